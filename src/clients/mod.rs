pub mod mailbox;
pub mod platform;

pub use mailbox::{MailboxPool, MailboxProvider};
pub use platform::PlatformClient;

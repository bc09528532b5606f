pub mod course;
pub mod identity;
pub mod platform;
pub mod question;
pub mod session;

pub use course::{CourseId, CourseUnit, NewCourse, NewTest, TestId, TestUnit};
pub use identity::{Credentials, IdentityId, NewIdentity, RetiredIdentity, WorkerIdentity};
pub use platform::{
    FormState, ListingEntry, MailMessage, Mailbox, MenuEntry, QuestionForm, ResultsPage,
    SessionHandle, Verdict,
};
pub use question::{
    AnswerCandidate, CandidateChoice, CandidateId, CandidateStatus, CorrelationItem, NewQuestion,
    OptionDescriptor, QuestionId, QuestionKind, QuestionRecord,
};
pub use session::SessionId;

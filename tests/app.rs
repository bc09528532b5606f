//! 端到端：发现课程 → 维护 → 尝试

mod common;

use std::sync::Arc;

use answer_prober::clients::{MailboxPool, MailboxProvider};
use answer_prober::models::{ListingEntry, MenuEntry};
use answer_prober::services::{CourseScan, PoolAction};
use answer_prober::store::{MemoryStore, Store};
use answer_prober::{App, Config};

use common::{fast_config, single_answer, single_question, FakeMailbox, FakePlatform};

#[tokio::test]
async fn test_full_cycle_finalizes_discovered_test() {
    let store = Arc::new(MemoryStore::new());
    let mail = FakeMailbox::new();
    let platform = Arc::new(FakePlatform::delivering_to(Arc::clone(&mail)));
    platform.set_listing(vec![vec![ListingEntry {
        publish_id: "10/1".to_string(),
        title: "Course".to_string(),
        available: true,
    }]]);
    platform.set_menu(
        "10/1",
        vec![MenuEntry {
            publish_id: "10/1/test/1/1".to_string(),
            title: "Test".to_string(),
            questions_count: 1,
        }],
    );
    platform.script_test(
        "10/1/test/1/1",
        vec![single_question(7, 1)],
        vec![(7, single_answer(1))],
    );

    let config = Config {
        accounts_count: 1,
        test_scan_interval_secs: 0,
        max_concurrent_attempts: 1,
        ..fast_config()
    };
    let mailboxes = MailboxPool::new(vec![mail as Arc<dyn MailboxProvider>]);
    let app = App::new(store.clone(), platform.clone(), mailboxes, config);

    let discovered = app.discover().await.unwrap();
    assert_eq!(discovered.added, 1);

    let report = app.run_maintenance().await.unwrap();
    assert!(matches!(report.pool, PoolAction::Registered(_)));
    assert!(matches!(report.scan, CourseScan::Scanned { .. }));
    assert_eq!(report.assigned, 1);

    let stats = app.run_attempts(2).await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.finalized, 1);
    assert_eq!(stats.no_work, 1);
    assert_eq!(stats.total(), 2);

    assert!(platform
        .calls()
        .contains(&"finalize:10/1/test/1/1".to_string()));
    let test = store
        .test_by_publish_id("10/1/test/1/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(test.passed_count, 1);
}

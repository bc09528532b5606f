//! 选题调度服务 - 业务能力层
//!
//! ## 职责
//!
//! - 发现课程：翻页读取课程列表，跳过付费课程
//! - 扫描课程：读取课程菜单，登记其中的测试
//! - 分配监视账号：每个测试由一个账号负责持续答题
//! - 选择下一项工作：分数最低的测试优先
//!
//! 扫描时间戳配合各自的超时窗口，限制对平台的访问频率。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::clients::PlatformClient;
use crate::config::Config;
use crate::error::{AppResult, BusinessError};
use crate::models::{
    CourseUnit, IdentityId, NewCourse, NewTest, SessionHandle, TestUnit, WorkerIdentity,
};
use crate::services::identity_pool::IdentityPool;
use crate::store::Store;

/// 选中的工作
#[derive(Debug, Clone)]
pub struct WorkSelection {
    pub test: TestUnit,
    pub course: CourseUnit,
    /// 测试的监视账号，选中时已被租用
    pub identity: WorkerIdentity,
}

/// 发现或扫描的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub found: usize,
    pub added: usize,
}

/// `scan_next_course` 的结果
#[derive(Debug, Clone)]
pub enum CourseScan {
    Scanned {
        course: CourseUnit,
        stats: DiscoveryStats,
    },
    /// 所有课程都在超时窗口内，`next` 是最早可以再扫描的课程
    AllInTimeout { next: CourseUnit },
    NoCourses,
}

pub struct WorkScheduler {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformClient>,
    pool: Arc<IdentityPool>,
    config: Config,
}

impl WorkScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformClient>,
        pool: Arc<IdentityPool>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            platform,
            pool,
            config: config.clone(),
        }
    }

    // ========== 发现 ==========

    /// 逐页读取课程列表直到空页
    pub async fn discover_courses(&self) -> AppResult<DiscoveryStats> {
        let mut stats = DiscoveryStats::default();

        for page in 0.. {
            let entries = self.platform.fetch_listing_page(page).await?;
            if entries.is_empty() {
                break;
            }
            debug!("课程列表第 {} 页: {} 项", page, entries.len());
            stats.found += entries.len();

            for entry in entries {
                if !entry.available {
                    debug!("跳过付费课程 \"{}\"", entry.title);
                    continue;
                }
                if self.store.course_by_publish_id(&entry.publish_id).await?.is_some() {
                    continue;
                }
                let new_course = NewCourse {
                    publish_id: entry.publish_id,
                    title: entry.title,
                };
                match self.store.insert_course(new_course, Utc::now()).await {
                    Ok(course) => {
                        info!("➕ 新课程 {}", course);
                        stats.added += 1;
                    }
                    // 并发写入时其他进程已登记
                    Err(e) if e.is_duplicate() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        info!("✓ 课程发现完成: 共 {} 项，新增 {}", stats.found, stats.added);
        Ok(stats)
    }

    /// 扫描最久未扫描的课程
    pub async fn scan_next_course(&self) -> AppResult<CourseScan> {
        let now = Utc::now();
        let course = self
            .store
            .courses()
            .await?
            .into_iter()
            .min_by_key(|course| (course.last_scan_at, course.id));
        let Some(course) = course else {
            return Ok(CourseScan::NoCourses);
        };

        if course.last_scan_at > self.config.course_scan_timeout_moment(now) {
            info!("⏳ 所有课程都在扫描间隔内，下一个是 {}", course);
            return Ok(CourseScan::AllInTimeout { next: course });
        }

        info!("🔍 扫描课程 {}", course);
        let session = self.session_for_course(&course).await?;
        let menu = self.platform.fetch_course_menu(&session, &course).await?;

        let mut stats = DiscoveryStats {
            found: menu.len(),
            added: 0,
        };
        for entry in menu {
            if self.store.test_by_publish_id(&entry.publish_id).await?.is_some() {
                continue;
            }
            let new_test = NewTest {
                publish_id: entry.publish_id,
                title: entry.title,
                course_id: course.id,
                questions_count: entry.questions_count,
            };
            match self.store.insert_test(new_test, Utc::now()).await {
                Ok(test) => {
                    info!("➕ 新测试 {}", test);
                    stats.added += 1;
                }
                Err(e) if e.is_duplicate() => {}
                Err(e) => return Err(e),
            }
        }

        self.store.mark_course_scanned(course.id, Utc::now()).await?;
        info!("✓ 课程 {} 扫描完成: 测试 {} 个，新增 {}", course.id, stats.found, stats.added);
        Ok(CourseScan::Scanned { course, stats })
    }

    /// 优先用已订阅该课程的账号，否则订阅课程最少的账号先订阅
    async fn session_for_course(&self, course: &CourseUnit) -> AppResult<SessionHandle> {
        let available = self.pool.available().await?;
        let subscribers: HashSet<IdentityId> =
            self.store.subscribers(course.id).await?.into_iter().collect();

        if let Some(identity) = available.iter().find(|i| subscribers.contains(&i.id)) {
            return self.pool.authenticate(identity).await;
        }

        let counts: HashMap<IdentityId, usize> =
            self.store.subscription_counts().await?.into_iter().collect();
        let identity = available
            .iter()
            .min_by_key(|i| (counts.get(&i.id).copied().unwrap_or(0), i.reserved_until, i.id))
            .ok_or(BusinessError::NoIdentityAvailable)?;

        let session = self.pool.authenticate(identity).await?;
        self.platform.subscribe(&session, course).await?;
        self.store.add_subscription(identity.id, course.id).await?;
        info!("✓ 账号 {} 订阅了课程 {}", identity, course);
        Ok(session)
    }

    // ========== 分配 ==========

    /// 为没有监视账号的测试分配账号，返回分配数量
    pub async fn assign_watchers(&self) -> AppResult<usize> {
        let mut tests = self.store.tests().await?;
        let available = self.pool.available().await?;

        let mut watched: HashMap<IdentityId, usize> = HashMap::new();
        let mut course_watchers: HashMap<i64, HashSet<IdentityId>> = HashMap::new();
        for test in &tests {
            if let Some(watcher) = test.watcher {
                *watched.entry(watcher).or_default() += 1;
                course_watchers.entry(test.course_id).or_default().insert(watcher);
            }
        }

        tests.retain(|test| test.watcher.is_none() && !test.unsolvable);
        tests.sort_by_key(|test| (test.last_scan_at, test.id));

        let mut assigned = 0;
        for test in tests {
            let excluded = course_watchers.entry(test.course_id).or_default();
            let chosen = available
                .iter()
                .filter(|identity| !excluded.contains(&identity.id))
                .min_by_key(|identity| {
                    (
                        watched.get(&identity.id).copied().unwrap_or(0),
                        identity.reserved_until,
                        identity.id,
                    )
                });
            let Some(identity) = chosen else {
                debug!("测试 {} 没有可分配的账号", test);
                continue;
            };

            self.store.set_watcher(test.id, Some(identity.id)).await?;
            *watched.entry(identity.id).or_default() += 1;
            excluded.insert(identity.id);
            assigned += 1;
            info!("👤 账号 {} 负责测试 {}", identity, test);
        }

        Ok(assigned)
    }

    // ========== 选择 ==========

    /// 选出下一项工作并租用其监视账号
    pub async fn select_work(&self) -> AppResult<Option<WorkSelection>> {
        let now = Utc::now();
        let reserve_out_moment = self.config.account_reserve_out_moment(now);
        let scan_moment = self.config.test_scan_timeout_moment(now);

        let identities: HashMap<IdentityId, WorkerIdentity> = self
            .store
            .identities()
            .await?
            .into_iter()
            .map(|identity| (identity.id, identity))
            .collect();
        let courses: HashMap<i64, CourseUnit> = self
            .store
            .courses()
            .await?
            .into_iter()
            .map(|course| (course.id, course))
            .collect();

        let best = self
            .store
            .tests()
            .await?
            .into_iter()
            .filter(|test| !test.unsolvable)
            .filter(|test| {
                test.watcher
                    .and_then(|id| identities.get(&id))
                    .is_some_and(|identity| identity.is_available(reserve_out_moment))
            })
            .filter(|test| {
                courses
                    .get(&test.course_id)
                    .is_some_and(|course| course.last_scan_at < scan_moment)
            })
            .min_by_key(|test| {
                (
                    test.passing_score(),
                    test.max_rating,
                    test.average_rating,
                    test.last_scan_at,
                    test.created_at,
                    test.id,
                )
            });

        let Some(test) = best else {
            info!("💤 没有可选的测试");
            return Ok(None);
        };

        let (Some(watcher), Some(course)) = (test.watcher, courses.get(&test.course_id).cloned())
        else {
            return Ok(None);
        };
        let identity = self.pool.reserve(watcher).await?;
        info!("🎯 选中测试 {}，课程 {}，账号 {}", test, course, identity);

        Ok(Some(WorkSelection {
            test,
            course,
            identity,
        }))
    }
}

// ==========================================
// 成绩评定 - 成绩写入防抖调度器
// ==========================================
// 职责: 合并同一成绩汇总在时间窗口内的连续修改, 只持久化最后状态
// key: (student_id, session, term), 每个 key 独立计时
// 约束:
// - 不同学生/学期的修改互不取消
// - 计时器触发后的写入不可取消; 放弃修改须在窗口内用新状态覆盖
// - 写入失败不重试, 记入失败列表供调用方重新提交
// 说明: Engine 层定义 ScoreStore trait, Repository 层实现
// ==========================================

use crate::domain::score::{ScoreAggregate, ScoreKey};
use crate::domain::types::AcademicPeriod;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// 默认防抖窗口 (毫秒)
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

pub type StoreError = Box<dyn Error + Send + Sync>;

// ==========================================
// ScoreStore - 成绩汇总持久化接口
// ==========================================
/// 整条替换语义的成绩写入接口
///
/// 实现者: ScoreRepository (rusqlite)
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn save_score(&self, aggregate: &ScoreAggregate) -> Result<(), StoreError>;
}

/// 写入失败记录
#[derive(Debug, Clone)]
pub struct FailedWrite {
    pub key: ScoreKey,
    pub aggregate: ScoreAggregate,
    pub error: String,
}

struct PendingWrite {
    generation: u64,
    aggregate: ScoreAggregate,
}

type PendingMap = Arc<Mutex<HashMap<ScoreKey, PendingWrite>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ==========================================
// ScoreWriteScheduler - 按 key 防抖写入
// ==========================================
pub struct ScoreWriteScheduler {
    store: Arc<dyn ScoreStore>,
    window: Duration,
    generation: Arc<AtomicU64>,
    pending: PendingMap,
    failures: Arc<Mutex<Vec<FailedWrite>>>,
}

impl ScoreWriteScheduler {
    pub fn new(store: Arc<dyn ScoreStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 提交最新汇总状态, 重置该 key 的计时器
    ///
    /// 须在 tokio 运行时内调用
    pub fn schedule(&self, aggregate: ScoreAggregate) {
        let key = aggregate.key();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut pending = lock(&self.pending);
            let replaced = pending
                .insert(key.clone(), PendingWrite { generation, aggregate })
                .is_some();
            tracing::debug!(
                student_id = %key.student_id,
                session = %key.session,
                term = %key.term,
                generation,
                replaced,
                "成绩写入已排队"
            );
        }

        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let failures = Arc::clone(&self.failures);
        let window = self.window;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            // 仅最后一次修改对应的计时器负责写入
            let due = {
                let mut map = lock(&pending);
                match map.get(&key) {
                    Some(entry) if entry.generation == generation => map.remove(&key),
                    _ => None,
                }
            };

            if let Some(entry) = due {
                write_one(store.as_ref(), &failures, key, entry.aggregate).await;
            }
        });
    }

    /// 待写入数量
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// 某 key 的待写入状态 (读路径优先于已持久化数据)
    pub fn pending_state(&self, key: &ScoreKey) -> Option<ScoreAggregate> {
        lock(&self.pending).get(key).map(|p| p.aggregate.clone())
    }

    /// 立即写入某 key 的待写状态
    ///
    /// 写入失败时待写状态放回队列 (期间已有更新的修改则以新修改为准)
    pub async fn flush(&self, key: &ScoreKey) -> Result<bool, StoreError> {
        let due = lock(&self.pending).remove(key);
        let Some(entry) = due else {
            return Ok(false);
        };
        match self.store.save_score(&entry.aggregate).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(student_id = %key.student_id, error = %e, "成绩汇总立即写入失败, 已放回待写队列");
                lock(&self.pending).entry(key.clone()).or_insert(entry);
                Err(e)
            }
        }
    }

    /// 失败列表中是否有该班级学期的汇总
    pub fn has_failures_for(&self, class_id: &str, period: &AcademicPeriod) -> bool {
        lock(&self.failures).iter().any(|f| {
            f.aggregate.class_id == class_id && period.matches(&f.aggregate.session, &f.aggregate.term)
        })
    }

    /// 立即写入全部待写状态 (关闭前调用)
    ///
    /// 返回成功写入条数; 失败项记入失败列表
    pub async fn flush_all(&self) -> usize {
        let drained: Vec<(ScoreKey, PendingWrite)> = lock(&self.pending).drain().collect();
        let mut written = 0;
        for (key, entry) in drained {
            if write_one(self.store.as_ref(), &self.failures, key, entry.aggregate).await {
                written += 1;
            }
        }
        tracing::debug!(written, "待写成绩已全部落盘");
        written
    }

    /// 取出并清空失败列表
    pub fn take_failures(&self) -> Vec<FailedWrite> {
        std::mem::take(&mut *lock(&self.failures))
    }
}

async fn write_one(
    store: &dyn ScoreStore,
    failures: &Mutex<Vec<FailedWrite>>,
    key: ScoreKey,
    aggregate: ScoreAggregate,
) -> bool {
    match store.save_score(&aggregate).await {
        Ok(()) => {
            tracing::debug!(student_id = %key.student_id, "成绩汇总已写入");
            true
        }
        Err(e) => {
            tracing::error!(student_id = %key.student_id, error = %e, "成绩汇总写入失败");
            lock(failures).push(FailedWrite {
                key,
                aggregate,
                error: e.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ScoreField;
    use crate::engine::score_entry::ScoreEntryEngine;

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<ScoreAggregate>>,
        fail: bool,
    }

    #[async_trait]
    impl ScoreStore for RecordingStore {
        async fn save_score(&self, aggregate: &ScoreAggregate) -> Result<(), StoreError> {
            if self.fail {
                return Err("remote unavailable".into());
            }
            self.writes.lock().unwrap().push(aggregate.clone());
            Ok(())
        }
    }

    fn aggregate(student_id: &str, exam: f64) -> ScoreAggregate {
        let mut agg = ScoreAggregate::new_empty(
            format!("A-{}", student_id),
            student_id,
            "C1",
            &AcademicPeriod::new("2023/2024", "First"),
        );
        ScoreEntryEngine::default()
            .apply_subject_score(&mut agg, "Maths", ScoreField::Exam, exam)
            .unwrap();
        agg
    }

    #[tokio::test]
    async fn test_rapid_edits_collapse_into_one_write() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = ScoreWriteScheduler::new(store.clone(), Duration::from_millis(40));

        scheduler.schedule(aggregate("S1", 10.0));
        scheduler.schedule(aggregate("S1", 20.0));
        scheduler.schedule(aggregate("S1", 30.0));
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].total_score(), 30.0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_cancel_each_other() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = ScoreWriteScheduler::new(store.clone(), Duration::from_millis(40));

        scheduler.schedule(aggregate("S1", 10.0));
        scheduler.schedule(aggregate("S2", 20.0));

        tokio::time::sleep(Duration::from_millis(200)).await;

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().any(|a| a.student_id == "S1"));
        assert!(writes.iter().any(|a| a.student_id == "S2"));
    }

    #[tokio::test]
    async fn test_flush_all_writes_immediately() {
        let store = Arc::new(RecordingStore::default());
        let scheduler = ScoreWriteScheduler::new(store.clone(), Duration::from_secs(60));

        scheduler.schedule(aggregate("S1", 10.0));
        scheduler.schedule(aggregate("S2", 20.0));
        assert_eq!(scheduler.flush_all().await, 2);
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(store.writes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_pending_state() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let scheduler = ScoreWriteScheduler::new(store, Duration::from_secs(60));
        let edited = aggregate("S1", 42.0);
        let key = edited.key();

        scheduler.schedule(edited);
        assert!(scheduler.flush(&key).await.is_err());

        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(
            scheduler.pending_state(&key).map(|a| a.total_score()),
            Some(42.0)
        );
        assert!(scheduler.take_failures().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_tracked_per_cohort() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let scheduler = ScoreWriteScheduler::new(store, Duration::from_secs(60));
        scheduler.schedule(aggregate("S1", 10.0));
        scheduler.flush_all().await;

        let first = AcademicPeriod::new("2023/2024", "First");
        assert!(scheduler.has_failures_for("C1", &first));
        assert!(!scheduler.has_failures_for("C2", &first));
        assert!(!scheduler.has_failures_for("C1", &AcademicPeriod::new("2023/2024", "Second")));
    }

    #[tokio::test]
    async fn test_failed_write_is_kept_for_resubmission() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let scheduler = ScoreWriteScheduler::new(store, Duration::from_secs(60));

        scheduler.schedule(aggregate("S1", 10.0));
        assert_eq!(scheduler.flush_all().await, 0);

        let failures = scheduler.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].aggregate.total_score(), 10.0);
        assert!(scheduler.take_failures().is_empty());
    }
}

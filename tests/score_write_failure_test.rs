// ==========================================
// 成绩写入失败 集成测试
// ==========================================
// 覆盖: 立即写入失败保留待写状态、批量发布遇失败中止、重试不回退发布状态
// ==========================================


use async_trait::async_trait;
use school_ledger::api::{ApiError, ScoreApi};
use school_ledger::config::{config_keys, ConfigManager};
use school_ledger::domain::score::{ScoreAggregate, ScoreKey};
use school_ledger::domain::types::ScoreField;
use school_ledger::engine::{PublicationState, ScoreStore, StoreError};
use school_ledger::repository::{AttendanceRepository, ScoreRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use test_helpers::{create_test_db, period};

/// 可切换为失败的写入目标
struct FlakyStore {
    inner: ScoreRepository,
    failing: AtomicBool,
}

impl FlakyStore {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScoreStore for FlakyStore {
    async fn save_score(&self, aggregate: &ScoreAggregate) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("remote store unavailable".into());
        }
        self.inner.save_score(aggregate).await
    }
}

struct Fixture {
    _tmp: NamedTempFile,
    api: ScoreApi,
    store: Arc<FlakyStore>,
    repo: Arc<ScoreRepository>,
}

/// 防抖窗口设为 60s, 只有显式落盘才会写入
fn setup() -> Fixture {
    let (tmp, db_path) = create_test_db().unwrap();
    let config = Arc::new(ConfigManager::new(&db_path).unwrap());
    config
        .set_global_config_value(config_keys::SCORE_DEBOUNCE_MS, "60000")
        .unwrap();

    let repo = Arc::new(ScoreRepository::new(&db_path).unwrap());
    let store = Arc::new(FlakyStore {
        inner: ScoreRepository::new(&db_path).unwrap(),
        failing: AtomicBool::new(true),
    });
    let api = ScoreApi::with_store(
        repo.clone(),
        Arc::new(AttendanceRepository::new(&db_path).unwrap()),
        config,
        store.clone(),
    )
    .unwrap();

    Fixture {
        _tmp: tmp,
        api,
        store,
        repo,
    }
}

#[tokio::test]
async fn test_publish_keeps_pending_edit_when_flush_fails() {
    let fx = setup();
    let p = period("First");
    fx.api
        .upsert_subject_score("S1", "JSS1", &p, "Maths", ScoreField::Exam, "60")
        .unwrap();
    let score_id = fx.api.get_aggregate("S1", &p).unwrap().unwrap().id;

    assert!(matches!(
        fx.api.publish(&score_id, "head-teacher").await.unwrap_err(),
        ApiError::TransportError(_)
    ));
    assert_eq!(fx.api.pending_writes(), 1);
    let pending = fx.api.get_aggregate("S1", &p).unwrap().unwrap();
    assert_eq!(pending.row("Maths").unwrap().exam(), 60.0);
    assert!(!pending.is_passed());

    fx.store.set_failing(false);
    let from = fx.api.publish(&score_id, "head-teacher").await.unwrap();
    assert_eq!(from, PublicationState::Unpublished);

    let stored = fx.repo.find_by_key(&ScoreKey::new("S1", &p)).unwrap().unwrap();
    assert!(stored.is_passed());
    assert_eq!(stored.row("Maths").unwrap().exam(), 60.0);
}

#[tokio::test]
async fn test_bulk_publish_aborts_on_failed_writes() {
    let fx = setup();
    let p = period("First");
    fx.api
        .upsert_subject_score("S1", "JSS1", &p, "Maths", ScoreField::Exam, "50")
        .unwrap();

    assert!(matches!(
        fx.api.publish_class("JSS1", &p, "head-teacher").await.unwrap_err(),
        ApiError::TransportError(_)
    ));
    assert!(matches!(
        fx.api.regrade_class("JSS1", &p).await.unwrap_err(),
        ApiError::TransportError(_)
    ));
    // 未做任何发布
    assert!(fx.api.student_result("S1", &p).unwrap().is_pending());
    let stored = fx.repo.find_by_key(&ScoreKey::new("S1", &p)).unwrap().unwrap();
    assert!(!stored.is_passed());

    fx.store.set_failing(false);
    assert_eq!(fx.api.retry_failed_writes().unwrap(), 1);
    assert_eq!(fx.api.flush_all().await, 1);
    assert_eq!(fx.api.publish_class("JSS1", &p, "head-teacher").await.unwrap(), 1);

    let stored = fx.repo.find_by_key(&ScoreKey::new("S1", &p)).unwrap().unwrap();
    assert!(stored.is_passed());
    assert_eq!(stored.average(), 50.0);
}

#[tokio::test]
async fn test_retry_does_not_revert_publication() {
    let fx = setup();
    let p = period("First");
    fx.api
        .upsert_subject_score("S1", "JSS1", &p, "Maths", ScoreField::Exam, "45")
        .unwrap();
    assert_eq!(fx.api.flush_all().await, 0);

    fx.store.set_failing(false);
    let score_id = fx.repo.find_by_key(&ScoreKey::new("S1", &p)).unwrap().unwrap().id;
    fx.api.publish(&score_id, "head-teacher").await.unwrap();

    // 失败快照发布前生成, 重放时沿用当前发布状态
    assert_eq!(fx.api.retry_failed_writes().unwrap(), 1);
    assert_eq!(fx.api.flush_all().await, 1);

    let stored = fx.repo.find_by_key(&ScoreKey::new("S1", &p)).unwrap().unwrap();
    assert!(stored.is_passed());
    assert_eq!(stored.passed_by(), Some("head-teacher"));
    assert_eq!(stored.row("Maths").unwrap().exam(), 45.0);
    assert!(!fx.api.student_result("S1", &p).unwrap().is_pending());
}

#[tokio::test]
async fn test_retry_skips_keys_with_newer_edits() {
    let fx = setup();
    let p = period("First");
    fx.api
        .upsert_subject_score("S1", "JSS1", &p, "Maths", ScoreField::Exam, "30")
        .unwrap();
    fx.api.flush_all().await;

    fx.store.set_failing(false);
    fx.api
        .upsert_subject_score("S1", "JSS1", &p, "Maths", ScoreField::Exam, "55")
        .unwrap();
    assert_eq!(fx.api.retry_failed_writes().unwrap(), 0);
    assert_eq!(fx.api.flush_all().await, 1);

    let stored = fx.repo.find_by_key(&ScoreKey::new("S1", &p)).unwrap().unwrap();
    assert_eq!(stored.row("Maths").unwrap().exam(), 55.0);
}

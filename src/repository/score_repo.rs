// ==========================================
// 成绩评定 - 成绩汇总仓储
// ==========================================
// 存储: payload_json 存整条 ScoreAggregate, 索引列 (班级/学期/发布状态/均分) 供查询
// 唯一键: (student_id, session, term)
// 写入为整条替换, 调度器通过 ScoreStore trait 调用
// ==========================================

use crate::domain::score::{ScoreAggregate, ScoreKey};
use crate::domain::types::AcademicPeriod;
use crate::engine::write_scheduler::{ScoreStore, StoreError};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const UPSERT_SQL: &str = r#"
    INSERT INTO score_aggregate (
        score_id, student_id, class_id, session, term,
        is_passed, average, total_score, payload_json, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
    ON CONFLICT(student_id, session, term) DO UPDATE SET
        class_id = excluded.class_id,
        is_passed = excluded.is_passed,
        average = excluded.average,
        total_score = excluded.total_score,
        payload_json = excluded.payload_json,
        updated_at = excluded.updated_at
"#;

// ==========================================
// ScoreRepository - 成绩汇总仓储
// ==========================================
pub struct ScoreRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, score_id: &str) -> RepositoryResult<Option<ScoreAggregate>> {
        let conn = self.get_conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM score_aggregate WHERE score_id = ?1",
                params![score_id],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    pub fn find_by_key(&self, key: &ScoreKey) -> RepositoryResult<Option<ScoreAggregate>> {
        let conn = self.get_conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM score_aggregate WHERE student_id = ?1 AND session = ?2 AND term = ?3",
                params![key.student_id, key.session, key.term],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&p)).transpose()
    }

    /// 查询或新建空汇总
    ///
    /// 新建时立即落库, 保证同一 key 只有一条记录
    pub fn get_or_create(
        &self,
        student_id: &str,
        class_id: &str,
        period: &AcademicPeriod,
    ) -> RepositoryResult<ScoreAggregate> {
        if let Some(existing) = self.find_by_key(&ScoreKey::new(student_id, period))? {
            return Ok(existing);
        }
        let aggregate = ScoreAggregate::new_empty(Uuid::new_v4().to_string(), student_id, class_id, period);
        self.save(&aggregate)?;
        tracing::debug!(student_id, session = %period.session, term = %period.term, "新建成绩汇总");
        Ok(aggregate)
    }

    /// 整条写入 (upsert)
    pub fn save(&self, aggregate: &ScoreAggregate) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        upsert(&conn, aggregate)
    }

    /// 批量写入 (单事务, 用于批量发布/撤回)
    pub fn save_all(&self, aggregates: &[ScoreAggregate]) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        for aggregate in aggregates {
            upsert(&tx, aggregate)?;
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    /// 查询班级某学期全部汇总 (按学生ID排序)
    pub fn list_by_cohort(&self, class_id: &str, period: &AcademicPeriod) -> RepositoryResult<Vec<ScoreAggregate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payload_json FROM score_aggregate
            WHERE class_id = ?1 AND session = ?2 AND term = ?3
            ORDER BY student_id
            "#,
        )?;
        let payloads = stmt
            .query_map(params![class_id, period.session, period.term], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        payloads.iter().map(|p| decode(p)).collect()
    }
}

#[async_trait]
impl ScoreStore for ScoreRepository {
    async fn save_score(&self, aggregate: &ScoreAggregate) -> Result<(), StoreError> {
        self.save(aggregate)?;
        Ok(())
    }
}

fn upsert(conn: &Connection, aggregate: &ScoreAggregate) -> RepositoryResult<()> {
    let payload = serde_json::to_string(aggregate)?;
    conn.execute(
        UPSERT_SQL,
        params![
            aggregate.id,
            aggregate.student_id,
            aggregate.class_id,
            aggregate.session,
            aggregate.term,
            aggregate.is_passed() as i32,
            aggregate.average(),
            aggregate.total_score(),
            payload,
        ],
    )?;
    Ok(())
}

fn decode(payload: &str) -> RepositoryResult<ScoreAggregate> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};
    use crate::domain::types::ScoreField;
    use crate::engine::publication::PublicationStateMachine;
    use crate::engine::score_entry::ScoreEntryEngine;
    use chrono::Utc;

    fn setup() -> ScoreRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        ScoreRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn period() -> AcademicPeriod {
        AcademicPeriod::new("2023/2024", "First")
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let repo = setup();
        let first = repo.get_or_create("S1", "JSS1", &period()).unwrap();
        let second = repo.get_or_create("S1", "JSS1", &period()).unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.rows().is_empty());
    }

    #[test]
    fn test_save_replaces_whole_aggregate() {
        let repo = setup();
        let mut agg = repo.get_or_create("S1", "JSS1", &period()).unwrap();
        ScoreEntryEngine::default()
            .apply_subject_score(&mut agg, "Maths", ScoreField::Exam, 50.0)
            .unwrap();
        repo.save(&agg).unwrap();

        let loaded = repo.find_by_key(&agg.key()).unwrap().unwrap();
        assert_eq!(loaded, agg);
        assert_eq!(loaded.row("Maths").unwrap().exam(), 50.0);
        assert_eq!(repo.find_by_id(&agg.id).unwrap().unwrap(), agg);
    }

    #[test]
    fn test_save_all_and_list_by_cohort() {
        let repo = setup();
        let machine = PublicationStateMachine::new();
        let mut cohort: Vec<ScoreAggregate> = ["S2", "S1"]
            .iter()
            .map(|s| repo.get_or_create(s, "JSS1", &period()).unwrap())
            .collect();
        repo.get_or_create("S9", "JSS2", &period()).unwrap();

        machine
            .publish_cohort(&mut cohort, "JSS1", &period(), "head", Utc::now())
            .unwrap();
        repo.save_all(&cohort).unwrap();

        let listed = repo.list_by_cohort("JSS1", &period()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].student_id, "S1");
        assert!(listed.iter().all(|a| a.is_passed()));
    }

    #[tokio::test]
    async fn test_score_store_impl_persists() {
        let repo = setup();
        let mut agg = ScoreAggregate::new_empty("A1".to_string(), "S1", "JSS1", &period());
        ScoreEntryEngine::default()
            .apply_subject_score(&mut agg, "English", ScoreField::Ca1, 15.0)
            .unwrap();
        repo.save_score(&agg).await.unwrap();
        assert_eq!(repo.find_by_id("A1").unwrap().unwrap().total_score(), 15.0);
    }
}

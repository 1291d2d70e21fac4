// ==========================================
// 学生财务台账 - 费用项仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (删除前的引用检查在 API 层)
// ==========================================

use crate::domain::fee::FeeStructure;
use crate::domain::types::{AcademicPeriod, ClassScope};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const FEE_COLUMNS: &str = "fee_id, name, amount, class_scope, session, term, is_optional";

// ==========================================
// FeeStructureRepository - 费用项仓储
// ==========================================
/// 职责: 管理 fee_structure 表的 CRUD 操作
pub struct FeeStructureRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FeeStructureRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn create(&self, fee: &FeeStructure) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO fee_structure (fee_id, name, amount, class_scope, session, term, is_optional)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                fee.id,
                fee.name,
                fee.amount,
                fee.class_scope.to_db_string(),
                fee.session,
                fee.term,
                fee.is_optional as i32,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, fee_id: &str) -> RepositoryResult<Option<FeeStructure>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM fee_structure WHERE fee_id = ?1", FEE_COLUMNS);
        let fee = conn
            .query_row(&sql, params![fee_id], map_fee_row)
            .optional()?;
        Ok(fee)
    }

    /// 查询某学期的费用目录 (按创建顺序)
    pub fn find_by_period(&self, period: &AcademicPeriod) -> RepositoryResult<Vec<FeeStructure>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM fee_structure WHERE session = ?1 AND term = ?2 ORDER BY rowid",
            FEE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let fees = stmt
            .query_map(params![period.session, period.term], map_fee_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fees)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<FeeStructure>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM fee_structure ORDER BY rowid", FEE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let fees = stmt
            .query_map([], map_fee_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fees)
    }

    /// 删除费用项
    ///
    /// # 返回
    /// - Err(NotFound): 费用项不存在
    pub fn delete(&self, fee_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM fee_structure WHERE fee_id = ?1", params![fee_id])?;
        if affected == 0 {
            return Err(RepositoryError::not_found("FeeStructure", fee_id));
        }
        Ok(())
    }
}

fn map_fee_row(row: &Row<'_>) -> rusqlite::Result<FeeStructure> {
    Ok(FeeStructure {
        id: row.get(0)?,
        name: row.get(1)?,
        amount: row.get(2)?,
        class_scope: ClassScope::from_db_str(&row.get::<_, String>(3)?),
        session: row.get(4)?,
        term: row.get(5)?,
        is_optional: row.get::<_, i32>(6)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};

    fn setup() -> FeeStructureRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        FeeStructureRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn fee(id: &str, term: &str, scope: ClassScope) -> FeeStructure {
        FeeStructure {
            id: id.to_string(),
            name: format!("Fee {}", id),
            amount: 10_000,
            class_scope: scope,
            session: "2023/2024".to_string(),
            term: term.to_string(),
            is_optional: false,
        }
    }

    #[test]
    fn test_create_and_find_by_period() {
        let repo = setup();
        repo.create(&fee("F1", "First", ClassScope::All)).unwrap();
        repo.create(&fee("F2", "First", ClassScope::Class("JSS1".to_string())))
            .unwrap();
        repo.create(&fee("F3", "Second", ClassScope::All)).unwrap();

        let first = repo
            .find_by_period(&AcademicPeriod::new("2023/2024", "First"))
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "F1");
        assert_eq!(first[1].class_scope, ClassScope::Class("JSS1".to_string()));
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_delete_missing_fee_is_not_found() {
        let repo = setup();
        repo.create(&fee("F1", "First", ClassScope::All)).unwrap();
        repo.delete("F1").unwrap();
        assert!(repo.find_by_id("F1").unwrap().is_none());

        let err = repo.delete("F1").unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}

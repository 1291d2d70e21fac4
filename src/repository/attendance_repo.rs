// ==========================================
// 考勤 - 考勤登记表仓储
// ==========================================
// 唯一键: (class_id, register_date), 由数据库约束兜底
// 更新仅限 (session, term), records 创建后不再写入
// ==========================================

use crate::domain::attendance::{AttendanceRecord, AttendanceRegister};
use crate::domain::types::AcademicPeriod;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const REGISTER_COLUMNS: &str = "register_id, class_id, register_date, session, term, records_json";

// ==========================================
// AttendanceRepository - 考勤登记表仓储
// ==========================================
pub struct AttendanceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AttendanceRepository {
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

    /// 新增登记表
    ///
    /// 同 (class_id, date) 已存在时返回 UniqueConstraintViolation
    pub fn insert(&self, register: &AttendanceRegister) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO attendance_register (register_id, class_id, register_date, session, term, records_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                register.id,
                register.class_id,
                register.date.format("%Y-%m-%d").to_string(),
                register.session,
                register.term,
                serde_json::to_string(&register.records)?,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, register_id: &str) -> RepositoryResult<Option<AttendanceRegister>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM attendance_register WHERE register_id = ?1", REGISTER_COLUMNS);
        let raw = conn.query_row(&sql, params![register_id], map_raw).optional()?;
        raw.map(decode).transpose()
    }

    pub fn find_by_class_date(&self, class_id: &str, date: NaiveDate) -> RepositoryResult<Option<AttendanceRegister>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM attendance_register WHERE class_id = ?1 AND register_date = ?2",
            REGISTER_COLUMNS
        );
        let raw = conn
            .query_row(&sql, params![class_id, date.format("%Y-%m-%d").to_string()], map_raw)
            .optional()?;
        raw.map(decode).transpose()
    }

    /// 班级某学期全部登记表 (按日期)
    pub fn list_by_class_period(
        &self,
        class_id: &str,
        period: &AcademicPeriod,
    ) -> RepositoryResult<Vec<AttendanceRegister>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM attendance_register WHERE class_id = ?1 AND session = ?2 AND term = ?3 ORDER BY register_date",
            REGISTER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![class_id, period.session, period.term], map_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(decode).collect()
    }

    /// 学期更正: 仅改写 session/term
    pub fn update_period(&self, register_id: &str, period: &AcademicPeriod) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE attendance_register SET session = ?1, term = ?2 WHERE register_id = ?3",
            params![period.session, period.term, register_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("AttendanceRegister", register_id));
        }
        Ok(())
    }
}

type RawRegister = (String, String, String, String, String, String);

fn map_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRegister> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode(raw: RawRegister) -> RepositoryResult<AttendanceRegister> {
    let (id, class_id, date, session, term, records_json) = raw;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| RepositoryError::SerializationError(format!("考勤日期格式错误 {}: {}", date, e)))?;
    let records: Vec<AttendanceRecord> = serde_json::from_str(&records_json)?;
    Ok(AttendanceRegister {
        id,
        class_id,
        date,
        session,
        term,
        records,
    })
}

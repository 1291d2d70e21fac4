// ==========================================
// 学生财务台账 - 缴费仓储
// ==========================================
// 表: payment / payment_line_item
// 约束: 缴费记录只增删不改; 金额须等于明细合计
// ==========================================

use crate::domain::fee::{Payment, PaymentLineItem};
use crate::domain::types::{AcademicPeriod, PaymentMethod, PaymentPurpose};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const PAYMENT_COLUMNS: &str = "payment_id, student_id, amount, method, payment_date, session, term, reference";

struct PaymentHead {
    id: String,
    student_id: String,
    amount: i64,
    method: String,
    date: String,
    session: String,
    term: String,
    reference: Option<String>,
}

// ==========================================
// PaymentRepository - 缴费仓储
// ==========================================
pub struct PaymentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PaymentRepository {
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

    /// 写入缴费记录 (主表 + 明细, 单事务)
    pub fn insert(&self, payment: &Payment) -> RepositoryResult<()> {
        if !payment.is_consistent() {
            return Err(RepositoryError::ValidationError(format!(
                "缴费金额{}与明细合计{}不一致",
                payment.amount,
                payment.line_items_total()
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO payment (payment_id, student_id, amount, method, payment_date, session, term, reference)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                payment.id,
                payment.student_id,
                payment.amount,
                payment.method.as_db_str(),
                payment.date.format("%Y-%m-%d").to_string(),
                payment.session,
                payment.term,
                payment.reference,
            ],
        )?;
        for (seq_no, item) in payment.line_items.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO payment_line_item (payment_id, seq_no, purpose_json, fee_id, amount)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    payment.id,
                    seq_no as i64,
                    serde_json::to_string(&item.purpose)?,
                    item.purpose.fee_id(),
                    item.amount,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(&self, payment_id: &str) -> RepositoryResult<Option<Payment>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM payment WHERE payment_id = ?1", PAYMENT_COLUMNS);
        let head = conn.query_row(&sql, params![payment_id], map_head).optional()?;
        match head {
            Some(h) => Ok(Some(load_payment(&conn, h)?)),
            None => Ok(None),
        }
    }

    /// 按在线支付流水号查询
    pub fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<Payment>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM payment WHERE reference = ?1", PAYMENT_COLUMNS);
        let head = conn.query_row(&sql, params![reference], map_head).optional()?;
        match head {
            Some(h) => Ok(Some(load_payment(&conn, h)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_student(&self, student_id: &str, period: &AcademicPeriod) -> RepositoryResult<Vec<Payment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM payment WHERE student_id = ?1 AND session = ?2 AND term = ?3 ORDER BY payment_date, rowid",
            PAYMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let heads = stmt
            .query_map(params![student_id, period.session, period.term], map_head)?
            .collect::<Result<Vec<_>, _>>()?;
        heads.into_iter().map(|h| load_payment(&conn, h)).collect()
    }

    pub fn find_by_period(&self, period: &AcademicPeriod) -> RepositoryResult<Vec<Payment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM payment WHERE session = ?1 AND term = ?2 ORDER BY payment_date, rowid",
            PAYMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let heads = stmt
            .query_map(params![period.session, period.term], map_head)?
            .collect::<Result<Vec<_>, _>>()?;
        heads.into_iter().map(|h| load_payment(&conn, h)).collect()
    }

    /// 明细中引用了该费用项的缴费记录
    pub fn find_by_fee(&self, fee_id: &str) -> RepositoryResult<Vec<Payment>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM payment
            WHERE payment_id IN (SELECT payment_id FROM payment_line_item WHERE fee_id = ?1)
            ORDER BY payment_date, rowid
            "#,
            PAYMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let heads = stmt
            .query_map(params![fee_id], map_head)?
            .collect::<Result<Vec<_>, _>>()?;
        heads.into_iter().map(|h| load_payment(&conn, h)).collect()
    }

    /// 该费用项是否被任何缴费明细引用
    pub fn is_fee_referenced(&self, fee_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM payment_line_item WHERE fee_id = ?1 LIMIT 1",
                params![fee_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// 删除缴费记录 (明细级联删除)
    pub fn delete(&self, payment_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM payment WHERE payment_id = ?1", params![payment_id])?;
        if affected == 0 {
            return Err(RepositoryError::not_found("Payment", payment_id));
        }
        Ok(())
    }
}

fn map_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentHead> {
    Ok(PaymentHead {
        id: row.get(0)?,
        student_id: row.get(1)?,
        amount: row.get(2)?,
        method: row.get(3)?,
        date: row.get(4)?,
        session: row.get(5)?,
        term: row.get(6)?,
        reference: row.get(7)?,
    })
}

fn load_payment(conn: &Connection, head: PaymentHead) -> RepositoryResult<Payment> {
    let mut stmt = conn.prepare(
        "SELECT purpose_json, amount FROM payment_line_item WHERE payment_id = ?1 ORDER BY seq_no",
    )?;
    let raw = stmt
        .query_map(params![head.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut line_items = Vec::with_capacity(raw.len());
    for (purpose_json, amount) in raw {
        let purpose: PaymentPurpose = serde_json::from_str(&purpose_json)?;
        line_items.push(PaymentLineItem { purpose, amount });
    }

    let date = NaiveDate::parse_from_str(&head.date, "%Y-%m-%d").map_err(|e| {
        RepositoryError::SerializationError(format!("缴费日期格式错误 {}: {}", head.date, e))
    })?;

    Ok(Payment {
        id: head.id,
        student_id: head.student_id,
        amount: head.amount,
        method: PaymentMethod::from_str(&head.method),
        line_items,
        date,
        session: head.session,
        term: head.term,
        reference: head.reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};

    fn setup() -> PaymentRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        PaymentRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn payment(id: &str, items: Vec<PaymentLineItem>, reference: Option<&str>) -> Payment {
        let amount = items.iter().map(|i| i.amount).sum();
        Payment {
            id: id.to_string(),
            student_id: "S1".to_string(),
            amount,
            method: PaymentMethod::Cash,
            line_items: items,
            date: NaiveDate::from_ymd_opt(2023, 10, 2).unwrap(),
            session: "2023/2024".to_string(),
            term: "First".to_string(),
            reference: reference.map(str::to_string),
        }
    }

    fn fee_item(fee_id: &str, amount: i64) -> PaymentLineItem {
        PaymentLineItem {
            purpose: PaymentPurpose::Fee {
                fee_id: fee_id.to_string(),
            },
            amount,
        }
    }

    #[test]
    fn test_insert_and_find_with_line_items() {
        let repo = setup();
        let p = payment(
            "P1",
            vec![
                fee_item("TUITION", 20_000),
                PaymentLineItem {
                    purpose: PaymentPurpose::Uniform,
                    amount: 5_000,
                },
            ],
            None,
        );
        repo.insert(&p).unwrap();

        let loaded = repo.find_by_id("P1").unwrap().unwrap();
        assert_eq!(loaded, p);
        assert!(repo.is_fee_referenced("TUITION").unwrap());
        assert!(!repo.is_fee_referenced("BUS").unwrap());
        assert_eq!(repo.find_by_fee("TUITION").unwrap().len(), 1);

        let by_student = repo
            .find_by_student("S1", &AcademicPeriod::new("2023/2024", "First"))
            .unwrap();
        assert_eq!(by_student.len(), 1);
        assert!(repo
            .find_by_student("S1", &AcademicPeriod::new("2023/2024", "Second"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_inconsistent_payment_rejected() {
        let repo = setup();
        let mut p = payment("P1", vec![fee_item("TUITION", 1_000)], None);
        p.amount = 2_000;
        let err = repo.insert(&p).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_reference_is_unique() {
        let repo = setup();
        repo.insert(&payment("P1", vec![fee_item("TUITION", 1_000)], Some("REF-1")))
            .unwrap();
        let err = repo
            .insert(&payment("P2", vec![fee_item("TUITION", 1_000)], Some("REF-1")))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
        assert_eq!(repo.find_by_reference("REF-1").unwrap().unwrap().id, "P1");
    }

    #[test]
    fn test_delete_removes_line_items() {
        let repo = setup();
        repo.insert(&payment("P1", vec![fee_item("TUITION", 1_000)], None))
            .unwrap();
        repo.delete("P1").unwrap();
        assert!(!repo.is_fee_referenced("TUITION").unwrap());
        assert!(matches!(
            repo.delete("P1").unwrap_err(),
            RepositoryError::NotFound { .. }
        ));
    }
}

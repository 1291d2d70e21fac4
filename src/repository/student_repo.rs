// ==========================================
// 学生财务台账 - 学生仓储
// ==========================================
// 表: student / student_assigned_fee / student_discount
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::fee::{Student, StudentDiscount};
use crate::domain::types::DiscountCategory;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

// ==========================================
// StudentRepository - 学生仓储
// ==========================================
pub struct StudentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StudentRepository {
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

    /// 新增学生 (含已选费用与减免, 单事务)
    pub fn create(&self, student: &Student) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO student (student_id, name, class_id) VALUES (?1, ?2, ?3)",
            params![student.id, student.name, student.class_id],
        )?;
        for fee_id in &student.assigned_fees {
            tx.execute(
                "INSERT INTO student_assigned_fee (student_id, fee_id) VALUES (?1, ?2)",
                params![student.id, fee_id],
            )?;
        }
        for discount in student.discounts() {
            insert_discount(&tx, &student.id, discount)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(&self, student_id: &str) -> RepositoryResult<Option<Student>> {
        let conn = self.get_conn()?;
        let head = conn
            .query_row(
                "SELECT student_id, name, class_id FROM student WHERE student_id = ?1",
                params![student_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        match head {
            Some((id, name, class_id)) => Ok(Some(load_student(&conn, id, name, class_id)?)),
            None => Ok(None),
        }
    }

    /// 查询学生, 不存在时返回 NotFound
    pub fn get(&self, student_id: &str) -> RepositoryResult<Student> {
        self.find_by_id(student_id)?
            .ok_or_else(|| RepositoryError::not_found("Student", student_id))
    }

    pub fn list_by_class(&self, class_id: &str) -> RepositoryResult<Vec<Student>> {
        self.list_where("WHERE class_id = ?1", Some(class_id))
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<Student>> {
        self.list_where("", None)
    }

    fn list_where(&self, filter: &str, arg: Option<&str>) -> RepositoryResult<Vec<Student>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT student_id, name, class_id FROM student {} ORDER BY student_id",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        };
        let heads = match arg {
            Some(a) => stmt.query_map(params![a], map)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
        };

        heads
            .into_iter()
            .map(|(id, name, class_id)| load_student(&conn, id, name, class_id))
            .collect()
    }

    /// 整体替换学生已选的可选费用
    pub fn set_assigned_fees(&self, student_id: &str, fee_ids: &BTreeSet<String>) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        ensure_student_exists(&tx, student_id)?;
        tx.execute(
            "DELETE FROM student_assigned_fee WHERE student_id = ?1",
            params![student_id],
        )?;
        for fee_id in fee_ids {
            tx.execute(
                "INSERT INTO student_assigned_fee (student_id, fee_id) VALUES (?1, ?2)",
                params![student_id, fee_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn add_discount(&self, student_id: &str, discount: &StudentDiscount) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        ensure_student_exists(&conn, student_id)?;
        insert_discount(&conn, student_id, discount)?;
        Ok(())
    }

    /// 删除减免
    ///
    /// # 返回
    /// - Err(NotFound): 该学生名下无此减免
    pub fn remove_discount(&self, student_id: &str, discount_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM student_discount WHERE student_id = ?1 AND discount_id = ?2",
            params![student_id, discount_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("StudentDiscount", discount_id));
        }
        Ok(())
    }
}

fn ensure_student_exists(conn: &Connection, student_id: &str) -> RepositoryResult<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM student WHERE student_id = ?1",
            params![student_id],
            |_| Ok(()),
        )
        .optional()?;
    exists.ok_or_else(|| RepositoryError::not_found("Student", student_id))
}

fn insert_discount(conn: &Connection, student_id: &str, discount: &StudentDiscount) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO student_discount (discount_id, student_id, amount, reason, category, session, term)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            discount.id,
            student_id,
            discount.amount,
            discount.reason,
            discount.category.as_db_str(),
            discount.session,
            discount.term,
        ],
    )?;
    Ok(())
}

fn load_student(conn: &Connection, id: String, name: String, class_id: String) -> RepositoryResult<Student> {
    let mut stmt = conn.prepare(
        "SELECT fee_id FROM student_assigned_fee WHERE student_id = ?1 ORDER BY fee_id",
    )?;
    let assigned: BTreeSet<String> = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(
        r#"
        SELECT discount_id, amount, reason, category, session, term
        FROM student_discount
        WHERE student_id = ?1
        ORDER BY rowid
        "#,
    )?;
    let raw = stmt
        .query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut discounts = Vec::with_capacity(raw.len());
    for (discount_id, amount, reason, category, session, term) in raw {
        let category = DiscountCategory::parse(&category).ok_or_else(|| {
            RepositoryError::ValidationError(format!("未知减免类别: {}", category))
        })?;
        discounts.push(StudentDiscount {
            id: discount_id,
            amount,
            reason,
            category,
            session,
            term,
        });
    }

    let mut student = Student::new(id, name, class_id).with_discounts(discounts);
    student.assigned_fees = assigned;
    Ok(student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};

    fn setup() -> StudentRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        StudentRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn scholarship(id: &str, amount: i64) -> StudentDiscount {
        StudentDiscount {
            id: id.to_string(),
            amount,
            reason: "merit".to_string(),
            category: DiscountCategory::Scholarship,
            session: "2023/2024".to_string(),
            term: "First".to_string(),
        }
    }

    #[test]
    fn test_student_roundtrip_with_fees_and_discounts() {
        let repo = setup();
        let mut student = Student::new("S1", "Ada", "JSS1").with_discounts(vec![scholarship("D1", 5_000)]);
        student.assigned_fees.insert("BUS".to_string());
        repo.create(&student).unwrap();

        let loaded = repo.get("S1").unwrap();
        assert_eq!(loaded, student);
        assert!(loaded.has_opted_into("BUS"));
    }

    #[test]
    fn test_discount_add_and_remove() {
        let repo = setup();
        repo.create(&Student::new("S1", "Ada", "JSS1")).unwrap();
        repo.add_discount("S1", &scholarship("D1", 1_000)).unwrap();
        repo.add_discount("S1", &scholarship("D2", 2_000)).unwrap();

        repo.remove_discount("S1", "D1").unwrap();
        let loaded = repo.get("S1").unwrap();
        assert_eq!(loaded.discounts().len(), 1);
        assert_eq!(loaded.discounts()[0].id, "D2");

        let err = repo.remove_discount("S1", "D1").unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_assign_fees_for_missing_student() {
        let repo = setup();
        let err = repo
            .set_assigned_fees("NOPE", &BTreeSet::from(["BUS".to_string()]))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_list_by_class() {
        let repo = setup();
        repo.create(&Student::new("S2", "Bola", "JSS1")).unwrap();
        repo.create(&Student::new("S1", "Ada", "JSS1")).unwrap();
        repo.create(&Student::new("S3", "Chidi", "JSS2")).unwrap();

        let jss1 = repo.list_by_class("JSS1").unwrap();
        assert_eq!(
            jss1.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["S1", "S2"]
        );
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }
}

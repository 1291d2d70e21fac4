// ==========================================
// 学生财务台账与成绩引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表 (幂等), 写入 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表 (幂等)
///
/// 表结构:
/// - config_kv: 配置 (scope_id + key)
/// - fee_structure / student / student_assigned_fee / student_discount: 费用与学生
/// - payment / payment_line_item: 缴费 (创建后不可修改)
/// - score_aggregate: 成绩汇总, payload_json 存整条记录, 索引列供查询
/// - attendance_register: 考勤表, UNIQUE(class_id, date)
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS fee_structure (
            fee_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount >= 0),
            class_scope TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            is_optional INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_fee_structure_period ON fee_structure(session, term);

        CREATE TABLE IF NOT EXISTS student (
            student_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_student_class ON student(class_id);

        CREATE TABLE IF NOT EXISTS student_assigned_fee (
            student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
            fee_id TEXT NOT NULL,
            PRIMARY KEY (student_id, fee_id)
        );

        CREATE TABLE IF NOT EXISTS student_discount (
            discount_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
            amount INTEGER NOT NULL CHECK (amount >= 0),
            reason TEXT NOT NULL,
            category TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payment (
            payment_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            method TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            reference TEXT UNIQUE
        );
        CREATE INDEX IF NOT EXISTS idx_payment_student_period ON payment(student_id, session, term);

        CREATE TABLE IF NOT EXISTS payment_line_item (
            payment_id TEXT NOT NULL REFERENCES payment(payment_id) ON DELETE CASCADE,
            seq_no INTEGER NOT NULL,
            purpose_json TEXT NOT NULL,
            fee_id TEXT,
            amount INTEGER NOT NULL CHECK (amount > 0),
            PRIMARY KEY (payment_id, seq_no)
        );
        CREATE INDEX IF NOT EXISTS idx_payment_line_item_fee ON payment_line_item(fee_id);

        CREATE TABLE IF NOT EXISTS score_aggregate (
            score_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            is_passed INTEGER NOT NULL DEFAULT 0,
            average REAL NOT NULL DEFAULT 0,
            total_score REAL NOT NULL DEFAULT 0,
            payload_json TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (student_id, session, term)
        );
        CREATE INDEX IF NOT EXISTS idx_score_cohort ON score_aggregate(class_id, session, term);

        CREATE TABLE IF NOT EXISTS attendance_register (
            register_id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            register_date TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            records_json TEXT NOT NULL,
            UNIQUE (class_id, register_date)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 打开连接并建表
pub fn open_and_migrate(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

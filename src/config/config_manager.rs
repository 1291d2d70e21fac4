// ==========================================
// 学生财务台账与成绩引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 说明: 引擎不读取配置, 由 API 层读取后显式传入
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::grading::GradingScheme;
use crate::domain::types::AcademicPeriod;
use crate::engine::score_entry::ScoreCaps;
use crate::engine::write_scheduler::DEFAULT_DEBOUNCE_MS;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(key, value, "配置已更新");
        Ok(())
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 数值配置, 缺失时取默认值; 格式错误返回 Err
    fn get_number_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(e) => Err(format!("配置项{}格式错误 ({}): {}", key, raw, e).into()),
            },
            None => Ok(default),
        }
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    // ===== 当前学年学期 =====

    /// 获取当前学年学期
    ///
    /// 未配置时返回 Err (考勤学期更正等操作依赖此值)
    pub fn get_current_period(&self) -> Result<AcademicPeriod, Box<dyn Error>> {
        let session = self.get_config_value(config_keys::CURRENT_SESSION)?;
        let term = self.get_config_value(config_keys::CURRENT_TERM)?;
        match (session, term) {
            (Some(s), Some(t)) if !s.trim().is_empty() && !t.trim().is_empty() => {
                Ok(AcademicPeriod::new(s.trim(), t.trim()))
            }
            _ => Err("未配置当前学年学期 (current_session / current_term)".into()),
        }
    }

    pub fn set_current_period(&self, period: &AcademicPeriod) -> Result<(), Box<dyn Error>> {
        if period.session.trim().is_empty() || period.term.trim().is_empty() {
            return Err("学年学期不能为空".into());
        }
        self.set_global_config_value(config_keys::CURRENT_SESSION, &period.session)?;
        self.set_global_config_value(config_keys::CURRENT_TERM, &period.term)?;
        Ok(())
    }

    // ===== 成绩录入 =====

    /// 获取成绩分项满分 (默认 20/20/60)
    pub fn get_score_caps(&self) -> Result<ScoreCaps, Box<dyn Error>> {
        let defaults = ScoreCaps::default();
        let caps = ScoreCaps {
            ca1: self.get_number_or_default(config_keys::CA1_MAX, defaults.ca1)?,
            ca2: self.get_number_or_default(config_keys::CA2_MAX, defaults.ca2)?,
            exam: self.get_number_or_default(config_keys::EXAM_MAX, defaults.exam)?,
        };
        if [caps.ca1, caps.ca2, caps.exam].iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(format!("成绩分项满分配置非法: {:?}", caps).into());
        }
        Ok(caps)
    }

    /// 获取成绩写入防抖窗口
    pub fn get_score_debounce(&self) -> Result<Duration, Box<dyn Error>> {
        let ms = self.get_number_or_default(config_keys::SCORE_DEBOUNCE_MS, DEFAULT_DEBOUNCE_MS)?;
        Ok(Duration::from_millis(ms))
    }

    // ===== 评分等级 =====

    /// 获取评分等级方案, 未配置时使用标准方案
    pub fn get_grading_scheme(&self) -> Result<GradingScheme, Box<dyn Error>> {
        match self.get_config_value(config_keys::GRADING_SCHEME)? {
            Some(raw) => {
                let scheme: GradingScheme = serde_json::from_str(&raw)?;
                scheme.validate()?;
                Ok(scheme)
            }
            None => Ok(GradingScheme::standard()),
        }
    }

    /// 保存评分等级方案 (保存前校验)
    pub fn save_grading_scheme(&self, scheme: &GradingScheme) -> Result<(), Box<dyn Error>> {
        scheme.validate()?;
        let raw = serde_json::to_string(scheme)?;
        self.set_global_config_value(config_keys::GRADING_SCHEME, &raw)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 当前学年学期
    pub const CURRENT_SESSION: &str = "current_session";
    pub const CURRENT_TERM: &str = "current_term";

    // 成绩录入
    pub const SCORE_DEBOUNCE_MS: &str = "score_debounce_ms";
    pub const CA1_MAX: &str = "ca1_max";
    pub const CA2_MAX: &str = "ca2_max";
    pub const EXAM_MAX: &str = "exam_max";

    // 评分等级 (JSON)
    pub const GRADING_SCHEME: &str = "grading_scheme";
}

// ==========================================
// 学生财务台账与成绩引擎 - 配置层
// ==========================================
// 职责: 系统配置管理 (当前学期、成绩满分、防抖窗口、评分等级)
// 存储: config_kv 表
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};

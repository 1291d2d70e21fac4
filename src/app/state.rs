// ==========================================
// 学生财务台账与成绩引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 所有仓储共享同一个 SQLite 连接
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AttendanceApi, ConfigApi, LedgerApi, ScoreApi};
use crate::config::config_manager::ConfigManager;
use crate::repository::{
    AttendanceRepository, FeeStructureRepository, PaymentRepository, PaymentVerifier,
    ScoreRepository, StudentRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 台账API
    pub ledger_api: Arc<LedgerApi>,

    /// 成绩API
    pub score_api: Arc<ScoreApi>,

    /// 考勤API
    pub attendance_api: Arc<AttendanceApi>,

    /// 配置管理API
    pub config_api: Arc<ConfigApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径 (不存在时创建并建表)
    /// - verifier: 在线支付网关
    ///
    /// # 返回
    /// - Err(String): 初始化错误
    pub fn new(db_path: String, verifier: Arc<dyn PaymentVerifier>) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_and_migrate(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let fee_repo = Arc::new(FeeStructureRepository::from_connection(conn.clone()));
        let student_repo = Arc::new(StudentRepository::from_connection(conn.clone()));
        let payment_repo = Arc::new(PaymentRepository::from_connection(conn.clone()));
        let score_repo = Arc::new(ScoreRepository::from_connection(conn.clone()));
        let attendance_repo = Arc::new(AttendanceRepository::from_connection(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone()).map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化API层
        // ==========================================
        let ledger_api = Arc::new(LedgerApi::new(fee_repo, student_repo, payment_repo, verifier));
        let score_api = Arc::new(
            ScoreApi::new(score_repo, attendance_repo.clone(), config_manager.clone())
                .map_err(|e| format!("无法创建ScoreApi: {}", e))?,
        );
        let attendance_api = Arc::new(AttendanceApi::new(attendance_repo, config_manager.clone()));
        let config_api = Arc::new(ConfigApi::new(config_manager));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            ledger_api,
            score_api,
            attendance_api,
            config_api,
        })
    }

    /// 关闭前落盘全部待写成绩
    pub async fn shutdown(&self) -> usize {
        let written = self.score_api.flush_all().await;
        let failed = self.score_api.take_failed_writes();
        if !failed.is_empty() {
            tracing::error!(failed = failed.len(), "关闭时仍有成绩写入失败");
        }
        written
    }
}

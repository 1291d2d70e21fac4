// ==========================================
// 学生财务台账与成绩评定引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 学校后台 (费用/减免/缴费台账, 成绩录入/发布/排名, 考勤锁定)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AcademicPeriod, AttendanceStatus, ClassScope, DiscountCategory, PaymentMethod,
    PaymentPurpose, RecordField, ScoreField, TraitDomain,
};

// 领域实体
pub use domain::{
    AttendanceRegister, FeeStructure, GradingScheme, Payment, ScoreAggregate, Student,
    StudentDiscount, StudentResultView,
};

// 引擎
pub use engine::{
    AttendanceRegisterLock, BalanceCalculator, ClassRankCalculator, FeeResolver,
    GradeScaleResolver, PublicationStateMachine, ScoreEntryEngine, ScoreWriteScheduler,
};

// API
pub use api::{ApiError, ApiResult, AttendanceApi, ConfigApi, LedgerApi, ScoreApi};

pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "学生财务台账与成绩评定引擎";

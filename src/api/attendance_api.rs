// ==========================================
// 考勤 - 考勤 API
// ==========================================
// 职责: 考勤表创建 (含学期更正)、查询
// 当前学期: 从配置读取后显式传给锁定引擎
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::attendance::{AttendanceRecord, AttendanceRegister, NewAttendanceRegister};
use crate::domain::types::AcademicPeriod;
use crate::engine::attendance_lock::{AttendanceRegisterLock, RegisterWrite};
use crate::repository::attendance_repo::AttendanceRepository;
use crate::repository::error::RepositoryError;

// ==========================================
// AttendanceApi - 考勤 API
// ==========================================
pub struct AttendanceApi {
    attendance_repo: Arc<AttendanceRepository>,
    config: Arc<ConfigManager>,
    lock: AttendanceRegisterLock,
}

impl AttendanceApi {
    pub fn new(attendance_repo: Arc<AttendanceRepository>, config: Arc<ConfigManager>) -> Self {
        Self {
            attendance_repo,
            config,
            lock: AttendanceRegisterLock::new(),
        }
    }

    /// 创建考勤表
    ///
    /// # 参数
    /// - term_correction: 同 (class_id, date) 已有考勤表时, 请求将其学期更正为当前学期
    ///
    /// # 返回
    /// - Ok(RegisterWrite::Created): 新建
    /// - Ok(RegisterWrite::TermCorrected): 仅学期被更正, records 未变
    /// - Err(DuplicateRegister): 已存在且未请求更正
    /// - Err(RegisterLocked): 请求更正但学期已是当前学期
    pub fn create_register(&self, request: NewAttendanceRegister, term_correction: bool) -> ApiResult<RegisterWrite> {
        let current = self.config.get_current_period().map_err(ApiError::config)?;
        let existing = self
            .attendance_repo
            .find_by_class_date(&request.class_id, request.date)?;

        let write = self.lock.create(existing.as_ref(), request, &current, term_correction)?;
        match &write {
            RegisterWrite::Created(register) => match self.attendance_repo.insert(register) {
                Ok(()) => {
                    tracing::info!(
                        register_id = %register.id,
                        class_id = %register.class_id,
                        date = %register.date,
                        "考勤表已创建"
                    );
                }
                // 并发创建: 数据库唯一约束兜底
                Err(RepositoryError::UniqueConstraintViolation(_)) => {
                    return Err(ApiError::DuplicateRegister {
                        class_id: register.class_id.clone(),
                        date: register.date,
                    });
                }
                Err(e) => return Err(e.into()),
            },
            RegisterWrite::TermCorrected(register) => {
                self.attendance_repo.update_period(&register.id, &register.period())?;
            }
        }
        Ok(write)
    }

    /// 修改已登记考勤表的点名记录 (一律拒绝)
    pub fn update_records(&self, register_id: &str, _records: Vec<AttendanceRecord>) -> ApiResult<()> {
        let register = self
            .attendance_repo
            .find_by_id(register_id)?
            .ok_or_else(|| RepositoryError::not_found("AttendanceRegister", register_id))?;
        tracing::warn!(register_id, "已锁定考勤表修改被拒绝");
        Err(self.lock.reject_edit(&register).into())
    }

    pub fn get_register(&self, class_id: &str, date: NaiveDate) -> ApiResult<Option<AttendanceRegister>> {
        Ok(self.attendance_repo.find_by_class_date(class_id, date)?)
    }

    pub fn list_registers(&self, class_id: &str, period: &AcademicPeriod) -> ApiResult<Vec<AttendanceRegister>> {
        Ok(self.attendance_repo.list_by_class_period(class_id, period)?)
    }
}

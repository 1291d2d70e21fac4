// ==========================================
// 考勤 - 登记表锁定引擎
// ==========================================
// 状态 (按 class_id + date): Absent (无登记表) → Present (已登记)
// 规则:
// 1) Absent 时创建 → Present
// 2) Present 且未请求学期更正 → DuplicateRegister
// 3) 学期更正: 登记表 (session, term) ≠ 当前学期时, 仅改写 (session, term), 不动 records
// 4) 其他任何修改 → RegisterLocked
// ==========================================

use crate::domain::attendance::{AttendanceRegister, NewAttendanceRegister};
use crate::domain::types::AcademicPeriod;
use crate::engine::error::{EngineError, EngineResult};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLockState {
    Absent,
    Present,
}

/// 登记表写入决策
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterWrite {
    /// 新建登记表
    Created(AttendanceRegister),
    /// 学期更正后的登记表 (records 不变)
    TermCorrected(AttendanceRegister),
}

impl RegisterWrite {
    pub fn register(&self) -> &AttendanceRegister {
        match self {
            RegisterWrite::Created(r) | RegisterWrite::TermCorrected(r) => r,
        }
    }
}

// ==========================================
// AttendanceRegisterLock - 登记表锁定
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AttendanceRegisterLock;

impl AttendanceRegisterLock {
    pub fn new() -> Self {
        Self
    }

    pub fn state(&self, existing: Option<&AttendanceRegister>) -> RegisterLockState {
        match existing {
            Some(_) => RegisterLockState::Present,
            None => RegisterLockState::Absent,
        }
    }

    /// 登记表学期是否与当前学期不一致 (可走学期更正)
    pub fn needs_term_correction(&self, register: &AttendanceRegister, current: &AcademicPeriod) -> bool {
        !current.matches(&register.session, &register.term)
    }

    /// 创建登记表
    ///
    /// # 参数
    /// - `existing`: 同 (class_id, date) 已有登记表
    /// - `current`: 调用方传入的当前学期
    /// - `term_correction`: 调用方是否显式请求学期更正
    pub fn create(
        &self,
        existing: Option<&AttendanceRegister>,
        request: NewAttendanceRegister,
        current: &AcademicPeriod,
        term_correction: bool,
    ) -> EngineResult<RegisterWrite> {
        match existing {
            None => {
                self.validate_request(&request)?;
                Ok(RegisterWrite::Created(AttendanceRegister {
                    id: Uuid::new_v4().to_string(),
                    class_id: request.class_id,
                    date: request.date,
                    session: request.session,
                    term: request.term,
                    records: request.records,
                }))
            }
            Some(register) if !term_correction => {
                tracing::warn!(
                    class_id = %register.class_id,
                    date = %register.date,
                    "考勤表重复创建被拒绝"
                );
                Err(EngineError::DuplicateRegister {
                    class_id: register.class_id.clone(),
                    date: register.date,
                })
            }
            Some(register) => self.correct_term(register, current).map(RegisterWrite::TermCorrected),
        }
    }

    /// 学期更正: 仅改写 (session, term)
    pub fn correct_term(
        &self,
        register: &AttendanceRegister,
        current: &AcademicPeriod,
    ) -> EngineResult<AttendanceRegister> {
        if !self.needs_term_correction(register, current) {
            return Err(EngineError::RegisterLocked {
                register_id: register.id.clone(),
                reason: format!("登记表学期已是当前学期 {}, 无需更正", current),
            });
        }

        let mut corrected = register.clone();
        corrected.session = current.session.clone();
        corrected.term = current.term.clone();

        tracing::info!(
            register_id = %register.id,
            from = %register.period(),
            to = %current,
            "考勤表学期已更正"
        );
        Ok(corrected)
    }

    /// 已登记的考勤表拒绝重新点名
    pub fn reject_edit(&self, register: &AttendanceRegister) -> EngineError {
        EngineError::RegisterLocked {
            register_id: register.id.clone(),
            reason: "已登记的考勤表不可修改".to_string(),
        }
    }

    fn validate_request(&self, request: &NewAttendanceRegister) -> EngineResult<()> {
        if request.class_id.trim().is_empty() {
            return Err(EngineError::validation("class_id", "班级不能为空"));
        }
        if request.session.trim().is_empty() || request.term.trim().is_empty() {
            return Err(EngineError::validation("session/term", "学年学期不能为空"));
        }
        let mut seen = HashSet::new();
        for record in &request.records {
            if !seen.insert(record.student_id.as_str()) {
                return Err(EngineError::validation(
                    "records",
                    format!("学生{}重复登记", record.student_id),
                ));
            }
        }
        Ok(())
    }
}

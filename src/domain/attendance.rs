// ==========================================
// 考勤 - 考勤登记表领域模型
// ==========================================
// 不变量: 每个 (class_id, date) 至多一张登记表
// 创建后锁定, 仅允许"学期更正"改写 (session, term)
// ==========================================

use crate::domain::types::{AcademicPeriod, AttendanceStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub status: AttendanceStatus,
}

// ==========================================
// AttendanceRegister - 考勤登记表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRegister {
    pub id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub session: String,
    pub term: String,
    pub records: Vec<AttendanceRecord>,
}

impl AttendanceRegister {
    pub fn period(&self) -> AcademicPeriod {
        AcademicPeriod::new(self.session.clone(), self.term.clone())
    }

    /// 学生当日状态 (未登记返回 None)
    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.records
            .iter()
            .find(|r| r.student_id == student_id)
            .map(|r| r.status)
    }
}

/// 新建登记表请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttendanceRegister {
    pub class_id: String,
    pub date: NaiveDate,
    pub session: String,
    pub term: String,
    pub records: Vec<AttendanceRecord>,
}

/// 学生学期出勤汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub present: u32,
    pub late: u32,
    pub absent: u32,
}

impl AttendanceSummary {
    /// 出勤天数 (迟到计为出勤)
    pub fn days_present(&self) -> u32 {
        self.present + self.late
    }

    /// 登记天数
    pub fn days_recorded(&self) -> u32 {
        self.present + self.late + self.absent
    }
}

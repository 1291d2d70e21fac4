// ==========================================
// 学生财务台账与成绩引擎 - 领域类型定义
// ==========================================
// 职责: 学年学期、费用范围、支付方式/用途、成绩字段等封闭枚举
// 红线: 边界处解析为枚举,下游不再处理自由文本
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 学年学期 (Academic Period)
// ==========================================
// 所有引擎操作显式传入,引擎不读取全局"当前学期"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcademicPeriod {
    pub session: String, // 学年, 如 "2023/2024"
    pub term: String,    // 学期, 如 "First Term"
}

impl AcademicPeriod {
    pub fn new(session: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            term: term.into(),
        }
    }

    /// 判断记录的 (session, term) 是否属于本学期
    pub fn matches(&self, session: &str, term: &str) -> bool {
        self.session == session && self.term == term
    }
}

impl fmt::Display for AcademicPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.session, self.term)
    }
}

// ==========================================
// 费用适用范围 (Class Scope)
// ==========================================
// 数据库存储: "all" 或 班级ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "class_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassScope {
    All,           // 全校
    Class(String), // 指定班级
}

impl ClassScope {
    pub const ALL_DB_VALUE: &'static str = "all";

    pub fn to_db_string(&self) -> String {
        match self {
            ClassScope::All => Self::ALL_DB_VALUE.to_string(),
            ClassScope::Class(id) => id.clone(),
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        if s.trim().is_empty() || s.eq_ignore_ascii_case(Self::ALL_DB_VALUE) {
            ClassScope::All
        } else {
            ClassScope::Class(s.to_string())
        }
    }

    /// 该范围是否覆盖指定班级
    pub fn covers(&self, class_id: &str) -> bool {
        match self {
            ClassScope::All => true,
            ClassScope::Class(id) => id == class_id,
        }
    }
}

// ==========================================
// 减免类别 (Discount Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountCategory {
    Discount,    // 折扣
    Scholarship, // 奖学金
}

impl DiscountCategory {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DiscountCategory::Discount => "DISCOUNT",
            DiscountCategory::Scholarship => "SCHOLARSHIP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DISCOUNT" => Some(DiscountCategory::Discount),
            "SCHOLARSHIP" => Some(DiscountCategory::Scholarship),
            _ => None,
        }
    }
}

impl fmt::Display for DiscountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ==========================================
// 支付方式 (Payment Method)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Pos,
    Online, // 在线支付(经外部核验)
    Other,
}

impl PaymentMethod {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Pos => "POS",
            PaymentMethod::Online => "ONLINE",
            PaymentMethod::Other => "OTHER",
        }
    }

    /// 从字符串解析,未知值归入 Other
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "CASH" => PaymentMethod::Cash,
            "BANK_TRANSFER" | "TRANSFER" => PaymentMethod::BankTransfer,
            "POS" => PaymentMethod::Pos,
            "ONLINE" => PaymentMethod::Online,
            _ => PaymentMethod::Other,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

// ==========================================
// 支付用途 (Payment Purpose)
// ==========================================
// 封闭枚举 + 显式 Other, 取代自由文本分支
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentPurpose {
    Fee { fee_id: String }, // 对应某个费用项
    Uniform,
    Books,
    Transport,
    Other { description: String },
}

impl PaymentPurpose {
    /// 边界解析
    ///
    /// 规则:
    /// - "fee:<id>" → Fee
    /// - uniform/books/transport (不区分大小写) → 对应枚举
    /// - 其他非空文本 → Other
    /// - 空文本 → None (由调用方报校验错误)
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(id) = s.strip_prefix("fee:") {
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            return Some(PaymentPurpose::Fee {
                fee_id: id.to_string(),
            });
        }
        match s.to_lowercase().as_str() {
            "uniform" => Some(PaymentPurpose::Uniform),
            "books" => Some(PaymentPurpose::Books),
            "transport" => Some(PaymentPurpose::Transport),
            _ => Some(PaymentPurpose::Other {
                description: s.to_string(),
            }),
        }
    }

    pub fn fee_id(&self) -> Option<&str> {
        match self {
            PaymentPurpose::Fee { fee_id } => Some(fee_id),
            _ => None,
        }
    }
}

// ==========================================
// 成绩分项 (Score Field)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    Ca1,  // 平时成绩1
    Ca2,  // 平时成绩2
    Exam, // 考试成绩
}

impl ScoreField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ca1" => Some(ScoreField::Ca1),
            "ca2" => Some(ScoreField::Ca2),
            "exam" => Some(ScoreField::Exam),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreField::Ca1 => write!(f, "ca1"),
            ScoreField::Ca2 => write!(f, "ca2"),
            ScoreField::Exam => write!(f, "exam"),
        }
    }
}

// ==========================================
// 品行评价维度 (Trait Domain)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitDomain {
    Affective,   // 情感领域
    Psychomotor, // 动作技能领域
}

impl fmt::Display for TraitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitDomain::Affective => write!(f, "affective"),
            TraitDomain::Psychomotor => write!(f, "psychomotor"),
        }
    }
}

// ==========================================
// 自由字段 (Record Field)
// ==========================================
// 直接赋值,不触发派生重算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum RecordField {
    AttendancePresent(u32),
    AttendanceTotal(u32),
    TeacherRemark(String),
    HeadTeacherRemark(String),
}

impl RecordField {
    pub fn name(&self) -> &'static str {
        match self {
            RecordField::AttendancePresent(_) => "attendance_present",
            RecordField::AttendanceTotal(_) => "attendance_total",
            RecordField::TeacherRemark(_) => "teacher_remark",
            RecordField::HeadTeacherRemark(_) => "head_teacher_remark",
        }
    }
}

// ==========================================
// 考勤状态 (Attendance Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    /// 迟到计为出勤
    pub fn counts_as_present(&self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "present"),
            AttendanceStatus::Late => write!(f, "late"),
            AttendanceStatus::Absent => write!(f, "absent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_scope_db_roundtrip() {
        assert_eq!(ClassScope::from_db_str("all"), ClassScope::All);
        assert_eq!(ClassScope::from_db_str("ALL"), ClassScope::All);
        assert_eq!(
            ClassScope::from_db_str("JSS1A"),
            ClassScope::Class("JSS1A".to_string())
        );
        assert!(ClassScope::All.covers("JSS1A"));
        assert!(!ClassScope::Class("JSS1B".to_string()).covers("JSS1A"));
    }

    #[test]
    fn test_payment_purpose_parse() {
        assert_eq!(
            PaymentPurpose::parse("fee:F1"),
            Some(PaymentPurpose::Fee {
                fee_id: "F1".to_string()
            })
        );
        assert_eq!(PaymentPurpose::parse("Uniform"), Some(PaymentPurpose::Uniform));
        assert_eq!(
            PaymentPurpose::parse("PTA levy"),
            Some(PaymentPurpose::Other {
                description: "PTA levy".to_string()
            })
        );
        assert_eq!(PaymentPurpose::parse("  "), None);
        assert_eq!(PaymentPurpose::parse("fee:"), None);
    }

    #[test]
    fn test_payment_method_unknown_falls_back_to_other() {
        assert_eq!(PaymentMethod::from_str("bank transfer"), PaymentMethod::BankTransfer);
        assert_eq!(PaymentMethod::from_str("cheque"), PaymentMethod::Other);
    }

    #[test]
    fn test_late_counts_as_present() {
        assert!(AttendanceStatus::Late.counts_as_present());
        assert!(!AttendanceStatus::Absent.counts_as_present());
    }
}

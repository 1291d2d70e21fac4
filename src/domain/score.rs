// ==========================================
// 成绩评定 - 成绩汇总领域模型
// ==========================================
// 每个 (student_id, session, term) 恰好一条 ScoreAggregate
// 首次录入时惰性创建, 之后增量修改, 从不删除
// 派生字段 (total/grade/comment/average/total_score) 不允许直接赋值
// ==========================================

use crate::domain::types::{AcademicPeriod, ScoreField, TraitDomain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ScoreKey - 成绩汇总标识
// ==========================================
// 防抖写入的 key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScoreKey {
    pub student_id: String,
    pub session: String,
    pub term: String,
}

impl ScoreKey {
    pub fn new(student_id: &str, period: &AcademicPeriod) -> Self {
        Self {
            student_id: student_id.to_string(),
            session: period.session.clone(),
            term: period.term.clone(),
        }
    }
}

// ==========================================
// ScoreRow - 单科成绩行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub subject: String,
    ca1: f64,
    ca2: f64,
    exam: f64,
    total: f64,
    grade: String,
    comment: String,
}

impl ScoreRow {
    /// 新建全零行 (等级待引擎计算)
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ca1: 0.0,
            ca2: 0.0,
            exam: 0.0,
            total: 0.0,
            grade: String::new(),
            comment: String::new(),
        }
    }

    pub fn component(&self, field: ScoreField) -> f64 {
        match field {
            ScoreField::Ca1 => self.ca1,
            ScoreField::Ca2 => self.ca2,
            ScoreField::Exam => self.exam,
        }
    }

    pub fn ca1(&self) -> f64 {
        self.ca1
    }

    pub fn ca2(&self) -> f64 {
        self.ca2
    }

    pub fn exam(&self) -> f64 {
        self.exam
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn grade(&self) -> &str {
        &self.grade
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// 写入分项并重算合计 (值须已由引擎截断)
    pub(crate) fn set_component(&mut self, field: ScoreField, value: f64) {
        match field {
            ScoreField::Ca1 => self.ca1 = value,
            ScoreField::Ca2 => self.ca2 = value,
            ScoreField::Exam => self.exam = value,
        }
        self.total = self.ca1 + self.ca2 + self.exam;
    }

    pub(crate) fn set_grade(&mut self, grade: &str, comment: &str) {
        self.grade = grade.to_string();
        self.comment = comment.to_string();
    }
}

// ==========================================
// ScoreAggregate - 学生学期成绩汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAggregate {
    // ===== 标识 =====
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub session: String,
    pub term: String,

    // ===== 成绩 =====
    rows: Vec<ScoreRow>,
    average: f64,
    total_score: f64,

    // ===== 品行评价 (1-5) =====
    affective: BTreeMap<String, u8>,
    psychomotor: BTreeMap<String, u8>,

    // ===== 自由字段 =====
    attendance_present: u32,
    attendance_total: u32,
    teacher_remark: Option<String>,
    head_teacher_remark: Option<String>,

    // ===== 发布状态 =====
    is_passed: bool,
    passed_at: Option<DateTime<Utc>>,
    passed_by: Option<String>,
}

impl ScoreAggregate {
    /// 空汇总 (无成绩行, 平均分 0, 未发布)
    pub fn new_empty(id: String, student_id: &str, class_id: &str, period: &AcademicPeriod) -> Self {
        Self {
            id,
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            session: period.session.clone(),
            term: period.term.clone(),
            rows: Vec::new(),
            average: 0.0,
            total_score: 0.0,
            affective: BTreeMap::new(),
            psychomotor: BTreeMap::new(),
            attendance_present: 0,
            attendance_total: 0,
            teacher_remark: None,
            head_teacher_remark: None,
            is_passed: false,
            passed_at: None,
            passed_by: None,
        }
    }

    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            student_id: self.student_id.clone(),
            session: self.session.clone(),
            term: self.term.clone(),
        }
    }

    pub fn period(&self) -> AcademicPeriod {
        AcademicPeriod::new(self.session.clone(), self.term.clone())
    }

    // ===== 只读访问 =====

    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    pub fn row(&self, subject: &str) -> Option<&ScoreRow> {
        self.rows.iter().find(|r| r.subject == subject)
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub fn traits(&self, domain: TraitDomain) -> &BTreeMap<String, u8> {
        match domain {
            TraitDomain::Affective => &self.affective,
            TraitDomain::Psychomotor => &self.psychomotor,
        }
    }

    pub fn attendance_present(&self) -> u32 {
        self.attendance_present
    }

    pub fn attendance_total(&self) -> u32 {
        self.attendance_total
    }

    pub fn teacher_remark(&self) -> Option<&str> {
        self.teacher_remark.as_deref()
    }

    pub fn head_teacher_remark(&self) -> Option<&str> {
        self.head_teacher_remark.as_deref()
    }

    pub fn is_passed(&self) -> bool {
        self.is_passed
    }

    pub fn passed_at(&self) -> Option<DateTime<Utc>> {
        self.passed_at
    }

    pub fn passed_by(&self) -> Option<&str> {
        self.passed_by.as_deref()
    }

    // ===== 类型化修改 (仅引擎调用) =====

    /// 查找或创建科目行
    pub(crate) fn row_entry(&mut self, subject: &str) -> &mut ScoreRow {
        let idx = match self.rows.iter().position(|r| r.subject == subject) {
            Some(idx) => idx,
            None => {
                self.rows.push(ScoreRow::new(subject));
                self.rows.len() - 1
            }
        };
        &mut self.rows[idx]
    }

    pub(crate) fn remove_row(&mut self, subject: &str) -> Option<ScoreRow> {
        let idx = self.rows.iter().position(|r| r.subject == subject)?;
        Some(self.rows.remove(idx))
    }

    /// 重算平均分与总分 (无成绩行时平均分为 0)
    pub(crate) fn recompute_summary(&mut self) {
        self.total_score = self.rows.iter().map(|r| r.total).sum();
        self.average = if self.rows.is_empty() {
            0.0
        } else {
            self.total_score / self.rows.len() as f64
        };
    }

    pub(crate) fn set_trait(&mut self, domain: TraitDomain, name: &str, rating: u8) {
        let map = match domain {
            TraitDomain::Affective => &mut self.affective,
            TraitDomain::Psychomotor => &mut self.psychomotor,
        };
        map.insert(name.to_string(), rating);
    }

    pub(crate) fn set_attendance(&mut self, present: u32, total: u32) {
        self.attendance_present = present;
        self.attendance_total = total;
    }

    pub(crate) fn set_teacher_remark(&mut self, remark: Option<String>) {
        self.teacher_remark = remark;
    }

    pub(crate) fn set_head_teacher_remark(&mut self, remark: Option<String>) {
        self.head_teacher_remark = remark;
    }

    pub(crate) fn mark_published(&mut self, actor_id: &str, at: DateTime<Utc>) {
        self.is_passed = true;
        self.passed_at = Some(at);
        self.passed_by = Some(actor_id.to_string());
    }

    pub(crate) fn mark_unpublished(&mut self) {
        self.is_passed = false;
        self.passed_at = None;
        self.passed_by = None;
    }

    /// 以已落库记录的发布状态为准 (重放旧快照前调用)
    pub(crate) fn adopt_publication(&mut self, stored: &ScoreAggregate) {
        self.is_passed = stored.is_passed;
        self.passed_at = stored.passed_at;
        self.passed_by = stored.passed_by.clone();
    }
}

// ==========================================
// 学生/家长视图
// ==========================================
// 未发布时只暴露 Pending, 不暴露成绩行与平均分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentResultView {
    Pending {
        student_id: String,
        session: String,
        term: String,
    },
    Published(PublishedResult),
}

impl StudentResultView {
    pub fn is_pending(&self) -> bool {
        matches!(self, StudentResultView::Pending { .. })
    }
}

/// 已发布成绩单数据 (供报告单渲染)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedResult {
    pub student_id: String,
    pub class_id: String,
    pub session: String,
    pub term: String,
    pub rows: Vec<ScoreRow>,
    pub average: f64,
    pub total_score: f64,
    pub position: Option<u32>,
    pub class_size: usize,
    pub affective: BTreeMap<String, u8>,
    pub psychomotor: BTreeMap<String, u8>,
    pub attendance_present: u32,
    pub attendance_total: u32,
    pub teacher_remark: Option<String>,
    pub head_teacher_remark: Option<String>,
    pub passed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_aggregate_average_is_zero() {
        let mut agg = ScoreAggregate::new_empty(
            "A1".to_string(),
            "S1",
            "JSS1",
            &AcademicPeriod::new("2023/2024", "First"),
        );
        agg.recompute_summary();
        assert_eq!(agg.average(), 0.0);
        assert_eq!(agg.total_score(), 0.0);
        assert!(!agg.is_passed());
    }

    #[test]
    fn test_row_entry_is_find_or_create() {
        let mut agg = ScoreAggregate::new_empty(
            "A1".to_string(),
            "S1",
            "JSS1",
            &AcademicPeriod::new("2023/2024", "First"),
        );
        agg.row_entry("Maths").set_component(ScoreField::Ca1, 10.0);
        agg.row_entry("Maths").set_component(ScoreField::Exam, 50.0);
        assert_eq!(agg.rows().len(), 1);
        assert_eq!(agg.row("Maths").map(|r| r.total()), Some(60.0));
    }

    #[test]
    fn test_adopt_publication_keeps_scores() {
        let period = AcademicPeriod::new("2023/2024", "First");
        let mut snapshot = ScoreAggregate::new_empty("A1".to_string(), "S1", "JSS1", &period);
        snapshot.row_entry("Maths").set_component(ScoreField::Exam, 50.0);
        snapshot.recompute_summary();

        let mut stored = ScoreAggregate::new_empty("A1".to_string(), "S1", "JSS1", &period);
        stored.mark_published("T1", Utc::now());

        snapshot.adopt_publication(&stored);
        assert!(snapshot.is_passed());
        assert_eq!(snapshot.passed_by(), Some("T1"));
        assert_eq!(snapshot.total_score(), 50.0);
    }

    #[test]
    fn test_unpublish_clears_stamps() {
        let mut agg = ScoreAggregate::new_empty(
            "A1".to_string(),
            "S1",
            "JSS1",
            &AcademicPeriod::new("2023/2024", "First"),
        );
        agg.mark_published("T1", Utc::now());
        assert!(agg.is_passed());
        assert_eq!(agg.passed_by(), Some("T1"));

        agg.mark_unpublished();
        assert!(!agg.is_passed());
        assert!(agg.passed_at().is_none());
        assert!(agg.passed_by().is_none());
    }
}

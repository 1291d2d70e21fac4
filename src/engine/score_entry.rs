// ==========================================
// 成绩评定 - 成绩录入引擎
// ==========================================
// 职责: 对 ScoreAggregate 执行类型化修改并维护派生字段
// 输入: 由 ScoreRepository::get_or_create 取得的汇总
// 输出: 修改后的汇总 (持久化交由调用方/防抖写入器)
// 红线: 每次成绩行修改后重算 total/grade/average/total_score
// ==========================================

use crate::domain::attendance::{AttendanceRegister, AttendanceSummary};
use crate::domain::score::{ScoreAggregate, ScoreRow};
use crate::domain::types::{AcademicPeriod, AttendanceStatus, RecordField, ScoreField, TraitDomain};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::grade_scale::GradeScaleResolver;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub const MIN_TRAIT_RATING: u8 = 1;
pub const MAX_TRAIT_RATING: u8 = 5;

// ==========================================
// ScoreCaps - 分项满分
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCaps {
    pub ca1: f64,
    pub ca2: f64,
    pub exam: f64,
}

impl ScoreCaps {
    /// 单科满分
    pub fn total(&self) -> f64 {
        self.ca1 + self.ca2 + self.exam
    }

    pub fn max_for(&self, field: ScoreField) -> f64 {
        match field {
            ScoreField::Ca1 => self.ca1,
            ScoreField::Ca2 => self.ca2,
            ScoreField::Exam => self.exam,
        }
    }
}

impl Default for ScoreCaps {
    fn default() -> Self {
        Self {
            ca1: 20.0,
            ca2: 20.0,
            exam: 60.0,
        }
    }
}

/// 原始输入转数值: 非数字/NaN/无穷 → 0
pub fn coerce_score(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// 截断到 [0, max]; NaN → 0
pub fn clamp_score(value: f64, max: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        0.0
    } else if value > max {
        max
    } else {
        value
    }
}

// ==========================================
// ScoreEntryEngine - 成绩录入
// ==========================================
#[derive(Debug, Clone)]
pub struct ScoreEntryEngine {
    resolver: GradeScaleResolver,
    caps: ScoreCaps,
}

impl ScoreEntryEngine {
    pub fn new(resolver: GradeScaleResolver, caps: ScoreCaps) -> Self {
        Self { resolver, caps }
    }

    pub fn caps(&self) -> ScoreCaps {
        self.caps
    }

    /// 录入单科分项成绩
    ///
    /// 幂等: 相同参数重复调用结果一致
    #[instrument(skip(self, aggregate), fields(student_id = %aggregate.student_id))]
    pub fn apply_subject_score(
        &self,
        aggregate: &mut ScoreAggregate,
        subject: &str,
        field: ScoreField,
        value: f64,
    ) -> EngineResult<()> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(EngineError::validation("subject", "科目不能为空"));
        }

        let clamped = clamp_score(value, self.caps.max_for(field));
        if clamped != value {
            tracing::debug!(value, clamped, "分项成绩已截断");
        }

        let row = aggregate.row_entry(subject);
        row.set_component(field, clamped);
        let resolution = self.resolver.resolve(row.total());
        row.set_grade(&resolution.grade, &resolution.remark);

        aggregate.recompute_summary();
        Ok(())
    }

    /// 录入单科分项成绩 (原始文本输入)
    pub fn apply_subject_score_raw(
        &self,
        aggregate: &mut ScoreAggregate,
        subject: &str,
        field: ScoreField,
        raw: &str,
    ) -> EngineResult<()> {
        self.apply_subject_score(aggregate, subject, field, coerce_score(raw))
    }

    /// 删除科目行并重算
    pub fn remove_subject(&self, aggregate: &mut ScoreAggregate, subject: &str) -> EngineResult<ScoreRow> {
        let removed = aggregate
            .remove_row(subject.trim())
            .ok_or_else(|| EngineError::not_found("ScoreRow", subject))?;
        aggregate.recompute_summary();
        Ok(removed)
    }

    /// 等级方案变更后重算全部科目等级
    pub fn regrade(&self, aggregate: &mut ScoreAggregate) {
        let subjects: Vec<String> = aggregate.rows().iter().map(|r| r.subject.clone()).collect();
        for subject in subjects {
            let row = aggregate.row_entry(&subject);
            let resolution = self.resolver.resolve(row.total());
            row.set_grade(&resolution.grade, &resolution.remark);
        }
        aggregate.recompute_summary();
    }

    /// 品行评价 (1-5), 不重算平均分
    pub fn apply_trait(
        &self,
        aggregate: &mut ScoreAggregate,
        domain: TraitDomain,
        trait_name: &str,
        rating: u8,
    ) -> EngineResult<()> {
        let trait_name = trait_name.trim();
        if trait_name.is_empty() {
            return Err(EngineError::validation("trait", "评价项不能为空"));
        }
        if !(MIN_TRAIT_RATING..=MAX_TRAIT_RATING).contains(&rating) {
            return Err(EngineError::validation(
                "rating",
                format!("评分须在{}-{}之间: {}", MIN_TRAIT_RATING, MAX_TRAIT_RATING, rating),
            ));
        }
        aggregate.set_trait(domain, trait_name, rating);
        Ok(())
    }

    /// 自由字段直接赋值
    ///
    /// 出勤约束: present ≤ total, 须先登记应出勤天数
    pub fn apply_field(&self, aggregate: &mut ScoreAggregate, field: RecordField) -> EngineResult<()> {
        match field {
            RecordField::AttendancePresent(present) => {
                let total = aggregate.attendance_total();
                if present > total {
                    return Err(EngineError::validation(
                        "attendance_present",
                        format!("出勤天数{}超过应出勤天数{}", present, total),
                    ));
                }
                aggregate.set_attendance(present, total);
            }
            RecordField::AttendanceTotal(total) => {
                let present = aggregate.attendance_present();
                if present > total {
                    return Err(EngineError::validation(
                        "attendance_total",
                        format!("应出勤天数{}小于已出勤天数{}", total, present),
                    ));
                }
                aggregate.set_attendance(present, total);
            }
            RecordField::TeacherRemark(remark) => {
                aggregate.set_teacher_remark(normalize_remark(remark));
            }
            RecordField::HeadTeacherRemark(remark) => {
                aggregate.set_head_teacher_remark(normalize_remark(remark));
            }
        }
        Ok(())
    }

    /// 按考勤表写入出勤汇总
    pub fn apply_attendance_summary(&self, aggregate: &mut ScoreAggregate, summary: AttendanceSummary) {
        aggregate.set_attendance(summary.days_present(), summary.days_recorded());
    }
}

impl Default for ScoreEntryEngine {
    fn default() -> Self {
        Self::new(GradeScaleResolver::default(), ScoreCaps::default())
    }
}

fn normalize_remark(remark: String) -> Option<String> {
    let trimmed = remark.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 汇总学生在某学期的考勤 (仅统计该学期、且登记了该学生的考勤表)
pub fn summarize_attendance(
    registers: &[AttendanceRegister],
    student_id: &str,
    period: &AcademicPeriod,
) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    for register in registers
        .iter()
        .filter(|r| period.matches(&r.session, &r.term))
    {
        match register.status_of(student_id) {
            Some(AttendanceStatus::Present) => summary.present += 1,
            Some(AttendanceStatus::Late) => summary.late += 1,
            Some(AttendanceStatus::Absent) => summary.absent += 1,
            None => {}
        }
    }
    summary
}

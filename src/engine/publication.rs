// ==========================================
// 成绩评定 - 发布状态机
// ==========================================
// 状态: Unpublished (初始) ⇄ Published
// publish: is_passed=true, 记录 passed_at / passed_by (重复发布会重新盖戳)
// unpublish: is_passed=false, 清空 passed_at / passed_by
// 可见性: 学生/家长视图在未发布时只返回 Pending
// ==========================================

use crate::domain::score::{PublishedResult, ScoreAggregate, StudentResultView};
use crate::domain::types::{AcademicPeriod, TraitDomain};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ranking::ClassRanking;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationState {
    Unpublished,
    Published,
}

impl fmt::Display for PublicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicationState::Unpublished => write!(f, "UNPUBLISHED"),
            PublicationState::Published => write!(f, "PUBLISHED"),
        }
    }
}

// ==========================================
// PublicationStateMachine - 发布状态机
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct PublicationStateMachine;

impl PublicationStateMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn state_of(&self, aggregate: &ScoreAggregate) -> PublicationState {
        if aggregate.is_passed() {
            PublicationState::Published
        } else {
            PublicationState::Unpublished
        }
    }

    /// 发布 (幂等, 已发布时重新盖戳)
    pub fn publish(
        &self,
        aggregate: &mut ScoreAggregate,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<PublicationState> {
        if actor_id.trim().is_empty() {
            return Err(EngineError::validation("actor_id", "发布人不能为空"));
        }
        let from = self.state_of(aggregate);
        aggregate.mark_published(actor_id.trim(), at);
        tracing::info!(
            score_id = %aggregate.id,
            student_id = %aggregate.student_id,
            from = %from,
            actor = actor_id,
            "成绩已发布"
        );
        Ok(from)
    }

    /// 撤销发布 (幂等)
    pub fn unpublish(&self, aggregate: &mut ScoreAggregate) -> PublicationState {
        let from = self.state_of(aggregate);
        aggregate.mark_unpublished();
        tracing::info!(
            score_id = %aggregate.id,
            student_id = %aggregate.student_id,
            from = %from,
            "成绩已撤销发布"
        );
        from
    }

    /// 批量发布某班级学期的全部汇总, 返回受影响条数
    pub fn publish_cohort(
        &self,
        aggregates: &mut [ScoreAggregate],
        class_id: &str,
        period: &AcademicPeriod,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<usize> {
        if actor_id.trim().is_empty() {
            return Err(EngineError::validation("actor_id", "发布人不能为空"));
        }
        let mut affected = 0;
        for aggregate in aggregates
            .iter_mut()
            .filter(|a| a.class_id == class_id && period.matches(&a.session, &a.term))
        {
            aggregate.mark_published(actor_id.trim(), at);
            affected += 1;
        }
        tracing::info!(class_id, period = %period, affected, "批量发布完成");
        Ok(affected)
    }

    /// 批量撤销发布, 返回受影响条数
    pub fn unpublish_cohort(
        &self,
        aggregates: &mut [ScoreAggregate],
        class_id: &str,
        period: &AcademicPeriod,
    ) -> usize {
        let mut affected = 0;
        for aggregate in aggregates
            .iter_mut()
            .filter(|a| a.class_id == class_id && period.matches(&a.session, &a.term))
        {
            aggregate.mark_unpublished();
            affected += 1;
        }
        tracing::info!(class_id, period = %period, affected, "批量撤销发布完成");
        affected
    }

    /// 学生/家长视图
    ///
    /// 未发布: 无论是否已有成绩, 一律返回 Pending
    pub fn student_view(&self, aggregate: &ScoreAggregate, ranking: &ClassRanking) -> StudentResultView {
        if !aggregate.is_passed() {
            return StudentResultView::Pending {
                student_id: aggregate.student_id.clone(),
                session: aggregate.session.clone(),
                term: aggregate.term.clone(),
            };
        }

        StudentResultView::Published(PublishedResult {
            student_id: aggregate.student_id.clone(),
            class_id: aggregate.class_id.clone(),
            session: aggregate.session.clone(),
            term: aggregate.term.clone(),
            rows: aggregate.rows().to_vec(),
            average: aggregate.average(),
            total_score: aggregate.total_score(),
            position: ranking.position_of(&aggregate.student_id),
            class_size: ranking.cohort_size,
            affective: aggregate.traits(TraitDomain::Affective).clone(),
            psychomotor: aggregate.traits(TraitDomain::Psychomotor).clone(),
            attendance_present: aggregate.attendance_present(),
            attendance_total: aggregate.attendance_total(),
            teacher_remark: aggregate.teacher_remark().map(str::to_string),
            head_teacher_remark: aggregate.head_teacher_remark().map(str::to_string),
            passed_at: aggregate.passed_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ScoreField;
    use crate::engine::ranking::ClassRankCalculator;
    use crate::engine::score_entry::ScoreEntryEngine;
    use chrono::Duration;

    fn period() -> AcademicPeriod {
        AcademicPeriod::new("2023/2024", "First")
    }

    fn scored(student_id: &str, class_id: &str) -> ScoreAggregate {
        let mut agg = ScoreAggregate::new_empty(format!("A-{}", student_id), student_id, class_id, &period());
        ScoreEntryEngine::default()
            .apply_subject_score(&mut agg, "Maths", ScoreField::Exam, 50.0)
            .unwrap();
        agg
    }

    #[test]
    fn test_publish_restamps_and_unpublish_clears() {
        let machine = PublicationStateMachine::new();
        let mut agg = scored("S1", "C1");
        let t0 = Utc::now();

        assert_eq!(machine.publish(&mut agg, "T1", t0).unwrap(), PublicationState::Unpublished);
        assert_eq!(agg.passed_by(), Some("T1"));

        let t1 = t0 + Duration::minutes(5);
        assert_eq!(machine.publish(&mut agg, "T2", t1).unwrap(), PublicationState::Published);
        assert_eq!(agg.passed_at(), Some(t1));
        assert_eq!(agg.passed_by(), Some("T2"));

        assert_eq!(machine.unpublish(&mut agg), PublicationState::Published);
        assert_eq!(machine.unpublish(&mut agg), PublicationState::Unpublished);
        assert!(agg.passed_at().is_none());
    }

    #[test]
    fn test_publish_requires_actor() {
        let mut agg = scored("S1", "C1");
        assert!(PublicationStateMachine::new().publish(&mut agg, " ", Utc::now()).is_err());
        assert!(!agg.is_passed());
    }

    #[test]
    fn test_cohort_publish_counts_only_class() {
        let machine = PublicationStateMachine::new();
        let mut aggregates = vec![scored("S1", "C1"), scored("S2", "C1"), scored("S3", "C2")];

        let affected = machine
            .publish_cohort(&mut aggregates, "C1", &period(), "T1", Utc::now())
            .unwrap();
        assert_eq!(affected, 2);
        assert!(!aggregates[2].is_passed());

        assert_eq!(machine.unpublish_cohort(&mut aggregates, "C1", &period()), 2);
        assert!(aggregates.iter().all(|a| !a.is_passed()));
    }

    #[test]
    fn test_student_view_hides_unpublished() {
        let machine = PublicationStateMachine::new();
        let mut agg = scored("S1", "C1");
        let ranking = ClassRankCalculator::new().rank(std::slice::from_ref(&agg), "C1", &period());

        assert!(machine.student_view(&agg, &ranking).is_pending());

        machine.publish(&mut agg, "T1", Utc::now()).unwrap();
        let ranking = ClassRankCalculator::new().rank(std::slice::from_ref(&agg), "C1", &period());
        match machine.student_view(&agg, &ranking) {
            StudentResultView::Published(result) => {
                assert_eq!(result.average, 50.0);
                assert_eq!(result.position, Some(1));
                assert_eq!(result.rows.len(), 1);
            }
            other => panic!("期望已发布视图, 实际: {:?}", other),
        }
    }
}

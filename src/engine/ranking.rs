// ==========================================
// 成绩评定 - 班级排名引擎
// ==========================================
// 输入: 某 (class_id, session, term) 下的成绩汇总
// 规则: 仅已发布 (is_passed=true) 的汇总参与排名
// 排名: 竞赛排名, position = 1 + 平均分严格更高的人数
//       90, 90, 85 → 1, 1, 3
// ==========================================

use crate::domain::score::ScoreAggregate;
use crate::domain::types::AcademicPeriod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// 班级排名结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassRanking {
    /// student_id → position
    pub positions: BTreeMap<String, u32>,
    /// 参与排名人数
    pub cohort_size: usize,
}

impl ClassRanking {
    /// 未发布或无成绩的学生返回 None
    pub fn position_of(&self, student_id: &str) -> Option<u32> {
        self.positions.get(student_id).copied()
    }
}

/// 科目班级统计 (报告单用)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStatistics {
    pub subject: String,
    pub entries: usize,
    pub class_average: f64,
    pub highest: f64,
    pub lowest: f64,
}

// ==========================================
// ClassRankCalculator - 班级排名
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ClassRankCalculator;

impl ClassRankCalculator {
    pub fn new() -> Self {
        Self
    }

    fn published_cohort<'a>(
        aggregates: &'a [ScoreAggregate],
        class_id: &'a str,
        period: &'a AcademicPeriod,
    ) -> impl Iterator<Item = &'a ScoreAggregate> + 'a {
        aggregates.iter().filter(move |a| {
            a.is_passed() && a.class_id == class_id && period.matches(&a.session, &a.term)
        })
    }

    #[instrument(skip(self, aggregates), fields(candidates = aggregates.len()))]
    pub fn rank(
        &self,
        aggregates: &[ScoreAggregate],
        class_id: &str,
        period: &AcademicPeriod,
    ) -> ClassRanking {
        let mut cohort: Vec<(&str, f64)> = Self::published_cohort(aggregates, class_id, period)
            .map(|a| (a.student_id.as_str(), a.average()))
            .collect();

        // 平均分降序; 同分按学生ID, 仅保证输出稳定
        cohort.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut positions = BTreeMap::new();
        let mut current_position = 0u32;
        let mut previous_average: Option<f64> = None;
        for (idx, (student_id, average)) in cohort.iter().enumerate() {
            if previous_average != Some(*average) {
                current_position = idx as u32 + 1;
                previous_average = Some(*average);
            }
            positions.insert(student_id.to_string(), current_position);
        }

        ClassRanking {
            cohort_size: cohort.len(),
            positions,
        }
    }

    /// 各科班级平均/最高/最低 (仅已发布)
    pub fn subject_statistics(
        &self,
        aggregates: &[ScoreAggregate],
        class_id: &str,
        period: &AcademicPeriod,
    ) -> Vec<SubjectStatistics> {
        let mut totals: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for aggregate in Self::published_cohort(aggregates, class_id, period) {
            for row in aggregate.rows() {
                totals.entry(row.subject.as_str()).or_default().push(row.total());
            }
        }

        totals
            .into_iter()
            .map(|(subject, values)| {
                let sum: f64 = values.iter().sum();
                SubjectStatistics {
                    subject: subject.to_string(),
                    entries: values.len(),
                    class_average: sum / values.len() as f64,
                    highest: values.iter().copied().fold(f64::MIN, f64::max),
                    lowest: values.iter().copied().fold(f64::MAX, f64::min),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ScoreField;
    use crate::engine::score_entry::ScoreEntryEngine;
    use chrono::Utc;

    fn period() -> AcademicPeriod {
        AcademicPeriod::new("2023/2024", "First")
    }

    fn aggregate(student_id: &str, exam_scores: &[(&str, f64)], published: bool) -> ScoreAggregate {
        let engine = ScoreEntryEngine::default();
        let mut agg = ScoreAggregate::new_empty(format!("A-{}", student_id), student_id, "C1", &period());
        for (subject, score) in exam_scores {
            engine
                .apply_subject_score(&mut agg, subject, ScoreField::Exam, *score)
                .unwrap();
        }
        if published {
            agg.mark_published("T1", Utc::now());
        }
        agg
    }

    #[test]
    fn test_competition_ranking_shares_ties() {
        // 平均分 = 两科 exam 之和 / 2, 分别为 45, 45, 40
        let aggregates = vec![
            aggregate("S1", &[("Maths", 50.0), ("English", 40.0)], true),
            aggregate("S2", &[("Maths", 40.0), ("English", 50.0)], true),
            aggregate("S3", &[("Maths", 40.0), ("English", 40.0)], true),
        ];

        let ranking = ClassRankCalculator::new().rank(&aggregates, "C1", &period());
        assert_eq!(ranking.position_of("S1"), Some(1));
        assert_eq!(ranking.position_of("S2"), Some(1));
        assert_eq!(ranking.position_of("S3"), Some(3));
        assert_eq!(ranking.cohort_size, 3);
    }

    #[test]
    fn test_unpublished_excluded() {
        let aggregates = vec![
            aggregate("S1", &[("Maths", 30.0)], true),
            aggregate("S2", &[("Maths", 60.0)], false),
        ];

        let ranking = ClassRankCalculator::new().rank(&aggregates, "C1", &period());
        assert_eq!(ranking.position_of("S1"), Some(1));
        assert_eq!(ranking.position_of("S2"), None);
        assert_eq!(ranking.position_of("S9"), None);
        assert_eq!(ranking.cohort_size, 1);
    }

    #[test]
    fn test_subject_statistics() {
        let aggregates = vec![
            aggregate("S1", &[("Maths", 50.0)], true),
            aggregate("S2", &[("Maths", 30.0)], true),
            aggregate("S3", &[("Maths", 10.0)], false),
        ];

        let stats = ClassRankCalculator::new().subject_statistics(&aggregates, "C1", &period());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].entries, 2);
        assert_eq!(stats[0].class_average, 40.0);
        assert_eq!(stats[0].highest, 50.0);
        assert_eq!(stats[0].lowest, 30.0);
    }
}

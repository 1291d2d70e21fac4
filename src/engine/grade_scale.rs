// ==========================================
// 成绩评定 - 等级映射引擎
// ==========================================
// 输入: 单科合计 (0-100) + 等级方案
// 输出: {grade, remark}, 取下界 ≤ 合计的区间中下界最高者
// 区间之间的小数间隙 (如 74.5) 归入较低区间, 等级随分数单调
// 合计低于全部下界时返回 {F, -}
// 说明: 重叠检测在配置保存时完成 (GradingScheme::validate), 此处不检测
// ==========================================

use crate::domain::grading::GradingScheme;
use serde::{Deserialize, Serialize};

pub const FALLBACK_GRADE: &str = "F";
pub const FALLBACK_REMARK: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResolution {
    pub grade: String,
    pub remark: String,
}

// ==========================================
// GradeScaleResolver - 等级映射
// ==========================================
#[derive(Debug, Clone)]
pub struct GradeScaleResolver {
    scheme: GradingScheme,
}

impl GradeScaleResolver {
    pub fn new(scheme: GradingScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &GradingScheme {
        &self.scheme
    }

    pub fn resolve(&self, total: f64) -> GradeResolution {
        let matched = self
            .scheme
            .ranges
            .iter()
            .filter(|r| r.min_score <= total)
            .max_by(|a, b| a.min_score.total_cmp(&b.min_score));
        match matched {
            Some(range) => GradeResolution {
                grade: range.grade.clone(),
                remark: range.remark.clone(),
            },
            None => GradeResolution {
                grade: FALLBACK_GRADE.to_string(),
                remark: FALLBACK_REMARK.to_string(),
            },
        }
    }
}

impl Default for GradeScaleResolver {
    fn default() -> Self {
        Self::new(GradingScheme::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grading::GradeRange;

    fn rank_of(grade: &str) -> u8 {
        match grade {
            "A" => 5,
            "B" => 4,
            "C" => 3,
            "D" => 2,
            _ => 1,
        }
    }

    #[test]
    fn test_standard_boundaries() {
        let resolver = GradeScaleResolver::default();
        assert_eq!(resolver.resolve(92.0).grade, "A");
        assert_eq!(resolver.resolve(75.0).grade, "A");
        assert_eq!(resolver.resolve(74.0).grade, "B");
        assert_eq!(resolver.resolve(55.0).grade, "C");
        assert_eq!(resolver.resolve(40.0).grade, "D");
        assert_eq!(resolver.resolve(39.0).grade, "F");
        assert_eq!(resolver.resolve(0.0).remark, "Fail");
    }

    #[test]
    fn test_grade_is_monotonic_over_integer_totals() {
        let resolver = GradeScaleResolver::default();
        let mut previous = 0u8;
        for total in 0..=100 {
            let current = rank_of(&resolver.resolve(total as f64).grade);
            assert!(current >= previous, "total={} 等级下降", total);
            previous = current;
        }
    }

    #[test]
    fn test_fractional_totals_between_ranges() {
        let resolver = GradeScaleResolver::default();
        assert_eq!(resolver.resolve(74.5).grade, "B");
        assert_eq!(resolver.resolve(39.5).grade, "F");
        assert_eq!(resolver.resolve(39.5).remark, "Fail");
        assert_eq!(resolver.resolve(54.99).grade, "D");

        let mut previous = 0u8;
        for step in 0..=1000 {
            let total = step as f64 / 10.0;
            let current = rank_of(&resolver.resolve(total).grade);
            assert!(current >= previous, "total={} 等级下降", total);
            previous = current;
        }
    }

    #[test]
    fn test_declaration_order_irrelevant() {
        let resolver = GradeScaleResolver::new(GradingScheme::new(vec![
            GradeRange::new("F", 0.0, 39.0, "Fail", 0.0),
            GradeRange::new("A", 40.0, 100.0, "Pass", 1.0),
        ]));
        assert_eq!(resolver.resolve(80.0).grade, "A");
        assert_eq!(resolver.resolve(10.0).grade, "F");
    }

    #[test]
    fn test_unmatched_total_falls_back() {
        let resolver = GradeScaleResolver::new(GradingScheme::new(vec![GradeRange::new(
            "A", 50.0, 100.0, "Good", 4.0,
        )]));
        let resolution = resolver.resolve(20.0);
        assert_eq!(resolution.grade, FALLBACK_GRADE);
        assert_eq!(resolution.remark, FALLBACK_REMARK);
    }
}

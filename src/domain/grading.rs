// ==========================================
// 成绩评定 - 等级区间配置
// ==========================================
// 区间按下界判定, 与声明顺序无关
// 配置时校验: 区间不重叠, 覆盖 [0, 100]
// ==========================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 区间之间允许的最大间隙 (整数书写的区间如 65-74 / 75-100)
pub const MAX_RANGE_GAP: f64 = 1.0;

// ==========================================
// GradeRange - 等级区间
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRange {
    pub grade: String,
    pub min_score: f64,
    pub max_score: f64,
    pub remark: String,
    pub gpa_point: f64,
}

impl GradeRange {
    pub fn new(grade: &str, min_score: f64, max_score: f64, remark: &str, gpa_point: f64) -> Self {
        Self {
            grade: grade.to_string(),
            min_score,
            max_score,
            remark: remark.to_string(),
            gpa_point,
        }
    }
}

/// 等级方案校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradingSchemeError {
    #[error("等级方案为空")]
    Empty,

    #[error("区间无效: grade={grade}, min={min} > max={max}")]
    InvertedRange { grade: String, min: f64, max: f64 },

    #[error("区间重叠: {first} 与 {second}")]
    Overlap { first: String, second: String },

    #[error("区间未覆盖: ({from}, {to})")]
    Gap { from: f64, to: f64 },
}

// ==========================================
// GradingScheme - 等级方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingScheme {
    pub ranges: Vec<GradeRange>,
}

impl GradingScheme {
    pub fn new(ranges: Vec<GradeRange>) -> Self {
        Self { ranges }
    }

    /// 方案覆盖的最高分 (分项满分之和不得超过此值)
    pub fn upper_bound(&self) -> f64 {
        self.ranges
            .iter()
            .map(|r| r.max_score)
            .fold(0.0, f64::max)
    }

    /// 标准方案: A 75-100, B 65-74, C 55-64, D 40-54, F 0-39
    pub fn standard() -> Self {
        Self::new(vec![
            GradeRange::new("A", 75.0, 100.0, "Excellent", 5.0),
            GradeRange::new("B", 65.0, 74.0, "Very Good", 4.0),
            GradeRange::new("C", 55.0, 64.0, "Good", 3.0),
            GradeRange::new("D", 40.0, 54.0, "Pass", 2.0),
            GradeRange::new("F", 0.0, 39.0, "Fail", 0.0),
        ])
    }

    /// 校验方案 (保存配置前调用)
    pub fn validate(&self) -> Result<(), GradingSchemeError> {
        if self.ranges.is_empty() {
            return Err(GradingSchemeError::Empty);
        }

        for r in &self.ranges {
            if r.min_score > r.max_score {
                return Err(GradingSchemeError::InvertedRange {
                    grade: r.grade.clone(),
                    min: r.min_score,
                    max: r.max_score,
                });
            }
        }

        let mut sorted: Vec<&GradeRange> = self.ranges.iter().collect();
        sorted.sort_by(|a, b| a.min_score.total_cmp(&b.min_score));

        let first = sorted[0];
        if first.min_score > 0.0 {
            return Err(GradingSchemeError::Gap {
                from: 0.0,
                to: first.min_score,
            });
        }

        for pair in sorted.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.min_score <= prev.max_score {
                return Err(GradingSchemeError::Overlap {
                    first: prev.grade.clone(),
                    second: next.grade.clone(),
                });
            }
            if next.min_score - prev.max_score > MAX_RANGE_GAP {
                return Err(GradingSchemeError::Gap {
                    from: prev.max_score,
                    to: next.min_score,
                });
            }
        }

        let last = sorted[sorted.len() - 1];
        if last.max_score < 100.0 {
            return Err(GradingSchemeError::Gap {
                from: last.max_score,
                to: 100.0,
            });
        }

        Ok(())
    }
}

impl Default for GradingScheme {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scheme_is_valid() {
        assert_eq!(GradingScheme::standard().validate(), Ok(()));
    }

    #[test]
    fn test_upper_bound() {
        assert_eq!(GradingScheme::standard().upper_bound(), 100.0);
    }

    #[test]
    fn test_overlap_rejected() {
        let scheme = GradingScheme::new(vec![
            GradeRange::new("A", 70.0, 100.0, "Excellent", 5.0),
            GradeRange::new("B", 0.0, 74.0, "Good", 4.0),
        ]);
        assert!(matches!(
            scheme.validate(),
            Err(GradingSchemeError::Overlap { .. })
        ));
    }

    #[test]
    fn test_gap_rejected() {
        let scheme = GradingScheme::new(vec![
            GradeRange::new("A", 75.0, 100.0, "Excellent", 5.0),
            GradeRange::new("F", 0.0, 50.0, "Fail", 0.0),
        ]);
        assert_eq!(
            scheme.validate(),
            Err(GradingSchemeError::Gap {
                from: 50.0,
                to: 75.0
            })
        );
    }

    #[test]
    fn test_must_reach_both_ends() {
        let low = GradingScheme::new(vec![GradeRange::new("A", 10.0, 100.0, "x", 1.0)]);
        assert!(matches!(low.validate(), Err(GradingSchemeError::Gap { .. })));

        let high = GradingScheme::new(vec![GradeRange::new("A", 0.0, 90.0, "x", 1.0)]);
        assert!(matches!(high.validate(), Err(GradingSchemeError::Gap { .. })));

        assert_eq!(GradingScheme::new(vec![]).validate(), Err(GradingSchemeError::Empty));
    }
}

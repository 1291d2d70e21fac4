// ==========================================
// 学生财务台账 - 适用费用解析引擎
// ==========================================
// 输入: 学生 + 费用目录 + 学期
// 输出: 适用费用列表 (保持目录顺序) + 折前合计
// 规则: 学期匹配 且 (全校 或 本班) 且 (必缴 或 已选)
// ==========================================

use crate::domain::fee::{FeeStructure, Student};
use crate::domain::types::AcademicPeriod;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// 适用费用解析结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedFees {
    pub fees: Vec<FeeStructure>,
    pub raw_bill: i64, // 折前合计
}

impl ResolvedFees {
    pub fn fee_ids(&self) -> Vec<&str> {
        self.fees.iter().map(|f| f.id.as_str()).collect()
    }
}

// ==========================================
// FeeResolver - 适用费用解析
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct FeeResolver;

impl FeeResolver {
    pub fn new() -> Self {
        Self
    }

    /// 单个费用项是否适用于学生
    pub fn is_applicable(&self, fee: &FeeStructure, student: &Student, period: &AcademicPeriod) -> bool {
        period.matches(&fee.session, &fee.term)
            && fee.class_scope.covers(&student.class_id)
            && (!fee.is_optional || student.has_opted_into(&fee.id))
    }

    /// 解析适用费用 (纯读取, 无副作用; 空结果合法)
    #[instrument(skip(self, student, catalog), fields(student_id = %student.id, catalog = catalog.len()))]
    pub fn resolve(
        &self,
        student: &Student,
        catalog: &[FeeStructure],
        period: &AcademicPeriod,
    ) -> ResolvedFees {
        let fees: Vec<FeeStructure> = catalog
            .iter()
            .filter(|fee| self.is_applicable(fee, student, period))
            .cloned()
            .collect();
        let raw_bill = fees.iter().map(|f| f.amount).sum();

        ResolvedFees { fees, raw_bill }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ClassScope;

    fn fee(id: &str, amount: i64, scope: ClassScope, term: &str, optional: bool) -> FeeStructure {
        FeeStructure {
            id: id.to_string(),
            name: id.to_string(),
            amount,
            class_scope: scope,
            session: "2023/2024".to_string(),
            term: term.to_string(),
            is_optional: optional,
        }
    }

    fn period() -> AcademicPeriod {
        AcademicPeriod::new("2023/2024", "First")
    }

    #[test]
    fn test_global_and_class_scoped_fees_apply() {
        let student = Student::new("S1", "Ada", "C1");
        let catalog = vec![
            fee("Tuition", 50_000, ClassScope::Class("C1".into()), "First", false),
            fee("Sports", 2_000, ClassScope::All, "First", false),
            fee("Lab", 3_000, ClassScope::Class("C2".into()), "First", false),
        ];

        let resolved = FeeResolver::new().resolve(&student, &catalog, &period());
        assert_eq!(resolved.fee_ids(), vec!["Tuition", "Sports"]);
        assert_eq!(resolved.raw_bill, 52_000);
    }

    #[test]
    fn test_optional_fee_requires_opt_in() {
        let mut student = Student::new("S1", "Ada", "C1");
        let catalog = vec![
            fee("Tuition", 50_000, ClassScope::Class("C1".into()), "First", false),
            fee("Bus", 10_000, ClassScope::Class("C1".into()), "First", true),
        ];
        let resolver = FeeResolver::new();

        assert_eq!(resolver.resolve(&student, &catalog, &period()).fee_ids(), vec!["Tuition"]);

        student.assigned_fees.insert("Bus".to_string());
        let resolved = resolver.resolve(&student, &catalog, &period());
        assert_eq!(resolved.fee_ids(), vec!["Tuition", "Bus"]);
        assert_eq!(resolved.raw_bill, 60_000);
    }

    #[test]
    fn test_other_term_excluded_and_empty_is_valid() {
        let student = Student::new("S1", "Ada", "C1");
        let catalog = vec![fee("Tuition", 50_000, ClassScope::All, "Second", false)];

        let resolved = FeeResolver::new().resolve(&student, &catalog, &period());
        assert!(resolved.fees.is_empty());
        assert_eq!(resolved.raw_bill, 0);
    }
}

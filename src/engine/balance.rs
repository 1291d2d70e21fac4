// ==========================================
// 学生财务台账 - 余额计算引擎
// ==========================================
// 输入: 适用费用 + 同学期减免 + 同学期缴费
// 输出: {raw_bill, total_discount, total_bill, total_paid, balance}
// 红线: 所有金额 ≥ 0, 且 total_bill + total_discount == raw_bill
// ==========================================
// 算法:
// 1. raw_bill = Σ 适用费用
// 2. total_discount = Σ 减免, 先求和再一次性截断到 ≤ raw_bill
// 3. total_bill = raw_bill - total_discount
// 4. total_paid = Σ 缴费
// 5. balance = max(0, total_bill - total_paid), 超付部分不结转
// ==========================================

use crate::domain::fee::{FeeStructure, Payment, Student};
use crate::domain::types::AcademicPeriod;
use crate::engine::fee_resolver::{FeeResolver, ResolvedFees};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

/// 学生学期余额明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    pub student_id: String,
    pub applicable_fee_ids: Vec<String>,
    pub raw_bill: i64,
    pub total_discount: i64,
    pub total_bill: i64,
    pub total_paid: i64,
    pub balance: i64,
    /// 超付金额 (仅展示, 不结转到下学期)
    pub overpaid: i64,
}

impl BalanceBreakdown {
    pub fn is_debtor(&self) -> bool {
        self.balance > 0
    }
}

/// 欠费报表
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebtorReport {
    pub session: String,
    pub term: String,
    pub student_count: usize,
    /// 欠费学生, 按欠费额降序, 同额按学生ID升序
    pub debtors: Vec<BalanceBreakdown>,
    pub total_expected: i64,    // Σ total_bill
    pub total_collected: i64,   // Σ total_paid
    pub total_outstanding: i64, // Σ balance
}

// ==========================================
// BalanceCalculator - 余额计算
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BalanceCalculator {
    resolver: FeeResolver,
}

impl BalanceCalculator {
    pub fn new() -> Self {
        Self {
            resolver: FeeResolver::new(),
        }
    }

    /// 基于已解析的适用费用计算余额
    ///
    /// 减免与缴费在此处按学期过滤, 其他学期的记录不参与计算
    pub fn calculate(
        &self,
        student: &Student,
        resolved: &ResolvedFees,
        payments: &[Payment],
        period: &AcademicPeriod,
    ) -> BalanceBreakdown {
        let raw_bill = resolved.raw_bill.max(0);

        let discount_sum: i64 = student.discounts_in(period).map(|d| d.amount.max(0)).sum();
        let total_discount = discount_sum.min(raw_bill);
        let total_bill = raw_bill - total_discount;

        let total_paid: i64 = payments
            .iter()
            .filter(|p| p.student_id == student.id && period.matches(&p.session, &p.term))
            .map(|p| p.amount.max(0))
            .sum();

        let balance = (total_bill - total_paid).max(0);
        let overpaid = (total_paid - total_bill).max(0);

        BalanceBreakdown {
            student_id: student.id.clone(),
            applicable_fee_ids: resolved.fees.iter().map(|f| f.id.clone()).collect(),
            raw_bill,
            total_discount,
            total_bill,
            total_paid,
            balance,
            overpaid,
        }
    }

    /// 解析适用费用并计算余额
    #[instrument(skip(self, student, catalog, payments), fields(student_id = %student.id))]
    pub fn calculate_for_student(
        &self,
        student: &Student,
        catalog: &[FeeStructure],
        payments: &[Payment],
        period: &AcademicPeriod,
    ) -> BalanceBreakdown {
        let resolved = self.resolver.resolve(student, catalog, period);
        self.calculate(student, &resolved, payments, period)
    }

    /// 生成欠费报表
    #[instrument(skip(self, students, catalog, payments), fields(students = students.len()))]
    pub fn debtor_report(
        &self,
        students: &[Student],
        catalog: &[FeeStructure],
        payments: &[Payment],
        period: &AcademicPeriod,
    ) -> DebtorReport {
        let mut by_student: HashMap<&str, Vec<Payment>> = HashMap::new();
        for p in payments {
            by_student.entry(p.student_id.as_str()).or_default().push(p.clone());
        }

        let mut report = DebtorReport {
            session: period.session.clone(),
            term: period.term.clone(),
            student_count: students.len(),
            ..Default::default()
        };

        for student in students {
            let student_payments = by_student
                .get(student.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let breakdown = self.calculate_for_student(student, catalog, student_payments, period);

            report.total_expected += breakdown.total_bill;
            report.total_collected += breakdown.total_paid;
            report.total_outstanding += breakdown.balance;

            if breakdown.is_debtor() {
                report.debtors.push(breakdown);
            }
        }

        report.debtors.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.student_id.cmp(&b.student_id))
        });

        tracing::debug!(
            debtors = report.debtors.len(),
            outstanding = report.total_outstanding,
            "欠费报表生成完成"
        );

        report
    }
}

// ==========================================
// 学生财务台账 - 费用/减免/缴费领域模型
// ==========================================
// 金额统一为 i64 (最小货币单位), 均要求 ≥ 0
// ==========================================

use crate::domain::types::{
    AcademicPeriod, ClassScope, DiscountCategory, PaymentMethod, PaymentPurpose,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// FeeStructure - 费用项
// ==========================================
// 被缴费记录引用后不可变, 仅未引用时可删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeStructure {
    pub id: String,
    pub name: String, // 费用名称, 如 "Tuition"
    pub amount: i64,
    pub class_scope: ClassScope,
    pub session: String,
    pub term: String,
    pub is_optional: bool, // 可选费用: 仅对已选学生计费
}

impl FeeStructure {
    pub fn period(&self) -> AcademicPeriod {
        AcademicPeriod::new(self.session.clone(), self.term.clone())
    }
}

// ==========================================
// StudentDiscount - 学生减免
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentDiscount {
    pub id: String,
    pub amount: i64,
    pub reason: String,
    pub category: DiscountCategory,
    pub session: String,
    pub term: String,
}

// ==========================================
// PaymentLineItem / Payment - 缴费记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLineItem {
    pub purpose: PaymentPurpose,
    pub amount: i64, // > 0
}

/// 缴费记录
///
/// 创建后不可修改, 更正通过删除 + 重建完成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub student_id: String,
    pub amount: i64, // = Σ line_items.amount
    pub method: PaymentMethod,
    pub line_items: Vec<PaymentLineItem>,
    pub date: NaiveDate,
    pub session: String,
    pub term: String,
    pub reference: Option<String>, // 在线支付流水号
}

impl Payment {
    pub fn line_items_total(&self) -> i64 {
        self.line_items.iter().map(|item| item.amount).sum()
    }

    /// 金额与明细合计一致
    pub fn is_consistent(&self) -> bool {
        self.amount == self.line_items_total()
    }

    pub fn references_fee(&self, fee_id: &str) -> bool {
        self.line_items
            .iter()
            .any(|item| item.purpose.fee_id() == Some(fee_id))
    }
}

// ==========================================
// Student - 学生 (仅台账相关字段)
// ==========================================
// 学生独占其减免列表, 删除通过整体替换完成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_id: String,
    pub assigned_fees: BTreeSet<String>, // 已选可选费用ID
    discounts: Vec<StudentDiscount>,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>, class_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class_id: class_id.into(),
            assigned_fees: BTreeSet::new(),
            discounts: Vec::new(),
        }
    }

    /// 从持久化数据重建
    pub fn with_discounts(mut self, discounts: Vec<StudentDiscount>) -> Self {
        self.discounts = discounts;
        self
    }

    pub fn discounts(&self) -> &[StudentDiscount] {
        &self.discounts
    }

    /// 指定学期内的减免
    pub fn discounts_in<'a>(
        &'a self,
        period: &'a AcademicPeriod,
    ) -> impl Iterator<Item = &'a StudentDiscount> + 'a {
        self.discounts
            .iter()
            .filter(move |d| period.matches(&d.session, &d.term))
    }

    pub fn add_discount(&mut self, discount: StudentDiscount) {
        self.discounts.push(discount);
    }

    /// 移除减免
    ///
    /// 生成新列表整体替换, 返回被移除的记录; id 不存在时返回 None 且不做改动
    pub fn remove_discount(&mut self, discount_id: &str) -> Option<StudentDiscount> {
        let removed = self.discounts.iter().find(|d| d.id == discount_id).cloned()?;
        let remaining: Vec<StudentDiscount> = self
            .discounts
            .iter()
            .filter(|d| d.id != discount_id)
            .cloned()
            .collect();
        self.discounts = remaining;
        Some(removed)
    }

    pub fn has_opted_into(&self, fee_id: &str) -> bool {
        self.assigned_fees.contains(fee_id)
    }
}

// ==========================================
// 学生财务台账 - 费用/减免/缴费录入校验
// ==========================================
// 职责: 边界输入 → 类型化实体; 校验失败时不产生任何记录
// 红线: 缴费金额必须等于明细合计
// ==========================================

use crate::domain::fee::{FeeStructure, Payment, PaymentLineItem, StudentDiscount};
use crate::domain::types::{ClassScope, DiscountCategory, PaymentMethod, PaymentPurpose};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 新建费用项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeDraft {
    pub name: String,
    pub amount: i64,
    pub class_scope: ClassScope,
    pub session: String,
    pub term: String,
    pub is_optional: bool,
}

/// 新建减免 (category 为边界原始文本)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountDraft {
    pub amount: i64,
    pub reason: String,
    pub category: String,
    pub session: String,
    pub term: String,
}

/// 缴费明细 (purpose 为边界原始文本)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemDraft {
    pub purpose: String,
    pub amount: i64,
}

/// 新建缴费
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub student_id: String,
    /// 调用方声明的总额; 提供时必须与明细合计一致
    pub declared_amount: Option<i64>,
    pub method: PaymentMethod,
    pub line_items: Vec<LineItemDraft>,
    pub date: NaiveDate,
    pub session: String,
    pub term: String,
    pub reference: Option<String>,
}

fn require_non_empty(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "不能为空"));
    }
    Ok(())
}

// ==========================================
// LedgerValidator - 台账录入校验
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct LedgerValidator;

impl LedgerValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn build_fee(&self, draft: FeeDraft) -> EngineResult<FeeStructure> {
        require_non_empty("name", &draft.name)?;
        require_non_empty("session", &draft.session)?;
        require_non_empty("term", &draft.term)?;
        if draft.amount < 0 {
            return Err(EngineError::validation("amount", format!("金额不能为负: {}", draft.amount)));
        }

        Ok(FeeStructure {
            id: Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            amount: draft.amount,
            class_scope: draft.class_scope,
            session: draft.session,
            term: draft.term,
            is_optional: draft.is_optional,
        })
    }

    pub fn build_discount(&self, draft: DiscountDraft) -> EngineResult<StudentDiscount> {
        require_non_empty("session", &draft.session)?;
        require_non_empty("term", &draft.term)?;
        if draft.amount < 0 {
            return Err(EngineError::validation("amount", format!("金额不能为负: {}", draft.amount)));
        }
        let category = DiscountCategory::parse(&draft.category).ok_or_else(|| {
            EngineError::validation("category", format!("未知减免类别: {}", draft.category))
        })?;

        Ok(StudentDiscount {
            id: Uuid::new_v4().to_string(),
            amount: draft.amount,
            reason: draft.reason.trim().to_string(),
            category,
            session: draft.session,
            term: draft.term,
        })
    }

    /// 构建缴费记录
    ///
    /// 校验:
    /// - 至少一条明细, 每条金额 > 0, 用途可解析
    /// - 合计 > 0
    /// - declared_amount (如有) == 合计
    pub fn build_payment(&self, draft: PaymentDraft) -> EngineResult<Payment> {
        require_non_empty("student_id", &draft.student_id)?;
        require_non_empty("session", &draft.session)?;
        require_non_empty("term", &draft.term)?;
        if draft.line_items.is_empty() {
            return Err(EngineError::validation("line_items", "缴费明细不能为空"));
        }

        let mut line_items = Vec::with_capacity(draft.line_items.len());
        for (idx, item) in draft.line_items.iter().enumerate() {
            if item.amount <= 0 {
                return Err(EngineError::validation(
                    "line_items.amount",
                    format!("第{}条明细金额必须大于0: {}", idx + 1, item.amount),
                ));
            }
            let purpose = PaymentPurpose::parse(&item.purpose).ok_or_else(|| {
                EngineError::validation("line_items.purpose", format!("第{}条明细用途无效", idx + 1))
            })?;
            line_items.push(PaymentLineItem {
                purpose,
                amount: item.amount,
            });
        }

        let amount: i64 = line_items.iter().map(|i| i.amount).sum();
        if let Some(declared) = draft.declared_amount {
            if declared != amount {
                return Err(EngineError::validation(
                    "amount",
                    format!("缴费金额{}与明细合计{}不一致", declared, amount),
                ));
            }
        }

        Ok(Payment {
            id: Uuid::new_v4().to_string(),
            student_id: draft.student_id,
            amount,
            method: draft.method,
            line_items,
            date: draft.date,
            session: draft.session,
            term: draft.term,
            reference: draft.reference.filter(|r| !r.trim().is_empty()),
        })
    }

    /// 费用项仅在未被缴费引用时可删除
    pub fn ensure_fee_deletable(&self, fee_id: &str, payments: &[Payment]) -> EngineResult<()> {
        if let Some(p) = payments.iter().find(|p| p.references_fee(fee_id)) {
            return Err(EngineError::validation(
                "fee_id",
                format!("费用项{}已被缴费记录{}引用, 不可删除", fee_id, p.id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(items: Vec<(&str, i64)>, declared: Option<i64>) -> PaymentDraft {
        PaymentDraft {
            student_id: "S1".to_string(),
            declared_amount: declared,
            method: PaymentMethod::Cash,
            line_items: items
                .into_iter()
                .map(|(purpose, amount)| LineItemDraft {
                    purpose: purpose.to_string(),
                    amount,
                })
                .collect(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            session: "2023/2024".to_string(),
            term: "Second".to_string(),
            reference: None,
        }
    }

    #[test]
    fn test_payment_amount_is_sum_of_items() {
        let payment = LedgerValidator::new()
            .build_payment(draft(vec![("fee:F1", 15_000), ("Books", 5_000)], Some(20_000)))
            .unwrap();
        assert_eq!(payment.amount, 20_000);
        assert!(payment.is_consistent());
        assert_eq!(payment.line_items[1].purpose, PaymentPurpose::Books);
    }

    #[test]
    fn test_payment_amount_mismatch_rejected() {
        let err = LedgerValidator::new()
            .build_payment(draft(vec![("fee:F1", 15_000)], Some(20_000)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "amount"));
    }

    #[test]
    fn test_payment_requires_positive_items() {
        let validator = LedgerValidator::new();
        assert!(validator.build_payment(draft(vec![], None)).is_err());
        assert!(validator.build_payment(draft(vec![("Books", 0)], None)).is_err());
        assert!(validator.build_payment(draft(vec![("  ", 100)], None)).is_err());
    }

    #[test]
    fn test_negative_fee_and_unknown_category_rejected() {
        let validator = LedgerValidator::new();
        let fee = validator.build_fee(FeeDraft {
            name: "Tuition".to_string(),
            amount: -1,
            class_scope: ClassScope::All,
            session: "2023/2024".to_string(),
            term: "First".to_string(),
            is_optional: false,
        });
        assert!(fee.is_err());

        let discount = validator.build_discount(DiscountDraft {
            amount: 100,
            reason: "sibling".to_string(),
            category: "waiver".to_string(),
            session: "2023/2024".to_string(),
            term: "First".to_string(),
        });
        assert!(matches!(discount, Err(EngineError::Validation { ref field, .. }) if field == "category"));
    }

    #[test]
    fn test_referenced_fee_not_deletable() {
        let validator = LedgerValidator::new();
        let payment = validator
            .build_payment(draft(vec![("fee:F1", 1_000)], None))
            .unwrap();
        assert!(validator.ensure_fee_deletable("F1", &[payment.clone()]).is_err());
        assert!(validator.ensure_fee_deletable("F2", &[payment]).is_ok());
    }
}

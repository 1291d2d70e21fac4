// ==========================================
// 学生财务台账 - 台账 API
// ==========================================
// 职责: 费用项管理、减免、可选费用、缴费录入、余额与欠费报表、在线支付核验
// 红线: 缴费金额与明细不一致的记录不落库; 被引用的费用项不可删除
// ==========================================

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::fee::{FeeStructure, Payment, Student, StudentDiscount};
use crate::domain::types::{AcademicPeriod, PaymentMethod};
use crate::engine::balance::{BalanceBreakdown, BalanceCalculator, DebtorReport};
use crate::engine::ledger::{DiscountDraft, FeeDraft, LedgerValidator, LineItemDraft, PaymentDraft};
use crate::repository::error::RepositoryError;
use crate::repository::fee_repo::FeeStructureRepository;
use crate::repository::payment_gateway::{PaymentVerifier, VerificationOutcome};
use crate::repository::payment_repo::PaymentRepository;
use crate::repository::student_repo::StudentRepository;

/// 默认在线支付明细用途
pub const ONLINE_PAYMENT_PURPOSE: &str = "online payment";

/// 在线支付核验请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlinePaymentRequest {
    pub reference: String,
    pub student_id: String,
    pub amount: i64,
    pub session: String,
    pub term: String,
    pub date: NaiveDate,
    /// 明细用途原始文本 (如 "fee:<id>"), 为空时记为在线支付
    #[serde(default)]
    pub purpose: Option<String>,
}

// ==========================================
// LedgerApi - 台账 API
// ==========================================
pub struct LedgerApi {
    fee_repo: Arc<FeeStructureRepository>,
    student_repo: Arc<StudentRepository>,
    payment_repo: Arc<PaymentRepository>,
    verifier: Arc<dyn PaymentVerifier>,
    validator: LedgerValidator,
    calculator: BalanceCalculator,
}

impl LedgerApi {
    pub fn new(
        fee_repo: Arc<FeeStructureRepository>,
        student_repo: Arc<StudentRepository>,
        payment_repo: Arc<PaymentRepository>,
        verifier: Arc<dyn PaymentVerifier>,
    ) -> Self {
        Self {
            fee_repo,
            student_repo,
            payment_repo,
            verifier,
            validator: LedgerValidator::new(),
            calculator: BalanceCalculator::new(),
        }
    }

    // ===== 费用项 =====

    pub fn create_fee(&self, draft: FeeDraft) -> ApiResult<FeeStructure> {
        let fee = self.validator.build_fee(draft)?;
        self.fee_repo.create(&fee)?;
        tracing::info!(fee_id = %fee.id, name = %fee.name, amount = fee.amount, "费用项已创建");
        Ok(fee)
    }

    pub fn list_fees(&self, period: &AcademicPeriod) -> ApiResult<Vec<FeeStructure>> {
        Ok(self.fee_repo.find_by_period(period)?)
    }

    /// 费用项是否已被缴费引用 (引用后不可修改/删除)
    pub fn is_fee_locked(&self, fee_id: &str) -> ApiResult<bool> {
        Ok(self.payment_repo.is_fee_referenced(fee_id)?)
    }

    /// 删除费用项
    ///
    /// # 返回
    /// - Err(NotFound): 费用项不存在
    /// - Err(ValidationError): 已被缴费记录引用
    pub fn delete_fee(&self, fee_id: &str) -> ApiResult<()> {
        if self.fee_repo.find_by_id(fee_id)?.is_none() {
            return Err(RepositoryError::not_found("FeeStructure", fee_id).into());
        }
        let referencing = self.payment_repo.find_by_fee(fee_id)?;
        if let Err(e) = self.validator.ensure_fee_deletable(fee_id, &referencing) {
            tracing::warn!(fee_id, references = referencing.len(), "费用项删除被拒绝");
            return Err(e.into());
        }
        self.fee_repo.delete(fee_id)?;
        tracing::info!(fee_id, "费用项已删除");
        Ok(())
    }

    // ===== 学生 / 减免 / 可选费用 =====

    pub fn register_student(&self, id: &str, name: &str, class_id: &str) -> ApiResult<Student> {
        if id.trim().is_empty() || class_id.trim().is_empty() {
            return Err(ApiError::ValidationError("学生ID与班级不能为空".to_string()));
        }
        let student = Student::new(id.trim(), name.trim(), class_id.trim());
        self.student_repo.create(&student)?;
        Ok(student)
    }

    pub fn add_discount(&self, student_id: &str, draft: DiscountDraft) -> ApiResult<StudentDiscount> {
        let discount = self.validator.build_discount(draft)?;
        self.student_repo.add_discount(student_id, &discount)?;
        tracing::info!(
            student_id,
            discount_id = %discount.id,
            amount = discount.amount,
            category = %discount.category,
            "减免已添加"
        );
        Ok(discount)
    }

    /// 移除减免, 返回被移除的记录
    pub fn remove_discount(&self, student_id: &str, discount_id: &str) -> ApiResult<StudentDiscount> {
        let mut student = self.student_repo.get(student_id)?;
        let removed = student
            .remove_discount(discount_id)
            .ok_or_else(|| RepositoryError::not_found("StudentDiscount", discount_id))?;
        self.student_repo.remove_discount(student_id, discount_id)?;
        tracing::info!(student_id, discount_id, "减免已移除");
        Ok(removed)
    }

    /// 整体设置学生已选的可选费用
    ///
    /// 每个费用项须存在且为可选费用
    pub fn set_optional_fees(&self, student_id: &str, fee_ids: &BTreeSet<String>) -> ApiResult<()> {
        for fee_id in fee_ids {
            let fee = self
                .fee_repo
                .find_by_id(fee_id)?
                .ok_or_else(|| RepositoryError::not_found("FeeStructure", fee_id))?;
            if !fee.is_optional {
                return Err(ApiError::ValidationError(format!("费用项{}不是可选费用", fee_id)));
            }
        }
        self.student_repo.set_assigned_fees(student_id, fee_ids)?;
        tracing::info!(student_id, fees = fee_ids.len(), "可选费用已更新");
        Ok(())
    }

    // ===== 缴费 =====

    pub fn record_payment(&self, draft: PaymentDraft) -> ApiResult<Payment> {
        self.student_repo.get(&draft.student_id)?;
        let payment = self.validator.build_payment(draft)?;
        self.ensure_referenced_fees_exist(&payment)?;
        self.payment_repo.insert(&payment)?;
        tracing::info!(
            payment_id = %payment.id,
            student_id = %payment.student_id,
            amount = payment.amount,
            method = %payment.method.as_db_str(),
            "缴费已登记"
        );
        Ok(payment)
    }

    /// 删除缴费 (缴费记录不可修改, 更正 = 删除 + 重新登记)
    pub fn delete_payment(&self, payment_id: &str) -> ApiResult<()> {
        self.payment_repo.delete(payment_id)?;
        tracing::info!(payment_id, "缴费已删除");
        Ok(())
    }

    pub fn list_payments(&self, student_id: &str, period: &AcademicPeriod) -> ApiResult<Vec<Payment>> {
        Ok(self.payment_repo.find_by_student(student_id, period)?)
    }

    fn ensure_referenced_fees_exist(&self, payment: &Payment) -> ApiResult<()> {
        for fee_id in payment.line_items.iter().filter_map(|i| i.purpose.fee_id()) {
            if self.fee_repo.find_by_id(fee_id)?.is_none() {
                return Err(ApiError::ValidationError(format!("缴费明细引用的费用项{}不存在", fee_id)));
            }
        }
        Ok(())
    }

    // ===== 余额 / 报表 =====

    pub fn get_balance(&self, student_id: &str, period: &AcademicPeriod) -> ApiResult<BalanceBreakdown> {
        let student = self.student_repo.get(student_id)?;
        let catalog = self.fee_repo.find_by_period(period)?;
        let payments = self.payment_repo.find_by_student(student_id, period)?;
        Ok(self
            .calculator
            .calculate_for_student(&student, &catalog, &payments, period))
    }

    /// 欠费报表
    ///
    /// # 参数
    /// - class_id: None 表示全校
    pub fn debtor_report(&self, class_id: Option<&str>, period: &AcademicPeriod) -> ApiResult<DebtorReport> {
        let students = match class_id {
            Some(c) => self.student_repo.list_by_class(c)?,
            None => self.student_repo.list_all()?,
        };
        let catalog = self.fee_repo.find_by_period(period)?;
        let payments = self.payment_repo.find_by_period(period)?;
        Ok(self
            .calculator
            .debtor_report(&students, &catalog, &payments, period))
    }

    // ===== 在线支付 =====

    /// 核验在线支付并登记
    ///
    /// 同一流水号重复核验返回已登记的缴费, 不重复记账
    pub async fn verify_online_payment(&self, request: OnlinePaymentRequest) -> ApiResult<Payment> {
        let reference = request.reference.trim().to_string();
        if reference.is_empty() {
            return Err(ApiError::ValidationError("支付流水号不能为空".to_string()));
        }
        if request.amount <= 0 {
            return Err(ApiError::ValidationError(format!("支付金额必须大于0: {}", request.amount)));
        }

        if let Some(existing) = self.existing_online_payment(&reference, &request.student_id)? {
            tracing::info!(reference = %reference, payment_id = %existing.id, "流水号已登记, 返回已有缴费");
            return Ok(existing);
        }
        self.student_repo.get(&request.student_id)?;

        let outcome = self
            .verifier
            .verify(&reference, request.amount)
            .await
            .map_err(|e| ApiError::TransportError(format!("支付网关不可用: {}", e)))?;

        let confirmed = match outcome {
            VerificationOutcome::Confirmed { amount } => amount,
            VerificationOutcome::Rejected { reason } => {
                tracing::warn!(reference = %reference, reason = %reason, "在线支付核验未通过");
                return Err(ApiError::ValidationError(format!("支付核验未通过: {}", reason)));
            }
        };
        if confirmed != request.amount {
            tracing::warn!(
                reference = %reference,
                requested = request.amount,
                confirmed,
                "网关确认金额与申报金额不一致, 以网关为准"
            );
        }

        let payment = self.validator.build_payment(PaymentDraft {
            student_id: request.student_id.clone(),
            declared_amount: None,
            method: PaymentMethod::Online,
            line_items: vec![LineItemDraft {
                purpose: request
                    .purpose
                    .clone()
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| ONLINE_PAYMENT_PURPOSE.to_string()),
                amount: confirmed,
            }],
            date: request.date,
            session: request.session,
            term: request.term,
            reference: Some(reference.clone()),
        })?;
        self.ensure_referenced_fees_exist(&payment)?;

        match self.payment_repo.insert(&payment) {
            Ok(()) => {
                tracing::info!(reference = %reference, payment_id = %payment.id, amount = confirmed, "在线支付已登记");
                Ok(payment)
            }
            // 并发核验同一流水号: 以先落库者为准
            Err(RepositoryError::UniqueConstraintViolation(_)) => self
                .existing_online_payment(&reference, &request.student_id)?
                .ok_or_else(|| ApiError::TransportError(format!("流水号{}写入冲突", reference))),
            Err(e) => Err(e.into()),
        }
    }

    fn existing_online_payment(&self, reference: &str, student_id: &str) -> ApiResult<Option<Payment>> {
        match self.payment_repo.find_by_reference(reference)? {
            Some(p) if p.student_id != student_id => Err(ApiError::ValidationError(format!(
                "流水号{}已登记在其他学生名下",
                reference
            ))),
            other => Ok(other),
        }
    }
}

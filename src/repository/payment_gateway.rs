// ==========================================
// 学生财务台账 - 在线支付核验接口
// ==========================================
// 职责: 定义支付网关核验 trait, 具体网关由部署方实现
// 说明: API 层只依赖 trait, 不依赖任何网关 SDK
// ==========================================

use async_trait::async_trait;
use std::error::Error;

/// 网关核验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// 网关确认到账金额
    Confirmed { amount: i64 },
    /// 网关拒绝 (流水号无效、金额不符等)
    Rejected { reason: String },
}

/// 在线支付核验
///
/// # 返回
/// - `Ok(Confirmed)`: 网关确认的到账金额 (可能与申报金额不同)
/// - `Ok(Rejected)`: 网关明确拒绝
/// - `Err`: 网关不可达等传输错误
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(
        &self,
        reference: &str,
        amount: i64,
    ) -> Result<VerificationOutcome, Box<dyn Error + Send + Sync>>;
}

// ==========================================
// 学生财务台账与成绩引擎 - 配置管理 API
// ==========================================
// 职责: 当前学期、成绩满分、评分等级方案的查询与更新
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::{config_keys, ConfigManager};
use crate::domain::grading::GradingScheme;
use crate::domain::types::AcademicPeriod;
use crate::engine::score_entry::ScoreCaps;

// ==========================================
// ConfigApi - 配置管理 API
// ==========================================
pub struct ConfigApi {
    config_manager: Arc<ConfigManager>,
}

impl ConfigApi {
    pub fn new(config_manager: Arc<ConfigManager>) -> Self {
        Self { config_manager }
    }

    pub fn current_period(&self) -> ApiResult<AcademicPeriod> {
        self.config_manager.get_current_period().map_err(ApiError::config)
    }

    /// 切换当前学期 (后续考勤学期更正以此为准)
    pub fn set_current_period(&self, period: &AcademicPeriod) -> ApiResult<()> {
        self.config_manager
            .set_current_period(period)
            .map_err(|e| ApiError::ValidationError(e.to_string()))
    }

    pub fn score_caps(&self) -> ApiResult<ScoreCaps> {
        self.config_manager.get_score_caps().map_err(ApiError::config)
    }

    /// 更新成绩分项满分 (新满分对此后录入生效, 之和不得超过等级方案上限)
    pub fn set_score_caps(&self, caps: ScoreCaps) -> ApiResult<()> {
        if [caps.ca1, caps.ca2, caps.exam].iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ApiError::ValidationError(format!("满分须为非负数: {:?}", caps)));
        }
        let upper = self.grading_scheme()?.upper_bound();
        if caps.total() > upper {
            tracing::warn!(total = caps.total(), upper, "分项满分之和超出等级方案上限");
            return Err(ApiError::ValidationError(format!(
                "分项满分之和{}超出等级方案上限{}",
                caps.total(),
                upper
            )));
        }
        for (key, value) in [
            (config_keys::CA1_MAX, caps.ca1),
            (config_keys::CA2_MAX, caps.ca2),
            (config_keys::EXAM_MAX, caps.exam),
        ] {
            self.config_manager
                .set_global_config_value(key, &value.to_string())
                .map_err(ApiError::config)?;
        }
        Ok(())
    }

    pub fn grading_scheme(&self) -> ApiResult<GradingScheme> {
        self.config_manager.get_grading_scheme().map_err(ApiError::config)
    }

    /// 保存评分等级方案 (重叠/未覆盖/上限低于满分之和时拒绝)
    pub fn save_grading_scheme(&self, scheme: &GradingScheme) -> ApiResult<()> {
        if let Err(e) = scheme.validate() {
            tracing::warn!(error = %e, "评分等级方案校验失败");
            return Err(ApiError::ValidationError(e.to_string()));
        }
        let caps = self.score_caps()?;
        if caps.total() > scheme.upper_bound() {
            return Err(ApiError::ValidationError(format!(
                "等级方案上限{}低于分项满分之和{}",
                scheme.upper_bound(),
                caps.total()
            )));
        }
        self.config_manager
            .save_grading_scheme(scheme)
            .map_err(ApiError::config)
    }

    /// 配置快照 (JSON)
    pub fn snapshot(&self) -> ApiResult<String> {
        self.config_manager.get_config_snapshot().map_err(ApiError::config)
    }
}

// ==========================================
// 成绩评定 - 成绩 API
// ==========================================
// 职责: 成绩录入 (防抖写入)、发布/撤销、班级排名、学生视图、科目统计
// 读路径: 防抖队列中的待写状态优先于已落库数据
// 发布类操作: 先落盘待写状态, 再直接写库 (不经防抖), 避免旧状态覆盖发布标记
// 说明: 录入类方法会派生写入任务, 须在 tokio 运行时内调用
// ==========================================

use std::sync::Arc;

use chrono::Utc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::score::{ScoreAggregate, ScoreKey, ScoreRow, StudentResultView};
use crate::domain::types::{AcademicPeriod, RecordField, ScoreField, TraitDomain};
use crate::engine::grade_scale::GradeScaleResolver;
use crate::engine::publication::{PublicationState, PublicationStateMachine};
use crate::engine::ranking::{ClassRankCalculator, ClassRanking, SubjectStatistics};
use crate::engine::score_entry::{summarize_attendance, ScoreEntryEngine};
use crate::engine::write_scheduler::{FailedWrite, ScoreStore, ScoreWriteScheduler};
use crate::repository::attendance_repo::AttendanceRepository;
use crate::repository::error::RepositoryError;
use crate::repository::score_repo::ScoreRepository;

// ==========================================
// ScoreApi - 成绩 API
// ==========================================
pub struct ScoreApi {
    score_repo: Arc<ScoreRepository>,
    attendance_repo: Arc<AttendanceRepository>,
    config: Arc<ConfigManager>,
    scheduler: ScoreWriteScheduler,
    publication: PublicationStateMachine,
    ranking: ClassRankCalculator,
}

impl ScoreApi {
    /// 创建 ScoreApi, 防抖窗口取自配置 score_debounce_ms
    pub fn new(
        score_repo: Arc<ScoreRepository>,
        attendance_repo: Arc<AttendanceRepository>,
        config: Arc<ConfigManager>,
    ) -> ApiResult<Self> {
        let store: Arc<dyn ScoreStore> = score_repo.clone();
        Self::with_store(score_repo, attendance_repo, config, store)
    }

    /// 指定防抖写入目标 (默认即 score_repo 本身)
    pub fn with_store(
        score_repo: Arc<ScoreRepository>,
        attendance_repo: Arc<AttendanceRepository>,
        config: Arc<ConfigManager>,
        store: Arc<dyn ScoreStore>,
    ) -> ApiResult<Self> {
        let window = config.get_score_debounce().map_err(ApiError::config)?;
        Ok(Self {
            score_repo,
            attendance_repo,
            config,
            scheduler: ScoreWriteScheduler::new(store, window),
            publication: PublicationStateMachine::new(),
            ranking: ClassRankCalculator::new(),
        })
    }

    /// 按当前配置 (满分/等级方案) 构造录入引擎
    fn entry_engine(&self) -> ApiResult<ScoreEntryEngine> {
        let caps = self.config.get_score_caps().map_err(ApiError::config)?;
        let scheme = self.config.get_grading_scheme().map_err(ApiError::config)?;
        Ok(ScoreEntryEngine::new(GradeScaleResolver::new(scheme), caps))
    }

    /// 取最新汇总: 待写状态 → 已落库 → 新建
    fn load_for_edit(&self, student_id: &str, class_id: &str, period: &AcademicPeriod) -> ApiResult<ScoreAggregate> {
        if student_id.trim().is_empty() {
            return Err(ApiError::ValidationError("学生ID不能为空".to_string()));
        }
        if let Some(pending) = self.scheduler.pending_state(&ScoreKey::new(student_id, period)) {
            return Ok(pending);
        }
        Ok(self.score_repo.get_or_create(student_id, class_id, period)?)
    }

    /// 修改并排队写入; 校验失败时不排队
    fn edit<F>(&self, student_id: &str, class_id: &str, period: &AcademicPeriod, mutate: F) -> ApiResult<ScoreAggregate>
    where
        F: FnOnce(&ScoreEntryEngine, &mut ScoreAggregate) -> ApiResult<()>,
    {
        let engine = self.entry_engine()?;
        let mut aggregate = self.load_for_edit(student_id, class_id, period)?;
        if let Err(e) = mutate(&engine, &mut aggregate) {
            tracing::warn!(student_id, error = %e, "成绩修改被拒绝");
            return Err(e);
        }
        self.scheduler.schedule(aggregate.clone());
        Ok(aggregate)
    }

    // ===== 录入 =====

    /// 录入单科分项成绩 (原始文本, 非数字记为 0, 超出满分截断)
    pub fn upsert_subject_score(
        &self,
        student_id: &str,
        class_id: &str,
        period: &AcademicPeriod,
        subject: &str,
        field: ScoreField,
        raw_value: &str,
    ) -> ApiResult<ScoreAggregate> {
        self.edit(student_id, class_id, period, |engine, agg| {
            Ok(engine.apply_subject_score_raw(agg, subject, field, raw_value)?)
        })
    }

    pub fn upsert_trait(
        &self,
        student_id: &str,
        class_id: &str,
        period: &AcademicPeriod,
        domain: TraitDomain,
        trait_name: &str,
        rating: u8,
    ) -> ApiResult<ScoreAggregate> {
        self.edit(student_id, class_id, period, |engine, agg| {
            Ok(engine.apply_trait(agg, domain, trait_name, rating)?)
        })
    }

    pub fn upsert_field(
        &self,
        student_id: &str,
        class_id: &str,
        period: &AcademicPeriod,
        field: RecordField,
    ) -> ApiResult<ScoreAggregate> {
        self.edit(student_id, class_id, period, |engine, agg| Ok(engine.apply_field(agg, field)?))
    }

    /// 删除科目行
    pub fn remove_subject(
        &self,
        student_id: &str,
        class_id: &str,
        period: &AcademicPeriod,
        subject: &str,
    ) -> ApiResult<ScoreRow> {
        let mut removed = None;
        self.edit(student_id, class_id, period, |engine, agg| {
            removed = Some(engine.remove_subject(agg, subject)?);
            Ok(())
        })?;
        removed.ok_or_else(|| ApiError::NotFound(format!("科目{}不存在", subject)))
    }

    /// 按本学期考勤表回填出勤天数
    pub fn derive_attendance(
        &self,
        student_id: &str,
        class_id: &str,
        period: &AcademicPeriod,
    ) -> ApiResult<ScoreAggregate> {
        let registers = self.attendance_repo.list_by_class_period(class_id, period)?;
        let summary = summarize_attendance(&registers, student_id, period);
        tracing::debug!(
            student_id,
            present = summary.days_present(),
            recorded = summary.days_recorded(),
            "出勤汇总"
        );
        self.edit(student_id, class_id, period, |engine, agg| {
            engine.apply_attendance_summary(agg, summary);
            Ok(())
        })
    }

    /// 教师端读取 (含未发布与待写状态)
    pub fn get_aggregate(&self, student_id: &str, period: &AcademicPeriod) -> ApiResult<Option<ScoreAggregate>> {
        let key = ScoreKey::new(student_id, period);
        if let Some(pending) = self.scheduler.pending_state(&key) {
            return Ok(Some(pending));
        }
        Ok(self.score_repo.find_by_key(&key)?)
    }

    // ===== 写入控制 =====

    /// 立即落盘全部待写成绩, 返回成功条数
    pub async fn flush_all(&self) -> usize {
        self.scheduler.flush_all().await
    }

    pub fn pending_writes(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// 取出写入失败的汇总 (调用方可修正后重新录入)
    pub fn take_failed_writes(&self) -> Vec<FailedWrite> {
        self.scheduler.take_failures()
    }

    /// 失败写入重新排队, 返回排队条数
    ///
    /// 已有更新修改的 key 直接丢弃旧快照; 发布状态以已落库记录为准
    pub fn retry_failed_writes(&self) -> ApiResult<usize> {
        let failures = self.scheduler.take_failures();
        let mut count = 0;
        for failure in failures {
            if self.scheduler.pending_state(&failure.key).is_some() {
                continue;
            }
            let mut aggregate = failure.aggregate;
            if let Some(stored) = self.score_repo.find_by_key(&failure.key)? {
                aggregate.adopt_publication(&stored);
            }
            self.scheduler.schedule(aggregate);
            count += 1;
        }
        Ok(count)
    }

    /// 批量操作前落盘待写状态; 该班级学期仍有写入失败时拒绝继续
    async fn flush_cohort(&self, class_id: &str, period: &AcademicPeriod) -> ApiResult<()> {
        self.scheduler.flush_all().await;
        if self.scheduler.has_failures_for(class_id, period) {
            tracing::warn!(class_id, period = %period, "班级成绩存在写入失败, 批量操作已中止");
            return Err(ApiError::TransportError(format!(
                "班级{} {} 有成绩写入失败, 请先重试失败写入",
                class_id, period
            )));
        }
        Ok(())
    }

    async fn flush_key(&self, key: &ScoreKey) -> ApiResult<()> {
        self.scheduler
            .flush(key)
            .await
            .map_err(|e| ApiError::TransportError(e.to_string()))?;
        Ok(())
    }

    async fn load_by_id(&self, score_id: &str) -> ApiResult<ScoreAggregate> {
        let stored = self
            .score_repo
            .find_by_id(score_id)?
            .ok_or_else(|| RepositoryError::not_found("ScoreAggregate", score_id))?;
        self.flush_key(&stored.key()).await?;
        Ok(self
            .score_repo
            .find_by_id(score_id)?
            .ok_or_else(|| RepositoryError::not_found("ScoreAggregate", score_id))?)
    }

    // ===== 发布 =====

    /// 发布单条成绩, 返回发布前状态
    pub async fn publish(&self, score_id: &str, actor_id: &str) -> ApiResult<PublicationState> {
        let mut aggregate = self.load_by_id(score_id).await?;
        let from = self.publication.publish(&mut aggregate, actor_id, Utc::now())?;
        self.score_repo.save(&aggregate)?;
        Ok(from)
    }

    /// 撤销发布单条成绩, 返回撤销前状态
    pub async fn unpublish(&self, score_id: &str) -> ApiResult<PublicationState> {
        let mut aggregate = self.load_by_id(score_id).await?;
        let from = self.publication.unpublish(&mut aggregate);
        self.score_repo.save(&aggregate)?;
        Ok(from)
    }

    /// 批量发布班级某学期全部成绩, 返回受影响条数
    pub async fn publish_class(&self, class_id: &str, period: &AcademicPeriod, actor_id: &str) -> ApiResult<usize> {
        self.flush_cohort(class_id, period).await?;
        let mut cohort = self.score_repo.list_by_cohort(class_id, period)?;
        let affected = self
            .publication
            .publish_cohort(&mut cohort, class_id, period, actor_id, Utc::now())?;
        self.score_repo.save_all(&cohort)?;
        Ok(affected)
    }

    pub async fn unpublish_class(&self, class_id: &str, period: &AcademicPeriod) -> ApiResult<usize> {
        self.flush_cohort(class_id, period).await?;
        let mut cohort = self.score_repo.list_by_cohort(class_id, period)?;
        let affected = self.publication.unpublish_cohort(&mut cohort, class_id, period);
        self.score_repo.save_all(&cohort)?;
        Ok(affected)
    }

    /// 等级方案变更后重算班级全部科目等级
    pub async fn regrade_class(&self, class_id: &str, period: &AcademicPeriod) -> ApiResult<usize> {
        let engine = self.entry_engine()?;
        self.flush_cohort(class_id, period).await?;
        let mut cohort = self.score_repo.list_by_cohort(class_id, period)?;
        for aggregate in cohort.iter_mut() {
            engine.regrade(aggregate);
        }
        self.score_repo.save_all(&cohort)?;
        tracing::info!(class_id, period = %period, count = cohort.len(), "班级成绩已按新方案重算等级");
        Ok(cohort.len())
    }

    // ===== 查询 =====

    /// 班级排名 (仅已发布)
    pub fn class_ranking(&self, class_id: &str, period: &AcademicPeriod) -> ApiResult<ClassRanking> {
        let cohort = self.score_repo.list_by_cohort(class_id, period)?;
        Ok(self.ranking.rank(&cohort, class_id, period))
    }

    pub fn subject_statistics(&self, class_id: &str, period: &AcademicPeriod) -> ApiResult<Vec<SubjectStatistics>> {
        let cohort = self.score_repo.list_by_cohort(class_id, period)?;
        Ok(self.ranking.subject_statistics(&cohort, class_id, period))
    }

    /// 学生/家长视图 (未发布或无成绩时为 Pending)
    pub fn student_result(&self, student_id: &str, period: &AcademicPeriod) -> ApiResult<StudentResultView> {
        let aggregate = match self.score_repo.find_by_key(&ScoreKey::new(student_id, period))? {
            Some(a) => a,
            None => {
                return Ok(StudentResultView::Pending {
                    student_id: student_id.to_string(),
                    session: period.session.clone(),
                    term: period.term.clone(),
                })
            }
        };
        let ranking = if aggregate.is_passed() {
            self.class_ranking(&aggregate.class_id, period)?
        } else {
            ClassRanking::default()
        };
        Ok(self.publication.student_view(&aggregate, &ranking))
    }
}

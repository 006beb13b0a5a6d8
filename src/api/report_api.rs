// ==========================================
// 试验报告API
// ==========================================
// 职责: 批次列表、批次预览、单个报告生成、批量报告生成
// 数据来源: 仅已提交数据（read_all），不含待提交变更
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ReportSettings};
use crate::domain::{Batch, BatchKey, BatchSummary, Record};
use crate::engine::{
    BatchPartitioner, BulkGenerationSummary, GenerationProgress, RenderContext, ReportBinder,
    ReportGenerator, TemplateRenderer,
};
use crate::repository::ToolRecordRepository;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 试验报告API
pub struct ReportApi {
    repo: Arc<ToolRecordRepository>,
    config: Arc<ConfigManager>,
    renderer: Arc<dyn TemplateRenderer>,
    partitioner: BatchPartitioner,
}

impl ReportApi {
    pub fn new(
        repo: Arc<ToolRecordRepository>,
        config: Arc<ConfigManager>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            repo,
            config,
            renderer,
            partitioner: BatchPartitioner,
        }
    }

    /// 读取当前报告配置
    pub fn settings(&self) -> ApiResult<ReportSettings> {
        self.config
            .load_report_settings()
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    /// 按已提交数据划分批次
    pub fn load_batches(&self) -> ApiResult<Vec<Batch>> {
        let table = self.repo.read_all()?;
        Ok(self.partitioner.partition(table.rows)?)
    }

    /// 批次列表
    pub fn list_batches(&self) -> ApiResult<Vec<BatchSummary>> {
        Ok(self.load_batches()?.iter().map(BatchSummary::from).collect())
    }

    /// 按批次键查找批次
    pub fn find_batch(&self, key: &BatchKey) -> ApiResult<Batch> {
        self.load_batches()?
            .into_iter()
            .find(|b| &b.key == key)
            .ok_or_else(|| ApiError::BatchNotFound(key.display_name()))
    }

    /// 按选择器定位批次: 1 起始序号或批次显示名
    pub fn select_batch(&self, selector: &str) -> ApiResult<Batch> {
        let selector = selector.trim();
        let batches = self.load_batches()?;

        if let Ok(n) = selector.parse::<usize>() {
            if n >= 1 && n <= batches.len() {
                return Ok(batches[n - 1].clone());
            }
        }
        batches
            .into_iter()
            .find(|b| b.key.display_name() == selector)
            .ok_or_else(|| ApiError::BatchNotFound(selector.to_string()))
    }

    /// 批次内全部记录（预览）
    pub fn batch_rows(&self, key: &BatchKey) -> ApiResult<Vec<Record>> {
        Ok(self.find_batch(key)?.rows)
    }

    /// 批次的渲染上下文（预览）
    pub fn preview_context(&self, key: &BatchKey) -> ApiResult<RenderContext> {
        let batch = self.find_batch(key)?;
        let generator = self.build_generator(&self.settings()?);
        generator
            .binder()
            .bind(&batch)
            .map_err(|e| ApiError::for_batch(key, e))
    }

    fn build_generator(&self, settings: &ReportSettings) -> ReportGenerator {
        let binder = ReportBinder::new(&settings.templates_dir, settings.template_ext.as_str())
            .with_list_columns(settings.list_columns.clone());
        ReportGenerator::new(binder, Arc::clone(&self.renderer), &settings.output_dir)
    }

    /// 生成单个批次的报告
    ///
    /// 配置了 open_after_generate 时用系统默认程序打开，打开失败只记录警告。
    #[instrument(skip(self), fields(batch = %key.display_name()))]
    pub fn generate_report(&self, key: &BatchKey) -> ApiResult<PathBuf> {
        let settings = self.settings()?;
        let batch = self.find_batch(key)?;
        let report = self
            .build_generator(&settings)
            .generate(&batch)
            .map_err(|e| ApiError::for_batch(key, e))?;

        if settings.open_after_generate {
            if let Err(e) = open::that_detached(&report.output_path) {
                warn!(
                    path = %report.output_path.display(),
                    error = %e,
                    "无法打开生成的报告"
                );
            }
        }

        info!(path = %report.output_path.display(), "报告已生成");
        Ok(report.output_path)
    }

    /// 批量生成全部批次的报告
    ///
    /// 单个批次失败记录在汇总中，不中断其余批次。
    pub fn generate_all<F>(&self, cancel: &AtomicBool, on_progress: F) -> ApiResult<BulkGenerationSummary>
    where
        F: FnMut(GenerationProgress),
    {
        let settings = self.settings()?;
        let batches = self.load_batches()?;
        Ok(self
            .build_generator(&settings)
            .generate_all(&batches, cancel, on_progress))
    }
}

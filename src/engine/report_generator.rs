// ==========================================
// 绝缘工器具试验报告系统 - 报告生成
// ==========================================
// 单批次流程: Idle → TemplateResolved → ContextBound → Rendered → Saved
// 任一步失败即终止该批次；批量生成时继续处理下一批次
// 取消: 每个批次开始前检查取消标志，批次内部不中断
// ==========================================

use crate::domain::{Batch, BatchKey};
use crate::engine::binder::{save_document, ReportBinder};
use crate::engine::error::{ReportError, ReportResult};
use crate::engine::renderer::TemplateRenderer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ReportStage - 单批次生成阶段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStage {
    Idle,
    TemplateResolved,
    ContextBound,
    Rendered,
    Saved,
}

impl fmt::Display for ReportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportStage::Idle => "未开始",
            ReportStage::TemplateResolved => "模板已定位",
            ReportStage::ContextBound => "数据已绑定",
            ReportStage::Rendered => "已渲染",
            ReportStage::Saved => "已保存",
        };
        write!(f, "{}", s)
    }
}

/// 单个报告的生成结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub key: BatchKey,
    pub output_path: PathBuf,
    pub row_count: usize,
}

/// 批量生成中失败的批次
///
/// `stage` 为失败前已到达的最后阶段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub key: BatchKey,
    pub display_name: String,
    pub stage: ReportStage,
    pub reason: String,
}

/// 进度通知（每个批次开始前发送）
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationProgress {
    /// 1 起始
    pub current: usize,
    pub total: usize,
    pub key: BatchKey,
}

impl fmt::Display for GenerationProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "正在生成第 {}/{} 个报告: {}", self.current, self.total, self.key)
    }
}

/// 批量生成汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGenerationSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<GeneratedReport>,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

impl BulkGenerationSummary {
    fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            total,
            succeeded: 0,
            failed: 0,
            reports: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }
}

// ==========================================
// ReportGenerator - 报告生成器
// ==========================================
pub struct ReportGenerator {
    binder: ReportBinder,
    renderer: Arc<dyn TemplateRenderer>,
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(
        binder: ReportBinder,
        renderer: Arc<dyn TemplateRenderer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binder,
            renderer,
            output_dir: output_dir.into(),
        }
    }

    pub fn binder(&self) -> &ReportBinder {
        &self.binder
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 批次对应的输出文件路径
    pub fn output_path_for(&self, key: &BatchKey) -> PathBuf {
        self.output_dir
            .join(key.report_file_name(self.binder.template_ext()))
    }

    /// 生成单个批次的报告
    pub fn generate(&self, batch: &Batch) -> ReportResult<GeneratedReport> {
        self.run_stages(batch).map_err(|(_, e)| e)
    }

    /// 依次生成所有批次的报告
    ///
    /// 单个批次失败只记录，不影响其余批次。`cancel` 在每个批次开始前检查。
    /// 报告文件名与本次已生成的报告相同的批次记为失败，不覆盖已有报告。
    #[instrument(skip_all, fields(batches = batches.len()))]
    pub fn generate_all<F>(
        &self,
        batches: &[Batch],
        cancel: &AtomicBool,
        mut on_progress: F,
    ) -> BulkGenerationSummary
    where
        F: FnMut(GenerationProgress),
    {
        let mut summary = BulkGenerationSummary::new(batches.len());
        // 本次运行已写出的报告文件 → 批次键；不同批次可能落到同一文件名
        let mut written: HashMap<PathBuf, BatchKey> = HashMap::new();
        info!(run_id = %summary.run_id, total = summary.total, "开始批量生成报告");

        for (idx, batch) in batches.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!(
                    run_id = %summary.run_id,
                    done = idx,
                    total = summary.total,
                    "批量生成已取消"
                );
                summary.cancelled = true;
                break;
            }

            on_progress(GenerationProgress {
                current: idx + 1,
                total: batches.len(),
                key: batch.key.clone(),
            });

            let output_path = self.output_path_for(&batch.key);
            let result = match written.get(&output_path) {
                Some(first) => Err((
                    ReportStage::Idle,
                    ReportError::OutputConflict {
                        path: output_path.clone(),
                        first: first.display_name(),
                        second: batch.key.display_name(),
                    },
                )),
                None => self.run_stages(batch),
            };

            match result {
                Ok(report) => {
                    written.insert(output_path, batch.key.clone());
                    summary.succeeded += 1;
                    summary.reports.push(report);
                }
                Err((stage, e)) => {
                    error!(
                        run_id = %summary.run_id,
                        batch = %batch.key.display_name(),
                        stage = %stage,
                        error = %e,
                        "报告生成失败"
                    );
                    summary.failed += 1;
                    summary.failures.push(BatchFailure {
                        key: batch.key.clone(),
                        display_name: batch.key.display_name(),
                        stage,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "批量生成结束"
        );
        summary
    }

    /// 执行单批次状态机，失败时返回已到达的阶段
    fn run_stages(&self, batch: &Batch) -> Result<GeneratedReport, (ReportStage, ReportError)> {
        let mut stage = ReportStage::Idle;
        let fail = |stage: ReportStage| move |e: ReportError| (stage, e);

        let template_path = self
            .binder
            .resolve_template_for(&batch.key)
            .map_err(fail(stage))?;
        stage = ReportStage::TemplateResolved;

        let context = self.binder.bind(batch).map_err(fail(stage))?;
        stage = ReportStage::ContextBound;

        let document = self
            .binder
            .render(self.renderer.as_ref(), &context, &template_path)
            .map_err(fail(stage))?;
        stage = ReportStage::Rendered;

        let output_path = self.output_path_for(&batch.key);
        save_document(&document, &output_path).map_err(fail(stage))?;

        info!(
            batch = %batch.key.display_name(),
            rows = batch.len(),
            path = %output_path.display(),
            "报告已保存"
        );
        Ok(GeneratedReport {
            key: batch.key.clone(),
            output_path,
            row_count: batch.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{columns, CellValue, Record};
    use crate::engine::binder::RenderContext;
    use crate::engine::error::RenderError;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// 样品名称为 "坏模板" 时渲染失败，其余输出样品名称
    struct FakeRenderer;

    impl TemplateRenderer for FakeRenderer {
        fn render(
            &self,
            _template_path: &Path,
            context: &RenderContext,
        ) -> Result<Vec<u8>, RenderError> {
            match context.get(columns::SAMPLE_NAME).and_then(|v| v.as_str()) {
                Some("坏模板") => Err(RenderError::Engine("boom".to_string())),
                Some(name) => Ok(name.as_bytes().to_vec()),
                None => Err(RenderError::MissingField {
                    field: columns::SAMPLE_NAME.to_string(),
                }),
            }
        }
    }

    fn batch(client: &str, sample: &str) -> Batch {
        batch_on(client, sample, CellValue::text("2024-05-01"))
    }

    fn batch_on(client: &str, sample: &str, receive_date: CellValue) -> Batch {
        let key = BatchKey::new(client, sample, receive_date.clone());
        let row = Record::from([
            (columns::CLIENT, CellValue::text(client)),
            (columns::SAMPLE_NAME, CellValue::text(sample)),
            (columns::RECEIVE_DATE, receive_date),
        ]);
        Batch::new(key, vec![row])
    }

    fn generator(dir: &Path) -> ReportGenerator {
        let templates = dir.join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        for name in ["绝缘手套", "坏模板", "绝缘靴"] {
            std::fs::write(templates.join(format!("{}.docx", name)), b"stub").unwrap();
        }
        ReportGenerator::new(
            ReportBinder::new(templates, "docx"),
            Arc::new(FakeRenderer),
            dir.join("reports"),
        )
    }

    #[test]
    fn test_generate_all_continues_past_failure() {
        let dir = tempdir().unwrap();
        let generator = generator(dir.path());
        let batches = vec![
            batch("甲", "绝缘手套"),
            batch("乙", "坏模板"),
            batch("丙", "绝缘靴"),
        ];

        let seen = Mutex::new(Vec::new());
        let summary = generator.generate_all(&batches, &AtomicBool::new(false), |p| {
            seen.lock().unwrap().push((p.current, p.total));
        });

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.cancelled);
        assert_eq!(summary.failures[0].display_name, "乙_坏模板_2024-05-01");
        assert_eq!(summary.failures[0].stage, ReportStage::ContextBound);
        assert!(summary.failures[0].reason.contains("boom"));
        assert_eq!(seen.into_inner().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);

        let written = std::fs::read(dir.path().join("reports").join("丙_绝缘靴_2024-05-01试验报告.docx"))
            .unwrap();
        assert_eq!(written, "绝缘靴".as_bytes());
    }

    #[test]
    fn test_missing_template_fails_at_idle() {
        let dir = tempdir().unwrap();
        let generator = generator(dir.path());
        let summary = generator.generate_all(
            &[batch("甲", "绝缘杆")],
            &AtomicBool::new(false),
            |_| {},
        );
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].stage, ReportStage::Idle);
    }

    #[test]
    fn test_cancel_before_first_batch() {
        let dir = tempdir().unwrap();
        let generator = generator(dir.path());
        let summary = generator.generate_all(
            &[batch("甲", "绝缘手套")],
            &AtomicBool::new(true),
            |_| panic!("no progress expected"),
        );
        assert!(summary.cancelled);
        assert_eq!(summary.succeeded + summary.failed, 0);
        assert!(!dir.path().join("reports").exists());
    }

    #[test]
    fn test_generate_single() {
        let dir = tempdir().unwrap();
        let generator = generator(dir.path());
        let report = generator.generate(&batch("甲", "绝缘手套")).unwrap();
        assert_eq!(report.row_count, 1);
        assert_eq!(
            report.output_path,
            generator.output_path_for(&BatchKey::new("甲", "绝缘手套", "2024-05-01"))
        );
        assert!(report.output_path.exists());

        let err = generator.generate(&batch("甲", "坏模板")).unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
    }

    #[test]
    fn test_same_file_name_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let generator = generator(dir.path());
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let batches = vec![
            batch_on("甲", "绝缘手套", CellValue::text("2024-05-01")),
            batch_on("甲", "绝缘手套", CellValue::Date(date)),
            batch("A/B", "绝缘靴"),
            batch("A_B", "绝缘靴"),
        ];

        let summary = generator.generate_all(&batches, &AtomicBool::new(false), |_| {});
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded + summary.failed, summary.total);

        let conflict = &summary.failures[0];
        assert_eq!(conflict.key, batches[1].key);
        assert_eq!(conflict.stage, ReportStage::Idle);
        assert!(conflict.reason.contains("甲_绝缘手套_2024-05-01试验报告.docx"));
        assert_eq!(summary.failures[1].key, batches[3].key);
        assert!(summary.failures[1].reason.contains("A/B_绝缘靴_2024-05-01"));
        assert!(summary.failures[1].reason.contains("A_B_绝缘靴_2024-05-01"));

        let reports: Vec<&BatchKey> = summary.reports.iter().map(|r| &r.key).collect();
        assert_eq!(reports, vec![&batches[0].key, &batches[2].key]);
    }

    #[test]
    fn test_unwritable_output_fails_at_rendered() {
        let dir = tempdir().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("绝缘手套.docx"), b"stub").unwrap();
        // 输出目录的上级是普通文件
        let blocker = dir.path().join("file.txt");
        std::fs::write(&blocker, b"x").unwrap();
        let generator = ReportGenerator::new(
            ReportBinder::new(templates, "docx"),
            Arc::new(FakeRenderer),
            blocker.join("reports"),
        );

        let err = generator.generate(&batch("甲", "绝缘手套")).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));

        let summary = generator.generate_all(
            &[batch("甲", "绝缘手套")],
            &AtomicBool::new(false),
            |_| {},
        );
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].stage, ReportStage::Rendered);
    }
}

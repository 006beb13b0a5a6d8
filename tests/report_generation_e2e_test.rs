// ==========================================
// 报告生成端到端测试
// ==========================================
// 测试目标: CSV 导入 → 批次划分 → docx 模板渲染 → 报告落盘
// ==========================================


use insulating_tool_report::api::ApiError;
use insulating_tool_report::app::AppState;
use insulating_tool_report::config::config_keys;
use insulating_tool_report::domain::BatchKey;
use insulating_tool_report::engine::ReportStage;
use insulating_tool_report::logging;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tempfile::{tempdir, TempDir};

/// 导入样例 CSV，并把模板/输出目录指向临时目录
fn setup(dir: &TempDir) -> AppState {
    logging::init_test();
    let db_path = dir.path().join("test.db").to_string_lossy().to_string();
    let state = AppState::new(db_path).unwrap();

    let csv_path = dir.path().join("tools.csv");
    test_helpers::write_file(&csv_path, test_helpers::SAMPLE_CSV);
    state.tool_api.import_file(&csv_path).unwrap();

    let templates = dir.path().join("templates");
    test_helpers::write_docx_template(
        &templates.join("绝缘手套.docx"),
        test_helpers::REPORT_TEMPLATE_XML,
    );

    state
        .config
        .set_value(config_keys::TEMPLATES_DIR, templates.to_str().unwrap())
        .unwrap();
    state
        .config
        .set_value(
            config_keys::OUTPUT_DIR,
            dir.path().join("reports").to_str().unwrap(),
        )
        .unwrap();
    state
        .config
        .set_value(config_keys::OPEN_AFTER_GENERATE, "false")
        .unwrap();
    state
}

fn report_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join("reports").join(format!("{}试验报告.docx", name))
}

#[test]
fn test_generate_all_renders_rows_and_records_failures() {
    let dir = tempdir().unwrap();
    let state = setup(&dir);

    let mut progress = Vec::new();
    let summary = state
        .report_api
        .generate_all(&AtomicBool::new(false), |p| {
            progress.push(p.to_string())
        })
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(progress.len(), 2);
    assert!(progress[0].starts_with("正在生成第 1/2 个报告"));

    let failure = &summary.failures[0];
    assert_eq!(failure.display_name, "乙检修公司_绝缘靴_2024-05-02");
    assert_eq!(failure.stage, ReportStage::Idle);
    assert!(failure.reason.contains("绝缘靴.docx"));

    let output = report_path(dir.path(), "甲供电公司_绝缘手套_2024-05-01");
    assert_eq!(summary.reports[0].output_path, output);

    let document = test_helpers::read_docx_part(&output, "word/document.xml");
    assert!(document.contains("委托单位: 甲供电公司"));
    assert!(document.contains("<w:t>S1</w:t>"));
    assert!(document.contains("<w:t>S2</w:t>"));
    assert!(document.contains("<w:t>1.3, 1.4</w:t>"));
    assert_eq!(document.matches("<w:tr>").count(), 3);
    assert!(!document.contains("{{"));
}

#[test]
fn test_generate_single_report() {
    let dir = tempdir().unwrap();
    let state = setup(&dir);

    let key = BatchKey::new("甲供电公司", "绝缘手套", "2024-05-01");
    let path = state.report_api.generate_report(&key).unwrap();
    assert_eq!(
        path,
        report_path(dir.path(), "甲供电公司_绝缘手套_2024-05-01")
    );
    assert!(path.exists());

    let missing = BatchKey::new("丙", "绝缘手套", "2024-05-01");
    assert!(matches!(
        state.report_api.generate_report(&missing),
        Err(ApiError::BatchNotFound(_))
    ));
}

#[test]
fn test_template_with_unknown_field_fails_at_render() {
    let dir = tempdir().unwrap();
    let state = setup(&dir);
    test_helpers::write_docx_template(
        &dir.path().join("templates").join("绝缘靴.docx"),
        "<w:document>{{ 不存在的字段 }}</w:document>",
    );

    let summary = state
        .report_api
        .generate_all(&AtomicBool::new(false), |_| {})
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, ReportStage::ContextBound);
    assert!(summary.failures[0].reason.contains("不存在的字段"));
}

#[test]
fn test_cancelled_run_produces_nothing() {
    let dir = tempdir().unwrap();
    let state = setup(&dir);

    let summary = state
        .report_api
        .generate_all(&AtomicBool::new(true), |_| {})
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.succeeded, 0);
    assert!(!dir.path().join("reports").exists());
}

#[test]
fn test_uncommitted_edits_do_not_affect_batches() {
    let dir = tempdir().unwrap();
    let state = setup(&dir);

    let row = state.tool_api.add_row().unwrap();
    state
        .tool_api
        .update_cell(row, "委托单位", "丁公司".into())
        .unwrap();
    assert_eq!(state.report_api.list_batches().unwrap().len(), 2);

    state.tool_api.save_changes().unwrap();
    // 新行的样品名称与接收日期为空，单独成一个批次
    assert_eq!(state.report_api.list_batches().unwrap().len(), 3);
}

// ==========================================
// 绝缘工器具试验报告系统 - 视图刷新
// ==========================================
// 宿主在数据变更或切换视图后调用 refresh_all，
// 各视图重新读取已提交数据；单个视图失败不影响其他视图
// ==========================================

use std::sync::Arc;
use tracing::{debug, warn};

/// 可刷新的视图
pub trait Refreshable: Send + Sync {
    /// 视图名称（用于日志）
    fn name(&self) -> &str;

    fn refresh(&self) -> Result<(), String>;
}

/// 一次刷新的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// 视图注册表
#[derive(Default)]
pub struct RefreshRegistry {
    views: Vec<Arc<dyn Refreshable>>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, view: Arc<dyn Refreshable>) {
        self.views.push(view);
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// 按注册顺序刷新全部视图
    pub fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for view in &self.views {
            match view.refresh() {
                Ok(()) => {
                    debug!(view = view.name(), "视图已刷新");
                    report.refreshed += 1;
                }
                Err(e) => {
                    warn!(view = view.name(), error = %e, "视图刷新失败");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

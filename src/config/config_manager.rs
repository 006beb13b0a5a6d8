// ==========================================
// 绝缘工器具试验报告系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)，与数据表同一数据库文件
// ==========================================

use crate::engine::ListColumns;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// 全局作用域
const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ReportSettings - 报告生成配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub templates_dir: PathBuf,
    pub output_dir: PathBuf,
    /// 不带点
    pub template_ext: String,
    pub list_columns: ListColumns,
    /// 单个报告生成后是否用系统默认程序打开
    pub open_after_generate: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from(defaults::TEMPLATES_DIR),
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            template_ext: defaults::TEMPLATE_EXT.to_string(),
            list_columns: ListColumns::All,
            open_after_generate: true,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// config_kv 表不存在时自动创建。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            conn_guard.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS config_kv (
                    scope_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (scope_id, key)
                );
                "#,
            )?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置（存在则覆盖）
    pub fn set_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let key = key.trim();
        if key.is_empty() {
            return Err("配置键不能为空".into());
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        debug!(config_key = key, "配置已更新");
        Ok(())
    }

    /// 列出所有全局配置（按键排序）
    pub fn list_values(&self) -> Result<Vec<(String, String)>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }

    // ===== 报告生成配置 =====

    /// 读取报告生成配置
    ///
    /// 格式错误的配置项回退为默认值并记录警告。
    pub fn load_report_settings(&self) -> Result<ReportSettings, Box<dyn Error>> {
        let templates_dir =
            self.get_config_or_default(config_keys::TEMPLATES_DIR, defaults::TEMPLATES_DIR)?;
        let output_dir =
            self.get_config_or_default(config_keys::OUTPUT_DIR, defaults::OUTPUT_DIR)?;

        let raw_ext =
            self.get_config_or_default(config_keys::TEMPLATE_EXT, defaults::TEMPLATE_EXT)?;
        let template_ext = match raw_ext.trim().trim_start_matches('.') {
            "" => {
                warn!(
                    config_key = config_keys::TEMPLATE_EXT,
                    raw_value = %raw_ext,
                    "模板扩展名为空，使用默认值"
                );
                defaults::TEMPLATE_EXT.to_string()
            }
            ext => ext.to_string(),
        };

        let raw_columns =
            self.get_config_or_default(config_keys::LIST_COLUMNS, defaults::LIST_COLUMNS)?;
        let list_columns = serde_json::from_str::<Vec<String>>(&raw_columns)
            .map(ListColumns::from_names)
            .unwrap_or_else(|_| {
                warn!(
                    config_key = config_keys::LIST_COLUMNS,
                    raw_value = %raw_columns,
                    "列表解析列配置格式错误，使用全部列"
                );
                ListColumns::All
            });

        let raw_open = self.get_config_or_default(
            config_keys::OPEN_AFTER_GENERATE,
            defaults::OPEN_AFTER_GENERATE,
        )?;
        let open_after_generate = parse_bool(&raw_open).unwrap_or_else(|| {
            warn!(
                config_key = config_keys::OPEN_AFTER_GENERATE,
                raw_value = %raw_open,
                "布尔配置格式错误，使用默认值"
            );
            true
        });

        Ok(ReportSettings {
            templates_dir: PathBuf::from(templates_dir),
            output_dir: PathBuf::from(output_dir),
            template_ext,
            list_columns,
            open_after_generate,
        })
    }
}

/// 解析布尔配置值
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 模板与输出
    pub const TEMPLATES_DIR: &str = "report.templates_dir";
    pub const OUTPUT_DIR: &str = "report.output_dir";
    pub const TEMPLATE_EXT: &str = "report.template_ext";

    // 列表字面量解析列 (JSON 数组，空数组 = 全部列)
    pub const LIST_COLUMNS: &str = "report.list_columns";

    pub const OPEN_AFTER_GENERATE: &str = "report.open_after_generate";

    pub const ALL: [&str; 5] = [
        TEMPLATES_DIR,
        OUTPUT_DIR,
        TEMPLATE_EXT,
        LIST_COLUMNS,
        OPEN_AFTER_GENERATE,
    ];
}

mod defaults {
    pub const TEMPLATES_DIR: &str = "./templates";
    pub const OUTPUT_DIR: &str = "./reports";
    pub const TEMPLATE_EXT: &str = "docx";
    pub const LIST_COLUMNS: &str = "[]";
    pub const OPEN_AFTER_GENERATE: &str = "true";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> ConfigManager {
        let conn = crate::db::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let manager = setup_manager();
        let settings = manager.load_report_settings().unwrap();
        assert_eq!(settings, ReportSettings::default());
        assert!(manager.list_values().unwrap().is_empty());
    }

    #[test]
    fn test_overrides() {
        let manager = setup_manager();
        manager.set_value(config_keys::TEMPLATES_DIR, "/srv/模板").unwrap();
        manager.set_value(config_keys::TEMPLATE_EXT, ".docx").unwrap();
        manager
            .set_value(config_keys::LIST_COLUMNS, r#"["泄漏电流"]"#)
            .unwrap();
        manager
            .set_value(config_keys::OPEN_AFTER_GENERATE, "false")
            .unwrap();

        let settings = manager.load_report_settings().unwrap();
        assert_eq!(settings.templates_dir, PathBuf::from("/srv/模板"));
        assert_eq!(settings.template_ext, "docx");
        assert_eq!(
            settings.list_columns,
            ListColumns::Only(vec!["泄漏电流".to_string()])
        );
        assert!(!settings.open_after_generate);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let manager = setup_manager();
        manager.set_value(config_keys::LIST_COLUMNS, "not json").unwrap();
        manager
            .set_value(config_keys::OPEN_AFTER_GENERATE, "maybe")
            .unwrap();

        let settings = manager.load_report_settings().unwrap();
        assert_eq!(settings.list_columns, ListColumns::All);
        assert!(settings.open_after_generate);
    }

    #[test]
    fn test_set_value_upserts() {
        let manager = setup_manager();
        manager.set_value(config_keys::OUTPUT_DIR, "a").unwrap();
        manager.set_value(config_keys::OUTPUT_DIR, "b").unwrap();
        assert_eq!(
            manager.list_values().unwrap(),
            vec![(config_keys::OUTPUT_DIR.to_string(), "b".to_string())]
        );
        assert!(manager.set_value("  ", "x").is_err());
    }
}

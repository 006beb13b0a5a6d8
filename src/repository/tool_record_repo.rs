// ==========================================
// 绝缘工器具试验报告系统 - 试验记录仓储
// ==========================================
// 职责: tools 表的整表替换导入、全表读取、行级增删改
// 约束: 行级修改先进入待提交变更集，commit 时在单个事务中落库
// 红线: Repository 不含业务逻辑（批次划分在 engine 层）
// ==========================================

use crate::db::{open_sqlite_connection, quote_ident, table_exists};
use crate::domain::{columns, CellValue, Record, ToolTable, DATE_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// 默认数据表名
pub const DEFAULT_TABLE_NAME: &str = "tools";

/// 全部非空值均为日期的列以此类型声明，读取时据此还原日期
const DATE_DECL_TYPE: &str = "DATE";

// ==========================================
// RowRef - 行引用
// ==========================================
/// 网格中的一行：已落库的行（内部行号）或尚未提交的新增行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowRef {
    Stored(i64),
    Pending(u64),
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Stored(id) => write!(f, "#{}", id),
            RowRef::Pending(id) => write!(f, "new#{}", id),
        }
    }
}

/// 待提交视图中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub row_ref: RowRef,
    pub record: Record,
}

/// commit 结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl CommitSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

// ==========================================
// PendingChanges - 待提交变更集
// ==========================================
#[derive(Debug, Default)]
struct PendingChanges {
    inserts: Vec<(u64, Record)>,
    /// 只记录被修改的单元格
    updates: BTreeMap<i64, Record>,
    deletes: BTreeSet<i64>,
    next_pending_id: u64,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    fn clear(&mut self) {
        self.inserts.clear();
        self.updates.clear();
        self.deletes.clear();
    }
}

/// 表结构中的一列
#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    is_date: bool,
}

// ==========================================
// ToolRecordRepository - 试验记录仓储
// ==========================================
/// 试验记录仓储
///
/// 表结构由导入文件决定（动态列），内部以 `__row_id` 自增列标识行并保证读取顺序。
/// 待提交变更集由仓储独占，批次划分与报告绑定只能通过 `read_all` 看到已提交数据。
pub struct ToolRecordRepository {
    conn: Arc<Mutex<Connection>>,
    table: String,
    pending: Mutex<PendingChanges>,
}

impl ToolRecordRepository {
    /// 创建新的 ToolRecordRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            table: DEFAULT_TABLE_NAME.to_string(),
            pending: Mutex::new(PendingChanges::default()),
        }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 获取待提交变更集（加锁顺序: 先连接后变更集）
    fn get_pending(&self) -> RepositoryResult<MutexGuard<'_, PendingChanges>> {
        self.pending
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn table_not_found(&self) -> RepositoryError {
        RepositoryError::TableNotFound {
            table: self.table.clone(),
        }
    }

    /// 数据表是否存在（与连接是否打开无关）
    pub fn exists(&self) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        Ok(table_exists(&conn, &self.table)?)
    }

    // ==========================================
    // 整表替换导入
    // ==========================================

    /// 用给定数据整表替换
    ///
    /// 表不存在则按数据列建表；已存在则连同旧表结构与数据一并丢弃。
    /// 在单个事务中完成，失败时原表保持不变。待提交变更集随之清空。
    ///
    /// # 返回
    /// - Ok(usize): 写入行数
    #[instrument(skip(self, data), fields(table = %self.table, rows = data.row_count()))]
    pub fn load_replace(&self, data: &ToolTable) -> RepositoryResult<usize> {
        validate_columns(&data.columns)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let table_ident = quote_ident(&self.table);
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", table_ident))?;

        let column_defs: Vec<String> = data
            .columns
            .iter()
            .map(|c| {
                if is_date_column(data, c) {
                    format!("{} {}", quote_ident(c), DATE_DECL_TYPE)
                } else {
                    quote_ident(c)
                }
            })
            .collect();
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({} INTEGER PRIMARY KEY AUTOINCREMENT, {})",
            table_ident,
            quote_ident(columns::ROW_ID),
            column_defs.join(", ")
        ))?;

        let insert_sql = insert_statement(&self.table, &data.columns);
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for record in &data.rows {
                let values = data
                    .columns
                    .iter()
                    .map(|c| to_sql_value(record.get(c).unwrap_or(&CellValue::Empty)));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        drop(conn);

        self.get_pending()?.clear();

        info!(
            columns = data.columns.len(),
            rows = data.row_count(),
            "数据表已整表替换"
        );
        Ok(data.row_count())
    }

    // ==========================================
    // 读取
    // ==========================================

    /// 读取全部已提交数据（按插入顺序）
    ///
    /// 表不存在返回 `TableNotFound`；表存在但为空返回空 rows。
    pub fn read_all(&self) -> RepositoryResult<ToolTable> {
        let conn = self.get_conn()?;
        let (cols, rows) = self.load_committed(&conn)?;
        Ok(ToolTable::new(
            cols.into_iter().map(|c| c.name).collect(),
            rows.into_iter().map(|(_, r)| r).collect(),
        ))
    }

    /// 读取待提交视图：已提交数据叠加待提交的修改/删除/新增
    pub fn read_view(&self) -> RepositoryResult<Vec<ViewRow>> {
        let conn = self.get_conn()?;
        let (_, rows) = self.load_committed(&conn)?;
        let pending = self.get_pending()?;

        let mut view = Vec::with_capacity(rows.len() + pending.inserts.len());
        for (row_id, mut record) in rows {
            if pending.deletes.contains(&row_id) {
                continue;
            }
            if let Some(changes) = pending.updates.get(&row_id) {
                for (column, value) in changes.iter() {
                    record.insert(column.clone(), value.clone());
                }
            }
            view.push(ViewRow {
                row_ref: RowRef::Stored(row_id),
                record,
            });
        }
        for (pending_id, record) in &pending.inserts {
            view.push(ViewRow {
                row_ref: RowRef::Pending(*pending_id),
                record: record.clone(),
            });
        }
        Ok(view)
    }

    /// 列名列表（表头顺序）
    pub fn column_names(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        Ok(self
            .load_columns(&conn)?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    fn load_columns(&self, conn: &Connection) -> RepositoryResult<Vec<ColumnInfo>> {
        if !table_exists(conn, &self.table)? {
            return Err(self.table_not_found());
        }

        let mut stmt =
            conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = stmt.query_map([&self.table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut cols = Vec::new();
        for row in rows {
            let (name, decl_type) = row?;
            if name == columns::ROW_ID {
                continue;
            }
            cols.push(ColumnInfo {
                name,
                is_date: decl_type.eq_ignore_ascii_case(DATE_DECL_TYPE),
            });
        }
        Ok(cols)
    }

    fn load_committed(
        &self,
        conn: &Connection,
    ) -> RepositoryResult<(Vec<ColumnInfo>, Vec<(i64, Record)>)> {
        let cols = self.load_columns(conn)?;

        let mut select_cols = vec![quote_ident(columns::ROW_ID)];
        select_cols.extend(cols.iter().map(|c| quote_ident(&c.name)));
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_cols.join(", "),
            quote_ident(&self.table),
            quote_ident(columns::ROW_ID)
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut query = stmt.query([])?;
        let mut rows = Vec::new();
        while let Some(row) = query.next()? {
            let row_id: i64 = row.get(0)?;
            let mut record = Record::new();
            for (idx, col) in cols.iter().enumerate() {
                let value = from_sql_value(row.get_ref(idx + 1)?, col.is_date);
                record.insert(col.name.clone(), value);
            }
            rows.push((row_id, record));
        }

        debug!(table = %self.table, rows = rows.len(), "已读取数据表");
        Ok((cols, rows))
    }

    fn stored_row_exists(&self, conn: &Connection, row_id: i64) -> RepositoryResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            quote_ident(&self.table),
            quote_ident(columns::ROW_ID)
        );
        Ok(conn
            .query_row(&sql, [row_id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn row_not_found(&self, row_ref: RowRef) -> RepositoryError {
        RepositoryError::NotFound {
            entity: self.table.clone(),
            id: row_ref.to_string(),
        }
    }

    // ==========================================
    // 行级修改（进入待提交变更集）
    // ==========================================

    /// 追加一行空记录
    pub fn insert_blank_row(&self) -> RepositoryResult<RowRef> {
        let conn = self.get_conn()?;
        let cols = self.load_columns(&conn)?;
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();

        let mut pending = self.get_pending()?;
        pending.next_pending_id += 1;
        let id = pending.next_pending_id;
        pending.inserts.push((id, Record::blank(&names)));

        debug!(row = %RowRef::Pending(id), "新增空行（待提交）");
        Ok(RowRef::Pending(id))
    }

    /// 修改一个单元格
    pub fn update_cell(&self, row_ref: RowRef, column: &str, value: CellValue) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let cols = self.load_columns(&conn)?;
        if !cols.iter().any(|c| c.name == column) {
            return Err(RepositoryError::UnknownColumn(column.to_string()));
        }

        match row_ref {
            RowRef::Pending(id) => {
                let mut pending = self.get_pending()?;
                let record = pending
                    .inserts
                    .iter_mut()
                    .find(|(pid, _)| *pid == id)
                    .map(|(_, r)| r)
                    .ok_or_else(|| self.row_not_found(row_ref))?;
                record.insert(column, value);
            }
            RowRef::Stored(id) => {
                let exists = self.stored_row_exists(&conn, id)?;
                let mut pending = self.get_pending()?;
                if !exists || pending.deletes.contains(&id) {
                    return Err(self.row_not_found(row_ref));
                }
                pending.updates.entry(id).or_default().insert(column, value);
            }
        }

        debug!(row = %row_ref, column = column, "单元格已修改（待提交）");
        Ok(())
    }

    /// 删除一行
    ///
    /// 未指定行返回 `NoSelection`；删除尚未提交的新增行直接从变更集移除。
    pub fn delete_row(&self, row_ref: Option<RowRef>) -> RepositoryResult<()> {
        let row_ref = row_ref.ok_or(RepositoryError::NoSelection)?;
        let conn = self.get_conn()?;

        match row_ref {
            RowRef::Pending(id) => {
                let mut pending = self.get_pending()?;
                let before = pending.inserts.len();
                pending.inserts.retain(|(pid, _)| *pid != id);
                if pending.inserts.len() == before {
                    return Err(self.row_not_found(row_ref));
                }
            }
            RowRef::Stored(id) => {
                let exists = self.stored_row_exists(&conn, id)?;
                let mut pending = self.get_pending()?;
                if !exists || pending.deletes.contains(&id) {
                    return Err(self.row_not_found(row_ref));
                }
                pending.updates.remove(&id);
                pending.deletes.insert(id);
            }
        }

        debug!(row = %row_ref, "行已标记删除（待提交）");
        Ok(())
    }

    /// 是否存在待提交变更
    pub fn has_pending(&self) -> RepositoryResult<bool> {
        Ok(!self.get_pending()?.is_empty())
    }

    // ==========================================
    // 提交 / 撤销
    // ==========================================

    /// 提交全部待提交变更
    ///
    /// 删除、修改、新增在同一个事务中执行，任一失败则整体回滚，
    /// 变更集保持不变以便重试或撤销。
    #[instrument(skip(self), fields(table = %self.table))]
    pub fn commit(&self) -> RepositoryResult<CommitSummary> {
        let mut conn = self.get_conn()?;
        let mut pending = self.get_pending()?;

        if pending.is_empty() {
            debug!("无待提交变更");
            return Ok(CommitSummary::default());
        }

        let cols = self.load_columns(&conn)?;
        let col_names: Vec<String> = cols.into_iter().map(|c| c.name).collect();
        let table_ident = quote_ident(&self.table);
        let row_id_ident = quote_ident(columns::ROW_ID);

        let result = (|| -> RepositoryResult<CommitSummary> {
            let tx = conn.transaction()?;
            let mut summary = CommitSummary::default();

            for row_id in &pending.deletes {
                let affected = tx.execute(
                    &format!("DELETE FROM {} WHERE {} = ?1", table_ident, row_id_ident),
                    [row_id],
                )?;
                if affected == 0 {
                    return Err(self.row_not_found(RowRef::Stored(*row_id)));
                }
                summary.deleted += 1;
            }

            for (row_id, changes) in &pending.updates {
                let assignments: Vec<String> = changes
                    .columns()
                    .enumerate()
                    .map(|(idx, c)| format!("{} = ?{}", quote_ident(c), idx + 1))
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?{}",
                    table_ident,
                    assignments.join(", "),
                    row_id_ident,
                    changes.len() + 1
                );
                let mut values: Vec<Value> = changes.iter().map(|(_, v)| to_sql_value(v)).collect();
                values.push(Value::Integer(*row_id));
                let affected = tx.execute(&sql, params_from_iter(values))?;
                if affected == 0 {
                    return Err(self.row_not_found(RowRef::Stored(*row_id)));
                }
                summary.updated += 1;
            }

            if !pending.inserts.is_empty() {
                let mut stmt = tx.prepare(&insert_statement(&self.table, &col_names))?;
                for (_, record) in &pending.inserts {
                    let values = col_names
                        .iter()
                        .map(|c| to_sql_value(record.get(c).unwrap_or(&CellValue::Empty)));
                    stmt.execute(params_from_iter(values))?;
                    summary.inserted += 1;
                }
            }

            tx.commit()?;
            Ok(summary)
        })();

        match result {
            Ok(summary) => {
                pending.clear();
                info!(
                    inserted = summary.inserted,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "变更已提交"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "提交失败，事务已回滚，待提交变更保留");
                Err(match e {
                    RepositoryError::DatabaseQueryError(msg) => {
                        RepositoryError::DatabaseTransactionError(msg)
                    }
                    other => other,
                })
            }
        }
    }

    /// 丢弃全部待提交变更，恢复到最近一次提交的状态
    pub fn discard_pending(&self) -> RepositoryResult<()> {
        let mut pending = self.get_pending()?;
        let had_changes = !pending.is_empty();
        pending.clear();
        if had_changes {
            info!(table = %self.table, "待提交变更已撤销");
        }
        Ok(())
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn validate_columns(cols: &[String]) -> RepositoryResult<()> {
    if cols.is_empty() {
        return Err(RepositoryError::ValidationError("导入数据没有任何列".to_string()));
    }
    let mut seen = HashSet::new();
    for c in cols {
        if c == columns::ROW_ID {
            return Err(RepositoryError::ValidationError(format!("列名为保留名: {}", c)));
        }
        if !seen.insert(c.as_str()) {
            return Err(RepositoryError::ValidationError(format!("列名重复: {}", c)));
        }
    }
    Ok(())
}

/// 全部非空值均为日期（且至少一个）的列声明为 DATE
fn is_date_column(data: &ToolTable, column: &str) -> bool {
    let mut saw_date = false;
    for record in &data.rows {
        match record.get(column) {
            None | Some(CellValue::Empty) => {}
            Some(CellValue::Date(_)) => saw_date = true,
            Some(_) => return false,
        }
    }
    saw_date
}

fn insert_statement(table: &str, cols: &[String]) -> String {
    let names: Vec<String> = cols.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

fn to_sql_value(value: &CellValue) -> Value {
    match value {
        CellValue::Empty => Value::Null,
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Number(n) => Value::Real(*n),
        CellValue::Date(d) => Value::Text(d.format(DATE_FORMAT).to_string()),
        CellValue::List(_) => Value::Text(value.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>, is_date_column: bool) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Empty,
        ValueRef::Integer(i) => CellValue::Number(i as f64),
        ValueRef::Real(f) => CellValue::Number(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if is_date_column {
                if let Ok(d) = NaiveDate::parse_from_str(&text, DATE_FORMAT) {
                    return CellValue::Date(d);
                }
            }
            CellValue::Text(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn repo() -> ToolRecordRepository {
        let conn = open_in_memory().unwrap();
        ToolRecordRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn date(y: i32, m: u32, d: u32) -> CellValue {
        CellValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn sample() -> ToolTable {
        ToolTable::new(
            vec![
                "委托单位".to_string(),
                "样品名称".to_string(),
                "接收日期".to_string(),
                "泄漏电流".to_string(),
            ],
            vec![
                Record::from([
                    ("委托单位", CellValue::text("甲公司")),
                    ("样品名称", CellValue::text("绝缘手套")),
                    ("接收日期", date(2024, 5, 1)),
                    ("泄漏电流", CellValue::Number(1.25)),
                ]),
                Record::from([
                    ("委托单位", CellValue::text("乙公司")),
                    ("样品名称", CellValue::text("绝缘靴")),
                    ("接收日期", CellValue::Empty),
                    ("泄漏电流", CellValue::text("[1.1, 1.2]")),
                ]),
            ],
        )
    }

    #[test]
    fn test_absent_table() {
        let repo = repo();
        assert!(!repo.exists().unwrap());
        assert!(matches!(
            repo.read_all(),
            Err(RepositoryError::TableNotFound { .. })
        ));
        assert!(matches!(
            repo.insert_blank_row(),
            Err(RepositoryError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_load_replace_round_trip_preserves_order() {
        let repo = repo();
        assert_eq!(repo.load_replace(&sample()).unwrap(), 2);
        assert!(repo.exists().unwrap());

        let table = repo.read_all().unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn test_load_replace_discards_previous_schema() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();

        let other = ToolTable::new(
            vec!["编号".to_string()],
            vec![Record::from([("编号", CellValue::text("X1"))])],
        );
        repo.load_replace(&other).unwrap();
        assert_eq!(repo.read_all().unwrap(), other);
    }

    #[test]
    fn test_empty_table_reads_empty() {
        let repo = repo();
        let empty = ToolTable::new(vec!["委托单位".to_string()], vec![]);
        repo.load_replace(&empty).unwrap();
        let table = repo.read_all().unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.columns, vec!["委托单位"]);
    }

    #[test]
    fn test_load_replace_rejects_duplicate_columns() {
        let repo = repo();
        let bad = ToolTable::new(vec!["a".to_string(), "a".to_string()], vec![]);
        assert!(matches!(
            repo.load_replace(&bad),
            Err(RepositoryError::ValidationError(_))
        ));
        assert!(!repo.exists().unwrap());
    }

    #[test]
    fn test_pending_insert_visible_in_view_only() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();

        let row_ref = repo.insert_blank_row().unwrap();
        assert!(repo.has_pending().unwrap());

        let view = repo.read_view().unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view[2].row_ref, row_ref);
        assert!(view[2].record.is_blank());

        // 已提交视图不受影响
        assert_eq!(repo.read_all().unwrap().rows.len(), 2);
    }

    #[test]
    fn test_commit_applies_all_changes() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();
        let view = repo.read_view().unwrap();
        let first = view[0].row_ref;
        let second = view[1].row_ref;

        let new_row = repo.insert_blank_row().unwrap();
        repo.update_cell(new_row, "委托单位", CellValue::text("丙公司")).unwrap();
        repo.update_cell(first, "泄漏电流", CellValue::Number(2.0)).unwrap();
        repo.delete_row(Some(second)).unwrap();

        let summary = repo.commit().unwrap();
        assert_eq!(
            summary,
            CommitSummary {
                inserted: 1,
                updated: 1,
                deleted: 1
            }
        );
        assert!(!repo.has_pending().unwrap());

        let table = repo.read_all().unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("泄漏电流"), Some(&CellValue::Number(2.0)));
        assert_eq!(table.rows[1].get("委托单位"), Some(&CellValue::text("丙公司")));
        assert_eq!(table.rows[1].get("接收日期"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_discard_restores_committed_view() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();
        let first = repo.read_view().unwrap()[0].row_ref;

        repo.insert_blank_row().unwrap();
        repo.delete_row(Some(first)).unwrap();
        repo.discard_pending().unwrap();

        let view = repo.read_view().unwrap();
        let committed = repo.read_all().unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(
            view.into_iter().map(|r| r.record).collect::<Vec<_>>(),
            committed.rows
        );
    }

    #[test]
    fn test_delete_without_selection() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();
        assert!(matches!(
            repo.delete_row(None),
            Err(RepositoryError::NoSelection)
        ));
    }

    #[test]
    fn test_delete_pending_insert_drops_it() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();
        let row_ref = repo.insert_blank_row().unwrap();
        repo.delete_row(Some(row_ref)).unwrap();
        assert!(!repo.has_pending().unwrap());
        assert!(matches!(
            repo.delete_row(Some(row_ref)),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_unknown_column() {
        let repo = repo();
        repo.load_replace(&sample()).unwrap();
        let first = repo.read_view().unwrap()[0].row_ref;
        assert!(matches!(
            repo.update_cell(first, "不存在的列", CellValue::Empty),
            Err(RepositoryError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_commit_failure_rolls_back_and_keeps_pending() {
        let conn = Arc::new(Mutex::new(open_in_memory().unwrap()));
        let repo = ToolRecordRepository::from_connection(conn.clone());
        repo.load_replace(&sample()).unwrap();

        let first = repo.read_view().unwrap()[0].row_ref;
        repo.update_cell(first, "委托单位", CellValue::text("已修改")).unwrap();
        repo.insert_blank_row().unwrap();

        // 插入触发器使新增行失败，修改需随之回滚
        conn.lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_insert BEFORE INSERT ON tools \
                 BEGIN SELECT RAISE(ABORT, 'insert rejected'); END;",
            )
            .unwrap();

        assert!(repo.commit().is_err());
        assert!(repo.has_pending().unwrap());

        let committed = repo.read_all().unwrap();
        assert_eq!(committed, sample());
    }
}

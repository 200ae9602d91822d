//! Query results and their formatting.

use crate::database::types::{is_money_column, sql_type_name, SqlValue};
use crate::error::ServerError;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::time::Instant;
use tiberius::{QueryItem, QueryStream};

/// Information about a result column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    /// Column name (unique within the result).
    pub name: String,

    /// SQL type name.
    pub sql_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

/// A single row of query results, values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub values: Vec<SqlValue>,
}

impl ResultRow {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }
}

/// Result of a query execution.
///
/// Serializes as `{columns, rows, row_count, truncated, execution_time_ms}`
/// where each row is an object keyed by column name in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Columns in order.
    pub columns: Vec<ColumnInfo>,

    /// Result rows.
    pub rows: Vec<ResultRow>,

    /// Whether results were truncated due to row limit.
    pub truncated: bool,

    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty query result.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            truncated: false,
            execution_time_ms: 0,
        }
    }

    /// Build a result from raw column names and rows.
    ///
    /// Column names are normalized: blank names become `column_N` and
    /// repeated names get `_2`, `_3` suffixes.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<ResultRow>) -> Self {
        Self {
            columns: normalize_columns(columns),
            rows,
            truncated: false,
            execution_time_ms: 0,
        }
    }

    /// Number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Drop rows past `max_rows`, marking the result as truncated.
    pub fn limit_rows(&mut self, max_rows: usize) {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
    }

    /// Iterate rows as name-addressable records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record {
            columns: &self.columns,
            values: &row.values,
        })
    }

    /// Format the result as a markdown table.
    pub fn to_markdown_table(&self) -> String {
        if self.columns.is_empty() {
            return "Query executed successfully. No results returned.".to_string();
        }

        let mut output = String::new();

        // Header row
        let headers: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        output.push_str("| ");
        output.push_str(&headers.join(" | "));
        output.push_str(" |\n");

        // Separator row
        output.push_str("| ");
        output.push_str(
            &headers
                .iter()
                .map(|h| "-".repeat(h.len().max(3)))
                .collect::<Vec<_>>()
                .join(" | "),
        );
        output.push_str(" |\n");

        for row in &self.rows {
            let values: Vec<String> = row
                .values
                .iter()
                .map(|v| v.to_display_string().replace('|', "\\|").replace('\n', " "))
                .collect();
            output.push_str("| ");
            output.push_str(&values.join(" | "));
            output.push_str(" |\n");
        }

        output.push_str(&format!("\n_{} row(s)_", self.rows.len()));
        if self.truncated {
            output.push_str(" _(truncated)_");
        }
        output.push_str(&format!(" _({} ms)_", self.execution_time_ms));

        output
    }

    /// Format the result as CSV. NULL becomes an empty field.
    pub fn to_csv(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let mut output = String::new();

        let headers: Vec<String> = self.columns.iter().map(|c| csv_escape(&c.name)).collect();
        output.push_str(&headers.join(","));
        output.push('\n');

        for row in &self.rows {
            let values: Vec<String> = row
                .values
                .iter()
                .map(|v| match v {
                    SqlValue::Null => String::new(),
                    other => csv_escape(&other.to_display_string()),
                })
                .collect();
            output.push_str(&values.join(","));
            output.push('\n');
        }

        output
    }

    /// Collect the first result set of a driver stream.
    ///
    /// Rows beyond `max_rows` and any later result sets are drained and
    /// discarded.
    pub(crate) async fn from_stream(
        mut stream: QueryStream<'_>,
        max_rows: usize,
        start: Instant,
    ) -> Result<Self, ServerError> {
        use futures_util::stream::TryStreamExt;

        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut money: Vec<bool> = Vec::new();
        let mut rows: Vec<ResultRow> = Vec::new();
        let mut truncated = false;
        let mut in_first_set = false;

        while let Some(item) = stream.try_next().await? {
            match item {
                QueryItem::Metadata(meta) => {
                    in_first_set = meta.result_index() == 0;
                    if in_first_set {
                        money = meta.columns().iter().map(is_money_column).collect();
                        columns = normalize_columns(
                            meta.columns()
                                .iter()
                                .map(|col| ColumnInfo::new(col.name(), sql_type_name(col)))
                                .collect(),
                        );
                    }
                }
                QueryItem::Row(row) => {
                    if !in_first_set {
                        continue;
                    }
                    if rows.len() >= max_rows {
                        truncated = true;
                        continue;
                    }
                    let values = row
                        .into_iter()
                        .enumerate()
                        .map(|(idx, data)| {
                            if money.get(idx).copied().unwrap_or(false) {
                                SqlValue::from_money_data(data)
                            } else {
                                SqlValue::from_column_data(data)
                            }
                        })
                        .collect();
                    rows.push(ResultRow::new(values));
                }
            }
        }

        Ok(Self {
            columns,
            rows,
            truncated,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let rows: Vec<Record<'_>> = self.records().collect();

        let mut state = serializer.serialize_struct("QueryResult", 5)?;
        state.serialize_field("columns", &names)?;
        state.serialize_field("rows", &rows)?;
        state.serialize_field("row_count", &self.row_count())?;
        state.serialize_field("truncated", &self.truncated)?;
        state.serialize_field("execution_time_ms", &self.execution_time_ms)?;
        state.end()
    }
}

/// A borrowed view of one row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [ColumnInfo],
    values: &'a [SqlValue],
}

impl<'a> Record<'a> {
    /// Get a value by column name (case-insensitive).
    pub fn get(&self, column: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a column as a string; NULL and missing columns yield an empty string.
    pub fn string(&self, column: &str) -> String {
        match self.get(column) {
            None | Some(SqlValue::Null) => String::new(),
            Some(v) => v.to_display_string(),
        }
    }

    /// Get a nullable string column.
    pub fn opt_string(&self, column: &str) -> Option<String> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(v) => Some(v.to_display_string()),
        }
    }

    /// Get an integer column.
    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    /// Get a boolean column; missing or NULL is false.
    pub fn bool(&self, column: &str) -> bool {
        self.get(column).and_then(SqlValue::as_bool).unwrap_or(false)
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (col, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(&col.name, value)?;
        }
        map.end()
    }
}

fn normalize_columns(columns: Vec<ColumnInfo>) -> Vec<ColumnInfo> {
    let mut seen: HashSet<String> = HashSet::new();

    columns
        .into_iter()
        .enumerate()
        .map(|(idx, mut col)| {
            let base = if col.name.trim().is_empty() {
                format!("column_{}", idx + 1)
            } else {
                col.name.clone()
            };

            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.to_lowercase()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }

            col.name = name;
            col
        })
        .collect()
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Truncate a string for logging purposes.
pub(crate) fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}...", &s[..idx]),
    }
}

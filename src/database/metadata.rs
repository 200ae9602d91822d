//! SQL Server metadata queries for schema introspection.
//!
//! All catalog queries bind schema and table names as parameters.

use crate::database::backend::{SqlBackend, SqlParam};
use crate::database::query::{QueryResult, Record};
use crate::error::{ErrorKind, ServerError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Table listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub table_name: String,
    pub schema_name: String,
    pub description: String,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDetail {
    pub column_name: String,
    pub data_type: String,
    pub max_length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub is_nullable: bool,
    pub description: String,
}

/// Foreign key column mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub fk_name: String,
    pub column_name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Non-primary-key index with its key columns in key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub index_name: String,
    pub index_type: String,
    pub is_unique: bool,
    pub columns: Vec<String>,
}

/// Full structure of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStructure {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDetail>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
}

/// Database-level information.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseInfo {
    pub database_name: Option<String>,
    pub version: Option<String>,
    pub schemas: Vec<String>,
}

const LIST_TABLES_SQL: &str = r#"
    SELECT
        t.name AS table_name,
        s.name AS schema_name,
        CAST(ISNULL(CAST(ep.value AS NVARCHAR(MAX)), '') AS NVARCHAR(MAX)) AS description
    FROM sys.tables t
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    LEFT JOIN sys.extended_properties ep
        ON t.object_id = ep.major_id AND ep.minor_id = 0 AND ep.name = 'MS_Description'
    WHERE s.name = @P1
    ORDER BY t.name
"#;

const LIST_TABLES_PLAIN_SQL: &str = r#"
    SELECT
        t.name AS table_name,
        s.name AS schema_name
    FROM sys.tables t
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    WHERE s.name = @P1
    ORDER BY t.name
"#;

const COLUMNS_SQL: &str = r#"
    SELECT
        c.name AS column_name,
        ty.name AS data_type,
        c.max_length,
        c.precision,
        c.scale,
        c.is_nullable,
        CAST(ISNULL(CAST(ep.value AS NVARCHAR(MAX)), '') AS NVARCHAR(MAX)) AS description
    FROM sys.columns c
    JOIN sys.types ty ON c.user_type_id = ty.user_type_id
    JOIN sys.tables tb ON c.object_id = tb.object_id
    JOIN sys.schemas s ON tb.schema_id = s.schema_id
    LEFT JOIN sys.extended_properties ep
        ON c.object_id = ep.major_id AND c.column_id = ep.minor_id AND ep.name = 'MS_Description'
    WHERE s.name = @P1 AND tb.name = @P2
    ORDER BY c.column_id
"#;

const COLUMNS_PLAIN_SQL: &str = r#"
    SELECT
        c.name AS column_name,
        ty.name AS data_type,
        c.max_length,
        c.precision,
        c.scale,
        c.is_nullable
    FROM sys.columns c
    JOIN sys.types ty ON c.user_type_id = ty.user_type_id
    JOIN sys.tables tb ON c.object_id = tb.object_id
    JOIN sys.schemas s ON tb.schema_id = s.schema_id
    WHERE s.name = @P1 AND tb.name = @P2
    ORDER BY c.column_id
"#;

const PRIMARY_KEYS_SQL: &str = r#"
    SELECT c.name AS column_name
    FROM sys.indexes i
    JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
    JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
    JOIN sys.tables t ON i.object_id = t.object_id
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    WHERE i.is_primary_key = 1 AND s.name = @P1 AND t.name = @P2
    ORDER BY ic.key_ordinal
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        fk.name AS fk_name,
        COL_NAME(fc.parent_object_id, fc.parent_column_id) AS column_name,
        OBJECT_SCHEMA_NAME(fc.referenced_object_id) AS referenced_schema,
        OBJECT_NAME(fc.referenced_object_id) AS referenced_table,
        COL_NAME(fc.referenced_object_id, fc.referenced_column_id) AS referenced_column
    FROM sys.foreign_keys fk
    JOIN sys.foreign_key_columns fc ON fk.object_id = fc.constraint_object_id
    JOIN sys.tables t ON fk.parent_object_id = t.object_id
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    WHERE s.name = @P1 AND t.name = @P2
    ORDER BY fk.name, fc.constraint_column_id
"#;

// One row per key column; grouped client-side since STRING_AGG needs SQL Server 2017.
const INDEX_COLUMNS_SQL: &str = r#"
    SELECT
        i.name AS index_name,
        i.type_desc AS index_type,
        i.is_unique,
        c.name AS column_name
    FROM sys.indexes i
    JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
    JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
    JOIN sys.tables t ON i.object_id = t.object_id
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    WHERE s.name = @P1 AND t.name = @P2
        AND i.is_primary_key = 0 AND ic.is_included_column = 0 AND i.name IS NOT NULL
    ORDER BY i.name, ic.key_ordinal
"#;

const DATABASE_NAME_SQL: &str = "SELECT DB_NAME() AS database_name, @@VERSION AS version";

const SCHEMAS_SQL: &str = "SELECT name AS schema_name FROM sys.schemas ORDER BY name";

/// Catalog queries over a [`SqlBackend`].
pub struct MetadataQueries {
    backend: Arc<dyn SqlBackend>,
}

impl MetadataQueries {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    async fn run(&self, sql: &str, params: &[SqlParam]) -> Result<QueryResult, ServerError> {
        self.backend.query(sql, params, usize::MAX).await
    }

    /// Run `primary`, falling back once to `plain` if it fails with a query error.
    async fn run_with_fallback(
        &self,
        primary: &str,
        plain: &str,
        params: &[SqlParam],
    ) -> Result<QueryResult, ServerError> {
        match self.run(primary, params).await {
            Err(e) if e.kind() == ErrorKind::Query => {
                warn!(error = %e, "Description query failed, retrying without descriptions");
                self.run(plain, params).await
            }
            other => other,
        }
    }

    /// List tables in a schema.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<TableSummary>, ServerError> {
        let params = [SqlParam::from(schema)];
        let result = self
            .run_with_fallback(LIST_TABLES_SQL, LIST_TABLES_PLAIN_SQL, &params)
            .await?;

        Ok(result
            .records()
            .map(|row| TableSummary {
                table_name: row.string("table_name"),
                schema_name: row.string("schema_name"),
                description: row.string("description"),
            })
            .collect())
    }

    /// Get columns for a table, in column order.
    pub async fn table_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnDetail>, ServerError> {
        let params = [SqlParam::from(schema), SqlParam::from(table)];
        let result = self
            .run_with_fallback(COLUMNS_SQL, COLUMNS_PLAIN_SQL, &params)
            .await?;

        Ok(result.records().map(column_detail).collect())
    }

    /// Get primary key columns in key order.
    pub async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, ServerError> {
        let params = [SqlParam::from(schema), SqlParam::from(table)];
        let result = self.run(PRIMARY_KEYS_SQL, &params).await?;

        Ok(result.records().map(|row| row.string("column_name")).collect())
    }

    /// Get foreign key column mappings.
    pub async fn foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKey>, ServerError> {
        let params = [SqlParam::from(schema), SqlParam::from(table)];
        let result = self.run(FOREIGN_KEYS_SQL, &params).await?;

        Ok(result
            .records()
            .map(|row| ForeignKey {
                fk_name: row.string("fk_name"),
                column_name: row.string("column_name"),
                referenced_schema: row.string("referenced_schema"),
                referenced_table: row.string("referenced_table"),
                referenced_column: row.string("referenced_column"),
            })
            .collect())
    }

    /// Get non-primary-key indexes with their key columns.
    pub async fn indexes(&self, schema: &str, table: &str) -> Result<Vec<IndexInfo>, ServerError> {
        let params = [SqlParam::from(schema), SqlParam::from(table)];
        let result = self.run(INDEX_COLUMNS_SQL, &params).await?;

        Ok(group_index_columns(result.records()))
    }

    /// Describe a table. Fails with not-found if the table has no columns.
    pub async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<TableStructure, ServerError> {
        debug!(schema, table, "Describing table");

        let columns = self.table_columns(schema, table).await?;
        if columns.is_empty() {
            return Err(ServerError::object_not_found(
                "Table",
                format!("{}.{}", schema, table),
            ));
        }

        let primary_keys = self.primary_keys(schema, table).await?;
        let foreign_keys = self.foreign_keys(schema, table).await?;
        let indexes = self.indexes(schema, table).await?;

        Ok(TableStructure {
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
            primary_keys,
            foreign_keys,
            indexes,
        })
    }

    /// List all schemas in the current database.
    pub async fn list_schemas(&self) -> Result<Vec<String>, ServerError> {
        let result = self.run(SCHEMAS_SQL, &[]).await?;
        Ok(result.records().map(|row| row.string("schema_name")).collect())
    }

    /// Get the current database name, server version and schemas.
    pub async fn database_info(&self) -> Result<DatabaseInfo, ServerError> {
        let result = self.run(DATABASE_NAME_SQL, &[]).await?;
        let (database_name, version) = result
            .records()
            .next()
            .map(|row| (row.opt_string("database_name"), row.opt_string("version")))
            .unwrap_or((None, None));

        let schemas = self.list_schemas().await?;

        Ok(DatabaseInfo {
            database_name,
            version,
            schemas,
        })
    }
}

fn column_detail(row: Record<'_>) -> ColumnDetail {
    ColumnDetail {
        column_name: row.string("column_name"),
        data_type: row.string("data_type"),
        max_length: row.i64("max_length"),
        precision: row.i64("precision"),
        scale: row.i64("scale"),
        is_nullable: row.bool("is_nullable"),
        description: row.string("description"),
    }
}

/// Fold per-column index rows (ordered by index name and key ordinal) into indexes.
fn group_index_columns<'a>(rows: impl Iterator<Item = Record<'a>>) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();

    for row in rows {
        let name = row.string("index_name");
        let column = row.string("column_name");

        match indexes.last_mut() {
            Some(last) if last.index_name == name => last.columns.push(column),
            _ => indexes.push(IndexInfo {
                index_name: name,
                index_type: row.string("index_type"),
                is_unique: row.bool("is_unique"),
                columns: vec![column],
            }),
        }
    }

    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::query::{ColumnInfo, ResultRow};
    use crate::database::types::SqlValue;

    fn text(s: &str) -> SqlValue {
        SqlValue::String(s.to_string())
    }

    #[test]
    fn test_group_index_columns() {
        let result = QueryResult::new(
            vec![
                ColumnInfo::new("index_name", "NVARCHAR"),
                ColumnInfo::new("index_type", "NVARCHAR"),
                ColumnInfo::new("is_unique", "BIT"),
                ColumnInfo::new("column_name", "NVARCHAR"),
            ],
            vec![
                ResultRow::new(vec![
                    text("IX_Orders_Customer"),
                    text("NONCLUSTERED"),
                    SqlValue::Bool(false),
                    text("CustomerId"),
                ]),
                ResultRow::new(vec![
                    text("IX_Orders_Customer"),
                    text("NONCLUSTERED"),
                    SqlValue::Bool(false),
                    text("OrderDate"),
                ]),
                ResultRow::new(vec![
                    text("UX_Orders_Number"),
                    text("NONCLUSTERED"),
                    SqlValue::Bool(true),
                    text("OrderNumber"),
                ]),
            ],
        );

        let indexes = group_index_columns(result.records());
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].columns, vec!["CustomerId", "OrderDate"]);
        assert!(!indexes[0].is_unique);
        assert_eq!(indexes[1].index_name, "UX_Orders_Number");
        assert!(indexes[1].is_unique);
    }

    #[test]
    fn test_column_detail_without_description() {
        let result = QueryResult::new(
            vec![
                ColumnInfo::new("column_name", "NVARCHAR"),
                ColumnInfo::new("data_type", "NVARCHAR"),
                ColumnInfo::new("max_length", "SMALLINT"),
                ColumnInfo::new("precision", "TINYINT"),
                ColumnInfo::new("scale", "TINYINT"),
                ColumnInfo::new("is_nullable", "BIT"),
            ],
            vec![ResultRow::new(vec![
                text("Name"),
                text("nvarchar"),
                SqlValue::I16(100),
                SqlValue::U8(0),
                SqlValue::U8(0),
                SqlValue::Bool(true),
            ])],
        );

        let columns: Vec<ColumnDetail> = result.records().map(column_detail).collect();
        assert_eq!(columns[0].column_name, "Name");
        assert_eq!(columns[0].max_length, Some(100));
        assert!(columns[0].is_nullable);
        assert_eq!(columns[0].description, "");
    }

    #[test]
    fn test_catalog_queries_are_parameterized() {
        for sql in [
            LIST_TABLES_SQL,
            LIST_TABLES_PLAIN_SQL,
            COLUMNS_SQL,
            COLUMNS_PLAIN_SQL,
            PRIMARY_KEYS_SQL,
            FOREIGN_KEYS_SQL,
            INDEX_COLUMNS_SQL,
        ] {
            assert!(sql.contains("@P1"));
            assert!(!sql.contains("STRING_AGG"));
        }
    }
}

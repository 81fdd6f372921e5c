//! Relational schema synthesis from Arrow schemas.
//!
//! The silver loader derives its table layout from the bronze artifact
//! rather than from hand-maintained DDL, so a column added upstream shows
//! up downstream without code changes. Synthesis is deterministic: the
//! same Arrow schema and table name always produce the same DDL.

use arrow::datatypes::{DataType, Schema};
use std::fmt;

/// SQL column types the loader emits.
///
/// Deliberately small: the target table stores analytics-ready values,
/// not a faithful copy of every Arrow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Int,
    Double,
    DateTime,
    Text,
}

impl SqlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Int => "INT",
            SqlType::Double => "DOUBLE",
            SqlType::DateTime => "DATETIME",
            SqlType::Text => "TEXT",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synthesized column: sanitized identifier plus SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumn {
    pub name: String,
    pub sql_type: SqlType,
}

/// Replace the characters that upset SQL identifiers.
pub fn sanitize_identifier(name: &str) -> String {
    name.replace([' ', '-'], "_")
}

fn sql_type_for(data_type: &DataType) -> SqlType {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => SqlType::Int,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => SqlType::Double,
        DataType::Date32
        | DataType::Date64
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Timestamp(_, _) => SqlType::DateTime,
        _ => SqlType::Text,
    }
}

/// The synthesized layout of the silver table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: String,
    columns: Vec<SqlColumn>,
}

impl TableSchema {
    /// Derive the table layout from an artifact's Arrow schema, keeping
    /// column order.
    pub fn synthesize(table: &str, schema: &Schema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| SqlColumn {
                name: sanitize_identifier(field.name()),
                sql_type: sql_type_for(field.data_type()),
            })
            .collect();

        Self {
            table: table.to_string(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[SqlColumn] {
        &self.columns
    }

    /// `CREATE TABLE IF NOT EXISTS` with backquoted identifiers. Every
    /// column is nullable; constraints are left to downstream owners.
    pub fn create_table_ddl(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("`{}` {}", column.name, column.sql_type))
            .collect::<Vec<String>>()
            .join(", ");

        format!("CREATE TABLE IF NOT EXISTS `{}` ({})", self.table, columns)
    }

    /// The `INSERT INTO ... VALUES ` head shared by every chunk statement.
    /// Callers append their own placeholder groups.
    pub fn insert_prefix(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("`{}`", column.name))
            .collect::<Vec<String>>()
            .join(", ");

        format!("INSERT INTO `{}` ({}) VALUES ", self.table, columns)
    }
}

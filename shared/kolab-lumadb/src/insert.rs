//! Generic JSON insert
//!
//! A record arrives as a JSON object whose keys are column names. The row is
//! built server side with `jsonb_populate_record`, so column types (text,
//! jsonb, enums) are coerced by the database and columns the record leaves
//! out keep their defaults.

use serde_json::{Map, Value};
use tokio_postgres::GenericClient;

use crate::{LumaDbError, Result};

/// Unquoted SQL identifier, optionally schema-qualified.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
}

/// Build the insert statement for `record`. `$1` binds the record as text.
pub fn insert_statement(table: &str, record: &Map<String, Value>) -> Result<String> {
    if !is_valid_identifier(table) {
        return Err(LumaDbError::InvalidRecord(format!("bad table name {:?}", table)));
    }
    if record.is_empty() {
        return Err(LumaDbError::InvalidRecord("empty record".to_string()));
    }

    let mut columns = Vec::with_capacity(record.len());
    for column in record.keys() {
        if !is_valid_identifier(column) || column.contains('.') {
            return Err(LumaDbError::InvalidRecord(format!("bad column name {:?}", column)));
        }
        columns.push(column.as_str());
    }
    let columns = columns.join(", ");

    Ok(format!(
        "INSERT INTO {table} ({columns}) \
         SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1::text::jsonb) \
         RETURNING to_jsonb({table}.*)::text"
    ))
}

/// Insert `record` into `table` on `client`; returns the stored row as JSON.
pub(crate) async fn insert_json<C>(client: &C, table: &str, record: &Value) -> Result<Value>
where
    C: GenericClient + Sync,
{
    let object = record
        .as_object()
        .ok_or_else(|| LumaDbError::InvalidRecord("record must be a JSON object".to_string()))?;
    let sql = insert_statement(table, object)?;
    let body = serde_json::to_string(record)?;

    let row = client
        .query_one(sql.as_str(), &[&body])
        .await
        .map_err(LumaDbError::Query)?;
    let stored: String = row.try_get(0).map_err(LumaDbError::Query)?;
    Ok(serde_json::from_str(&stored)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("error_reports"));
        assert!(is_valid_identifier("public.error_reports"));
        assert!(!is_valid_identifier("ErrorReports"));
        assert!(!is_valid_identifier("reports; drop table x"));
        assert!(!is_valid_identifier("a.b.c"));
        assert!(!is_valid_identifier("1st"));
    }

    #[test]
    fn test_insert_statement_lists_record_columns() {
        let record = json!({"title": "t", "severity": "high"});
        let sql = insert_statement("error_reports", record.as_object().unwrap()).unwrap();
        assert!(sql.starts_with("INSERT INTO error_reports (severity, title) SELECT severity, title"));
        assert!(sql.contains("jsonb_populate_record(NULL::error_reports, $1::text::jsonb)"));
        assert!(sql.ends_with("RETURNING to_jsonb(error_reports.*)::text"));
    }

    #[test]
    fn test_insert_statement_rejects_bad_input() {
        let record = json!({"title": "t"});
        assert!(insert_statement("x;y", record.as_object().unwrap()).is_err());
        assert!(insert_statement("t", &Map::new()).is_err());
        let bad = json!({"title\"": "t"});
        assert!(insert_statement("t", bad.as_object().unwrap()).is_err());
    }
}

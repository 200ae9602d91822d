//! The narrow interface between the query bridge and a SQL driver.

use crate::database::query::QueryResult;
use crate::error::ServerError;
use async_trait::async_trait;
use serde_json::Value;

/// A positional query parameter, bound as `@P1`, `@P2`, ... in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlParam {
    /// Convert a JSON tool argument into a parameter.
    ///
    /// Arrays and objects are rejected; they have no scalar SQL equivalent.
    pub fn from_json(value: &Value) -> Result<Self, ServerError> {
        match value {
            Value::Null => Ok(SqlParam::Null),
            Value::Bool(b) => Ok(SqlParam::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(SqlParam::Int(i)),
                None => n.as_f64().map(SqlParam::Float).ok_or_else(|| {
                    ServerError::invalid_input(format!("Unsupported numeric parameter: {}", n))
                }),
            },
            Value::String(s) => Ok(SqlParam::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(ServerError::invalid_input(
                "Query parameters must be scalar values (string, number, boolean or null)",
            )),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        SqlParam::Text(s)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

/// A SQL Server session the bridge can run statements on.
///
/// Implementations own connection management; callers see one round trip
/// per call and get the first result set back.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Execute `sql` with positional `params`, keeping at most `max_rows` rows.
    async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        max_rows: usize,
    ) -> Result<QueryResult, ServerError>;

    /// Verify the server is reachable.
    async fn ping(&self) -> Result<(), ServerError> {
        self.query("SELECT 1", &[], 1).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_from_json() {
        assert_eq!(SqlParam::from_json(&json!(null)).unwrap(), SqlParam::Null);
        assert_eq!(SqlParam::from_json(&json!(42)).unwrap(), SqlParam::Int(42));
        assert_eq!(SqlParam::from_json(&json!(1.5)).unwrap(), SqlParam::Float(1.5));
        assert_eq!(
            SqlParam::from_json(&json!("dbo")).unwrap(),
            SqlParam::Text("dbo".into())
        );
        assert!(SqlParam::from_json(&json!([1, 2])).is_err());
        assert!(SqlParam::from_json(&json!({"a": 1})).is_err());
    }
}

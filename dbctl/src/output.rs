// JSON rendering of query results

use common::db::{QueryResult, Row, Value};
use serde_json::json;

pub fn result_to_json(result: &QueryResult) -> serde_json::Value {
    match result {
        QueryResult::Rows(rows) => {
            let rows: Vec<serde_json::Value> = rows.iter().map(row_to_json).collect();
            json!({
                "rows": rows,
                "row_count": rows.len(),
            })
        }
        QueryResult::Affected(count) => json!({ "affected_rows": count }),
    }
}

fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Array(row.iter().map(value_to_json).collect())
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,
        Value::Bytes(bytes) => json!(String::from_utf8_lossy(bytes)),
        Value::Int(v) => json!(v),
        Value::UInt(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Double(v) => json!(v),
        Value::Date(year, month, day, hour, minute, second, micros) => json!(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            year, month, day, hour, minute, second, micros
        )),
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = *days as u64 * 24 + *hours as u64;
            json!(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, minutes, seconds, micros
            ))
        }
    }
}

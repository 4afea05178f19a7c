use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A warehouse row derived from one published payload. Absent fields stay null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub timestamp: Value,
    pub latency: Value,
    pub cpu: Value,
}

impl MetricRow {
    pub fn from_message(message: &Value) -> Self {
        let field = |name: &str| message.get(name).cloned().unwrap_or(Value::Null);
        Self {
            timestamp: field("timestamp"),
            latency: field("latency"),
            cpu: field("cpu"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub timestamp: Option<String>,
    pub latency: Option<f64>,
    pub is_anomaly: Option<bool>,
    pub anomaly_probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyQuery {
    pub dataset: String,
    pub table: String,
    pub model: String,
    pub threshold: f64,
    pub limit: usize,
}

impl AnomalyQuery {
    pub fn to_sql(&self) -> String {
        format!(
            "SELECT timestamp, latency, is_anomaly, anomaly_probability \
             FROM ML.DETECT_ANOMALIES(\
             MODEL `{dataset}.{model}`, \
             STRUCT({threshold} AS anomaly_prob_threshold), \
             (SELECT TIMESTAMP_SECONDS(timestamp) AS timestamp, latency FROM `{dataset}.{table}`)) \
             ORDER BY timestamp DESC LIMIT {limit}",
            dataset = self.dataset,
            model = self.model,
            table = self.table,
            threshold = self.threshold,
            limit = self.limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn row_picks_known_fields_and_nulls_missing() {
        let row = MetricRow::from_message(&json!({"timestamp": 1700000000, "cpu": 42, "mem": 7}));
        assert_eq!(row.timestamp, json!(1700000000));
        assert_eq!(row.latency, Value::Null);
        assert_eq!(row.cpu, json!(42));
    }

    #[test]
    fn anomaly_sql_names_model_table_and_limit() {
        let q = AnomalyQuery {
            dataset: "metrics_dataset".into(),
            table: "metrics_table".into(),
            model: "latency_anomalies".into(),
            threshold: 0.01,
            limit: 100,
        };
        let sql = q.to_sql();
        assert!(sql.contains("MODEL `metrics_dataset.latency_anomalies`"));
        assert!(sql.contains("STRUCT(0.01 AS anomaly_prob_threshold)"));
        assert!(sql.contains("FROM `metrics_dataset.metrics_table`"));
        assert!(sql.ends_with("ORDER BY timestamp DESC LIMIT 100"));
    }
}

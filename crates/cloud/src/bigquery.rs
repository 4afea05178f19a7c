use async_trait::async_trait;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::model::row::{AnomalyQuery, AnomalyRow, MetricRow};
use pipeline_core::time::{parse_epoch_seconds, rfc3339_precise};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{TokenSource, Warehouse, authorize, describe_failure};

const QUERY_TIMEOUT_MS: u64 = 10_000;

/// BigQuery `tabledata.insertAll` and `jobs.query` over REST.
#[derive(Clone)]
pub struct BigQueryClient {
    http: reqwest::Client,
    tokens: TokenSource,
    endpoint: String,
    project_id: String,
    dataset: String,
    table: String,
}

#[derive(Debug, Serialize)]
struct InsertAllRequest<'a> {
    rows: Vec<InsertRow<'a>>,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    json: &'a MetricRow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

impl BigQueryClient {
    pub fn new(
        http: reqwest::Client,
        tokens: TokenSource,
        endpoint: &str,
        project_id: &str,
        dataset: &str,
        table: &str,
    ) -> Self {
        Self {
            http,
            tokens,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let req = authorize(self.http.post(url).json(body), &self.tokens).await?;
        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Warehouse(format!("request to {url} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Warehouse(format!(
                "request to {url} rejected: {}",
                describe_failure(resp).await
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn insert_rows(&self, rows: &[MetricRow]) -> Result<()> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.endpoint, self.project_id, self.dataset, self.table
        );
        let body = InsertAllRequest {
            rows: rows.iter().map(|json| InsertRow { json }).collect(),
        };
        let parsed: InsertAllResponse = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::Warehouse(format!("bad insertAll response: {e}")))?;
        if !parsed.insert_errors.is_empty() {
            return Err(PipelineError::Warehouse(format!(
                "insert errors: {}",
                Value::Array(parsed.insert_errors)
            )));
        }
        Ok(())
    }

    async fn detect_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRow>> {
        let url = format!("{}/bigquery/v2/projects/{}/queries", self.endpoint, self.project_id);
        let body = QueryRequest {
            query: query.to_sql(),
            use_legacy_sql: false,
            timeout_ms: QUERY_TIMEOUT_MS,
        };
        let parsed: QueryResponse = self
            .post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::Warehouse(format!("bad query response: {e}")))?;
        decode_anomalies(parsed)
    }
}

fn decode_anomalies(resp: QueryResponse) -> Result<Vec<AnomalyRow>> {
    if !resp.job_complete {
        return Err(PipelineError::Warehouse(format!(
            "query did not complete within {QUERY_TIMEOUT_MS}ms"
        )));
    }
    let Some(schema) = resp.schema else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(resp.rows.len());
    for row in resp.rows {
        let mut record = Map::new();
        for (field, cell) in schema.fields.iter().zip(row.f) {
            record.insert(field.name.clone(), decode_cell(&field.field_type, cell.v)?);
        }
        let row: AnomalyRow = serde_json::from_value(Value::Object(record))
            .map_err(|e| PipelineError::Warehouse(format!("unexpected anomaly row: {e}")))?;
        out.push(row);
    }
    Ok(out)
}

/// Query results carry every scalar as a string; convert by declared column type.
fn decode_cell(field_type: &str, value: Value) -> Result<Value> {
    let Value::String(raw) = value else {
        return Ok(value);
    };
    let decoded = match field_type {
        "FLOAT" | "FLOAT64" | "NUMERIC" => {
            let v: f64 = raw.parse().map_err(|e| bad_cell(field_type, &raw, e))?;
            serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
        }
        "INTEGER" | "INT64" => {
            Value::from(raw.parse::<i64>().map_err(|e| bad_cell(field_type, &raw, e))?)
        }
        "BOOLEAN" | "BOOL" => Value::Bool(raw.eq_ignore_ascii_case("true")),
        "TIMESTAMP" => {
            let ts = parse_epoch_seconds(&raw).map_err(|e| bad_cell(field_type, &raw, e))?;
            Value::String(rfc3339_precise(ts))
        }
        _ => Value::String(raw),
    };
    Ok(decoded)
}

fn bad_cell(field_type: &str, raw: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Warehouse(format!("bad {field_type} value {raw}: {e}"))
}

// src/services/bigquery.rs

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use super::google_oauth::TokenProvider;

const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
const UPLOAD_BASE: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const QUERY_TIMEOUT_MS: u64 = 10_000;

/// A result row keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("BigQuery returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("BigQuery job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("invalid table id '{0}', expected project.dataset.table")]
    InvalidTable(String),
    #[error("failed to encode or decode rows: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unexpected BigQuery response: {0}")]
    UnexpectedResponse(String),
    #[error("{0}")]
    Config(String),
}

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

fn table_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-z0-9][a-z0-9\-]{0,62}[a-z0-9])\.([A-Za-z0-9_]{1,1024})\.([A-Za-z0-9_\-]{1,1024})$")
            .expect("table id pattern is valid")
    })
}

impl TableId {
    pub fn parse(id: &str) -> Result<Self, WarehouseError> {
        let caps = table_id_pattern()
            .captures(id.trim())
            .ok_or_else(|| WarehouseError::InvalidTable(id.to_string()))?;
        Ok(TableId {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
            table: caps[3].to_string(),
        })
    }

    /// Back-quoted reference for use in GoogleSQL.
    pub fn sql(&self) -> String {
        format!("`{}`", self)
    }
}

impl FromStr for TableId {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableId::parse(s)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// A typed, possibly null, query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(Option<String>),
    Float64(Option<f64>),
    Int64(Option<i64>),
    Date(Option<NaiveDate>),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "STRING",
            ParamValue::Float64(_) => "FLOAT64",
            ParamValue::Int64(_) => "INT64",
            ParamValue::Date(_) => "DATE",
        }
    }

    fn wire_value(&self) -> Value {
        let text = match self {
            ParamValue::String(v) => v.clone(),
            ParamValue::Float64(v) => v.filter(|f| f.is_finite()).map(|f| f.to_string()),
            ParamValue::Int64(v) => v.map(|i| i.to_string()),
            ParamValue::Date(v) => v.map(|d| d.format("%Y-%m-%d").to_string()),
        };
        text.map(Value::String).unwrap_or(Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => v.as_deref(),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(Some(v.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(Some(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float64(Some(v))
    }
}

impl From<Option<f64>> for ParamValue {
    fn from(v: Option<f64>) -> Self {
        ParamValue::Float64(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int64(Some(v))
    }
}

impl From<Option<i64>> for ParamValue {
    fn from(v: Option<i64>) -> Self {
        ParamValue::Int64(v)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self {
        ParamValue::Date(Some(v))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: ParamValue,
}

/// A GoogleSQL statement with named (`@name`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.push(QueryParam {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Body of a `jobs.query` request.
    pub fn to_request(&self) -> Value {
        let parameters: Vec<Value> = self
            .params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "parameterType": {"type": p.value.type_name()},
                    "parameterValue": {"value": p.value.wire_value()},
                })
            })
            .collect();

        json!({
            "query": self.sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": parameters,
            "timeoutMs": QUERY_TIMEOUT_MS,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorProto {
    pub reason: Option<String>,
    pub message: Option<String>,
    pub location: Option<String>,
}

impl fmt::Display for ErrorProto {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.reason.as_deref().unwrap_or("error"),
            self.message.as_deref().unwrap_or("")
        )
    }
}

/// Per-row failure reported by a streaming insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInsertError {
    pub index: usize,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Stream rows into the table. Rejected rows come back as errors; accepted rows stay written.
    async fn insert_rows(&self, table: &TableId, rows: &[Value]) -> Result<Vec<RowInsertError>, WarehouseError>;

    /// Append rows with a single load job and wait for it. Returns the number of rows loaded.
    async fn load_rows(&self, table: &TableId, rows: &[Value]) -> Result<u64, WarehouseError>;

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, WarehouseError>;
}

pub fn to_rows<T: Serialize>(records: &[T]) -> Result<Vec<Value>, serde_json::Error> {
    records.iter().map(serde_json::to_value).collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
pub struct WireRow {
    #[serde(default)]
    pub f: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
pub struct WireCell {
    #[serde(default)]
    pub v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<WireRow>,
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowInsertError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: JobStatus,
    #[serde(default)]
    statistics: JobStatistics,
}

fn decode_cell(field: &FieldSchema, v: &Value) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    if field.mode.as_deref() == Some("REPEATED") {
        let element = FieldSchema {
            mode: None,
            ..field.clone()
        };
        let items = v.as_array().map(Vec::as_slice).unwrap_or_default();
        return Value::Array(items.iter().map(|item| decode_cell(&element, &item["v"])).collect());
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => {
            let cells = v["f"].as_array().map(Vec::as_slice).unwrap_or_default();
            let nested = field
                .fields
                .iter()
                .zip(cells)
                .map(|(f, cell)| (f.name.clone(), decode_cell(f, &cell["v"])))
                .collect();
            Value::Object(nested)
        }
        "INTEGER" | "INT64" => v
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| v.clone()),
        "FLOAT" | "FLOAT64" => v
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| v.clone()),
        "BOOLEAN" | "BOOL" => match v.as_str() {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => v.clone(),
        },
        _ => v.clone(),
    }
}

/// Turn the `{"f": [{"v": ...}]}` wire rows into name/value maps.
pub fn decode_rows(schema: &TableSchema, rows: &[WireRow]) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            schema
                .fields
                .iter()
                .zip(&row.f)
                .map(|(field, cell)| (field.name.clone(), decode_cell(field, &cell.v)))
                .collect()
        })
        .collect()
}

/// `multipart/related` body for a load job: job metadata, then newline-delimited JSON rows.
pub fn multipart_body(boundary: &str, metadata: &Value, rows: &[Value]) -> Result<String, serde_json::Error> {
    let ndjson = rows
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?
        .join("\n");

    Ok(format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
--{b}\r\nContent-Type: application/octet-stream\r\n\r\n{data}\r\n--{b}--\r\n",
        b = boundary,
        meta = serde_json::to_string(metadata)?,
        data = ndjson,
    ))
}

fn load_job_metadata(table: &TableId) -> Value {
    json!({
        "configuration": {
            "load": {
                "destinationTable": {
                    "projectId": table.project,
                    "datasetId": table.dataset,
                    "tableId": table.table,
                },
                "sourceFormat": "NEWLINE_DELIMITED_JSON",
                "writeDisposition": "WRITE_APPEND",
                "createDisposition": "CREATE_IF_NEEDED",
                "autodetect": true,
            }
        }
    })
}

pub struct BigQueryClient {
    client: Client,
    tokens: TokenProvider,
    project_id: Option<String>,
    api_base: String,
    upload_base: String,
}

impl BigQueryClient {
    pub fn new(tokens: TokenProvider, project_id: Option<String>) -> Self {
        BigQueryClient {
            client: Client::new(),
            tokens,
            project_id,
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, WarehouseError> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| WarehouseError::Auth(e.to_string()))?;

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(WarehouseError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn wait_for_job(&self, project: &str, job: Job) -> Result<Job, WarehouseError> {
        let mut job = job;
        while !job_finished(&job)? {
            tokio::time::sleep(POLL_INTERVAL).await;
            let url = format!("{}/projects/{}/jobs/{}", self.api_base, project, job.job_reference.job_id);
            let mut request = self.client.get(&url);
            if let Some(location) = &job.job_reference.location {
                request = request.query(&[("location", location)]);
            }
            job = self.send_json(request).await?;
            debug!("Job {} is {}", job.job_reference.job_id, job.status.state);
        }
        Ok(job)
    }
}

/// `Ok(false)` while the job runs, `Ok(true)` once it is DONE, an error if it finished with `errorResult`.
fn job_finished(job: &Job) -> Result<bool, WarehouseError> {
    if job.status.state != "DONE" {
        return Ok(false);
    }
    match &job.status.error_result {
        Some(err) => Err(WarehouseError::JobFailed {
            job_id: job.job_reference.job_id.clone(),
            message: err.to_string(),
        }),
        None => Ok(true),
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn insert_rows(&self, table: &TableId, rows: &[Value]) -> Result<Vec<RowInsertError>, WarehouseError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.api_base, table.project, table.dataset, table.table
        );
        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": rows.iter().map(|row| json!({"json": row})).collect::<Vec<_>>(),
        });

        info!("Streaming {} rows into {}", rows.len(), table);
        let response: InsertAllResponse = self.send_json(self.client.post(&url).json(&body)).await?;
        Ok(response.insert_errors)
    }

    async fn load_rows(&self, table: &TableId, rows: &[Value]) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            info!("No rows to load into {}", table);
            return Ok(0);
        }

        let boundary = format!("greenbull_{}", Utc::now().timestamp_micros());
        let body = multipart_body(&boundary, &load_job_metadata(table), rows)?;
        let url = format!("{}/projects/{}/jobs", self.upload_base, table.project);

        info!("Loading {} rows into {}", rows.len(), table);
        let request = self
            .client
            .post(&url)
            .query(&[("uploadType", "multipart")])
            .header("Content-Type", format!("multipart/related; boundary={}", boundary))
            .body(body);
        let job: Job = self.send_json(request).await?;
        let job = self.wait_for_job(&table.project, job).await?;

        let output_rows = job
            .statistics
            .load
            .and_then(|load| load.output_rows)
            .and_then(|n| n.parse().ok())
            .unwrap_or(rows.len() as u64);
        Ok(output_rows)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, WarehouseError> {
        let project = self
            .project_id
            .as_deref()
            .ok_or_else(|| WarehouseError::Config("GCP project id is not configured".to_string()))?;

        debug!("Running query: {}", statement.sql);
        let url = format!("{}/projects/{}/queries", self.api_base, project);
        let mut response: QueryResponse = self
            .send_json(self.client.post(&url).json(&statement.to_request()))
            .await?;

        let mut rows = Vec::new();
        loop {
            // Failed jobs come back as HTTP errors; anything here is advisory
            if !response.errors.is_empty() {
                warn!("Query reported errors: {:?}", response.errors);
            }

            if response.job_complete {
                let schema = response.schema.take().unwrap_or_default();
                rows.extend(decode_rows(&schema, &response.rows));
            } else {
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            let page_token = if response.job_complete {
                match response.page_token.take() {
                    Some(token) => Some(token),
                    None => break,
                }
            } else {
                None
            };

            let job_ref = response.job_reference.as_ref().ok_or_else(|| {
                WarehouseError::Config("incomplete query response without a job reference".to_string())
            })?;
            let mut params = vec![("timeoutMs".to_string(), QUERY_TIMEOUT_MS.to_string())];
            if let Some(location) = &job_ref.location {
                params.push(("location".to_string(), location.clone()));
            }
            if let Some(token) = page_token {
                params.push(("pageToken".to_string(), token));
            }
            let url = format!("{}/projects/{}/queries/{}", self.api_base, project, job_ref.job_id);
            response = self.send_json(self.client.get(&url).query(&params)).await?;
        }

        Ok(rows)
    }
}

//! Milvus / Zilliz Cloud backend over the RESTful v2 API.
//!
//! Every response is wrapped in a `{code, message, data}` envelope; a
//! non-zero `code` is a failure even when the HTTP status is 200. Parameter
//! errors are the caller's fault and map to [`Error::InvalidInput`]; every
//! other code is treated as the service being unavailable.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use sonority_core::model::EntityId;
use sonority_core::{Error, Result};

use super::{Filter, RawHit, Row, SearchRequest, VectorBackend};

const QUERY_ENDPOINT: &str = "/v2/vectordb/entities/query";
const SEARCH_ENDPOINT: &str = "/v2/vectordb/entities/search";
const HAS_COLLECTION_ENDPOINT: &str = "/v2/vectordb/collections/has";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool,
}

/// Milvus REST client.
///
/// Holds a pooled `reqwest` client that is safe to share between
/// concurrent requests. Collections confirmed by [`VectorBackend::connect`]
/// are remembered so repeated connects cost nothing.
#[derive(Debug)]
pub struct MilvusBackend {
    http: Client,
    base_url: String,
    token: Option<String>,
    connected: Mutex<HashSet<String>>,
}

impl MilvusBackend {
    /// Create a client for the endpoint at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        uri: &str,
        token: Option<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("sonority/0.1.0")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: uri.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            connected: Mutex::new(HashSet::new()),
        })
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let mut request = self
            .http
            .post(format!("{}{endpoint}", self.base_url))
            .json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unavailable(format!(
                "Milvus rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "Milvus returned HTTP {status} for {endpoint}"
            )));
        }

        let envelope: Envelope = response.json().await.map_err(transport_error)?;
        unwrap_envelope(envelope)
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Unavailable(format!("Milvus request timed out: {err}"))
    } else if err.is_decode() {
        Error::Unavailable(format!("undecodable Milvus response: {err}"))
    } else {
        Error::Unavailable(format!("Milvus request failed: {err}"))
    }
}

/// Milvus codes for a rejected request (invalid, missing, or too large
/// parameter). Resending the same request cannot succeed.
const PARAMETER_ERRORS: std::ops::RangeInclusive<i64> = 1100..=1102;

fn unwrap_envelope(envelope: Envelope) -> Result<Value> {
    if envelope.code == 0 {
        return Ok(envelope.data);
    }
    let message = format!(
        "Milvus error {}: {}",
        envelope.code,
        envelope.message.unwrap_or_default()
    );
    if PARAMETER_ERRORS.contains(&envelope.code) {
        Err(Error::InvalidInput(message))
    } else {
        Err(Error::Unavailable(message))
    }
}

/// Render a [`Filter`] as a Milvus boolean expression.
fn filter_expr(filter: &Filter) -> String {
    match filter {
        Filter::IdIn(ids) => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            format!("id in [{}]", ids.join(", "))
        }
        Filter::PathIn(paths) => {
            let paths: Vec<String> = paths.iter().map(|p| string_literal(p)).collect();
            format!("path in [{}]", paths.join(", "))
        }
        Filter::PathEq(path) => format!("path == {}", string_literal(path)),
    }
}

/// Double-quoted literal with backslash escapes, which Milvus expressions
/// share with JSON.
fn string_literal(value: &str) -> String {
    Value::from(value).to_string()
}

fn query_body(collection: &str, filter: &Filter, output_fields: &[&str], limit: Option<usize>) -> Value {
    let mut body = json!({
        "collectionName": collection,
        "filter": filter_expr(filter),
        "outputFields": output_fields,
    });
    if let Some(limit) = limit {
        body["limit"] = json!(limit);
    }
    body
}

fn search_body(collection: &str, vector: &[f32], request: &SearchRequest<'_>) -> Value {
    json!({
        "collectionName": collection,
        "data": [vector],
        "annsField": request.anns_field,
        "limit": request.limit,
        "offset": request.offset,
        "outputFields": request.output_fields,
        "searchParams": {
            "params": { "nprobe": request.nprobe }
        },
    })
}

fn rows_from_data(data: Value) -> Result<Vec<Row>> {
    let Value::Array(items) = data else {
        return Err(Error::Unavailable("Milvus data is not an array".into()));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(Error::Unavailable(format!(
                "Milvus row is not an object: {other}"
            ))),
        })
        .collect()
}

/// Split a search row into its id, distance, and remaining fields.
///
/// A single-vector search returns a flat list of rows; some server
/// versions nest it one level deeper, one list per query vector.
fn hits_from_data(data: Value) -> Result<Vec<RawHit>> {
    let data = match data {
        Value::Array(mut groups) if groups.first().is_some_and(Value::is_array) => {
            groups.swap_remove(0)
        }
        other => other,
    };

    rows_from_data(data)?
        .into_iter()
        .map(|mut row| {
            let distance = row
                .remove("distance")
                .and_then(|d| d.as_f64())
                .ok_or_else(|| Error::Unavailable("Milvus hit without distance".into()))?;
            let id = match row.remove("id") {
                Some(Value::Number(n)) => n.as_i64(),
                Some(Value::String(s)) => s.parse().ok(),
                _ => None,
            }
            .ok_or_else(|| Error::Unavailable("Milvus hit without a numeric id".into()))?;
            #[allow(clippy::cast_possible_truncation)]
            let distance = distance as f32;
            Ok(RawHit {
                id: EntityId::new(id),
                distance,
                fields: row,
            })
        })
        .collect()
}

#[async_trait]
impl VectorBackend for MilvusBackend {
    async fn connect(&self, collection: &str) -> Result<()> {
        let known = self
            .connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(collection);
        if known {
            return Ok(());
        }

        let data = self
            .post(HAS_COLLECTION_ENDPOINT, &json!({ "collectionName": collection }))
            .await?;
        let has: HasCollection = serde_json::from_value(data)
            .map_err(|e| Error::Unavailable(format!("unexpected has-collection reply: {e}")))?;
        if !has.has {
            return Err(Error::Unavailable(format!(
                "collection {collection} does not exist"
            )));
        }

        log::info!("Connected to Milvus collection {collection}");
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string());
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let body = query_body(collection, filter, output_fields, limit);
        let data = self.post(QUERY_ENDPOINT, &body).await?;
        rows_from_data(data)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        request: &SearchRequest<'_>,
    ) -> Result<Vec<RawHit>> {
        let body = search_body(collection, vector, request);
        let data = self.post(SEARCH_ENDPOINT, &body).await?;
        hits_from_data(data)
    }
}

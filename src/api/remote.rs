//! Purpose: Blocking HTTP client for a running `tabserve serve` instance.
//! Exports: `RemoteClient`, `PageView`, `Health`.
//! Role: Mirrors the server routes (/healthz, /load, /data, /summary, /info).
//! Invariants: Base URLs are http(s) with no path; routes are appended here.
//! Invariants: Server error envelopes surface as `Error` with the remote kind.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use crate::core::store::DatasetInfo;
use crate::core::summary::ColumnSummary;
use crate::core::table::Row;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub loaded: bool,
}

/// One page of rows as returned by `GET /data`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PageView {
    pub records: Vec<Row>,
    pub columns: Vec<String>,
    pub total: u64,
    pub start: u64,
    pub limit: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<String>,
}

#[derive(Deserialize)]
struct DatasetEnvelope {
    dataset: DatasetInfo,
}

#[derive(Deserialize)]
struct SummaryEnvelope {
    summary: Vec<ColumnSummary>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
    path: Option<String>,
    row: Option<u64>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(RemoteClientInner { base_url, agent }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn health(&self) -> ApiResult<Health> {
        let url = build_url(&self.inner.base_url, &["healthz"])?;
        self.request_json::<(), _>("GET", &url, &())
    }

    /// Asks the server to load `path` (resolved on the server side).
    pub fn load(&self, path: &str, delimiter: Option<char>) -> ApiResult<DatasetInfo> {
        let url = build_url(&self.inner.base_url, &["load"])?;
        let payload = LoadRequest {
            path,
            delimiter: delimiter.map(String::from),
        };
        let envelope: DatasetEnvelope = self
            .request_json("POST", &url, &payload)
            .map_err(|err| match err.path() {
                Some(_) => err,
                None => err.with_path(path),
            })?;
        Ok(envelope.dataset)
    }

    pub fn page(&self, start: Option<i64>, limit: Option<i64>) -> ApiResult<PageView> {
        let mut url = build_url(&self.inner.base_url, &["data"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(start) = start {
                query.append_pair("start", &start.to_string());
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.request_json::<(), _>("GET", &url, &())
    }

    pub fn summary(&self) -> ApiResult<Vec<ColumnSummary>> {
        let url = build_url(&self.inner.base_url, &["summary"])?;
        let envelope: SummaryEnvelope = self.request_json::<(), _>("GET", &url, &())?;
        Ok(envelope.summary)
    }

    pub fn info(&self) -> ApiResult<DatasetInfo> {
        let url = build_url(&self.inner.base_url, &["info"])?;
        let envelope: DatasetEnvelope = self.request_json::<(), _>("GET", &url, &())?;
        Ok(envelope.dataset)
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: &T) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = if method == "GET" {
            request.call()
        } else {
            let payload = serde_json::to_string(body).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode request json")
                    .with_source(err)
            })?;
            request
                .set("Content-Type", "application/json")
                .send_string(&payload)
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::InvalidRequest)
            .with_message("invalid server url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::InvalidRequest)
            .with_message("server url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::InvalidRequest).with_message("server url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::InvalidRequest).with_message("server url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error, status);
    }
    Error::new(error_kind_from_status(status)).with_message(format!("server error status {status}"))
}

fn error_from_remote(remote: RemoteError, status: u16) -> Error {
    let kind = ErrorKind::parse(&remote.kind).unwrap_or_else(|| error_kind_from_status(status));
    let mut err = Error::new(kind);
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    if let Some(path) = remote.path {
        err = err.with_path(path);
    }
    if let Some(row) = remote.row {
        err = err.with_row(row);
    }
    err
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 415 | 422 => ErrorKind::InvalidRequest,
        404 => ErrorKind::NotLoaded,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ErrorEnvelope, RemoteClient, build_url, error_from_remote, error_kind_from_status,
        normalize_base_url,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn normalize_base_url_adds_root_path() {
        let url = normalize_base_url("http://localhost:8080".to_string()).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn normalize_base_url_rejects_paths_and_schemes() {
        let err = normalize_base_url("http://localhost:8080/data".to_string()).expect_err("path");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        let err = normalize_base_url("ftp://localhost".to_string()).expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn build_url_replaces_path() {
        let base = normalize_base_url("http://127.0.0.1:9000".to_string()).expect("url");
        let url = build_url(&base, &["summary"]).expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/summary");
    }

    #[test]
    fn remote_error_keeps_kind_and_context() {
        let body = serde_json::json!({
            "error": {
                "kind": "MalformedRow",
                "message": "expected 2 fields, found 3",
                "path": "/tmp/x.csv",
                "row": 4,
            }
        });
        let envelope: ErrorEnvelope = serde_json::from_value(body).expect("envelope");
        let err = error_from_remote(envelope.error, 400);
        assert_eq!(err.kind(), ErrorKind::MalformedRow);
        assert_eq!(err.row(), Some(4));
        assert_eq!(
            err.path().map(|p| p.to_string_lossy().to_string()).as_deref(),
            Some("/tmp/x.csv")
        );
    }

    #[test]
    fn unknown_remote_kind_falls_back_to_status() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error":{"kind":"Mystery"}}"#).expect("envelope");
        let err = error_from_remote(envelope.error, 404);
        assert_eq!(err.kind(), ErrorKind::NotLoaded);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(error_kind_from_status(400), ErrorKind::InvalidRequest);
        assert_eq!(error_kind_from_status(404), ErrorKind::NotLoaded);
        assert_eq!(error_kind_from_status(503), ErrorKind::Internal);
        assert_eq!(error_kind_from_status(302), ErrorKind::Io);
    }

    #[test]
    fn unreachable_server_is_io_error() {
        // Port 9 (discard) on loopback is expected to refuse connections.
        let client = RemoteClient::new("http://127.0.0.1:9").expect("client");
        let err = client.summary().expect_err("unreachable");
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

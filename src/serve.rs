//! Purpose: Provide the HTTP/JSON server for tabserve.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum adapter over one injected `Store`; loads, pages, and summarizes.
//! Invariants: CSV files are read on the blocking pool before the store is touched.
//! Invariants: Handlers take one snapshot at entry and answer from it alone.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tabserve::api::{
    Dataset, Error, ErrorKind, LoadOptions, PageRequest, Snapshot, Store, load_path, page,
    parse_delimiter, summarize,
};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub data_dir: Option<PathBuf>,
    pub preload: Option<PathBuf>,
    pub load_options: LoadOptions,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    data_dir: Option<PathBuf>,
    load_options: LoadOptions,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config.max_body_bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::InvalidRequest).with_message("--max-body-bytes is too large")
    })?;

    let state = AppState {
        store: Arc::new(Store::new()),
        data_dir: config.data_dir.clone(),
        load_options: config.load_options.clone(),
    };

    if let Some(preload) = &config.preload {
        let path = resolve_load_path(preload, state.data_dir.as_deref());
        let dataset = load_blocking(path.clone(), state.load_options.clone()).await?;
        let snapshot = state.store.replace(dataset);
        log_loaded(&path, &snapshot);
    }

    let app = router(state, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, "starting data server");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/load", post(load_dataset))
        .route("/data", get(data_page))
        .route("/summary", get(summary))
        .route("/info", get(info))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::InvalidRequest)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::InvalidRequest)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 65536."));
    }

    if let Some(dir) = &config.data_dir {
        if !dir.is_dir() {
            return Err(Error::new(ErrorKind::InvalidRequest)
                .with_message("--data-dir is not a directory")
                .with_path(dir));
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Relative paths are taken from `data_dir` when one is configured, otherwise
/// from the server's working directory.
fn resolve_load_path(path: &Path, data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

async fn load_blocking(path: PathBuf, options: LoadOptions) -> Result<Dataset, Error> {
    tokio::task::spawn_blocking(move || load_path(&path, &options))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("load task failed")
                .with_source(err)
        })?
}

fn log_loaded(path: &Path, snapshot: &Snapshot) {
    tracing::info!(
        path = %path.display(),
        rows = snapshot.row_count(),
        columns = snapshot.column_count(),
        generation = snapshot.generation(),
        "loaded dataset"
    );
}

#[derive(Debug, Deserialize)]
struct LoadRequest {
    path: String,
    delimiter: Option<String>,
}

#[derive(Debug, Default)]
struct DataQuery {
    start: Option<String>,
    limit: Option<String>,
}

impl DataQuery {
    /// First value wins for repeated keys; unknown keys are ignored.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "start" => &mut query.start,
                "limit" => &mut query.limit,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<u64>,
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    json_response(json!({ "ok": true, "loaded": state.store.is_loaded() }))
}

async fn load_dataset(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(
                Error::new(ErrorKind::InvalidRequest)
                    .with_message(format!("bad request body: {}", rejection.body_text()))
                    .with_hint(r#"Send a JSON body like {"path": "data.csv"}."#),
            );
        }
    };
    if payload.path.trim().is_empty() {
        return error_response(
            Error::new(ErrorKind::InvalidRequest).with_message("load path must not be empty"),
        );
    }
    let mut options = state.load_options.clone();
    if let Some(delimiter) = payload.delimiter.as_deref() {
        match parse_delimiter(delimiter) {
            Ok(delimiter) => options.delimiter = delimiter,
            Err(err) => return error_response(err),
        }
    }

    let path = resolve_load_path(Path::new(&payload.path), state.data_dir.as_deref());
    match load_blocking(path.clone(), options).await {
        Ok(dataset) => {
            let snapshot = state.store.replace(dataset);
            log_loaded(&path, &snapshot);
            match snapshot.info().and_then(|info| encode(&info)) {
                Ok(info) => json_response(json!({ "dataset": info })),
                Err(err) => error_response(err),
            }
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "load failed");
            error_response(err)
        }
    }
}

async fn data_page(
    State(state): State<Arc<AppState>>,
    pairs: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    // Unreadable query strings fall back to the paging defaults.
    let query = match pairs {
        Ok(Query(pairs)) => DataQuery::from_pairs(pairs),
        Err(_) => DataQuery::default(),
    };
    let snapshot = match state.store.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(err),
    };
    let request = PageRequest::from_query(query.start.as_deref(), query.limit.as_deref());
    let result = page(&snapshot, request);
    let records = match encode(&result.rows) {
        Ok(records) => records,
        Err(err) => return error_response(err),
    };
    let mut body = json!({
        "records": records,
        "columns": snapshot.column_names(),
        "total": result.total,
        "start": result.start,
        "limit": result.limit,
    });
    if result.is_empty() {
        body["message"] = json!("No data in specified range");
    }
    tracing::debug!(rows = result.rows.len(), start = result.start, "served page");
    json_response(body)
}

async fn summary(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = match state.store.snapshot() {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(err),
    };
    let result = tokio::task::spawn_blocking(move || encode(&summarize(&snapshot)))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("summary task failed")
                .with_source(err)
        })
        .and_then(|encoded| encoded);
    match result {
        Ok(summary) => json_response(json!({ "summary": summary })),
        Err(err) => error_response(err),
    }
}

async fn info(State(state): State<Arc<AppState>>) -> Response {
    let result = state
        .store
        .snapshot()
        .and_then(|snapshot| snapshot.info())
        .and_then(|info| encode(&info));
    match result {
        Ok(info) => json_response(json!({ "dataset": info })),
        Err(err) => error_response(err),
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode response")
            .with_source(err)
    })
}

fn json_response(payload: Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert("tabserve-version", HeaderValue::from_static("0"));
    response
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::MalformedRow | ErrorKind::DuplicateColumn => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotLoaded => StatusCode::NOT_FOUND,
        ErrorKind::Io | ErrorKind::Syntax | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: err.kind().as_str().to_string(),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            path: err.path().map(|path| path.to_string_lossy().to_string()),
            row: err.row(),
        },
    };
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert("tabserve-version", HeaderValue::from_static("0"));
    response
}

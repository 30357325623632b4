//! Read-only JSON HTTP API over the monitor's outputs.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/contents` | Document count per collection |
//! | `GET`  | `/status` | Latest status updates, newest first |
//! | `GET`  | `/stats` | Derived statistics over the sampled series |
//!
//! Handlers never share a connection: each request opens the store with a
//! short bounded retry, so the server comes up (and answers `/health` and
//! `/stats` with "no data yet") before the pipeline's database exists.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "store_unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `store_unavailable` (503), `internal` (500).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use monitor_core::models::StatusRecord;
use monitor_core::store::{collection_counts, Store};

use crate::config::Config;
use crate::db;
use crate::error::MonitorError;
use crate::sqlite_store::SqliteStore;
use crate::stats::{build_report, read_series};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

/// Build the router. Split from [`run_server`] so it can be served on any
/// listener.
pub fn router(config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/contents", get(handle_contents))
        .route("/status", get(handle_status))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(AppState { config })
}

/// Serve on `[server].bind` until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(Arc::new(config.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "monitor API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<MonitorError> for AppError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::ConnectionUnavailable { .. } => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "store_unavailable".to_string(),
                message: err.to_string(),
            },
            other => internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(format!("{:#}", err))
    }
}

fn internal(message: impl ToString) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.to_string(),
    }
}

async fn open_store(state: &AppState) -> Result<SqliteStore, AppError> {
    db::connect_for_read(&state.config.store).await.map_err(|e| {
        tracing::warn!(error = %e, "store unavailable for request");
        AppError::from(e)
    })
}

// ============ Handlers ============

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct ContentsResponse {
    collections: BTreeMap<String, u64>,
}

async fn handle_contents(State(state): State<AppState>) -> Result<Json<ContentsResponse>, AppError> {
    let store = open_store(&state).await?;
    let collections = collection_counts(&store).await?.into_iter().collect();
    store.pool().close().await;
    Ok(Json(ContentsResponse { collections }))
}

#[derive(Serialize)]
struct StatusResponse {
    statuses: Vec<StatusRecord>,
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let store = open_store(&state).await?;
    let statuses = store.latest_statuses(state.config.stats.status_limit).await?;
    store.pool().close().await;
    Ok(Json(StatusResponse { statuses }))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let config = &state.config;
    let Some(loaded) = read_series(&config.sampler.series_path)? else {
        return Ok(Json(json!({ "status": "no data yet" })));
    };

    let store = open_store(&state).await?;
    let clones = store.clones().await?;
    store.pool().close().await;

    let report = build_report(config, loaded, &clones);
    Ok(Json(serde_json::to_value(report).map_err(internal)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::migrate;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config(tmp: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.store = StoreConfig {
            host: tmp.path().join("db").display().to_string(),
            name: "cloneDetector".to_string(),
            retry_backoff_ms: 1,
        };
        config.sampler.series_path = tmp.path().join("data.csv");
        config
    }

    /// Serve the router on an ephemeral port and return its address.
    async fn spawn(config: Config) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(config));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Minimal HTTP/1.1 GET returning (status code, JSON body).
    async fn get_json(addr: std::net::SocketAddr, path: &str) -> (u16, Value) {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let status: u16 = head.split_whitespace().nth(1).unwrap().parse().unwrap();
        (status, serde_json::from_str(body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::TempDir::new().unwrap();
        let addr = spawn(test_config(&tmp)).await;
        let (status, body) = get_json(addr, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_store_unavailable_is_503() {
        let tmp = tempfile::TempDir::new().unwrap();
        let addr = spawn(test_config(&tmp)).await;
        let (status, body) = get_json(addr, "/contents").await;
        assert_eq!(status, 503);
        assert_eq!(body["error"]["code"], "store_unavailable");
    }

    #[tokio::test]
    async fn test_stats_without_series() {
        let tmp = tempfile::TempDir::new().unwrap();
        let addr = spawn(test_config(&tmp)).await;
        let (status, body) = get_json(addr, "/stats").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "status": "no data yet" }));
    }

    #[tokio::test]
    async fn test_contents_status_and_stats() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(&tmp);
        migrate::run_migrations(&config).await.unwrap();

        let pool = db::open_pool(&config.store.db_path(), false).await.unwrap();
        sqlx::query(r#"INSERT INTO "files" (doc) VALUES ('{}'), ('{}')"#)
            .execute(&pool)
            .await
            .unwrap();
        for (ts, msg) in [(1.0, "Reading files"), (2.0, "Chunking")] {
            sqlx::query(r#"INSERT INTO "statusUpdates" (timestamp, message) VALUES (?, ?)"#)
                .bind(ts)
                .bind(msg)
                .execute(&pool)
                .await
                .unwrap();
        }
        for raw in [r#"[{"startLine":10,"endLine":25}]"#, "{bad"] {
            sqlx::query(r#"INSERT INTO "clones" (instances) VALUES (?)"#)
                .bind(raw)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
        std::fs::write(
            &config.sampler.series_path,
            "files,chunks,statusUpdates,elapsed\n2,0,2,1\n2,10,3,2\n2,30,3,4\n",
        )
        .unwrap();

        let addr = spawn(config).await;

        let (status, body) = get_json(addr, "/contents").await;
        assert_eq!(status, 200);
        assert_eq!(body["collections"]["files"], 2);
        assert_eq!(body["collections"]["statusUpdates"], 2);
        assert_eq!(body["collections"]["clones"], 2);

        let (status, body) = get_json(addr, "/status").await;
        assert_eq!(status, 200);
        assert_eq!(body["statuses"][0]["message"], "Chunking");
        assert_eq!(body["statuses"][1]["message"], "Reading files");

        let (status, body) = get_json(addr, "/stats").await;
        assert_eq!(status, 200);
        assert_eq!(body["samples"], 3);
        assert_eq!(body["per_file"]["chunks"], 15.0);
        assert_eq!(body["rates"]["chunks"][0]["rate"], 10.0);
        // The unreadable clone row is skipped, not fatal.
        assert_eq!(body["clone_size"]["average"], 15.0);
        assert_eq!(body["clone_size"]["malformed"], 1);
    }
}

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;

pub mod blobs;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod paths;
pub mod roster;
pub mod sqlite;
pub mod transfer;
pub mod tree;

extern crate serde;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::blobs::SqliteBlobs;
use crate::domain::{BlobStore, MetadataStore};
use crate::sqlite::{Mode, Sqlite};
use crate::transfer::Limits;
use std::env;
use std::net::SocketAddr;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const META_FILE: &str = "docstore.db";
const BLOB_FILE: &str = "docstore-blobs.db";
const CURRENT_DIR: &str = "./";
const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 3600;

extern crate tokio;

/// Shared handler state: where the two stores live plus the operational
/// knobs. Connections are opened per request.
pub struct AppState {
    pub meta_db: PathBuf,
    pub blob_db: PathBuf,
    pub limits: Limits,
    pub pending_timeout: Duration,
}

pub async fn run() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "docstore=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration from environment
    let meta_file = env::var("DOCSTORE_META_FILE").unwrap_or_else(|_| String::from(META_FILE));
    let blob_file = env::var("DOCSTORE_BLOB_FILE").unwrap_or_else(|_| String::from(BLOB_FILE));
    let dir = env::var("DOCSTORE_DATA_DIR").unwrap_or_else(|_| String::from(CURRENT_DIR));
    let port = env::var("DOCSTORE_PORT").unwrap_or_else(|_| String::from("5000"));
    let limits = Limits {
        max_upload_bytes: env::var("DOCSTORE_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Limits::default().max_upload_bytes),
    };
    let pending_timeout = Duration::from_secs(
        env::var("DOCSTORE_PENDING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PENDING_TIMEOUT_SECS),
    );

    // Start init
    let meta_db = Path::new(&dir).join(&meta_file);
    if !meta_db.exists() {
        Sqlite::open(meta_db.clone(), Mode::ReadWrite)
            .expect("Metadata database file cannot be created")
            .new_database()
            .unwrap_or_default();
    }
    let blob_db = Path::new(&dir).join(&blob_file);
    if !blob_db.exists() {
        SqliteBlobs::open(blob_db.clone(), Mode::ReadWrite)
            .expect("Blob database file cannot be created")
            .new_database()
            .unwrap_or_default();
    }

    let socket: SocketAddr = format!("0.0.0.0:{port}").parse().expect("Invalid port");
    tracing::debug!("listening on {socket}");

    let app = create_routes(AppState {
        meta_db,
        blob_db,
        limits,
        pending_timeout,
    });

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .expect("Cannot bind socket");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");
}

pub fn create_routes(state: AppState) -> Router {
    // raw bodies above this are refused outright; the application-level
    // upload limit producing a validation error is checked far below it
    let body_cap = state.limits.max_upload_bytes.saturating_mul(4);

    Router::new()
        .route("/api/browse", get(handlers::browse))
        .route("/api/folders", post(handlers::create_folder))
        .route("/api/files", post(handlers::upload_many))
        .route(
            "/api/files/:id_or_name",
            post(handlers::upload_file).get(handlers::get_file_content),
        )
        .route(
            "/api/records/:id",
            get(handlers::get_record)
                .patch(handlers::update_record)
                .delete(handlers::delete_record),
        )
        .route("/api/export", post(handlers::export))
        .route("/api/maintenance/reconcile", post(handlers::reconcile))
        .route("/api/roster/users/import", post(handlers::import_users))
        .route("/api/roster/users/export", get(handlers::export_users))
        .route("/api/roster/offers/import", post(handlers::import_offers))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_cap))
                .into_inner(),
        )
        .with_state(Arc::new(state))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    println!("signal received, starting graceful shutdown");
}

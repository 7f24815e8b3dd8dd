use plaza_common::{
    snowflake::{ProcessId, WorkerId},
    util::{NonPositiveDurationError, PositiveDuration},
};
use plaza_db::client::{DbClient, DbError};
use serde::Deserialize;
use server::{ServerState, Settings};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU64,
    sync::Arc,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid token lifetime: {0}")]
    InvalidTokenLifetime(#[from] NonPositiveDurationError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
    #[serde(default = "default_page_size")]
    page_size: NonZeroU64,
    token_lifetime_seconds: Option<i64>,
}

fn default_database_url() -> String {
    "sqlite://plaza.db?mode=rwc".to_owned()
}

fn default_database_max_connections() -> u32 {
    8
}

fn default_page_size() -> NonZeroU64 {
    plaza_common::model::page::DEFAULT_PAGE_SIZE
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "plaza_api=debug,plaza_db=debug,plaza_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Could not listen for ctrl-c, shutting down");
        } else {
            info!("Received ctrl-c, shutting down");
        }
        trigger.cancel();
    });

    shutdown
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let token_lifetime = env
        .token_lifetime_seconds
        .map(PositiveDuration::from_seconds)
        .transpose()?;

    let db_client = DbClient::connect(
        &env.database_url,
        env.database_max_connections,
        env.worker_id,
        env.process_id,
    )
    .await?;

    let state = ServerState {
        db_client: Arc::new(db_client),
        settings: Settings {
            page_size: env.page_size,
            token_lifetime,
        },
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().with_state(state).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_ctrl_c().cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}

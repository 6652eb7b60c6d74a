mod channels;
mod commands;
mod config;
mod errors;
mod events;
mod manager;
mod session;
mod state;
#[cfg(test)]
mod test_support;

use crate::config::load_config;
use crate::manager::handle_connection;
use crate::state::AppState;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use clap::Parser;
use pyx_client::HttpConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bridges IRC clients to a PYX game server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "gateway.json")]
    config: PathBuf,
}

#[tokio::main]
/// Activates tracing, loads the configuration, starts the optional admin listener and then
/// accepts client connections forever.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("{}=trace,pyx_client=debug,protocol=debug", env!("CARGO_CRATE_NAME"))
                        .into()
                }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let args = Args::parse();
    let config = match load_config(&args.config).await {
        Ok(config) => config,
        Err(message) => {
            tracing::error!(message, "Initial load error.");
            return;
        }
    };

    let connector = Arc::new(HttpConnector::new(config.backend.clone()));
    let state = Arc::new(AppState::new(config, connector));

    if let Some(admin_port) = state.config.admin_port {
        let app = Router::new()
            .route("/enlist", get(enlist_handler))
            .with_state(state.clone());
        match TcpListener::bind(("127.0.0.1", admin_port)).await {
            Ok(listener) => {
                tokio::spawn(async move {
                    if let Err(error) = axum::serve(listener, app).await {
                        tracing::error!(?error, "Admin listener failed.");
                    }
                });
            }
            Err(error) => tracing::error!(?error, admin_port, "Unable to bind admin listener."),
        }
    }

    let listener =
        match TcpListener::bind((state.config.bind_address.as_str(), state.config.port)).await {
            Ok(listener) => listener,
            Err(error) => {
                tracing::error!(?error, "Unable to bind client listener.");
                return;
            }
        };
    tracing::info!(
        address = %state.config.bind_address,
        port = state.config.port,
        "Accepting clients."
    );

    loop {
        match listener.accept().await {
            Ok((stream, address)) => {
                tokio::spawn(handle_connection(stream, address, state.clone()));
            }
            Err(error) => tracing::warn!(?error, "Accept failed."),
        }
    }
}

/// Lists the live sessions with address, nickname and connection time.
async fn enlist_handler(State(state): State<Arc<AppState>>) -> String {
    state.listing().await
}

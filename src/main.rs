// wagate - Realtime channel, response cache and session store for the WhatsApp gateway portal
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use wagate::auth::{TokenCipher, TokenStore};
use wagate::cli::Args;
use wagate::config::{AppConfig, DEFAULT_ENCRYPTION_SECRET};
use wagate::realtime::RealtimeChannel;
use wagate::server::create_router;
use wagate::storage::FileStore;
use wagate::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting wagate v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Open the encrypted session store
    if config.storage.encryption_secret == DEFAULT_ENCRYPTION_SECRET {
        warn!("Using the built-in encryption secret; set storage.encryption_secret for real deployments");
    }
    let storage = FileStore::open(&config.storage.path)
        .with_context(|| format!("opening session store {}", config.storage.path))?;
    let tokens = TokenStore::new(
        Arc::new(storage),
        TokenCipher::from_secret(&config.storage.encryption_secret),
    );

    // Phase 3.5: Session management flags
    if args.logout {
        tokens.clear()?;
        info!("Stored session removed");
        return Ok(());
    }
    if let Some(token) = &args.set_token {
        tokens.set_token(token)?;
        info!("Session token stored");
    }
    if let Some(token) = &args.set_refresh_token {
        tokens.set_refresh_token(token)?;
        info!("Refresh token stored");
    }
    if args.status {
        print_session(&tokens);
        return Ok(());
    }
    if !tokens.is_logged_in() {
        warn!("Stored session token is missing or expired; the gateway may refuse the connection");
    }

    // Phase 4: Connect the realtime channel
    let channel = RealtimeChannel::new(config.realtime.clone(), Arc::new(tokens.clone()));
    let mut inbound = channel.connect()?;
    let mut statuses = channel.status_stream();

    tokio::spawn(async move {
        while let Some(message) = inbound.next().await {
            if args.wants_event(&message.event) {
                info!(event = %message.event, data = %message.data, "Gateway event");
            }
        }
    });

    tokio::spawn(async move {
        while let Some(status) = statuses.next().await {
            if status.connected {
                info!("Realtime channel connected");
            } else if status.reconnecting {
                warn!("Realtime channel reconnecting");
            } else if let Some(e) = &status.error {
                error!("Realtime channel down: {}", e);
            } else {
                info!("Realtime channel closed");
            }
        }
    });

    // Phase 5: Optional status server, then run until shutdown
    if config.server.enabled {
        let app = create_router(channel.clone(), tokens.clone());
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

        info!("Status server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    // Phase 6: Close the socket with a normal closure
    channel.disconnect();
    info!("Shut down gracefully");
    Ok(())
}

fn print_session(tokens: &TokenStore) {
    println!("logged in:     {}", tokens.is_logged_in());
    match tokens.token_expiration() {
        Some(exp) => println!("token expires: {}", exp.to_rfc3339()),
        None if tokens.get_token().is_some() => println!("token expires: unknown"),
        None => println!("token:         none"),
    }
    println!("refresh token: {}", tokens.get_refresh_token().is_some());
    match tokens.get_user() {
        Some(user) => println!("user:          {} <{}>", user.name, user.email),
        None => println!("user:          none"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

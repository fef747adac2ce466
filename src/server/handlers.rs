// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::metrics::gather_metrics;
use crate::realtime::ConnectionStatus;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sessions closer than this to expiry report as degraded.
const EXPIRY_WARNING_SECS: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

impl HealthCheck {
    fn new(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
        }
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(build_health(
        &state.channel.status(),
        state.tokens.get_token().is_some(),
        state.tokens.token_expiration(),
        Utc::now(),
    ))
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

fn build_health(
    connection: &ConnectionStatus,
    has_token: bool,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> HealthResponse {
    let mut checks = HashMap::new();
    let mut overall = HealthStatus::Healthy;

    let realtime = if connection.connected {
        HealthCheck::new("ok", "Connected")
    } else if connection.reconnecting {
        overall = HealthStatus::Degraded;
        HealthCheck::new("warning", "Reconnecting")
    } else {
        overall = HealthStatus::Unhealthy;
        match &connection.error {
            Some(e) => HealthCheck::new("error", e.clone()),
            None => HealthCheck::new("error", "Disconnected"),
        }
    };
    checks.insert("realtime".to_string(), realtime);

    let session = match (has_token, expires_at) {
        (false, _) => {
            overall = HealthStatus::Unhealthy;
            HealthCheck::new("error", "No session token")
        }
        (true, None) => {
            overall = HealthStatus::Unhealthy;
            HealthCheck::new("error", "Token has no readable expiry")
        }
        (true, Some(exp)) => {
            let expires_in = (exp - now).num_seconds();
            if expires_in <= 0 {
                overall = HealthStatus::Unhealthy;
                HealthCheck::new("error", "Token expired")
            } else if expires_in < EXPIRY_WARNING_SECS {
                if overall == HealthStatus::Healthy {
                    overall = HealthStatus::Degraded;
                }
                HealthCheck::new("warning", format!("Token expires in {} seconds", expires_in))
            } else {
                HealthCheck::new("ok", format!("Valid token, expires in {} seconds", expires_in))
            }
        }
    };
    checks.insert("session".to_string(), session);

    HealthResponse {
        status: overall,
        checks,
        timestamp: now.to_rfc3339(),
    }
}

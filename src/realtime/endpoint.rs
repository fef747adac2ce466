// WebSocket endpoint resolution
// Author: kelexine (https://github.com/kelexine)

use crate::config::RealtimeConfig;
use crate::error::{PortalError, Result};
use url::Url;

/// Build the URL the channel dials, with the credential as `?token=`.
///
/// An explicit `ws_url` wins. Otherwise the endpoint is derived from the
/// portal `origin` plus `path`. `http`/`https` are upgraded to `ws`/`wss`
/// in both cases; any other scheme is rejected.
pub fn resolve_endpoint(config: &RealtimeConfig, token: &str) -> Result<String> {
    let explicit = non_empty(config.ws_url.as_deref());
    let origin = non_empty(config.origin.as_deref());

    let url = match (explicit, origin) {
        (Some(ws_url), _) => upgrade_scheme(parse(ws_url)?)?,
        (None, Some(origin)) => {
            let mut url = upgrade_scheme(parse(origin)?)?;
            url.set_path(&config.path);
            url.set_query(None);
            url
        }
        (None, None) => {
            return Err(PortalError::Endpoint(
                "neither realtime.ws_url nor realtime.origin is configured".to_string(),
            ))
        }
    };

    let separator = if url.query().is_some() { '&' } else { '?' };
    Ok(format!(
        "{}{}token={}",
        url.as_str(),
        separator,
        urlencoding::encode(token)
    ))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| PortalError::Endpoint(format!("invalid URL {}: {}", raw, e)))
}

fn upgrade_scheme(mut url: Url) -> Result<Url> {
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(PortalError::Endpoint(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| PortalError::Endpoint(format!("cannot use scheme {}", scheme)))?;
    url.set_fragment(None);
    Ok(url)
}

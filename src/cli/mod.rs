// CLI module for wagate
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;

/// wagate - WhatsApp gateway portal realtime client
#[derive(Parser, Debug)]
#[command(name = "wagate", version, about, long_about = None)]
pub struct Args {
    /// Config file path (defaults to ~/.wagate/config.toml)
    #[arg(long, env = "WAGATE_CONFIG")]
    pub config: Option<String>,

    /// Store a bearer token (encrypted) before connecting
    #[arg(long, value_name = "TOKEN")]
    pub set_token: Option<String>,

    /// Store a refresh token (encrypted)
    #[arg(long, value_name = "TOKEN")]
    pub set_refresh_token: Option<String>,

    /// Remove every stored credential and exit
    #[arg(long)]
    pub logout: bool,

    /// Print the stored session state and exit
    #[arg(long)]
    pub status: bool,

    /// Only log these events (repeatable). Logs everything when omitted.
    #[arg(long = "event", value_name = "EVENT")]
    pub events: Vec<String>,
}

impl Args {
    /// Whether an inbound event passes the `--event` filters.
    pub fn wants_event(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_filters() {
        let args = Args::parse_from(["wagate", "--event", "message.received", "--event", "device.status"]);
        assert_eq!(args.events.len(), 2);
        assert!(args.wants_event("device.status"));
        assert!(!args.wants_event("qr.updated"));

        let all = Args::parse_from(["wagate"]);
        assert!(all.wants_event("anything"));
        assert!(!all.logout);
    }

    #[test]
    fn test_token_flags() {
        let args = Args::parse_from(["wagate", "--set-token", "abc", "--status"]);
        assert_eq!(args.set_token.as_deref(), Some("abc"));
        assert!(args.status);
        assert!(args.set_refresh_token.is_none());
    }
}

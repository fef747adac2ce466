// wagate - Realtime channel, response cache and session store for the WhatsApp gateway portal
// Author: kelexine (https://github.com/kelexine)

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod realtime;
pub mod server;
pub mod storage;
pub mod utils;

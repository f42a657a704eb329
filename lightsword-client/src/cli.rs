use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{ProxyMode, RawConfig};

/// Routing mode for non-local destinations
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Relay everything
    #[value(name = "global")]
    Global,
    /// Connect blacklisted suffixes directly, relay the rest
    #[value(name = "blacklist")]
    Blacklist,
    /// Relay whitelisted suffixes
    #[value(name = "whitelist")]
    Whitelist,
}

impl From<Mode> for ProxyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Global => ProxyMode::Global,
            Mode::Blacklist => ProxyMode::Blacklist,
            Mode::Whitelist => ProxyMode::Whitelist,
        }
    }
}

/// LightSword local SOCKS5 proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "lightsword-local")]
#[command(version)]
#[command(about = "Local SOCKS5 proxy for a LightSword relay", long_about = None)]
pub struct Args {
    /// JSON config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Relay host
    #[arg(short, long)]
    pub server: Option<String>,

    /// Relay port
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Local bind address
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Local SOCKS5 port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Handshake cipher (aes-128-cfb, aes-192-cfb, aes-256-cfb)
    #[arg(long)]
    pub method: Option<String>,

    /// Shared secret with the relay
    #[arg(long)]
    pub password: Option<String>,

    /// Per-read timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Send private and loopback destinations through the normal routing
    #[arg(long)]
    pub no_bypass_local: bool,

    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Domain suffix to connect directly in blacklist mode (repeatable)
    #[arg(long = "blacklist", value_name = "SUFFIX")]
    pub black_list: Vec<String>,

    /// Domain suffix to relay in whitelist mode (repeatable)
    #[arg(long = "whitelist", value_name = "SUFFIX")]
    pub white_list: Vec<String>,

    /// Log traffic totals every N seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    pub stats_interval: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Settings given on the command line, as overrides for the config file
    pub fn overrides(&self) -> RawConfig {
        RawConfig {
            server_addr: self.server.clone(),
            server_port: self.server_port,
            listen_addr: self.bind.clone(),
            listen_port: self.port,
            cipher_algorithm: self.method.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
            bypass_local: self.no_bypass_local.then_some(false),
            black_list: (!self.black_list.is_empty()).then(|| self.black_list.clone()),
            white_list: (!self.white_list.is_empty()).then(|| self.white_list.clone()),
            proxy_mode: self.mode.map(ProxyMode::from),
        }
    }
}

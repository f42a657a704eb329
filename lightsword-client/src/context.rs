//! Shared state for one running server instance

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::config::ServerConfig;
use crate::crypto::CipherContext;
use crate::random::RandomSource;
use crate::router::Router;
use crate::stats::TrafficStats;

/// Everything a connection handler needs, built once per server.
///
/// Only `stats` is mutated after construction.
pub struct Context {
    config: ServerConfig,
    router: Router,
    cipher: CipherContext,
    stats: Arc<TrafficStats>,
    random: Arc<dyn RandomSource>,
    runtime: Handle,
}

impl Context {
    pub fn new(
        config: ServerConfig,
        stats: Arc<TrafficStats>,
        random: Arc<dyn RandomSource>,
        runtime: Handle,
    ) -> Self {
        let router = Router::new(&config);
        let cipher = CipherContext::new(config.cipher, &config.password);
        Self {
            config,
            router,
            cipher,
            stats,
            random,
            runtime,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cipher(&self) -> &CipherContext {
        &self.cipher
    }

    pub fn stats(&self) -> &Arc<TrafficStats> {
        &self.stats
    }

    pub fn random(&self) -> &dyn RandomSource {
        self.random.as_ref()
    }

    /// Scheduler every connection and forwarding task is spawned on
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

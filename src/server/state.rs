//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers via Axum's state extraction.

use crate::config::Settings;
use crate::services::{
    CredentialPool, HttpUpstream, RelayOptions, RequestTransformer, UpstreamDispatcher,
    UpstreamTransport,
};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
///
/// Everything here is immutable after startup and cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Failover dispatcher over the credential pool
    pub dispatcher: UpstreamDispatcher,

    /// Caller request to upstream request conversion
    pub transformer: RequestTransformer,

    /// How successful replies are relayed
    pub relay: RelayOptions,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create the application state with the HTTP upstream transport
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        tracing::debug!(
            upstream_url = %settings.upstream_url,
            connect_timeout_s = settings.timeouts.connect_timeout_seconds,
            attempt_timeout_s = settings.timeouts.attempt_timeout_seconds,
            "Creating upstream HTTP client"
        );
        let transport = HttpUpstream::from_settings(&settings)
            .context("Failed to build upstream HTTP client")?;

        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    /// Create the application state around any transport
    pub fn with_transport(settings: Settings, transport: Arc<dyn UpstreamTransport>) -> Self {
        let pool = CredentialPool::from_newline_delimited(&settings.upstream_api_keys);

        if pool.is_empty() {
            tracing::warn!("No upstream credentials configured, every chat completion will fail");
        } else {
            tracing::info!(
                credentials = pool.len(),
                names = ?pool.iter().map(|c| c.name()).collect::<Vec<_>>(),
                "Credential pool loaded"
            );
        }

        let transformer = RequestTransformer::from_settings(&settings);
        let relay = RelayOptions {
            idle_timeout: settings.timeouts.stream_idle_timeout(),
        };

        let dispatcher = UpstreamDispatcher::new(
            Arc::new(pool),
            transport,
            settings.timeouts.attempt_timeout(),
        );

        Self {
            settings: Arc::new(settings),
            dispatcher,
            transformer,
            relay,
            start_time: Instant::now(),
        }
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Number of upstream credentials available for failover
    pub fn credential_count(&self) -> usize {
        self.dispatcher.pool().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_builds_pool_from_settings() {
        let settings = Settings {
            upstream_api_keys: "key-a\n\n  key-b  \n".to_string(),
            ..Settings::default()
        };
        let state = AppState::new(settings).unwrap();

        assert_eq!(state.credential_count(), 2);
        assert_eq!(state.relay.idle_timeout, state.settings.timeouts.stream_idle_timeout());
    }
}

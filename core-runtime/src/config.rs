//! # Core Configuration Module
//!
//! Provides configuration management for the player core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding the server location, the injected host capabilities and feature
//! flags. It enforces fail-fast validation so a session never starts with a
//! missing transport or a malformed URL.
//!
//! ## Required Dependencies
//!
//! - `WebSocketConnector` - Opens the backend socket (desktop default:
//!   `TungsteniteConnector`, injected with the `desktop-shims` feature)
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Wall-clock source for message timestamps (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .server_url("ws://localhost:8765")
//!     .enable_preload(true)
//!     .build()
//!     .expect("Failed to build config");
//!
//! assert_eq!(config.websocket_url(), "ws://localhost:8765/ws");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing server URL
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing server url");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, SystemClock, WebSocketConnector};
use std::sync::Arc;

/// Default WebSocket endpoint path on the player backend.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Core configuration for the player core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Backend base URL, `ws://` or `wss://`
    pub server_url: String,

    /// WebSocket endpoint path appended to `server_url`
    pub ws_path: String,

    /// Socket transport (required)
    pub connector: Arc<dyn WebSocketConnector>,

    /// Timestamp source for outgoing messages
    pub clock: Arc<dyn Clock>,

    /// Feature flags
    pub features: FeatureFlags,

    /// Buffer size of the session event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("server_url", &self.server_url)
            .field("ws_path", &self.ws_path)
            .field("connector", &"WebSocketConnector { ... }")
            .field("clock", &"Clock { ... }")
            .field("features", &self.features)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Fetch chunks ahead of the playhead through the injected loader
    pub enable_preload: bool,

    /// Keep the socket alive with application-level PING/PONG
    pub enable_heartbeat: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_preload: true,
            enable_heartbeat: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Full socket URL: `server_url` without trailing slashes, then `ws_path`.
    pub fn websocket_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.ws_path)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Server URL uses the `ws://` or `wss://` scheme and names a host
    /// - WebSocket path starts with `/`
    /// - Event buffer size is within (0, 10_000]
    pub fn validate(&self) -> Result<()> {
        let rest = self
            .server_url
            .strip_prefix("ws://")
            .or_else(|| self.server_url.strip_prefix("wss://"))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Server URL '{}' must start with ws:// or wss://",
                    self.server_url
                ))
            })?;

        if rest.trim_matches('/').is_empty() {
            return Err(Error::Config(format!(
                "Server URL '{}' has no host",
                self.server_url
            )));
        }

        if !self.ws_path.starts_with('/') {
            return Err(Error::Config(format!(
                "WebSocket path '{}' must start with '/'",
                self.ws_path
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 10_000 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 10,000".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn connector_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "WebSocketConnector".to_string(),
        message: "WebSocketConnector implementation is required to reach the player backend. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TungsteniteConnector. \
                 Tests: inject an in-memory connector."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_connector() -> Result<Arc<dyn WebSocketConnector>> {
    use bridge_desktop::TungsteniteConnector;

    let connector: Arc<dyn WebSocketConnector> = Arc::new(TungsteniteConnector::new());
    Ok(connector)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_connector() -> Result<Arc<dyn WebSocketConnector>> {
    Err(connector_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    server_url: Option<String>,
    ws_path: Option<String>,
    connector: Option<Arc<dyn WebSocketConnector>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the backend base URL (required).
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().server_url("wss://player.local:8765");
    /// ```
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Overrides the WebSocket path. Defaults to `/ws`.
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = Some(path.into());
        self
    }

    /// Sets the socket transport.
    ///
    /// Required unless the `desktop-shims` feature provides one.
    pub fn connector(mut self, connector: Arc<dyn WebSocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the timestamp source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Enables or disables chunk preloading.
    pub fn enable_preload(mut self, enabled: bool) -> Self {
        self.features.enable_preload = enabled;
        self
    }

    /// Enables or disables the application heartbeat.
    pub fn enable_heartbeat(mut self, enabled: bool) -> Self {
        self.features.enable_heartbeat = enabled;
        self
    }

    /// Replaces all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the server URL is missing or malformed
    /// - `Error::CapabilityMissing` if no connector was injected and no
    ///   platform default exists
    pub fn build(self) -> Result<CoreConfig> {
        let server_url = self.server_url.ok_or_else(|| {
            Error::Config("Server URL is required. Use .server_url() to set it.".to_string())
        })?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => provide_default_connector()?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let config = CoreConfig {
            server_url,
            ws_path: self.ws_path.unwrap_or_else(|| DEFAULT_WS_PATH.to_string()),
            connector,
            clock,
            features: self.features,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BridgeError, ManualClock, WebSocketChannel};
    use mockall::mock;

    mock! {
        pub Connector {}

        #[async_trait::async_trait]
        impl WebSocketConnector for Connector {
            async fn connect(&self, url: &str) -> BridgeResult<WebSocketChannel>;
        }
    }

    fn builder_with_connector() -> CoreConfigBuilder {
        CoreConfig::builder()
            .server_url("ws://localhost:8765")
            .connector(Arc::new(MockConnector::new()))
    }

    #[test]
    fn test_builder_with_required_fields() {
        let config = builder_with_connector().build().unwrap();

        assert_eq!(config.server_url, "ws://localhost:8765");
        assert_eq!(config.ws_path, DEFAULT_WS_PATH);
        assert_eq!(config.websocket_url(), "ws://localhost:8765/ws");
        assert_eq!(config.event_buffer_size, crate::events::DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.features, FeatureFlags::default());
    }

    #[test]
    fn test_builder_requires_server_url() {
        let result = CoreConfig::builder()
            .connector(Arc::new(MockConnector::new()))
            .build();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Server URL is required")),
            other => panic!("Expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_connector() {
        let result = CoreConfig::builder()
            .server_url("ws://localhost:8765")
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, message }) => {
                assert_eq!(capability, "WebSocketConnector");
                assert!(message.contains("desktop-shims"));
            }
            other => panic!("Expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_connector() {
        let config = CoreConfig::builder()
            .server_url("ws://localhost:8765")
            .build()
            .expect("desktop connector injected");
        assert_eq!(config.websocket_url(), "ws://localhost:8765/ws");
    }

    #[test]
    fn test_rejects_http_scheme() {
        let result = CoreConfig::builder()
            .server_url("http://localhost:8765")
            .connector(Arc::new(MockConnector::new()))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("ws://")));
    }

    #[test]
    fn test_rejects_missing_host() {
        let result = CoreConfig::builder()
            .server_url("wss:///")
            .connector(Arc::new(MockConnector::new()))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("no host")));
    }

    #[test]
    fn test_rejects_relative_ws_path() {
        let result = builder_with_connector().ws_path("socket").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_event_buffer() {
        let result = builder_with_connector().event_buffer_size(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_websocket_url_trims_trailing_slash() {
        let config = CoreConfig::builder()
            .server_url("wss://player.local:8765/")
            .ws_path("/live")
            .connector(Arc::new(MockConnector::new()))
            .build()
            .unwrap();
        assert_eq!(config.websocket_url(), "wss://player.local:8765/live");
    }

    #[test]
    fn test_feature_flags() {
        assert!(FeatureFlags::default().enable_preload);
        assert!(FeatureFlags::default().enable_heartbeat);

        let config = builder_with_connector()
            .enable_preload(false)
            .enable_heartbeat(false)
            .build()
            .unwrap();
        assert!(!config.features.enable_preload);
        assert!(!config.features.enable_heartbeat);
    }

    #[test]
    fn test_custom_clock_is_kept() {
        let expected = SystemClock.now() - chrono::Duration::days(1);
        let clock = Arc::new(ManualClock::new(expected));
        let config = builder_with_connector()
            .clock(clock.clone())
            .build()
            .unwrap();
        assert_eq!(config.clock.now(), expected);

        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(config.clock.now(), expected + chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_connector_is_shared_on_clone() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|url| url.ends_with("/ws"))
            .times(2)
            .returning(|_| Err(BridgeError::ConnectionFailed("refused".to_string())));

        let config = CoreConfig::builder()
            .server_url("ws://localhost:8765")
            .connector(Arc::new(connector))
            .build()
            .unwrap();
        let cloned = config.clone();
        let url = config.websocket_url();

        assert!(config.connector.connect(&url).await.is_err());
        assert!(cloned.connector.connect(&url).await.is_err());
    }

    #[test]
    fn test_debug_hides_capabilities() {
        let config = builder_with_connector()
            .clock(Arc::new(ManualClock::new(SystemClock.now())))
            .build()
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("WebSocketConnector { ... }"));
        assert!(debug.contains("ws://localhost:8765"));
    }
}

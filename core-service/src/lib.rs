//! Core service façade.
//!
//! [`PlayerSession`] wires one protocol client, one playback controller and
//! one chunk preloader together for a host application, and republishes what
//! they report on a single [`EventBus`](core_runtime::events::EventBus).
//! Desktop apps typically enable the `desktop-shims` feature, which lets
//! `CoreConfig::builder()` fall back to the `tokio-tungstenite` connector from
//! `bridge-desktop`.

pub mod error;
mod events;
pub mod session;

pub use error::{CoreError, Result};
pub use events::playback_event;
pub use session::{PlayerSession, SessionOptions};

pub use core_runtime::config::{CoreConfig, FeatureFlags};
pub use core_runtime::events::{CoreEvent, EventStream};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::TungsteniteConnector;

//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-service`, `core-playback`, `core-protocol`). Host applications
//! can depend on `auralis-workspace` and enable the documented features without
//! wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service;

#[cfg(feature = "playback-only")]
pub use core_playback;

#[cfg(feature = "protocol-only")]
pub use core_protocol;

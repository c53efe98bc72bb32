//! Slotnet Server - pooled TCP listener engine
//!
//! This library provides a high-connection-count TCP engine built on
//! pre-allocated operation slots, a single fixed buffer arena and a counting
//! admission gate, so neither memory nor live connections grow under load.

pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod session;
pub mod util;

pub use cipher::{CipherRegistry, StreamCipher};
pub use config::Config;
pub use engine::{Engine, EngineBuilder, EngineConfig, EngineObserver};
pub use error::EngineError;
pub use session::{Session, SessionCore, SessionFactory};

/// Server version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

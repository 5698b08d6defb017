//! greenproof host glue — the [`Engine`] facade that composes verification
//! and rewards over one store, plus configuration and logging setup.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::NodeConfig;
pub use engine::{Engine, EngineEvent};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};

//! Core utilities, configuration, errors and the HTTP server

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod utils;
pub mod web_server;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use logging::{init_logger, log_tools_configuration, startup_banner};
pub use web_server::{router, start_web_server, AppState};

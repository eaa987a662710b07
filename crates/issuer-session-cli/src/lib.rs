/*
[INPUT]:  Public API exports for issuer-session-cli crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod commands;
pub mod config;
pub mod context;
pub mod terminal;

// Re-export main types for convenience
pub use config::CliConfig;
pub use context::AppContext;
pub use terminal::{TerminalConfirmation, TerminalPopupHost};

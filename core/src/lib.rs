pub mod cli;
pub mod config;
pub mod interpreter;

// Re-export the embedding API
pub use config::Config;
pub use interpreter::{check_script, LoopError, Session, SessionBuilder, Value, Workspace};

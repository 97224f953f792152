// src/commands/mod.rs
pub mod add;
pub mod list;
pub mod rem;
pub mod start;

use teloxide::RequestError;

/// Result type for command handlers
pub type CmdResult = Result<(), RequestError>;

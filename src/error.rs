// src/error.rs

//! Error types for the reporter
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Fatal at start-up.
    #[error("config error: {0}")]
    Config(String),

    #[error("state file error: {0}")]
    Store(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("send error: {0}")]
    Send(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Self {
        Error::Send(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

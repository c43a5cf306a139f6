//! Single error type for the crate. No public entry point (`get_flag`,
//! `track_event`, `set_attribute`) ever returns one of these to its caller --
//! they're logged via `tracing` and swallowed into a neutral result instead.
//! `CoreError` only escapes from `Client::init` and `Client::update_settings`,
//! where a caller genuinely needs to know construction failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("predicate evaluation error: {0}")]
    Predicate(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

//! Runtime settings for voiceturn deployments
//!
//! Settings are layered from an optional file and `VOICETURN_`-prefixed
//! environment variables, validated once at load time. Every tunable has
//! a documented default; the coordinator exposes runtime setters for the
//! thresholds on top of these startup values.

pub mod settings;

pub use settings::{
    load_settings, InterruptSettings, ReplySettings, SessionSettings, Settings, VadSettings,
};

use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

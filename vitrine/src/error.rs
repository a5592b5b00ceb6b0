use std::io;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use vitrine_contrib_content::ContentError;
use vitrine_contrib_settings::SettingsError;

use crate::auth::TokenConfigError;

/// Error type for vitrine's start-up
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum VitrineError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] envy::Error),

    #[error("Invalid token configuration: {0}")]
    Tokens(#[from] TokenConfigError),

    #[error("Failed to install the tracing subscriber: {0}")]
    Tracing(#[from] TryInitError),

    #[error("Failed to load the settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to load the content: {0}")]
    Content(#[from] ContentError),
}

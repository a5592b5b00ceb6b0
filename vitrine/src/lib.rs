//! Branding settings and content blocks served over http
//!
//! The server keeps two stores in memory, one for the branding settings
//! (company name, logo, primary color, ...) and one for the content blocks of the public site.
//! Admins edit both through the api, the public site reads them through the public endpoints.
//!
//! Start with [`Vitrine::new`].

/// Re-exports of the store crates
pub mod contrib {
    pub use vitrine_contrib_content as content;
    pub use vitrine_contrib_settings as settings;
}

pub mod core {
    pub use vitrine_core::*;
}

pub use crate::router::router;
pub use crate::state::AppState;
pub use crate::vitrine::*;

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
mod router;
mod state;
pub mod tracing;
pub mod uploads;
mod vitrine;

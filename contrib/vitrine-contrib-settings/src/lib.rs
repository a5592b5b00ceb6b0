//! Runtime branding settings for vitrine
//!
//! # "Settings" refresher
//!
//! In vitrine's naming, **"settings"** refer to global values
//! which can be changed at runtime (by an admin) and don't require a server restart.
//! The company name, the logo and the primary color are settings.
//! They are stored in the database.
//!
//! **"config"** values require a restart and access to the application's host server.
//! They are stored in environment variables.
//!
//! # Starting point
//! Pick a [`SettingsBackend`] ([`RormSettingsBackend`] in production,
//! [`MemorySettingsBackend`] in tests) and hand it to [`SettingsStore::load`].
#![warn(missing_docs)]

pub use crate::backend::MemoryBackendError;
pub use crate::backend::MemorySettingsBackend;
pub use crate::backend::RormBackendError;
pub use crate::backend::RormSettingsBackend;
pub use crate::backend::SettingRecord;
pub use crate::backend::SettingsBackend;
pub use crate::model::VitrineSetting;
pub use crate::settings_store::SettingsError;
pub use crate::settings_store::SettingsSnapshot;
pub use crate::settings_store::SettingsStore;

mod backend;
mod model;
mod settings_store;

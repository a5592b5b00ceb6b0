//! Client side of vitrine
//!
//! - [`ApiClient`] speaks to the vitrine server.
//! - [`ResourceCache`] is the single place views read settings and content from.
//!   It refetches whatever a mutation could have changed.
//! - [`branding`] turns a settings snapshot into the side effects a page applies
//!   (title, favicon, css variables, logo).
//! - [`editor`] edits the content blocks of one section without knowing their shape up front.
#![warn(missing_docs)]

pub use crate::api::ApiClient;
pub use crate::api::UploadTarget;
pub use crate::api::VitrineApi;
pub use crate::cache::Resource;
pub use crate::cache::ResourceCache;
pub use crate::cache::ResourceKey;
pub use crate::cache::ResourceState;
pub use crate::cache::Subscription;
pub use crate::error::ClientError;

mod api;
pub mod branding;
mod cache;
pub mod editor;
mod error;

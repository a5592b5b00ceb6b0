//! Editable content blocks for vitrine's public site
//!
//! A content block is an arbitrary json value addressed by a `section` (a part of a page)
//! and an `identifier` (the block's name inside that section).
//! Its shape is up to the page rendering it: a string, a list of records or some object.
//!
//! # Starting point
//! Pick a [`ContentBackend`] ([`RormContentBackend`] in production,
//! [`MemoryContentBackend`] in tests) and hand it to [`ContentStore::load`].
#![warn(missing_docs)]

pub use crate::backend::ContentBackend;
pub use crate::backend::MemoryBackendError;
pub use crate::backend::MemoryContentBackend;
pub use crate::backend::RormBackendError;
pub use crate::backend::RormContentBackend;
pub use crate::content_store::ContentError;
pub use crate::content_store::ContentSnapshot;
pub use crate::content_store::ContentStore;
pub use crate::model::VitrineContent;

mod backend;
mod content_store;
mod model;

//! Assorted building blocks for handlers

pub mod api_error;
pub mod api_json;

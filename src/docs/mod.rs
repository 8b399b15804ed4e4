//! API Documentation module
//!
//! Provides OpenAPI document generation using utoipa.

mod openapi;

pub use openapi::ApiDoc;

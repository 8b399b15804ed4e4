//! Export the OpenAPI document to static JSON file
//!
//! Usage: cargo run --bin export_openapi
//!
//! Generates docs/openapi.json for SDK generation and API linting.

use anyhow::{Context, Result};
use bazaar::docs::ApiDoc;
use std::fs;
use utoipa::OpenApi;

fn main() -> Result<()> {
    let document = ApiDoc::openapi();
    let json = document
        .to_pretty_json()
        .context("Failed to serialize OpenAPI document")?;

    // Ensure docs directory exists
    fs::create_dir_all("docs").context("Failed to create docs directory")?;

    fs::write("docs/openapi.json", json).context("Failed to write openapi.json")?;
    println!("Exported OpenAPI document to docs/openapi.json");
    Ok(())
}

//! Writes the tutoring API's OpenAPI document.
//!
//! Usage: `openapi [OUTPUT]` (defaults to `openapi.json`).

use tutor_api::router::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let doc = ApiDoc::openapi();
    std::fs::write(&output, doc.to_pretty_json()?)?;
    println!(
        "Wrote {} paths to {}",
        doc.paths.paths.len(),
        output
    );
    Ok(())
}

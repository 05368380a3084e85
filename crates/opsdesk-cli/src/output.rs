use anyhow::{Context, Result};
use serde::Serialize;

pub fn render_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).context("Failed to serialize output")
    } else {
        serde_json::to_string(value).context("Failed to serialize output")
    }
}

/// One JSON document per line on stdout
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    println!("{}", render_json(value, pretty)?);
    Ok(())
}

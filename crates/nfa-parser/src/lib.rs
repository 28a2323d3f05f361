pub mod json;
pub mod text;

pub use json::parse_json;
pub use text::{TextParser, parse_text};

use nfa_core::{Error, ParseResult, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Surface syntax of a ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Text,
    Json,
}

impl Format {
    /// `.json` files are JSON, everything else is text
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Text,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Text => f.write_str("text"),
            Format::Json => f.write_str("json"),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "nft" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

pub fn parse(content: &str, format: Format) -> Result<ParseResult> {
    match format {
        Format::Text => Ok(parse_text(content)),
        Format::Json => parse_json(content),
    }
}

/// Read and parse a ruleset file; without an explicit format the extension
/// decides.
pub fn parse_file(path: &Path, format: Option<Format>) -> Result<ParseResult> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let format = format.unwrap_or_else(|| Format::from_path(path));
    tracing::debug!("Parsing {:?} as {}", path, format);
    parse(&content, format)
}

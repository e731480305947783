//! Comment input: JSON or YAML arrays from a file or stdin.

use std::path::Path;

use anyhow::{Context, Result};

use crate::models::Comment;

/// Read comments from `path`, or stdin when `None`.
pub fn read_comments(path: Option<&Path>) -> Result<Vec<Comment>> {
    let (content, yaml_hint) = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file '{}'", path.display()))?;
            let yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            (content, yaml)
        }
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            (buf, false)
        }
    };
    parse_comments(&content, yaml_hint)
}

/// Parse a comment array. JSON is tried first unless the source looked like
/// YAML; YAML is the fallback either way.
pub fn parse_comments(content: &str, yaml_hint: bool) -> Result<Vec<Comment>> {
    if !yaml_hint {
        if let Ok(comments) = serde_json::from_str::<Vec<Comment>>(content) {
            return Ok(comments);
        }
    }
    serde_yaml_ng::from_str::<Vec<Comment>>(content)
        .map_err(|e| anyhow::anyhow!("Invalid comment input (expected a JSON or YAML array): {}", e))
}

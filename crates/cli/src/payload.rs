//! Builds submission payloads from command-line arguments.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use studio_core::transport::{FilePart, SubmitPayload};

/// Parse a `key=value` argument.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Read a JSON request body from disk.
pub fn load_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Read a file attachment from disk.
pub fn load_file(field: &str, path: &Path) -> Result<FilePart> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| field.to_string());
    Ok(FilePart {
        field: field.to_string(),
        mime: mime_for(&file_name).map(str::to_string),
        file_name,
        bytes,
    })
}

/// Combine the JSON body, extra fields and attachments into one payload.
///
/// Without attachments the result is a JSON object (fields are added as
/// string properties). With attachments it is a multipart form, and the
/// top-level JSON properties become text fields.
pub fn build(json: Option<Value>, fields: Vec<(String, String)>, files: Vec<FilePart>) -> Result<SubmitPayload> {
    let mut body = match json {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) if fields.is_empty() && files.is_empty() => {
            return Ok(SubmitPayload::Json(other));
        }
        Some(_) => bail!("JSON body must be an object when combined with --field or --file"),
    };

    if files.is_empty() {
        for (key, value) in fields {
            body.insert(key, Value::String(value));
        }
        return Ok(SubmitPayload::Json(Value::Object(body)));
    }

    let mut form_fields: Vec<(String, String)> = body
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect();
    form_fields.extend(fields);

    Ok(SubmitPayload::Multipart {
        fields: form_fields,
        files,
    })
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        _ => None,
    }
}

//! Loads the matcher configuration document: an ordered JSON array of
//! `{type, target, protocol, value}` entries.

use std::path::Path;

use muxy_core::matcher::Target;
use muxy_core::{Matcher, ProtocolConfig};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MatcherType {
    Regex,
    String,
    Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JsonTarget {
    Line,
    Raw,
}

impl From<JsonTarget> for Target {
    fn from(t: JsonTarget) -> Self {
        match t {
            JsonTarget::Line => Target::Line,
            JsonTarget::Raw => Target::Raw,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatcherEntry {
    #[serde(rename = "type")]
    kind: MatcherType,
    target: JsonTarget,
    protocol: String,
    value: serde_json::Value,
}

/// Load and compile the matcher configuration file, preserving array
/// order, which is the tie-break order during classification.
pub fn load(path: impl AsRef<Path>) -> ConfigResult<ProtocolConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&text, &path.display().to_string())
}

/// Load and compile matcher configuration from an already-read JSON
/// string. Exposed separately so callers (and tests) need not touch the
/// filesystem.
pub fn load_str(text: &str, source_name: &str) -> ConfigResult<ProtocolConfig> {
    let entries: Vec<MatcherEntry> =
        serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: source_name.to_string(),
            source,
        })?;

    let matchers = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| compile_entry(index, entry))
        .collect::<ConfigResult<Vec<_>>>()?;

    Ok(ProtocolConfig::new(matchers))
}

fn compile_entry(index: usize, entry: MatcherEntry) -> ConfigResult<Matcher> {
    let target: Target = entry.target.into();
    let protocol = entry.protocol.clone();

    let compiled = match entry.kind {
        MatcherType::Regex => {
            let pattern = entry.value.as_str().unwrap_or_default();
            Matcher::compile_regex(protocol.clone(), target, pattern)
        }
        MatcherType::String => {
            let value = entry.value.as_str().unwrap_or_default();
            return Ok(Matcher::compile_string(protocol, target, value));
        }
        MatcherType::Bytes => {
            let values: Vec<i64> = entry
                .value
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_i64())
                .collect();
            Matcher::compile_bytes(protocol.clone(), target, &values)
        }
    };

    compiled.map_err(|source| ConfigError::MatcherCompile {
        index,
        protocol,
        source,
    })
}

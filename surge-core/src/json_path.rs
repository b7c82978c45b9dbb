use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{Error, Result};

/// A validated JSON path. Paths without a leading `$` are read relative to the document root,
/// so `username` and `$.username` select the same node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: Arc<str>,
    normalized: Arc<str>,
}

impl JsonPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::JsonPath {
                path: raw.to_string(),
                message: "empty path".to_string(),
            });
        }

        let normalized = if trimmed.starts_with('$') {
            trimmed.to_string()
        } else if trimmed.starts_with('[') {
            format!("${trimmed}")
        } else {
            format!("$.{trimmed}")
        };

        // Compile once against an empty document so syntax errors surface at load time.
        jsonpath_lib::select(&Json::Null, &normalized).map_err(|e| Error::JsonPath {
            path: raw.to_string(),
            message: format!("{e:?}"),
        })?;

        Ok(Self {
            raw: Arc::from(trimmed),
            normalized: Arc::from(normalized),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn select<'a>(&self, doc: &'a Json) -> std::result::Result<Vec<&'a Json>, String> {
        jsonpath_lib::select(doc, &self.normalized).map_err(|e| format!("{e:?}"))
    }

    pub fn first<'a>(&self, doc: &'a Json) -> std::result::Result<Option<&'a Json>, String> {
        Ok(self.select(doc)?.into_iter().next())
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Strings verbatim; everything else as compact JSON text.
pub(crate) fn stringify(node: &Json) -> String {
    match node {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

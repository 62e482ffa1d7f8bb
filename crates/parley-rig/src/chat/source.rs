//! Citations attached to assistant answers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Where a piece of context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    /// A web page.
    Web,
    /// A knowledge base document.
    Vector,
    /// The session's temporary document.
    Temp,
}

/// A citation: `{"type": "web", "url": "https://..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// URL, or stored filename for documents.
    pub url: String,
}

impl Source {
    /// Creates a citation.
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// Removes citations whose identifier was already seen, keeping the first.
pub fn dedupe_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse_to_first() {
        let sources = vec![
            Source::new(SourceKind::Web, "X"),
            Source::new(SourceKind::Web, "X"),
            Source::new(SourceKind::Vector, "Y"),
        ];
        assert_eq!(
            dedupe_sources(sources),
            vec![
                Source::new(SourceKind::Web, "X"),
                Source::new(SourceKind::Vector, "Y"),
            ]
        );
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&Source::new(SourceKind::Temp, "a.txt")).unwrap();
        assert_eq!(json, r#"{"type":"temp","url":"a.txt"}"#);
        assert_eq!(SourceKind::Vector.to_string(), "vector");
    }
}

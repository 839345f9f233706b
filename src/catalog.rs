use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// List entry that opens the chat panel instead of naming a topic.
pub const CHAT_SENTINEL: &str = "Ask Your Question 🤖";

/// Shown for names the catalog doesn't know.
pub const NO_CONTENT: &str = "No information available.";

/// Key of the single entry in a fallback catalog.
pub const FALLBACK_KEY: &str = "Welcome";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("could not read {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("could not decode {}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        reason: MalformedSource,
    },
}

/// Why a topics source isn't a flat object of strings.
#[derive(Debug, Error)]
pub enum MalformedSource {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("topic '{name}' must map to a string, found {kind}")]
    NotAString { name: String, kind: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ordering {
    /// Topics in source order, sentinel last.
    #[default]
    Insertion,
    /// Topics and sentinel sorted together by code point.
    Alphabetical,
}

/// What a click on a list entry resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<'a> {
    Chat,
    Topic(&'a str),
}

/// Read-only mapping from topic name to its HTML body.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    topics: Vec<(String, String)>,
    ordering: Ordering,
}

impl TopicCatalog {
    pub fn load(path: &Path, ordering: Ordering) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound {
                path: path.to_path_buf(),
            },
            _ => LoadError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        Self::from_json_str(&text, ordering).map_err(|reason| LoadError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse a flat JSON object of string values. Duplicate keys keep their
    /// first position and their last value.
    pub fn from_json_str(text: &str, ordering: Ordering) -> Result<Self, MalformedSource> {
        let map: Map<String, Value> = serde_json::from_str(text)?;

        let mut topics = Vec::with_capacity(map.len());
        for (name, value) in map {
            match value {
                Value::String(content) => topics.push((name, content)),
                other => {
                    return Err(MalformedSource::NotAString {
                        name,
                        kind: json_kind(&other),
                    })
                }
            }
        }

        Ok(Self::from_entries(topics, ordering))
    }

    pub fn from_entries<I, K, V>(entries: I, ordering: Ordering) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut topics: Vec<(String, String)> = Vec::new();
        for (name, content) in entries {
            let name = name.into();
            if name == CHAT_SENTINEL {
                tracing::warn!("ignoring topic named like the chat entry: {}", name);
                continue;
            }
            let content = content.into();
            match topics.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = content,
                None => topics.push((name, content)),
            }
        }

        TopicCatalog { topics, ordering }
    }

    /// One-entry catalog telling the user why no topics are listed.
    pub fn fallback(error: &LoadError, ordering: Ordering) -> Self {
        let notice = match error {
            LoadError::Malformed { .. } => {
                "Welcome to the Civic Education System! Topics file is corrupted."
            }
            LoadError::NotFound { .. } | LoadError::Unreadable { .. } => {
                "Welcome to the Civic Education System! No topics loaded due to missing file."
            }
        };
        Self::from_entries([(FALLBACK_KEY, notice)], ordering)
    }

    /// Load `path`, substituting the fallback catalog on failure unless `strict`.
    pub fn load_or_fallback(path: &Path, ordering: Ordering, strict: bool) -> Result<Self, LoadError> {
        match Self::load(path, ordering) {
            Ok(catalog) if catalog.is_empty() => {
                tracing::warn!("{} contains no topics", path.display());
                Ok(catalog)
            }
            Ok(catalog) => {
                tracing::info!("Loaded {} topics from {}", catalog.len(), path.display());
                Ok(catalog)
            }
            Err(e) if strict => Err(e),
            Err(e) => {
                tracing::error!("Error: {}", e);
                Ok(Self::fallback(&e, ordering))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|(n, _)| n.as_str())
    }

    /// Names containing `query` case-insensitively, plus the chat sentinel.
    pub fn filter(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        let mut names: Vec<String> = self
            .names()
            .filter(|name| name.to_lowercase().contains(&needle))
            .map(str::to_string)
            .collect();
        names.push(CHAT_SENTINEL.to_string());

        if self.ordering == Ordering::Alphabetical {
            names.sort();
        }
        names
    }

    /// Stored content for `name`, or [`NO_CONTENT`].
    pub fn get(&self, name: &str) -> &str {
        self.topics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, content)| content.as_str())
            .unwrap_or(NO_CONTENT)
    }

    pub fn select(&self, name: &str) -> Selection<'_> {
        if name == CHAT_SENTINEL {
            Selection::Chat
        } else {
            Selection::Topic(self.get(name))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Client configuration documents.
//!
//! Two variants exist: [`JsonDocument`], an in-memory tree mutated in place
//! at a container key path, and [`TomlAppendDocument`], raw text edited by
//! appending a named section. Both tolerate absent files and content that
//! is not UTF-8; the JSON variant also tolerates unparseable content by
//! starting from an empty tree.

use std::io::ErrorKind;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{ConfigError, Result};

/// What a merge did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The entry was not present and has been inserted.
    Added,
    /// An entry with the same name was overwritten.
    Updated,
    /// The append-only marker was already present; nothing changed.
    AlreadyPresent,
}

/// A JSON configuration tree.
#[derive(Debug, Clone, Default)]
pub struct JsonDocument {
    root: Map<String, Value>,
    recovered: Option<String>,
}

impl JsonDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text`, substituting an empty tree when it is blank,
    /// unparseable, or not a JSON object.
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::new();
        }
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(root)) => Self {
                root,
                recovered: None,
            },
            Ok(other) => Self {
                root: Map::new(),
                recovered: Some(format!("root is {} rather than an object", kind(&other))),
            },
            Err(e) => Self {
                root: Map::new(),
                recovered: Some(e.to_string()),
            },
        }
    }

    /// Load a document from disk. A missing file yields an empty document.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(match read_text(path)? {
            Loaded::Missing => Self::new(),
            Loaded::Text(text) => Self::parse(&text),
            Loaded::NotUtf8(reason) => Self {
                root: Map::new(),
                recovered: Some(reason),
            },
        })
    }

    /// Why the original content was discarded, if it was.
    pub fn recovered_from(&self) -> Option<&str> {
        self.recovered.as_deref()
    }

    /// The document root.
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Locate the object at `path`, creating missing levels.
    ///
    /// A level that exists but is not an object is replaced by an empty one.
    pub fn container_mut(&mut self, path: &[&str]) -> &mut Map<String, Value> {
        let mut current = &mut self.root;
        for key in path {
            let slot = current
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                tracing::warn!(key, found = kind(slot), "replacing non-object container");
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                unreachable!("container slot was normalised to an object");
            };
            current = map;
        }
        current
    }

    /// Look up an entry without creating anything.
    pub fn entry(&self, path: &[&str], name: &str) -> Option<&Value> {
        let mut current = &self.root;
        for key in path {
            current = current.get(*key)?.as_object()?;
        }
        current.get(name)
    }

    /// Insert or overwrite the entry `name` in the container at `path`.
    pub fn upsert(&mut self, path: &[&str], name: &str, value: Value) -> MergeOutcome {
        let container = self.container_mut(path);
        let outcome = if container.contains_key(name) {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Added
        };
        container.insert(name.to_string(), value);
        outcome
    }

    /// Serialize with two-space indentation and a trailing newline.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.root)?;
        text.push('\n');
        Ok(text)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

enum Loaded {
    Missing,
    Text(String),
    NotUtf8(String),
}

/// Read `path` as text. Only genuine I/O failures are errors.
fn read_text(path: &Path) -> Result<Loaded> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(match String::from_utf8(bytes) {
            Ok(text) => Loaded::Text(text),
            Err(e) => Loaded::NotUtf8(format!("file is not valid UTF-8 ({})", e.utf8_error())),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Loaded::Missing),
        Err(e) => Err(ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// A TOML document edited only by appending sections.
#[derive(Debug, Clone, Default)]
pub struct TomlAppendDocument {
    text: String,
    recovered: Option<String>,
}

impl TomlAppendDocument {
    /// Wrap existing text.
    pub fn parse(text: &str) -> Self {
        Self {
            text: text.to_string(),
            recovered: None,
        }
    }

    /// Load from disk. A missing file yields an empty document, as does one
    /// that is not UTF-8 (see [`recovered_from`](Self::recovered_from)).
    pub fn load(path: &Path) -> Result<Self> {
        Ok(match read_text(path)? {
            Loaded::Missing => Self::default(),
            Loaded::Text(text) => Self::parse(&text),
            Loaded::NotUtf8(reason) => Self {
                text: String::new(),
                recovered: Some(reason),
            },
        })
    }

    /// Why the original content was discarded, if it was.
    pub fn recovered_from(&self) -> Option<&str> {
        self.recovered.as_deref()
    }

    /// Header line of the section for `name` in `table`.
    pub fn header(table: &str, name: &str) -> String {
        format!("[{}.{}]", table, name)
    }

    /// Whether a line of the document is exactly `header`.
    pub fn contains_section(&self, header: &str) -> bool {
        self.text.lines().any(|line| line.trim() == header)
    }

    /// Append `[table.name]` followed by `body` unless the header is present.
    ///
    /// Sub-tables of `body` get their own `[table.name.key]` headers so they
    /// stay inside the section.
    pub fn append_section(&mut self, table: &str, name: &str, body: &toml::Table) -> Result<MergeOutcome> {
        let header = Self::header(table, name);
        if self.contains_section(&header) {
            return Ok(MergeOutcome::AlreadyPresent);
        }
        let (nested, flat): (Vec<_>, Vec<_>) = body
            .iter()
            .partition(|(_, value)| matches!(value, toml::Value::Table(_)));
        let flat: toml::Table = flat.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.push_block(&header, &toml::to_string(&flat)?);
        for (key, value) in nested {
            if let toml::Value::Table(sub) = value {
                let sub_header = format!("[{}.{}.{}]", table, name, key);
                self.push_block(&sub_header, &toml::to_string(sub)?);
            }
        }
        Ok(MergeOutcome::Added)
    }

    fn push_block(&mut self, header: &str, rendered: &str) {
        self.text.push('\n');
        self.text.push_str(header);
        self.text.push('\n');
        self.text.push_str(rendered);
        if !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    /// Current document text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Replace `path` with `contents` via a sibling temporary file.
///
/// Creates parent directories if they don't exist.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let write_err = |source| ConfigError::WriteFile {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, contents).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        write_err(e)
    })
}

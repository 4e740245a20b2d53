//! The `repository.json` document and its merge rules.
//!
//! Records are kept as loosely typed JSON objects so keys this crate does not
//! know about survive a load/save cycle. Only `name` is interpreted; the rest
//! of a record is replaced wholesale when a payload for that name is merged.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{PackagePayload, Platforms, ReleaseEntry};

/// Errors raised while reading or writing an index file.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The index file could not be read or written.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The index file is not valid JSON or has the wrong shape.
    #[error("Invalid index {path}: {source}")]
    Json {
        /// File being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory index could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A package entry in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name; never changes once the record exists.
    pub name: String,

    /// Every other key of the record (`details`, `releases`, `author`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PackageRecord {
    /// Homepage URL, if the record has one.
    pub fn details(&self) -> Option<&str> {
        self.fields.get("details").and_then(Value::as_str)
    }

    /// Typed view of the record's releases.
    ///
    /// # Errors
    ///
    /// Returns an error if `releases` holds entries that are not
    /// [`ReleaseEntry`] objects.
    pub fn releases(&self) -> Result<Vec<ReleaseEntry>, serde_json::Error> {
        match self.fields.get("releases") {
            Some(value) => Vec::<ReleaseEntry>::deserialize(value),
            None => Ok(Vec::new()),
        }
    }
}

/// The whole `repository.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Package records sorted by name.
    #[serde(default)]
    pub packages: Vec<PackageRecord>,

    /// Top-level keys other than `packages` (e.g. `schema_version`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepositoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an index file.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file cannot be read and
    /// [`IndexError::Json`] if it is not a valid index document.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let text = fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| IndexError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render the index the way it is stored on disk: keys sorted, tab
    /// indentation, non-ASCII characters escaped, trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Serialize`] if a record cannot be serialized.
    pub fn to_json_string(&self) -> Result<String, IndexError> {
        let value = sort_keys(serde_json::to_value(self)?);
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, IndexFormatter::new());
        value.serialize(&mut ser)?;
        buf.push(b'\n');
        // The formatter only ever emits ASCII.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Atomically replace the index file.
    ///
    /// The document is written to a temporary file next to `path` and then
    /// renamed over it, so readers never observe a partial write.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the temporary file cannot be written or
    /// renamed, or [`IndexError::Serialize`] if serialization fails.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let text = self.to_json_string()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(text.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Find a package by name.
    pub fn find(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Merge a payload into the index.
    ///
    /// An existing record with the payload's name has all of its non-key
    /// fields replaced. Otherwise a new record is inserted before the first
    /// record whose name is not less than the new one (or at the end).
    /// Returns `true` when a record was created.
    pub fn upsert(&mut self, payload: PackagePayload) -> bool {
        let (name, fields) = payload_fields(payload);

        if let Some(record) = self.packages.iter_mut().find(|p| p.name == name) {
            record.fields = fields;
            return false;
        }

        let at = self
            .packages
            .iter()
            .position(|p| p.name.as_str() >= name.as_str())
            .unwrap_or(self.packages.len());
        self.packages.insert(at, PackageRecord { name, fields });
        true
    }

    /// Whether records are in non-decreasing name order.
    pub fn is_sorted(&self) -> bool {
        self.packages.is_sorted_by(|a, b| a.name <= b.name)
    }
}

fn payload_fields(payload: PackagePayload) -> (String, Map<String, Value>) {
    let releases = payload.releases.into_iter().map(release_value).collect();

    let mut fields = Map::new();
    fields.insert("details".to_string(), Value::String(payload.details));
    fields.insert("releases".to_string(), Value::Array(releases));
    (payload.name, fields)
}

fn release_value(release: ReleaseEntry) -> Value {
    let platforms = match release.platforms {
        Platforms::One(key) => Value::String(key),
        Platforms::Many(keys) => Value::Array(keys.into_iter().map(Value::String).collect()),
    };

    let mut map = Map::new();
    map.insert("date".to_string(), Value::String(release.date));
    map.insert("platforms".to_string(), platforms);
    map.insert(
        "sublime_text".to_string(),
        Value::String(release.sublime_text),
    );
    map.insert("url".to_string(), Value::String(release.url));
    map.insert("version".to_string(), Value::String(release.version));
    Value::Object(map)
}

/// Rebuild every object with its keys in sorted order.
///
/// `serde_json::Map` is already ordered unless `preserve_order` is enabled
/// somewhere in the build; sorting here keeps the output stable either way.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Tab-indented pretty printer that escapes non-ASCII text as `\uXXXX`,
/// matching the layout existing index files were written with.
struct IndexFormatter {
    inner: PrettyFormatter<'static>,
}

impl IndexFormatter {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b"\t"),
        }
    }
}

impl Formatter for IndexFormatter {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                let mut byte = [0u8; 1];
                writer.write_all(ch.encode_utf8(&mut byte).as_bytes())?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

//! Source map (revision 3) decoding and lookup.
//!
//! Maps are keyed by the generated script's URL. Lookups in both directions use
//! 0-based lines and columns; conversion to 1-based happens in the inspector
//! client.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use inspect_debug_core::{Error, Result};

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_CONTINUATION: i64 = 32;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    source_root: Option<String>,
    sources: Vec<Option<String>>,
    mappings: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    generated_line: u32,
    generated_column: u32,
    source: u32,
    original_line: u32,
    original_column: u32,
}

/// A position in an original source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition<'a> {
    /// Resolved source path or URL
    pub source: &'a str,
    /// 0-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

/// A decoded source map.
#[derive(Debug, Clone)]
pub struct SourceMap {
    sources: Vec<String>,
    /// Sorted by generated position
    mappings: Vec<Mapping>,
}

impl SourceMap {
    /// Parse a source map.
    ///
    /// Relative `sources` entries are resolved against `base_dir` (the
    /// directory holding the map or, for inline maps, the generated script).
    pub fn from_json(text: &str, base_dir: Option<&Path>) -> Result<Self> {
        let raw: RawSourceMap = serde_json::from_str(text)
            .map_err(|e| Error::SourceMap(format!("Invalid source map JSON: {e}")))?;

        if raw.version != 3 {
            return Err(Error::SourceMap(format!(
                "Unsupported source map version {}",
                raw.version
            )));
        }

        let root = raw.source_root.unwrap_or_default();
        let sources = raw
            .sources
            .iter()
            .map(|s| resolve_source(base_dir, &root, s.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>();

        let mut mappings = decode_mappings(&raw.mappings)?;
        mappings.retain(|m| (m.source as usize) < sources.len());
        mappings.sort_by_key(|m| (m.generated_line, m.generated_column));

        Ok(Self { sources, mappings })
    }

    /// Original source files this map covers.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of decoded mapping segments.
    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    /// Original position for a generated position.
    ///
    /// Picks the closest segment at or before `column` on `line`, falling back
    /// to the first segment of the line.
    pub fn original_position(&self, line: u32, column: u32) -> Option<OriginalPosition<'_>> {
        let start = self
            .mappings
            .partition_point(|m| m.generated_line < line);
        let end = self
            .mappings
            .partition_point(|m| m.generated_line <= line);
        let on_line = &self.mappings[start..end];

        let mapping = on_line
            .iter()
            .rev()
            .find(|m| m.generated_column <= column)
            .or_else(|| on_line.first())?;

        Some(OriginalPosition {
            source: &self.sources[mapping.source as usize],
            line: mapping.original_line,
            column: mapping.original_column,
        })
    }

    /// Generated position for an original position.
    ///
    /// When `line` has no mapping, the next mapped line of the same source is
    /// used, matching how targets slide breakpoints to the next statement.
    pub fn generated_position(&self, source: &str, line: u32) -> Option<(u32, u32)> {
        let index = self.sources.iter().position(|s| s == source)? as u32;

        self.mappings
            .iter()
            .filter(|m| m.source == index && m.original_line >= line)
            .min_by_key(|m| {
                (
                    m.original_line,
                    m.generated_line,
                    m.generated_column,
                )
            })
            .map(|m| (m.generated_line, m.generated_column))
    }
}

fn base64_value(byte: u8) -> Option<i64> {
    BASE64_ALPHABET
        .iter()
        .position(|&b| b == byte)
        .map(|v| v as i64)
}

/// Decode one segment's VLQ fields.
fn decode_segment(segment: &str) -> Result<Vec<i64>> {
    let mut values = Vec::with_capacity(5);
    let mut value = 0i64;
    let mut shift = 0u32;

    for byte in segment.bytes() {
        let digit = base64_value(byte).ok_or_else(|| {
            Error::SourceMap(format!("Invalid base64 digit '{}' in mappings", byte as char))
        })?;
        value += (digit & (VLQ_CONTINUATION - 1)) << shift;
        if digit & VLQ_CONTINUATION != 0 {
            shift += 5;
            if shift > 60 {
                return Err(Error::SourceMap("VLQ value overflow".to_string()));
            }
        } else {
            let negative = value & 1 == 1;
            let magnitude = value >> 1;
            values.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }

    if shift != 0 {
        return Err(Error::SourceMap("Truncated VLQ segment".to_string()));
    }
    Ok(values)
}

fn decode_mappings(mappings: &str) -> Result<Vec<Mapping>> {
    let mut out = Vec::new();
    let (mut source, mut original_line, mut original_column) = (0i64, 0i64, 0i64);

    for (line, group) in mappings.split(';').enumerate() {
        let mut generated_column = 0i64;
        for segment in group.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_segment(segment)?;
            generated_column += fields[0];
            if fields.len() < 4 {
                continue;
            }
            source += fields[1];
            original_line += fields[2];
            original_column += fields[3];

            if generated_column < 0 || source < 0 || original_line < 0 || original_column < 0 {
                return Err(Error::SourceMap(format!(
                    "Negative position in mappings on line {line}"
                )));
            }

            out.push(Mapping {
                generated_line: line as u32,
                generated_column: generated_column as u32,
                source: source as u32,
                original_line: original_line as u32,
                original_column: original_column as u32,
            });
        }
    }
    Ok(out)
}

/// Lexically normalize a path, resolving `.` and `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve_source(base_dir: Option<&Path>, root: &str, source: &str) -> String {
    if let Some(path) = source.strip_prefix("file://") {
        return normalize_path(Path::new(path)).to_string_lossy().into_owned();
    }
    if source.contains("://") {
        return source.to_string();
    }

    let joined = Path::new(root).join(source);
    let full = match base_dir {
        Some(base) if !joined.is_absolute() => base.join(joined),
        _ => joined,
    };
    normalize_path(&full).to_string_lossy().into_owned()
}

/// Convert a `file://` URL into a path; other strings pass through.
pub fn url_to_path(url: &str) -> String {
    match url.strip_prefix("file://") {
        Some(path) => percent_decode(path),
        None => url.to_string(),
    }
}

/// Convert an absolute path into a `file://` URL.
pub fn path_to_url(path: &str) -> String {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{}", path.replace(' ', "%20"))
    } else {
        format!("file:///{}", path.replace(' ', "%20"))
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(v) = decoded {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Decode an inline `data:` source map URL.
pub fn decode_data_url(url: &str) -> Result<String> {
    let (header, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| Error::SourceMap("Malformed data URL".to_string()))?;

    if header.ends_with(";base64") {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::SourceMap(format!("Invalid base64 source map: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::SourceMap(format!("Source map is not UTF-8: {e}")))
    } else {
        Ok(percent_decode(payload))
    }
}

/// Load the source map declared by a script.
///
/// `script_url` is the generated script's URL; `map_url` the declared
/// `sourceMapURL`, either a `data:` URL or a path relative to the script.
pub async fn load_source_map(script_url: &str, map_url: &str) -> Result<SourceMap> {
    let script_path = PathBuf::from(url_to_path(script_url));
    let script_dir = script_path.parent().map(Path::to_path_buf);

    if map_url.starts_with("data:") {
        let text = decode_data_url(map_url)?;
        return SourceMap::from_json(&text, script_dir.as_deref());
    }

    if map_url.contains("://") && !map_url.starts_with("file://") {
        return Err(Error::SourceMap(format!(
            "Unsupported source map location {map_url}"
        )));
    }

    let map_path = PathBuf::from(url_to_path(map_url));
    let map_path = match &script_dir {
        Some(dir) if map_path.is_relative() => dir.join(map_path),
        _ => map_path,
    };
    debug!("Loading source map {}", map_path.display());

    let text = tokio::fs::read_to_string(&map_path).await.map_err(|e| {
        Error::SourceMap(format!("Cannot read {}: {e}", map_path.display()))
    })?;
    SourceMap::from_json(&text, map_path.parent())
}

/// Source maps of every script seen on a connection.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
    by_script: HashMap<String, Arc<SourceMap>>,
    /// Original source → generated script URL
    by_source: HashMap<String, String>,
}

impl SourceMapRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the map of the script at `script_url`.
    pub fn insert(&mut self, script_url: &str, map: SourceMap) {
        for source in map.sources() {
            self.by_source
                .insert(source.clone(), script_url.to_string());
        }
        self.by_script
            .insert(script_url.to_string(), Arc::new(map));
    }

    /// Whether any map is registered.
    pub fn is_empty(&self) -> bool {
        self.by_script.is_empty()
    }

    /// Number of registered maps.
    pub fn len(&self) -> usize {
        self.by_script.len()
    }

    fn find_source(&self, file: &str) -> Option<(&str, &str)> {
        if let Some((source, script)) = self.by_source.get_key_value(file) {
            return Some((source, script));
        }
        // Relative names match by path suffix.
        let suffix = format!("/{}", file.trim_start_matches("./"));
        self.by_source
            .iter()
            .find(|(source, _)| source.ends_with(&suffix))
            .map(|(source, script)| (source.as_str(), script.as_str()))
    }

    /// Map an original `file` and 0-based `line` to `(script_url, line, column)`.
    pub fn to_generated(&self, file: &str, line: u32) -> Option<(String, u32, u32)> {
        let (source, script) = self.find_source(file)?;
        let map = self.by_script.get(script)?;
        let (gen_line, gen_col) = map.generated_position(source, line)?;
        Some((script.to_string(), gen_line, gen_col))
    }

    /// Map a generated position back to `(source, line, column)`.
    pub fn to_original(&self, script_url: &str, line: u32, column: u32) -> Option<(String, u32, u32)> {
        let map = self.by_script.get(script_url)?;
        let pos = map.original_position(line, column)?;
        Some((pos.source.to_string(), pos.line, pos.column))
    }
}

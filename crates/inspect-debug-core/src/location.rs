//! Source location type.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A position in a source file.
///
/// Lines and columns are 1-based. The remote protocol counts from zero; the
/// inspector client converts at its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SourceLocation {
    /// File path, or the script URL when it has no file path
    pub file: String,
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl SourceLocation {
    /// Create a new location.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Whether two locations are on the same file and line, ignoring columns.
    pub fn same_line(&self, other: &SourceLocation) -> bool {
        self.line == other.line && self.file == other.file
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

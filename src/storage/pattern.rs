//! Wildcard file-name patterns for topology bootstrap directories

use regex::{Regex, RegexBuilder};
use std::path::Path;

use super::{StorageError, StorageResult};

/// Case-insensitive glob where `*` matches any run of characters
///
/// Every other character is literal, so `topo*.json` matches `topo1.json` and
/// `TOPO_test.JSON` but not `topo1.jsonx`.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    pub const DEFAULT: &'static str = "*.json";

    pub fn new(pattern: &str) -> StorageResult<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let regex = RegexBuilder::new(&format!("^{body}$"))
            .case_insensitive(true)
            .build()
            .map_err(|e| StorageError::invalid_request(format!("bad file pattern '{pattern}': {e}")))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    /// Match on the final path component only
    pub fn matches_path(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.matches(n))
    }
}

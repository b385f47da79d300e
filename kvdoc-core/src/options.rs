//! Store-wide configuration.

use serde::{Deserialize, Serialize};

fn default_table() -> String {
    "documents".to_string()
}

fn default_scan_page_size() -> Option<usize> {
    Some(1000)
}

/// Options shared by every model of a [`DocumentStore`](crate::store::DocumentStore).
///
/// Deserializable so it can be embedded in an application's configuration file;
/// missing fields take their defaults.
///
/// # Example
///
/// ```ignore
/// let options = StoreOptions::default()
///     .with_table("app-documents")
///     .with_scan_page_size(Some(100))
///     .with_strict(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// The physical table every model shares.
    #[serde(default = "default_table")]
    pub table: String,
    /// Page limit passed to backend scans. `None` leaves paging to the backend.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: Option<usize>,
    /// Reject unsupported filter operators, update operators, pipeline stages and
    /// join fields instead of ignoring them.
    pub strict: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            table: default_table(),
            scan_page_size: default_scan_page_size(),
            strict: false,
        }
    }
}

impl StoreOptions {
    /// Sets the physical table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the page limit passed to backend scans.
    pub fn with_scan_page_size(mut self, scan_page_size: Option<usize>) -> Self {
        self.scan_page_size = scan_page_size;
        self
    }

    /// Enables or disables strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options: StoreOptions = serde_json::from_str(r#"{ "strict": true }"#).unwrap();

        assert_eq!(options, StoreOptions::default().with_strict(true));
    }

    #[test]
    fn fields_are_camel_case() {
        let options: StoreOptions =
            serde_json::from_str(r#"{ "table": "t", "scanPageSize": null }"#).unwrap();

        assert_eq!(options.table, "t");
        assert_eq!(options.scan_page_size, None);
        assert!(!options.strict);
    }
}

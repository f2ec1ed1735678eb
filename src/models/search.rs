//! Search-related models for queries and results.

use serde::{Deserialize, Serialize};

use super::document::Metadata;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// A single nearest-neighbour hit. Lower distance is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Collection of search results with query metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Original query
    pub query: String,

    /// Collection that was searched
    pub collection: String,

    /// Hits ordered by ascending distance
    pub results: Vec<SearchResult>,

    /// Query execution time in milliseconds
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(
        query: String,
        collection: String,
        results: Vec<SearchResult>,
        duration_ms: u64,
    ) -> Self {
        Self {
            query,
            collection,
            results,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_search_results_len() {
        let results = SearchResults::new(
            "hello".to_string(),
            "docs".to_string(),
            vec![SearchResult {
                id: "1".to_string(),
                text: "hello world".to_string(),
                metadata: Metadata::new(),
                distance: 0.1,
            }],
            4,
        );
        assert_eq!(results.len(), 1);
        assert!(!results.is_empty());
    }
}

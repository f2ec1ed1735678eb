use console::style;
use std::fmt::Write as FmtWrite;

use crate::models::{Document, OutputFormat, SearchResults};

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_documents(&self, documents: &[Document]) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_insert_stats(&self, stats: &InsertStats) -> String;
    fn format_message(&self, message: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub embedding_url: String,
    pub embedding_healthy: bool,
    pub database_path: String,
    pub database_healthy: bool,
    pub worker_threads: usize,
    pub collections: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Default)]
pub struct InsertStats {
    pub collection: String,
    pub documents: u64,
    pub skipped: u64,
    pub duration_ms: u64,
}

fn badge(ok: bool, good: &str, bad: &str) -> String {
    if ok {
        style(format!("[{good}]")).green().to_string()
    } else {
        style(format!("[{bad}]")).red().to_string()
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(
            output,
            "Search results for: \"{}\" in {}",
            results.query, results.collection
        )
        .unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(
                output,
                "{}. {} [Distance: {:.4}]",
                i + 1,
                style(&result.id).bold(),
                result.distance
            )
            .unwrap();
            write_metadata(&mut output, &result.metadata);
            writeln!(output, "   ---").unwrap();
            write_preview(&mut output, &result.text);
            writeln!(output).unwrap();
        }

        output
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        if documents.is_empty() {
            return "No documents found.\n".to_string();
        }

        let mut output = String::new();
        for document in documents {
            writeln!(output, "{}", style(&document.id).bold()).unwrap();
            write_metadata(&mut output, &document.metadata);
            writeln!(output, "   ---").unwrap();
            write_preview(&mut output, &document.text);
            writeln!(output).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        writeln!(
            output,
            "Embedding:     {} {}",
            status.embedding_url,
            badge(status.embedding_healthy, "UP", "DOWN")
        )
        .unwrap();
        writeln!(
            output,
            "Vector Store:  {} {}",
            status.database_path,
            badge(status.database_healthy, "OK", "UNAVAILABLE")
        )
        .unwrap();
        writeln!(output, "  Workers:     {}", status.worker_threads).unwrap();

        if !status.collections.is_empty() {
            writeln!(output).unwrap();
            writeln!(output, "Collections").unwrap();
            writeln!(output, "-----------").unwrap();
            for (name, count) in &status.collections {
                writeln!(output, "  {} ({})", name, count).unwrap();
            }
        }
        output
    }

    fn format_insert_stats(&self, stats: &InsertStats) -> String {
        let mut output = String::new();
        writeln!(output, "Insert Complete").unwrap();
        writeln!(output, "---------------").unwrap();
        writeln!(output, "Collection: {}", stats.collection).unwrap();
        writeln!(output, "Documents:  {}", stats.documents).unwrap();
        writeln!(output, "Skipped:    {}", stats.skipped).unwrap();
        writeln!(output, "Duration:   {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }
}

fn write_metadata(output: &mut String, metadata: &crate::models::Metadata) {
    if metadata.is_empty() {
        return;
    }
    let pairs: Vec<String> = metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
    writeln!(output, "   Metadata: {}", pairs.join(", ")).unwrap();
}

fn write_preview(output: &mut String, text: &str) {
    let preview: String = text.chars().take(200).collect();
    let preview = if text.chars().count() > 200 {
        format!("{}...", preview)
    } else {
        preview
    };
    for line in preview.lines() {
        writeln!(output, "   {}", line).unwrap();
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, json: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(json)
        } else {
            serde_json::to_string(json)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)) + "\n"
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        match serde_json::to_value(results) {
            Ok(json) => self.render(&json),
            Err(e) => format!("{{\"error\": \"{}\"}}\n", e),
        }
    }

    fn format_documents(&self, documents: &[Document]) -> String {
        match serde_json::to_value(documents) {
            Ok(json) => self.render(&json),
            Err(e) => format!("{{\"error\": \"{}\"}}\n", e),
        }
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let collections: Vec<serde_json::Value> = status
            .collections
            .iter()
            .map(|(name, count)| serde_json::json!({"name": name, "count": count}))
            .collect();

        self.render(&serde_json::json!({
            "embedding": {
                "url": status.embedding_url,
                "healthy": status.embedding_healthy,
            },
            "vector_store": {
                "path": status.database_path,
                "healthy": status.database_healthy,
                "worker_threads": status.worker_threads,
                "collections": collections,
            }
        }))
    }

    fn format_insert_stats(&self, stats: &InsertStats) -> String {
        self.render(&serde_json::json!({
            "collection": stats.collection,
            "documents": stats.documents,
            "skipped": stats.skipped,
            "duration_ms": stats.duration_ms,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&serde_json::json!({"message": message}))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

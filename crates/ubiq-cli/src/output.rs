use ubiq_bridge::ChannelEvent;
use ubiq_core::domain::FileRecord;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
    fn records(&self, records: &[FileRecord]);
    fn event(&self, event: &ChannelEvent);
}

fn status_label(record: &FileRecord) -> String {
    match record.download_status {
        Some(status) => status.to_string(),
        None => "-".to_string(),
    }
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {
        // Human formatter doesn't print JSON
    }
    fn records(&self, records: &[FileRecord]) {
        for record in records {
            let size = record
                .size_in_bytes
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            let kind = if record.is_directory { "dir " } else { "file" };
            println!(
                "  {} {:>12}  {:<15} {}",
                kind,
                size,
                status_label(record),
                record.relative_path
            );
        }
    }
    fn event(&self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Progress(percent) => println!("  {:>6.1}%", percent),
            ChannelEvent::Files(records) => {
                println!("  listing changed ({} items)", records.len());
                self.records(records);
            }
            ChannelEvent::Error { code, message, .. } => {
                eprintln!("\u{2717} Error [{}]: {}", code, message)
            }
            ChannelEvent::EndOfStream => println!("\u{2713} Done"),
        }
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
    fn records(&self, records: &[FileRecord]) {
        println!(
            "{}",
            serde_json::to_string_pretty(records).unwrap_or_default()
        );
    }
    fn event(&self, event: &ChannelEvent) {
        // One compact object per line so the stream can be piped.
        println!("{}", serde_json::to_string(event).unwrap_or_default());
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

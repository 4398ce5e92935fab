// Output formatting for CLI

use crate::cli::{CliResult, OutputFormat};
use std::io::Write;

/// Format and output records
pub struct OutputFormatter {
    format: OutputFormat,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    /// Output one record
    pub fn output_record(&self, record: &serde_json::Value, writer: &mut impl Write) -> CliResult<()> {
        match self.format {
            OutputFormat::Pretty => {
                writeln!(writer, "{}", serde_json::to_string_pretty(record)?)?;
            }
            OutputFormat::Json => {
                writeln!(writer, "{}", serde_json::to_string(record)?)?;
            }
            OutputFormat::Table => {
                self.output_table(record, writer)?;
            }
        }
        Ok(())
    }

    /// Output as table
    fn output_table(&self, record: &serde_json::Value, writer: &mut impl Write) -> CliResult<()> {
        if let Some(obj) = record.as_object() {
            let max_key_len = obj.keys().map(|k| k.len()).max().unwrap_or(0);

            writeln!(writer, "{}", "=".repeat(max_key_len + 30))?;

            for (key, value) in obj {
                writeln!(
                    writer,
                    "{:<width$} {}",
                    format!("{}:", key),
                    self.format_value(value),
                    width = max_key_len + 1
                )?;
            }
        } else {
            writeln!(writer, "{}", self.format_value(record))?;
        }
        Ok(())
    }

    /// Format a JSON value for display
    fn format_value(&self, value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "(null)".to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Array(arr) => {
                if arr.is_empty() {
                    "[]".to_string()
                } else {
                    format!("[{} items]", arr.len())
                }
            }
            serde_json::Value::Object(obj) => {
                let fields: Vec<String> = obj
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, self.format_value(v)))
                    .collect();
                format!("{{{}}}", fields.join(", "))
            }
        }
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            eprintln!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if !self.quiet {
            eprintln!("  {}", message);
        }
    }
}

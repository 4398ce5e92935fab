// CLI command implementations
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use glob::glob;
use serde_json::json;
use tracing::{debug, warn};

use oggframe::{
    DecodeEvent, DecodeReader, Encoder, MuxConfig, PageReader, PageWriter, StreamHandle,
};

use crate::cli::{CliError, CliResult, OutputFormatter};

/// Expand file arguments; arguments with glob metacharacters are patterns
pub fn expand_files(patterns: &[String]) -> CliResult<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Err(CliError::Other("No files specified".to_string()));
    }

    let mut files = Vec::new();
    for pattern in patterns {
        if pattern.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            let before = files.len();
            for entry in glob(pattern)? {
                match entry {
                    Ok(path) if path.is_file() => files.push(path),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "unreadable glob match"),
                }
            }
            if files.len() == before {
                return Err(CliError::FileNotFound(pattern.clone()));
            }
        } else {
            let path = PathBuf::from(pattern);
            if !path.is_file() {
                return Err(CliError::FileNotFound(pattern.clone()));
            }
            files.push(path);
        }
    }
    debug!(count = files.len(), "input files");
    Ok(files)
}

fn open(path: &Path) -> CliResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CliError::FileNotFound(path.display().to_string()),
        _ => CliError::IoError(e),
    })
}

/// Print one record per page
pub fn command_pages(
    files: &[String],
    formatter: &OutputFormatter,
    writer: &mut impl Write,
) -> CliResult<()> {
    for path in expand_files(files)? {
        let mut reader = PageReader::new(open(&path)?);
        let mut pages = 0u64;
        for page in &mut reader {
            let mut record = serde_json::to_value(page?.info())?;
            record["file"] = json!(path.display().to_string());
            formatter.output_record(&record, writer)?;
            pages += 1;
        }
        let stats = reader.stats();
        if !stats.is_clean() {
            formatter.print_error(&format!(
                "{}: {} byte(s) skipped outside valid pages",
                path.display(),
                stats.bytes_skipped
            ));
        }
        formatter.print_info(&format!("{}: {} page(s)", path.display(), pages));
    }
    Ok(())
}

/// Print one record per packet, or per-stream packet counts
pub fn command_packets(
    files: &[String],
    summary: bool,
    payload: bool,
    formatter: &OutputFormatter,
    writer: &mut impl Write,
) -> CliResult<()> {
    for path in expand_files(files)? {
        let file_name = path.display().to_string();
        let mut counts: BTreeMap<u32, u64> = BTreeMap::new();

        for event in DecodeReader::new(open(&path)?) {
            match event? {
                DecodeEvent::StreamOpened { serial_number } => {
                    counts.entry(serial_number).or_insert(0);
                }
                DecodeEvent::Packet {
                    serial_number,
                    packet,
                } => {
                    *counts.entry(serial_number).or_insert(0) += 1;
                    if summary {
                        continue;
                    }
                    let mut record = serde_json::to_value(&packet)?;
                    record["file"] = json!(file_name);
                    record["serial_number"] = json!(serial_number);
                    record["len"] = json!(packet.len());
                    if payload {
                        record["payload"] = json!(STANDARD.encode(&packet.payload));
                    }
                    formatter.output_record(&record, writer)?;
                }
                DecodeEvent::StreamError {
                    serial_number,
                    error,
                } => {
                    formatter.print_error(&format!("{}: stream {}: {}", file_name, serial_number, error));
                }
                DecodeEvent::Page(_) | DecodeEvent::Corrupt(_) | DecodeEvent::StreamEnded { .. } => {}
            }
        }

        if summary {
            let streams: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(serial, count)| (serial.to_string(), json!(count)))
                .collect();
            formatter.output_record(&json!({ "file": file_name, "packets": streams }), writer)?;
        }
    }
    Ok(())
}

/// Decode every file; returns whether all of them were free of corruption
pub fn command_check(
    files: &[String],
    formatter: &OutputFormatter,
    writer: &mut impl Write,
) -> CliResult<bool> {
    let mut all_clean = true;

    for path in expand_files(files)? {
        let file_name = path.display().to_string();
        let mut corruption = Vec::new();
        let mut errors = Vec::new();

        let mut reader = DecodeReader::new(open(&path)?);
        for event in &mut reader {
            match event? {
                DecodeEvent::Corrupt(c) => corruption.push(serde_json::to_value(&c)?),
                DecodeEvent::StreamError {
                    serial_number,
                    error,
                } => errors.push(json!({
                    "serial_number": serial_number,
                    "error": error.to_string(),
                })),
                _ => {}
            }
        }

        let decoder = reader.decoder();
        let mut streams = serde_json::Map::new();
        for serial in decoder.demux().serial_numbers() {
            if let Some(stats) = decoder.stream_stats(serial) {
                streams.insert(serial.to_string(), serde_json::to_value(stats)?);
            }
        }

        let clean = corruption.is_empty() && errors.is_empty();
        all_clean &= clean;
        let record = json!({
            "file": file_name,
            "clean": clean,
            "sync": decoder.sync_stats(),
            "streams": streams,
            "corruption": corruption,
            "errors": errors,
        });
        formatter.output_record(&record, writer)?;

        if clean {
            formatter.print_success(&format!("{}: no corruption", file_name));
        } else {
            formatter.print_error(&format!(
                "{}: {} corruption event(s), {} stream error(s)",
                file_name,
                corruption.len(),
                errors.len()
            ));
        }
    }
    Ok(all_clean)
}

/// Load the page layout for `copy`
pub fn load_mux_config(json: Option<&str>, file: Option<&str>) -> CliResult<MuxConfig> {
    match (json, file) {
        (Some(json), _) => Ok(MuxConfig::from_json(json)?),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CliError::FileNotFound(path.to_string()),
                _ => CliError::IoError(e),
            })?;
            Ok(MuxConfig::from_json(&text)?)
        }
        (None, None) => Ok(MuxConfig::default()),
    }
}

/// Page-by-page remux of `input` into `output`.
///
/// Every input stream gets an output stream with the same serial number.
/// Whenever an input page arrives, the matching output stream flushes what
/// it has queued, so output pages follow input page boundaries one page
/// behind. Returns the number of pages written.
pub fn command_copy(
    input: &str,
    output: &str,
    config: MuxConfig,
    formatter: &OutputFormatter,
) -> CliResult<u64> {
    let source = open(Path::new(input))?;
    let target = File::create(output)?;

    let mut encoder = Encoder::with_config(config);
    let mut writer = PageWriter::new(BufWriter::new(target));
    let mut handles: BTreeMap<u32, StreamHandle> = BTreeMap::new();
    let mut corrupt = 0usize;

    for event in DecodeReader::new(source) {
        match event? {
            DecodeEvent::StreamOpened { serial_number } => {
                handles.insert(serial_number, encoder.open_stream(Some(serial_number))?);
            }
            DecodeEvent::Page(info) => {
                if let Some(&handle) = handles.get(&info.serial_number) {
                    encoder.flush_all(handle)?;
                }
            }
            DecodeEvent::Packet {
                serial_number,
                packet,
            } => {
                if let Some(&handle) = handles.get(&serial_number) {
                    encoder.submit(handle, packet)?;
                }
            }
            DecodeEvent::StreamEnded { serial_number } => {
                if let Some(&handle) = handles.get(&serial_number) {
                    encoder.flush_all(handle)?;
                }
            }
            DecodeEvent::Corrupt(c) => {
                corrupt += 1;
                formatter.print_info(&format!("skipped: {}", c));
            }
            DecodeEvent::StreamError {
                serial_number,
                error,
            } => {
                formatter.print_error(&format!("stream {}: {}", serial_number, error));
            }
        }
        writer.write_from(&mut encoder)?;
    }

    // streams cut off before their eos page
    for &handle in handles.values() {
        encoder.flush_all(handle)?;
    }
    writer.write_from(&mut encoder)?;
    writer.flush()?;

    let pages = writer.pages_written();
    if corrupt > 0 {
        formatter.print_error(&format!("{}: {} corruption event(s) skipped", input, corrupt));
    }
    formatter.print_success(&format!("Created copy of {} as {} ({} pages)", input, output, pages));
    Ok(pages)
}

// Library configuration
//
// Both records deserialize from JSON so the CLI can load them with
// `--mux-config`, the same way metadata is loaded from a file.

use serde::{Deserialize, Serialize};

/// Page layout policy of a stream multiplexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Put the stream's first packet alone on the bos page
    pub isolate_first_packet: bool,
    /// Treat a page as ready for `pageout` once its body reaches this many bytes
    pub page_body_target: Option<usize>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        MuxConfig {
            isolate_first_packet: true,
            page_body_target: None,
        }
    }
}

impl MuxConfig {
    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Byte source adapter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Bytes requested from the source per read
    pub chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig { chunk_size: 4096 }
    }
}

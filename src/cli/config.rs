// CLI configuration
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

/// Oggframe - Ogg bitstream inspection and remuxing tool
#[derive(Parser, Debug)]
#[command(name = "oggframe")]
#[command(about = "Inspect, verify and remux Ogg physical streams", long_about = None)]
#[command(version)]
#[command(author = "xwsjjctz <xwsjjctz@icloud.com>")]
pub struct Config {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Pretty,
    /// One compact JSON record per line
    Json,
    /// Aligned key/value table
    Table,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the pages of Ogg file(s)
    Pages {
        /// Ogg file path(s) or glob patterns
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },

    /// List the packets of every logical stream
    Packets {
        /// Ogg file path(s) or glob patterns
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,

        /// Only print the packet count of each stream
        #[arg(short, long)]
        summary: bool,

        /// Include base64 packet payloads
        #[arg(short, long, conflicts_with = "summary")]
        payload: bool,
    },

    /// Decode file(s) fully and report any corruption
    Check {
        /// Ogg file path(s) or glob patterns
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },

    /// Remux a file page by page, keeping serial numbers
    Copy {
        /// Source Ogg file
        #[arg(value_name = "INPUT")]
        input: String,

        /// Target file
        #[arg(value_name = "OUTPUT")]
        output: String,

        /// Page layout JSON, e.g. '{"page_body_target": 4096}'
        #[arg(short, long)]
        mux_config: Option<String>,

        /// Read the page layout JSON from a file
        #[arg(long, conflicts_with = "mux_config")]
        mux_config_file: Option<String>,
    },
}

impl Config {
    /// Maximum log level for the stderr subscriber
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::ERROR
        } else {
            Level::WARN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packets_summary() {
        let config = Config::parse_from(["oggframe", "packets", "a.ogg", "b.ogg", "--summary"]);
        match config.command {
            Commands::Packets {
                ref files,
                summary,
                payload,
            } => {
                assert_eq!(*files, vec!["a.ogg", "b.ogg"]);
                assert!(summary);
                assert!(!payload);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(config.format, OutputFormat::Pretty);
        assert_eq!(config.log_level(), Level::WARN);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let config = Config::parse_from(["oggframe", "check", "x.ogg", "-f", "json", "-v"]);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.log_level(), Level::DEBUG);
    }

    #[test]
    fn test_copy_config_sources_conflict() {
        let result = Config::try_parse_from([
            "oggframe",
            "copy",
            "in.ogg",
            "out.ogg",
            "--mux-config",
            "{}",
            "--mux-config-file",
            "layout.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_files_required() {
        assert!(Config::try_parse_from(["oggframe", "pages"]).is_err());
    }
}

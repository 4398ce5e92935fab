// CLI binary entry point for oggframe
//
// Exit status: 0 on success, 1 on error, 2 when `check` found corruption.

mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use cli::commands;
use cli::{Commands, Config, OutputFormatter};

fn main() -> ExitCode {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(&config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> anyhow::Result<bool> {
    let formatter = OutputFormatter::new(config.format, config.quiet);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let clean = match &config.command {
        Commands::Pages { files } => {
            commands::command_pages(files, &formatter, &mut out).context("listing pages")?;
            true
        }
        Commands::Packets {
            files,
            summary,
            payload,
        } => {
            commands::command_packets(files, *summary, *payload, &formatter, &mut out)
                .context("listing packets")?;
            true
        }
        Commands::Check { files } => {
            commands::command_check(files, &formatter, &mut out).context("checking files")?
        }
        Commands::Copy {
            input,
            output,
            mux_config,
            mux_config_file,
        } => {
            let layout =
                commands::load_mux_config(mux_config.as_deref(), mux_config_file.as_deref())
                    .context("loading page layout")?;
            commands::command_copy(input, output, layout, &formatter)
                .with_context(|| format!("copying {} to {}", input, output))?;
            true
        }
    };

    out.flush()?;
    Ok(clean)
}

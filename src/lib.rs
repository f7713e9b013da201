pub mod cli;
pub mod columns;
pub mod config;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod lookup;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod pivot;
pub mod preview;
pub mod prompt;
pub mod reader;
pub mod relation;
pub mod render;
pub mod report;
pub mod report_cmd;
pub mod table;
pub mod yaml_provider;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};

pub use crate::{
    error::ReportError,
    pipeline::{Pipeline, PipelineOutcome, PipelineRequest, Reconciled},
    relation::Relation,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ticket_report", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Report(args) => report_cmd::execute(&args),
        Commands::Preview(args) => preview::execute(&args),
        Commands::Columns(args) => columns::execute(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    let config = report_cmd::load_config(args.config.as_deref())?;
    config.validate()?;
    match &args.output {
        Some(path) => {
            yaml_provider::save_to_path(path, &config)
                .with_context(|| format!("Writing configuration to {path:?}"))?;
            info!("Configuration written to {path:?}");
        }
        None => print!("{}", yaml_provider::to_string(&config)?),
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

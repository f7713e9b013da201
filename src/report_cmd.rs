//! `report` subcommand plus the configuration plumbing shared with `preview`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::{info, warn};

use crate::{
    cli::{NormalizeArgs, OutputFormat, ReportArgs, SourceArgs},
    config::PipelineConfig,
    io_utils,
    normalize::NormalizeOptions,
    pipeline::{self, Pipeline, PipelineRequest},
    printable_delimiter,
    prompt::{ColumnResolver, NoPrompt, StdinResolver},
    reader::DelimitedOptions,
    render::{CsvRenderer, ReportRenderer, XlsxRenderer},
    table,
};

pub fn execute(args: &ReportArgs) -> Result<()> {
    let mut config = load_config(args.source.config.as_deref())?;
    apply_normalize_args(&mut config, &args.normalize);
    apply_lookup_args(&mut config, args);
    config.validate()?;

    let now = resolve_now(&config)?;
    let delimited = delimited_options(&args.source, &config)?;
    let output = resolve_output(args)?;
    info!(
        "Building report from '{}' (delimiter '{}') into {:?}",
        args.source.input.display(),
        printable_delimiter(delimited.delimiter),
        output
    );

    let prompt: &dyn ColumnResolver = if args.interactive {
        &StdinResolver
    } else {
        &NoPrompt
    };
    let options = NormalizeOptions::from_settings(&config.normalize, &config.columns, Some(now));
    let pipeline = Pipeline::new(&config, options, prompt);
    let request = PipelineRequest {
        input: args.source.input.clone(),
        lookup: args.lookup.clone(),
        delimited,
    };

    let xlsx = XlsxRenderer::new(config.style.clone());
    let csv = CsvRenderer::new(
        io_utils::DEFAULT_CSV_DELIMITER,
        io_utils::resolve_encoding(args.output_encoding.as_deref())?,
    );
    let engines: Vec<&dyn ReportRenderer> = match args.format {
        OutputFormat::Xlsx => vec![&xlsx as &dyn ReportRenderer, &csv],
        OutputFormat::Csv => vec![&csv as &dyn ReportRenderer],
    };

    let outcome = pipeline
        .run(&request, &output, &engines)
        .with_context(|| format!("Building report from {:?}", args.source.input))?;

    if let Some(stats) = &outcome.reconciled.merge_stats {
        info!(
            "Lookup applied to {} of {} row(s)",
            stats.applied,
            outcome.reconciled.relation.row_count()
        );
    }
    if !outcome.warnings.is_empty() {
        warn!("Report finished with {} warning(s)", outcome.warnings.len());
    }
    if args.print_pivot {
        match &outcome.render.pivot {
            Some(pivot) => print!("{}", table::render_pivot(pivot)),
            None => warn!("No pivot view to print"),
        }
    }
    for file in &outcome.render.files {
        println!("{}", file.display());
    }
    Ok(())
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::default()),
    }
}

pub(crate) fn apply_normalize_args(config: &mut PipelineConfig, args: &NormalizeArgs) {
    if let Some(now) = &args.now {
        config.normalize.now = Some(now.clone());
    }
    if let Some(mode) = args.remarks_mode {
        config.normalize.remarks_mode = mode;
    }
    if let Some(seed) = args.seed {
        config.normalize.seed = Some(seed);
    }
    if args.lenient_columns {
        config.normalize.strict_columns = false;
    }
}

fn apply_lookup_args(config: &mut PipelineConfig, args: &ReportArgs) {
    if let Some(key) = &args.key_column {
        config.lookup.key_column = Some(key.clone());
    }
    if let Some(value) = &args.value_column {
        config.lookup.value_column = Some(value.clone());
    }
    if let Some(policy) = args.policy {
        config.lookup.policy = policy;
    }
    if let Some(page) = &args.page_filter {
        config.report.default_page_value = page.clone();
    }
}

pub(crate) fn resolve_now(config: &PipelineConfig) -> Result<NaiveDateTime> {
    Ok(config
        .fixed_now()
        .context("Parsing the reference time")?
        .unwrap_or_else(|| Local::now().naive_local()))
}

/// A forced `--input-encoding` replaces the configured candidate list.
pub(crate) fn delimited_options(
    source: &SourceArgs,
    config: &PipelineConfig,
) -> Result<DelimitedOptions> {
    let encodings = match &source.input_encoding {
        Some(label) => vec![io_utils::resolve_encoding(Some(label.as_str()))?],
        None => io_utils::resolve_encoding_list(&config.input.encodings)?,
    };
    Ok(DelimitedOptions::for_path(
        &source.input,
        source.delimiter,
        encodings,
    ))
}

fn resolve_output(args: &ReportArgs) -> Result<PathBuf> {
    if let Some(path) = &args.output {
        return Ok(path.clone());
    }
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Creating output directory {:?}", args.output_dir))?;
    Ok(args
        .output_dir
        .join(pipeline::default_output_name(Local::now().naive_local())))
}

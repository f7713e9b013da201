use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::PreviewArgs,
    normalize::{NormalizeOptions, TicketNormalizer},
    reader,
    report_cmd::{apply_normalize_args, delimited_options, load_config, resolve_now},
    table,
};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let mut config = load_config(args.source.config.as_deref())?;
    apply_normalize_args(&mut config, &args.normalize);
    config.validate()?;

    let now = resolve_now(&config)?;
    let delimited = delimited_options(&args.source, &config)?;
    let raw = reader::read_delimited(&args.source.input, &delimited)?;
    let normalizer = TicketNormalizer::new(NormalizeOptions::from_settings(
        &config.normalize,
        &config.columns,
        Some(now),
    ));
    let normalized = normalizer
        .normalize(&raw)
        .with_context(|| format!("Normalizing {:?}", args.source.input))?;

    print!(
        "{}",
        table::render_relation(&normalized.relation, Some(args.rows))
    );
    info!(
        "Displayed {} of {} normalized row(s) from {:?}",
        args.rows.min(normalized.relation.row_count()),
        normalized.relation.row_count(),
        args.source.input
    );
    Ok(())
}

//! Column listing for ticket exports and lookup workbooks.
//!
//! Prints each column with its position and first non-empty value, which is
//! usually enough to pick `--key-column` and `--value-column`.

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{ColumnsArgs, SourceArgs},
    reader::{self, SourceKind},
    relation::Relation,
    report_cmd::{delimited_options, load_config},
    table,
};

pub fn execute(args: &ColumnsArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = SourceArgs {
        input: args.input.clone(),
        config: None,
        delimiter: args.delimiter,
        input_encoding: args.input_encoding.clone(),
    };
    let delimited = delimited_options(&source, &config)?;
    let sheet = args
        .sheet
        .clone()
        .unwrap_or_else(|| config.input.lookup_sheet.clone());

    if SourceKind::detect(&args.input) == SourceKind::Workbook {
        let sheets = reader::workbook_sheet_names(&args.input)?;
        info!("Workbook {:?} has sheet(s): {}", args.input, sheets.join(", "));
    }
    let relation = reader::read_source(&args.input, &delimited, &sheet)
        .with_context(|| format!("Reading columns from {:?}", args.input))?;

    let headers = vec!["#".to_string(), "column".to_string(), "sample".to_string()];
    table::print_table(&headers, &column_rows(&relation));
    info!(
        "Listed {} column(s) from {:?}",
        relation.column_count(),
        args.input
    );
    Ok(())
}

fn column_rows(relation: &Relation) -> Vec<Vec<String>> {
    relation
        .headers()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let sample = relation
                .rows()
                .iter()
                .map(|row| row[idx].trim())
                .find(|cell| !cell.is_empty())
                .unwrap_or_default();
            vec![(idx + 1).to_string(), name.clone(), sample.to_string()]
        })
        .collect()
}

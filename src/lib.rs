pub mod config;
pub mod error;
pub mod join;
pub mod pipeline;
pub mod reader;
pub mod reference;
pub mod table;
mod util;
pub mod writer;

pub use anyhow::{Context, Error};
use qu::ick_use::*;
use serde::Serialize;
use std::sync::Arc;

pub use crate::{
    config::{Config, ConfigArgs, DataFiles},
    error::TableError,
    pipeline::{EventFilter, FilterStats, FilteredEvents},
    table::{Column, ColumnType, Table, Value},
    util::header,
    writer::write_table,
};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// The cohort key table and the allow-list.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    pub cohort_keys: Table,
    pub allow_list: Table,
}

impl ReferenceTables {
    /// Build both tables from the raw extracts and save them to the data directory.
    pub fn build(config: &Config) -> Result<Self> {
        let cohort_keys =
            reference::build_cohort_keys(config.admissions_path(), config.cohort_path())?;
        write_table(&cohort_keys, config.cohort_keys_path())?;

        let allow_list =
            reference::build_allow_list(config.dictionary_path(), config.selection_path())?;
        write_table(&allow_list, config.allow_list_path())?;

        Ok(ReferenceTables {
            cohort_keys,
            allow_list,
        })
    }

    /// Load tables saved by an earlier `build`.
    pub fn load(config: &Config) -> Result<Self> {
        Ok(ReferenceTables {
            cohort_keys: reference::load_cohort_keys(config.cohort_keys_path())?,
            allow_list: reference::load_allow_list(config.allow_list_path())?,
        })
    }
}

/// What a full run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub cohort_keys: usize,
    pub allow_list: usize,
    /// Selected labels with no entry in the item dictionary.
    pub unmatched_labels: Vec<String>,
    pub events: FilterStats,
}

impl RunSummary {
    fn new(references: &ReferenceTables, events: FilterStats) -> Self {
        RunSummary {
            cohort_keys: references.cohort_keys.len(),
            allow_list: references.allow_list.len(),
            unmatched_labels: reference::unmatched_labels(&references.allow_list),
            events,
        }
    }

    /// Print the summary to stdout.
    pub fn print(&self) {
        header("Summary");
        println!("cohort admissions:       {}", self.cohort_keys);
        println!("allow-list rows:         {}", self.allow_list);
        if !self.unmatched_labels.is_empty() {
            println!("unmatched labels:        {}", self.unmatched_labels.join(", "));
        }
        println!("event chunks:            {}", self.events.chunks);
        println!("event rows read:         {}", self.events.rows_read);
        println!("rows on the allow-list:  {}", self.events.rows_allowed);
        println!("rows kept:               {}", self.events.rows_kept);
    }
}

/// Stream the event log through `references` and save the surviving events.
pub fn filter_events(config: &Config, references: &ReferenceTables) -> Result<FilterStats> {
    let filter = EventFilter::new(
        references.allow_list.clone(),
        references.cohort_keys.clone(),
    )?;
    let chunks = reader::read_chunks(config.events_path(), None, config.chunk_size)?;
    event!(
        Level::INFO,
        "filtering \"{}\" {} rows at a time",
        config.events_path().display(),
        config.chunk_size
    );
    let filtered = filter.run(chunks)?;
    write_table(&filtered.table, config.output_path())?;
    Ok(filtered.stats)
}

/// Build the reference tables, then filter the event log with them.
pub fn run(config: &Config) -> Result<RunSummary> {
    let references = ReferenceTables::build(config)?;
    let events = filter_events(config, &references)?;
    Ok(RunSummary::new(&references, events))
}

/// Like `run`, but reuse reference tables saved by an earlier run.
pub fn rerun_filter(config: &Config) -> Result<RunSummary> {
    let references = ReferenceTables::load(config)?;
    let events = filter_events(config, &references)?;
    Ok(RunSummary::new(&references, events))
}

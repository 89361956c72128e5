//! Streaming the event log through the allow-list and cohort filters.
//!
//! Each chunk is filtered on its own and only the surviving rows are kept, so peak memory is one
//! chunk plus the rows kept so far. Chunk boundaries do not change which rows are kept.
use crate::{
    error::TableError,
    join::{IndexedTable, JoinKind},
    reader::Chunks,
    table::Table,
    ArcStr,
};
use qu::ick_use::*;
use serde::Serialize;
use std::io;

/// Event column matched against the allow-list.
pub const ITEM_KEY: [&str; 1] = ["itemid"];

/// Event columns matched against the cohort key table.
pub const COHORT_KEYS: [&str; 2] = ["subject_id", "hadm_id"];

/// Row counts from a filtering run.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub chunks: usize,
    pub rows_read: usize,
    /// Rows left after the allow-list join. Can exceed `rows_read` when several allow-list rows
    /// share an `itemid`.
    pub rows_allowed: usize,
    pub rows_kept: usize,
}

impl FilterStats {
    fn add(&mut self, other: FilterStats) {
        self.chunks += other.chunks;
        self.rows_read += other.rows_read;
        self.rows_allowed += other.rows_allowed;
        self.rows_kept += other.rows_kept;
    }
}

/// The filtered events and how they were arrived at.
#[derive(Debug, Clone)]
pub struct FilteredEvents {
    pub table: Table,
    pub stats: FilterStats,
}

/// Keeps the events whose measurement type is on the allow-list and whose admission is in the
/// cohort, annotating them with the allow-list columns.
#[derive(Debug, Clone)]
pub struct EventFilter {
    allow_list: IndexedTable,
    cohort: IndexedTable,
}

impl EventFilter {
    pub fn new(allow_list: Table, cohort_keys: Table) -> Result<Self, TableError> {
        Ok(EventFilter {
            allow_list: IndexedTable::new(allow_list, &ITEM_KEY)?,
            cohort: IndexedTable::new(cohort_keys, &COHORT_KEYS)?,
        })
    }

    /// Filter a single chunk.
    ///
    /// Column names are lower-cased first. The result has the chunk's columns, then the
    /// allow-list's non-key columns, then any cohort columns other than its keys. Rows stay in
    /// event order. This differs from a merge with the cohort on the left, which would start with
    /// `hadm_id, subject_id` and group rows by cohort row.
    pub fn filter_chunk(&self, mut chunk: Table) -> Result<FilteredEvents, TableError> {
        let rows_read = chunk.len();
        chunk.lowercase_column_names()?;
        let allowed = self.allow_list.join(&chunk, JoinKind::Inner)?;
        let kept = self.cohort.join(&allowed, JoinKind::Inner)?;
        Ok(FilteredEvents {
            stats: FilterStats {
                chunks: 1,
                rows_read,
                rows_allowed: allowed.len(),
                rows_kept: kept.len(),
            },
            table: kept,
        })
    }

    /// Filter every chunk of an event source and stack the results.
    pub fn run<R: io::Read>(&self, chunks: Chunks<R>) -> Result<FilteredEvents> {
        let headers = chunks.headers().to_vec();
        let source_name = chunks.source_name().clone();
        self.run_tables(chunks, &headers)
            .with_context(|| format!("filtering events from \"{}\"", source_name))
    }

    /// Filter a sequence of chunks with the given column names, in order.
    ///
    /// If no rows survive, the result is an empty table that still has every output column.
    pub fn run_tables(
        &self,
        chunks: impl IntoIterator<Item = Result<Table>>,
        headers: &[ArcStr],
    ) -> Result<FilteredEvents> {
        let mut parts = vec![];
        let mut stats = FilterStats::default();
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let filtered = self
                .filter_chunk(chunk?)
                .with_context(|| format!("in chunk {}", idx + 1))?;
            event!(
                Level::INFO,
                "chunk {}: read {} rows, {} on the allow-list, {} in the cohort",
                idx + 1,
                filtered.stats.rows_read,
                filtered.stats.rows_allowed,
                filtered.stats.rows_kept
            );
            stats.add(filtered.stats);
            if !filtered.table.is_empty() {
                parts.push(filtered.table);
            }
        }

        let table = if parts.is_empty() {
            let empty = Table::empty(headers.iter().cloned())?;
            self.filter_chunk(empty)?.table
        } else {
            Table::concat(parts)?
        };
        event!(
            Level::INFO,
            "kept {} of {} event rows from {} chunks",
            stats.rows_kept,
            stats.rows_read,
            stats.chunks
        );
        Ok(FilteredEvents { table, stats })
    }
}

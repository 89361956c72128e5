//! The ways a run can fail.
//!
//! Library functions return `anyhow` errors with context naming the stage and file. The
//! underlying cause is always one of these variants, so callers can `downcast_ref` to find out
//! what went wrong.
use crate::{table::ColumnType, ArcStr};
use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("no such file \"{}\"", .path.display())]
    SourceNotFound { path: PathBuf },
    #[error("schema mismatch on column `{column}`: {detail}")]
    SchemaMismatch { column: ArcStr, detail: String },
    #[error("malformed row in {source_name} at line {line}: {message}")]
    ParseError {
        source_name: ArcStr,
        line: u64,
        message: String,
    },
    #[error("join key `{column}` is {left} on the left but {right} on the right")]
    JoinKeyTypeMismatch {
        column: ArcStr,
        left: ColumnType,
        right: ColumnType,
    },
    #[error("cannot write to \"{}\"", .path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TableError {
    pub(crate) fn missing_column(column: impl Into<ArcStr>, available: &[ArcStr]) -> Self {
        use itertools::Itertools;
        TableError::SchemaMismatch {
            column: column.into(),
            detail: format!(
                "not present (columns are {})",
                available.iter().map(|c| format!("`{}`", c)).join(", ")
            ),
        }
    }
}

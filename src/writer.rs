//! Writing tables back out as comma-delimited text.
use crate::{error::TableError, table::Table, util};
use qu::ick_use::*;
use std::{fmt::Write as _, io, path::Path};

/// Write `table` to `path` with a header row and no index column.
///
/// Null cells are written empty. The file is written next to its destination and moved into
/// place once complete, so readers never see half a table. An existing file is replaced.
pub fn write_table(table: &Table, path: impl AsRef<Path>) -> Result {
    fn inner(table: &Table, path: &Path) -> Result {
        let unwritable = |source: io::Error| TableError::DestinationUnwritable {
            path: path.to_owned(),
            source,
        };
        let parent = util::parent_dir(path);
        if !parent.is_dir() {
            return Err(unwritable(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no directory at \"{}\"", parent.display()),
            ))
            .into());
        }

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(unwritable)?;
        {
            let mut out = csv::Writer::from_writer(tmp.as_file_mut());
            write_records(table, &mut out)?;
            out.flush().map_err(unwritable)?;
        }
        if util::path_exists(path)? {
            event!(
                Level::WARN,
                "overwriting existing file at \"{}\"",
                path.display()
            );
        }
        tmp.persist(path).map_err(|e| unwritable(e.error))?;
        Ok(())
    }
    let path = path.as_ref();
    inner(table, path).with_context(|| format!("unable to save table to \"{}\"", path.display()))?;
    event!(
        Level::INFO,
        "wrote {} rows to \"{}\"",
        table.len(),
        path.display()
    );
    Ok(())
}

fn write_records<W: io::Write>(table: &Table, out: &mut csv::Writer<W>) -> Result {
    out.write_record(table.column_names().iter().map(|name| name.as_bytes()))?;
    let mut scratch = String::new();
    for row in 0..table.len() {
        for value in table.row(row) {
            scratch.clear();
            write!(scratch, "{}", value)?;
            out.write_field(&scratch)?;
        }
        out.write_record(None::<&[u8]>)?;
    }
    Ok(())
}

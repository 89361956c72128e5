//! Reading comma-delimited sources, either whole or as a sequence of fixed-size chunks.
use crate::{
    error::TableError,
    table::{Column, Table},
    ArcStr,
};
use qu::ick_use::*;
use std::{fs, io, num::NonZeroUsize, path::Path};

/// A source opened either whole or in chunks.
pub enum TableSource<R = fs::File> {
    Whole(Table),
    Chunked(Chunks<R>),
}

/// Open `path`, reading it whole when `chunk_size` is `None` and lazily in chunks otherwise.
pub fn open_source(
    path: impl AsRef<Path>,
    columns: Option<&[&str]>,
    chunk_size: Option<NonZeroUsize>,
) -> Result<TableSource> {
    Ok(match chunk_size {
        Some(chunk_size) => TableSource::Chunked(read_chunks(path, columns, chunk_size)?),
        None => TableSource::Whole(read_table(path, columns)?),
    })
}

/// Read a whole source into memory.
///
/// If `columns` is given, only those columns are parsed (matching header names ignoring ASCII
/// case, kept in file order).
pub fn read_table(path: impl AsRef<Path>, columns: Option<&[&str]>) -> Result<Table> {
    let path = path.as_ref();
    let table = Chunks::open(path, columns, usize::MAX)?.read_all()?;
    event!(
        Level::INFO,
        "read {} rows and {} columns from \"{}\"",
        table.len(),
        table.width(),
        path.display()
    );
    Ok(table)
}

/// Lazily read a source `chunk_size` rows at a time.
pub fn read_chunks(
    path: impl AsRef<Path>,
    columns: Option<&[&str]>,
    chunk_size: NonZeroUsize,
) -> Result<Chunks> {
    Chunks::open(path.as_ref(), columns, chunk_size.get())
}

/// The chunks of a delimited source, in source order.
///
/// Every row is in exactly one chunk. Each chunk infers its own column types. The sequence can
/// only be walked once, and ends after the first error.
pub struct Chunks<R = fs::File> {
    reader: csv::Reader<R>,
    source_name: ArcStr,
    headers: Vec<ArcStr>,
    /// Indices into each record of the columns we keep.
    selected: Vec<usize>,
    chunk_size: usize,
    record: csv::StringRecord,
    done: bool,
}

impl Chunks {
    fn open(path: &Path, columns: Option<&[&str]>, chunk_size: usize) -> Result<Self> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TableError::SourceNotFound {
                    path: path.to_owned(),
                }
                .into())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("opening \"{}\"", path.display()))
            }
        };
        Chunks::from_reader(file, path.display().to_string(), columns, chunk_size)
    }
}

impl<R: io::Read> Chunks<R> {
    /// Read chunks from any reader. `source_name` is used in error messages.
    pub fn from_reader(
        rdr: R,
        source_name: impl Into<ArcStr>,
        columns: Option<&[&str]>,
        chunk_size: usize,
    ) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk size must be positive");
        let source_name = source_name.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);
        let all_headers = reader
            .headers()
            .map_err(|e| parse_error(&source_name, e))?
            .iter()
            .map(ArcStr::from)
            .collect::<Vec<_>>();
        if let Some(dup) = all_headers
            .iter()
            .enumerate()
            .find_map(|(idx, h)| all_headers[..idx].contains(h).then(|| h.clone()))
        {
            return Err(TableError::SchemaMismatch {
                column: dup,
                detail: "column name appears more than once".into(),
            })
            .with_context(|| format!("reading {}", source_name));
        }

        let selected = match columns {
            None => (0..all_headers.len()).collect(),
            Some(columns) => {
                for column in columns {
                    if !all_headers.iter().any(|h| h.eq_ignore_ascii_case(column)) {
                        return Err(TableError::missing_column(*column, &all_headers))
                            .with_context(|| format!("reading {}", source_name));
                    }
                }
                (0..all_headers.len())
                    .filter(|idx| {
                        columns
                            .iter()
                            .any(|col| all_headers[*idx].eq_ignore_ascii_case(col))
                    })
                    .collect::<Vec<_>>()
            }
        };
        let headers = selected
            .iter()
            .map(|idx| all_headers[*idx].clone())
            .collect();

        Ok(Chunks {
            reader,
            source_name,
            headers,
            selected,
            chunk_size,
            record: csv::StringRecord::new(),
            done: false,
        })
    }

    /// Names of the columns every chunk will have, before any renaming.
    pub fn headers(&self) -> &[ArcStr] {
        &self.headers
    }

    pub fn source_name(&self) -> &ArcStr {
        &self.source_name
    }

    /// Read everything that is left into one table.
    pub fn read_all(mut self) -> Result<Table> {
        self.chunk_size = usize::MAX;
        match self.next() {
            Some(table) => table,
            None => Ok(Table::empty(self.headers.iter().cloned())?),
        }
    }

    fn read_chunk(&mut self) -> Result<Option<Table>> {
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); self.selected.len()];
        let mut rows = 0;
        while rows < self.chunk_size {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => (),
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => return Err(parse_error(&self.source_name, e).into()),
            }
            for (cells, idx) in raw.iter_mut().zip(self.selected.iter()) {
                // the csv reader already rejects rows of the wrong length
                cells.push(self.record.get(*idx).unwrap_or_default().to_owned());
            }
            rows += 1;
        }
        if rows == 0 {
            return Ok(None);
        }

        let columns = self
            .headers
            .iter()
            .zip(raw)
            .map(|(name, cells)| Column::from_raw(name.clone(), cells))
            .collect();
        Ok(Some(Table::new(columns)?))
    }
}

impl<R: io::Read> Iterator for Chunks<R> {
    type Item = Result<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(table)) => Some(Ok(table)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn parse_error(source_name: &ArcStr, e: csv::Error) -> TableError {
    TableError::ParseError {
        source_name: source_name.clone(),
        line: e.position().map(|pos| pos.line()).unwrap_or(0),
        message: e.to_string(),
    }
}

/// Parse a table from csv text.
#[cfg(test)]
pub(crate) fn table_from_str(src: &str) -> Table {
    Chunks::from_reader(io::Cursor::new(src), "test", None, usize::MAX)
        .unwrap()
        .read_all()
        .unwrap()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::table::Value;
    use std::io::{Cursor, Write};

    const EVENTS: &str = "\
ROW_ID,SUBJECT_ID,HADM_ID,ITEMID,VALUE
1,10,1,100,5
2,10,1,999,9
3,11,2,100,7
4,12,3,100,high
5,12,3,101,8
";

    fn chunks(
        src: &'static str,
        columns: Option<&[&str]>,
        size: usize,
    ) -> Chunks<Cursor<&'static str>> {
        Chunks::from_reader(Cursor::new(src), "events", columns, size).unwrap()
    }

    #[test]
    fn chunk_boundaries() {
        let sizes = chunks(EVENTS, None, 2)
            .map(|chunk| chunk.unwrap().len())
            .collect::<Vec<_>>();
        assert_eq!(sizes, [2, 2, 1]);

        let sizes = chunks(EVENTS, None, 5)
            .map(|chunk| chunk.unwrap().len())
            .collect::<Vec<_>>();
        assert_eq!(sizes, [5]);
    }

    #[test]
    fn chunks_cover_rows_in_order() {
        let row_ids = chunks(EVENTS, None, 2)
            .flat_map(|chunk| {
                let chunk = chunk.unwrap();
                chunk.require("ROW_ID").unwrap().values().to_vec()
            })
            .collect::<Vec<_>>();
        assert_eq!(
            row_ids,
            (1..=5).map(Value::Int).collect::<Vec<_>>()
        );
    }

    #[test]
    fn types_are_per_chunk() {
        let mut iter = chunks(EVENTS, None, 3);
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.require("VALUE").unwrap().ty(), crate::table::ColumnType::Int);
        let second = iter.next().unwrap().unwrap();
        assert_eq!(second.require("VALUE").unwrap().ty(), crate::table::ColumnType::Text);
        assert!(iter.next().is_none());
    }

    #[test]
    fn column_subset_ignores_case_and_keeps_file_order() {
        let table = chunks(EVENTS, Some(&["itemid", "subject_id"][..]), usize::MAX)
            .read_all()
            .unwrap();
        assert_eq!(
            table.column_names(),
            vec![ArcStr::from("SUBJECT_ID"), ArcStr::from("ITEMID")]
        );
    }

    #[test]
    fn missing_column_is_schema_mismatch() {
        let err = Chunks::from_reader(Cursor::new(EVENTS), "events", Some(&["charttime"][..]), 10)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<TableError>(),
            Some(TableError::SchemaMismatch { column, .. }) if &**column == "charttime"
        ));
    }

    #[test]
    fn malformed_row_is_parse_error() {
        let src = "a,b\n1,2\n3\n4,5\n";
        let mut iter = chunks(src, None, 1);
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TableError>(),
            Some(TableError::ParseError { source_name, .. }) if &**source_name == "events"
        ));
        // fused after an error
        assert!(iter.next().is_none());
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        let err = Chunks::from_reader(Cursor::new("a,b,a\n1,2,3\n"), "events", None, 10)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<TableError>(),
            Some(TableError::SchemaMismatch { column, .. }) if &**column == "a"
        ));
    }

    #[test]
    fn header_only_source() {
        assert_eq!(chunks("a,b\n", None, 10).count(), 0);
        let table = chunks("a,b\n", None, 10).read_all().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.width(), 2);
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table(dir.path().join("ADMISSIONS.csv"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TableError>(),
            Some(TableError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn open_source_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHARTEVENTS.csv");
        fs::File::create(&path)
            .unwrap()
            .write_all(EVENTS.as_bytes())
            .unwrap();

        match open_source(&path, None, None).unwrap() {
            TableSource::Whole(table) => assert_eq!(table.len(), 5),
            TableSource::Chunked(_) => panic!("expected a whole table"),
        }
        match open_source(&path, None, NonZeroUsize::new(4)).unwrap() {
            TableSource::Chunked(chunks) => assert_eq!(chunks.count(), 2),
            TableSource::Whole(_) => panic!("expected chunks"),
        }
    }
}

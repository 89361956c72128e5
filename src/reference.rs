//! The two small lookup tables the event filter needs.
//!
//! The cohort key table lists the `(hadm_id, subject_id)` pairs of the cohort admissions, and the
//! allow-list lists the measurement types (`itemid`s) we want to keep. Both are small, so they are
//! read whole and built once before the event log is touched.
//!
//! Cohort admissions missing from the admissions table are dropped. Selected labels missing from
//! the item dictionary are kept with empty dictionary fields, and logged.
use crate::{
    error::TableError,
    join::{join, JoinKind},
    reader::read_table,
    table::Table,
};
use qu::ick_use::*;
use std::path::Path;

/// Columns of the cohort key table, in output order.
pub const COHORT_KEY_COLUMNS: [&str; 2] = ["hadm_id", "subject_id"];

/// Columns kept from the item dictionary.
pub const DICTIONARY_COLUMNS: [&str; 8] = [
    "label",
    "itemid",
    "dbsource",
    "linksto",
    "category",
    "unitname",
    "param_type",
    "conceptid",
];

/// Build the cohort key table from the admissions and cohort files.
pub fn build_cohort_keys(admissions: impl AsRef<Path>, cohort: impl AsRef<Path>) -> Result<Table> {
    fn inner(admissions: &Path, cohort: &Path) -> Result<Table> {
        let admissions = read_table(admissions, None)?;
        let cohort = read_table(cohort, None)?;
        Ok(cohort_keys(admissions, &cohort)?)
    }

    let (admissions, cohort) = (admissions.as_ref(), cohort.as_ref());
    let table = inner(admissions, cohort).with_context(|| {
        format!(
            "building cohort key table from \"{}\" and \"{}\"",
            admissions.display(),
            cohort.display()
        )
    })?;
    event!(Level::INFO, "cohort key table has {} rows", table.len());
    Ok(table)
}

/// Attach subject IDs to cohort admissions.
///
/// Admission column names are lower-cased first; the cohort's are used as they are. Cohort rows
/// without a matching admission are dropped, and a cohort row matching several admissions rows
/// appears once for each.
pub fn cohort_keys(mut admissions: Table, cohort: &Table) -> Result<Table, TableError> {
    admissions.lowercase_column_names()?;
    let admissions = admissions.select(&COHORT_KEY_COLUMNS)?;
    let cohort = cohort.select(&["hadm_id"])?;
    join(&cohort, &admissions, &["hadm_id"], JoinKind::Inner)?.select(&COHORT_KEY_COLUMNS)
}

/// Build the allow-list table from the item dictionary and the label selection files.
pub fn build_allow_list(
    dictionary: impl AsRef<Path>,
    selection: impl AsRef<Path>,
) -> Result<Table> {
    fn inner(dictionary: &Path, selection: &Path) -> Result<Table> {
        let dictionary = read_table(dictionary, Some(&DICTIONARY_COLUMNS))?;
        let selection = read_table(selection, None)?;
        Ok(allow_list(dictionary, selection)?)
    }

    let (dictionary, selection) = (dictionary.as_ref(), selection.as_ref());
    let table = inner(dictionary, selection).with_context(|| {
        format!(
            "building allow-list from \"{}\" and \"{}\"",
            dictionary.display(),
            selection.display()
        )
    })?;
    let unmatched = unmatched_labels(&table);
    for label in unmatched.iter() {
        event!(Level::WARN, "label {:?} is not in the item dictionary", label);
    }
    event!(
        Level::INFO,
        "allow-list has {} rows ({} labels unmatched)",
        table.len(),
        unmatched.len()
    );
    Ok(table)
}

/// Left-join the selected labels against the item dictionary, ignoring case.
///
/// Labels are lower-cased once here, so the join itself compares exactly.
pub fn allow_list(mut dictionary: Table, mut selection: Table) -> Result<Table, TableError> {
    dictionary.lowercase_column_names()?;
    for column in DICTIONARY_COLUMNS {
        dictionary.require(column)?;
    }
    let keep = dictionary
        .column_names()
        .into_iter()
        .filter(|name| DICTIONARY_COLUMNS.contains(&&**name))
        .collect::<Vec<_>>();
    let mut dictionary = dictionary.select(&keep.iter().map(|name| &**name).collect::<Vec<_>>())?;
    normalize_labels(&mut dictionary)?;
    normalize_labels(&mut selection)?;
    join(&selection, &dictionary, &["label"], JoinKind::Left)
}

fn normalize_labels(table: &mut Table) -> Result<(), TableError> {
    table.cast_to_text("label")?;
    table.lowercase_values("label")
}

/// Labels of allow-list rows that found no dictionary entry.
pub fn unmatched_labels(allow_list: &Table) -> Vec<String> {
    let (Some(labels), Some(itemids)) = (allow_list.column("label"), allow_list.column("itemid"))
    else {
        return vec![];
    };
    labels
        .values()
        .iter()
        .zip(itemids.values())
        .filter(|(_, itemid)| itemid.is_null())
        .map(|(label, _)| label.to_string())
        .collect()
}

/// Load a cohort key table written by a previous run.
pub fn load_cohort_keys(path: impl AsRef<Path>) -> Result<Table> {
    fn inner(path: &Path) -> Result<Table> {
        let mut table = read_table(path, Some(&COHORT_KEY_COLUMNS))?;
        table.lowercase_column_names()?;
        Ok(table.select(&COHORT_KEY_COLUMNS)?)
    }
    let path = path.as_ref();
    inner(path).with_context(|| format!("loading cohort key table from \"{}\"", path.display()))
}

/// Load an allow-list table written by a previous run.
pub fn load_allow_list(path: impl AsRef<Path>) -> Result<Table> {
    fn inner(path: &Path) -> Result<Table> {
        let mut table = read_table(path, None)?;
        table.require("itemid")?;
        if table.column("label").is_some() {
            table.cast_to_text("label")?;
        }
        Ok(table)
    }
    let path = path.as_ref();
    inner(path).with_context(|| format!("loading allow-list from \"{}\"", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        reader::table_from_str,
        table::{ColumnType, Value},
    };
    use std::fs;

    const ADMISSIONS: &str = "\
ROW_ID,SUBJECT_ID,HADM_ID,ADMITTIME,DISCHTIME,HAS_CHARTEVENTS_DATA
1,10,1,2101-10-20 19:08:00,2101-10-31 13:58:00,1
2,11,2,2191-03-16 00:28:00,2191-03-23 18:41:00,1
3,12,3,2103-02-02 04:31:00,2103-02-04 12:15:00,0
";

    const DICTIONARY: &str = "\
ROW_ID,ITEMID,LABEL,ABBREVIATION,DBSOURCE,LINKSTO,CATEGORY,UNITNAME,PARAM_TYPE,CONCEPTID
1,211,Heart Rate,HR,carevue,chartevents,,bpm,,
2,220045,Heart Rate,HR,metavision,chartevents,Routine Vital Signs,bpm,Numeric,
3,807,Fingerstick Glucose,,carevue,chartevents,,,,
";

    fn names(table: &Table) -> Vec<String> {
        table.column_names().iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn cohort_keys_drop_unknown_admissions() {
        let cohort = table_from_str("hadm_id,sofa\n3,4\n99,2\n1,7\n");
        let keys = cohort_keys(table_from_str(ADMISSIONS), &cohort).unwrap();
        assert_eq!(names(&keys), ["hadm_id", "subject_id"]);
        assert_eq!(
            keys.row(0).cloned().collect::<Vec<_>>(),
            [Value::Int(3), Value::Int(12)]
        );
        assert_eq!(
            keys.row(1).cloned().collect::<Vec<_>>(),
            [Value::Int(1), Value::Int(10)]
        );
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn cohort_keys_keep_duplicates() {
        let cohort = table_from_str("hadm_id\n1\n1\n");
        let keys = cohort_keys(table_from_str(ADMISSIONS), &cohort).unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn cohort_column_case_is_not_changed() {
        let cohort = table_from_str("HADM_ID\n1\n");
        let err = cohort_keys(table_from_str(ADMISSIONS), &cohort).unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch { column, .. } if &*column == "hadm_id"));
    }

    #[test]
    fn cohort_key_types_are_checked() {
        let cohort = table_from_str("hadm_id\nfirst\n");
        let err = cohort_keys(table_from_str(ADMISSIONS), &cohort).unwrap_err();
        assert!(matches!(err, TableError::JoinKeyTypeMismatch { .. }));
    }

    #[test]
    fn allow_list_matches_labels_ignoring_case() {
        let dictionary = table_from_str(DICTIONARY);
        let selection = table_from_str("label\nheart rate\nFINGERSTICK GLUCOSE\nPaO2/FiO2\n");
        let table = allow_list(dictionary, selection).unwrap();
        // the abbreviation and row_id columns of the dictionary are not kept
        assert_eq!(
            names(&table),
            [
                "label",
                "itemid",
                "dbsource",
                "linksto",
                "category",
                "unitname",
                "param_type",
                "conceptid"
            ]
        );
        // two dictionary rows for heart rate, one for glucose, one unmatched
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.require("itemid").unwrap().values(),
            &[Value::Int(211), Value::Int(220045), Value::Int(807), Value::Null]
        );
        assert_eq!(unmatched_labels(&table), ["pao2/fio2"]);
    }

    #[test]
    fn allow_list_requires_dictionary_columns() {
        let dictionary = table_from_str("ITEMID,LABEL\n211,Heart Rate\n");
        let err = allow_list(dictionary, table_from_str("label\nheart rate\n")).unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch { column, .. } if &*column == "dbsource"));
    }

    #[test]
    fn numeric_looking_labels_still_join() {
        let dictionary = table_from_str(
            "itemid,label,dbsource,linksto,category,unitname,param_type,conceptid\n1,100,,,,,,\n",
        );
        let table = allow_list(dictionary, table_from_str("label\n100\n")).unwrap();
        assert_eq!(table.require("label").unwrap().ty(), ColumnType::Text);
        assert_eq!(table.require("itemid").unwrap().values(), &[Value::Int(1)]);
    }

    #[test]
    fn builds_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);
        fs::write(path("ADMISSIONS.csv"), ADMISSIONS).unwrap();
        fs::write(path("sepsis3-df.csv"), "hadm_id\n2\n").unwrap();
        fs::write(path("D_ITEMS.csv"), DICTIONARY).unwrap();
        fs::write(path("D_ITEMS_select.csv"), "label\nHeart Rate\n").unwrap();

        let keys = build_cohort_keys(path("ADMISSIONS.csv"), path("sepsis3-df.csv")).unwrap();
        assert_eq!(keys.row(0).cloned().collect::<Vec<_>>(), [Value::Int(2), Value::Int(11)]);

        let allow = build_allow_list(path("D_ITEMS.csv"), path("D_ITEMS_select.csv")).unwrap();
        assert_eq!(allow.len(), 2);

        let err = build_cohort_keys(path("missing.csv"), path("sepsis3-df.csv")).unwrap_err();
        assert!(format!("{:#}", err).contains("building cohort key table"));
        assert!(matches!(
            err.downcast_ref::<TableError>(),
            Some(TableError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn loads_persisted_tables() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("sepsis3-patients.csv");
        fs::write(&keys, "hadm_id,subject_id\n1,10\n").unwrap();
        let table = load_cohort_keys(&keys).unwrap();
        assert_eq!(names(&table), ["hadm_id", "subject_id"]);

        let allow = dir.path().join("D_ITEMS_final.csv");
        fs::write(&allow, "label,itemid\nglucose,100\nunknown,\n").unwrap();
        let table = load_allow_list(&allow).unwrap();
        assert_eq!(unmatched_labels(&table), ["unknown"]);

        fs::write(&allow, "label\nglucose\n").unwrap();
        assert!(load_allow_list(&allow).is_err());
    }
}

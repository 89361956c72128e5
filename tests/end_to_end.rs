use sepsis_events::{Config, TableError};
use std::{fs, num::NonZeroUsize, path::Path};

const ADMISSIONS: &str = "\
ROW_ID,SUBJECT_ID,HADM_ID,ADMITTIME
1,10,1,2101-10-20 19:08:00
2,11,2,2191-03-16 00:28:00
";

const DICTIONARY: &str = "\
ROW_ID,ITEMID,LABEL,ABBREVIATION,DBSOURCE,LINKSTO,CATEGORY,UNITNAME,PARAM_TYPE,CONCEPTID
1,100,Glucose,,carevue,chartevents,Labs,mg/dL,,
2,211,Heart Rate,HR,carevue,chartevents,,bpm,,
";

const EVENTS: &str = "\
ROW_ID,SUBJECT_ID,HADM_ID,ITEMID,VALUE
1,10,1,100,5
2,10,1,999,9
";

fn data_dir(cohort: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, contents: &str| fs::write(dir.path().join(name), contents).unwrap();
    write("ADMISSIONS.csv", ADMISSIONS);
    write("sepsis3-df.csv", cohort);
    write("D_ITEMS.csv", DICTIONARY);
    write("D_ITEMS_select.csv", "label\nglucose\n");
    write("CHARTEVENTS.csv", EVENTS);
    dir
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

fn config(dir: &Path, chunk_size: usize) -> Config {
    Config::new(dir).with_chunk_size(NonZeroUsize::new(chunk_size).unwrap())
}

#[test]
fn extracts_cohort_events() {
    let dir = data_dir("hadm_id\n1\n");
    let summary = sepsis_events::run(&config(dir.path(), 1)).unwrap();

    assert_eq!(read(dir.path(), "sepsis3-patients.csv"), "hadm_id,subject_id\n1,10\n");
    assert_eq!(
        read(dir.path(), "D_ITEMS_final.csv"),
        "label,itemid,dbsource,linksto,category,unitname,param_type,conceptid\n\
         glucose,100,carevue,chartevents,Labs,mg/dL,,\n"
    );
    assert_eq!(
        read(dir.path(), "sepsis_chartevents.csv"),
        "row_id,subject_id,hadm_id,itemid,value,label,\
         dbsource,linksto,category,unitname,param_type,conceptid\n\
         1,10,1,100,5,glucose,carevue,chartevents,Labs,mg/dL,,\n"
    );
    assert_eq!(summary.events.chunks, 2);
    assert_eq!(summary.events.rows_read, 2);
    assert_eq!(summary.events.rows_kept, 1);
    assert!(summary.unmatched_labels.is_empty());
}

#[test]
fn rerunning_the_filter_gives_the_same_output() {
    let dir = data_dir("hadm_id\n1\n2\n");
    sepsis_events::run(&config(dir.path(), 1)).unwrap();
    let first = read(dir.path(), "sepsis_chartevents.csv");

    let summary = sepsis_events::rerun_filter(&config(dir.path(), 1000)).unwrap();
    assert_eq!(summary.events.chunks, 1);
    assert_eq!(summary.cohort_keys, 2);
    assert_eq!(read(dir.path(), "sepsis_chartevents.csv"), first);
}

#[test]
fn empty_cohort_gives_an_empty_result() {
    let dir = data_dir("hadm_id\n");
    let summary = sepsis_events::run(&config(dir.path(), 1)).unwrap();
    assert_eq!(summary.cohort_keys, 0);
    assert_eq!(summary.events.rows_kept, 0);
    assert_eq!(read(dir.path(), "sepsis3-patients.csv"), "hadm_id,subject_id\n");
    assert_eq!(
        read(dir.path(), "sepsis_chartevents.csv"),
        "row_id,subject_id,hadm_id,itemid,value,label,\
         dbsource,linksto,category,unitname,param_type,conceptid\n"
    );
}

#[test]
fn missing_event_log_fails_after_building_references() {
    let dir = data_dir("hadm_id\n1\n");
    fs::remove_file(dir.path().join("CHARTEVENTS.csv")).unwrap();
    let err = sepsis_events::run(&config(dir.path(), 1)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TableError>(),
        Some(TableError::SourceNotFound { path }) if path.ends_with("CHARTEVENTS.csv")
    ));
    assert!(dir.path().join("D_ITEMS_final.csv").exists());
    assert!(!dir.path().join("sepsis_chartevents.csv").exists());
}

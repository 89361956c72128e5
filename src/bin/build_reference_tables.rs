use clap::Parser;
use qu::ick_use::*;
use sepsis_events::{header, reference, ConfigArgs, ReferenceTables};

/// Build and save the cohort key table and the allow-list, without touching the event log.
#[derive(Parser)]
struct Opt {
    #[clap(flatten)]
    config: ConfigArgs,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = opt.config.into_config()?;
    let tables = ReferenceTables::build(&config)?;

    header("Reference tables");
    println!(
        "{} cohort admissions written to \"{}\"",
        tables.cohort_keys.len(),
        config.cohort_keys_path().display()
    );
    println!(
        "{} allow-list rows written to \"{}\"",
        tables.allow_list.len(),
        config.allow_list_path().display()
    );
    for label in reference::unmatched_labels(&tables.allow_list) {
        println!("unmatched label: {}", label);
    }
    Ok(())
}

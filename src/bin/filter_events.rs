use clap::Parser;
use qu::ick_use::*;
use sepsis_events::ConfigArgs;

/// Filter the event log using reference tables saved by `build_reference_tables`.
#[derive(Parser)]
struct Opt {
    #[clap(flatten)]
    config: ConfigArgs,
    /// Print the summary as JSON.
    #[clap(long)]
    json: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = opt.config.into_config()?;
    let summary = sepsis_events::rerun_filter(&config)?;
    if opt.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
    }
    Ok(())
}

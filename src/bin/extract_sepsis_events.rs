use clap::Parser;
use qu::ick_use::*;
use sepsis_events::ConfigArgs;

/// Extract the chart events of the sepsis cohort, restricted to the selected measurements.
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
    let summary = sepsis_events::run(&config)?;
    if opt.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
    }
    Ok(())
}

use clap::Parser;
use rigr::Direction;
use tracing::instrument;

use super::{Context, OutputFormat, print_json, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "List items without links of a given option")]
pub struct Orphans {
    /// The level to inspect
    level: String,

    /// The link option
    option: String,

    /// Which reading of the link must be missing
    #[arg(long, value_name = "DIRECTION", default_value = "incoming")]
    direction: Reading,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Reading {
    /// Nothing links to the item
    Incoming,
    /// The item links to nothing
    Outgoing,
}

impl From<Reading> for Direction {
    fn from(reading: Reading) -> Self {
        match reading {
            Reading::Incoming => Self::Incoming,
            Reading::Outgoing => Self::Outgoing,
        }
    }
}

impl Orphans {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;
        let orphans =
            snapshot
                .query()
                .orphans(&self.level, &self.option, self.direction.into())?;

        match self.output {
            OutputFormat::Json => print_json(&orphans)?,
            OutputFormat::Table => {
                if orphans.is_empty() {
                    println!("No orphans ✅");
                }
                for id in &orphans {
                    println!("{}", id.as_str().warning());
                }
            }
        }
        Ok(())
    }
}

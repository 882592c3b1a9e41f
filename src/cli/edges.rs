use clap::Parser;
use tracing::instrument;

use super::{Context, OutputFormat, print_json, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "List the edges of a link option with their style hints")]
pub struct Edges {
    /// The link option
    option: String,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

impl Edges {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;
        let edges = snapshot.query().styled_edges(&self.option)?;

        match self.output {
            OutputFormat::Json => print_json(&edges)?,
            OutputFormat::Table => {
                for edge in &edges {
                    let arrow = format!("--{}-->", self.option);
                    println!(
                        "{:<14} {} {:<14} {}",
                        edge.from,
                        arrow.hinted(edge.style.as_deref()),
                        edge.to,
                        edge.style.as_deref().unwrap_or("-").dim()
                    );
                }
            }
        }
        Ok(())
    }
}

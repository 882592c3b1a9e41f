use clap::Parser;
use rigr::domain::query;
use tracing::instrument;

use super::{Context, OutputFormat, print_json, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Show which items of one level are connected to another level")]
pub struct Matrix {
    /// The level rows are drawn from
    source_level: String,

    /// The level targets are drawn from
    target_level: String,

    /// The link option connecting them
    option: String,

    /// Only list rows without any target
    #[arg(long)]
    uncovered: bool,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

impl Matrix {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;
        let mut matrix =
            snapshot
                .query()
                .matrix(&self.source_level, &self.target_level, &self.option)?;

        let covered = matrix.covered();
        let total = matrix.rows.len();
        if self.uncovered {
            matrix.rows.retain(|row| !row.is_covered());
        }

        match self.output {
            OutputFormat::Json => print_json(&matrix)?,
            OutputFormat::Table => Self::output_table(&matrix, covered, total),
        }
        Ok(())
    }

    fn output_table(matrix: &query::Matrix, covered: usize, total: usize) {
        println!(
            "{} {} {}",
            matrix.source_level,
            format!("--{}-->", matrix.option).dim(),
            matrix.target_level
        );

        for row in &matrix.rows {
            if row.is_covered() {
                let targets: Vec<_> = row.targets.iter().map(ToString::to_string).collect();
                println!("  {:<14} {}", row.source, targets.join(", "));
            } else {
                println!("  {:<14} {}", row.source, "uncovered".warning());
            }
        }

        println!();
        let summary = format!("{covered}/{total} covered");
        if covered == total {
            println!("{}", summary.success());
        } else {
            println!("{}", summary.warning());
        }
    }
}

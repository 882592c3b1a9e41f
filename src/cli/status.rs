use std::collections::BTreeMap;

use clap::Parser;
use rigr::{Schema, domain::query::Summary};
use tracing::instrument;

use super::{Context, OutputFormat, print_json, terminal::Colorize};

#[derive(Debug, Parser, Default)]
#[command(about = "Show item counts and defect totals")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

impl Status {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;
        let summary = snapshot.query().summary();

        let mut defects: BTreeMap<&str, usize> = BTreeMap::new();
        for defect in snapshot.defects() {
            *defects.entry(defect.kind.name()).or_default() += 1;
        }

        if summary.items == 0 {
            println!("No items found under {}.", context.root().display());
            return Ok(());
        }

        match self.output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "summary": summary,
                "defects": defects,
            }))?,
            OutputFormat::Table if self.quiet => {
                let total: usize = defects.values().sum();
                println!(
                    "items={} links={} defects={total}",
                    summary.items, summary.links
                );
            }
            OutputFormat::Table => {
                Self::output_table(&summary, &defects, snapshot.schema());
            }
        }
        Ok(())
    }

    fn output_table(summary: &Summary, defects: &BTreeMap<&str, usize>, schema: &Schema) {
        println!("Item counts");
        println!("{}", "───────────".dim());
        println!("{:<16} {:<6}", "Type", "Count");
        for (kind, count) in &summary.by_type {
            println!("{kind:<16} {count:<6}");
        }
        println!(
            "Total            {} in {} documents",
            summary.items, summary.documents
        );

        println!();
        println!("{:<16} {:<6}", "Status", "Count");
        for (status, count) in &summary.by_status {
            println!("{} {count:<6}", format!("{status:<16}").hinted(schema.status_color(status)));
        }

        println!();
        println!("Links: {} ({} dangling)", summary.links, summary.dangling);

        println!();
        if defects.is_empty() {
            println!("Defects: {} ✅", "0".success());
        } else {
            let total: usize = defects.values().sum();
            println!("Defects: {} ⚠️", total.to_string().warning());
            for (kind, count) in defects {
                println!("  - {kind}: {count}");
            }
            println!("{}", "Run 'rigr validate' for details.".dim());
        }
    }
}

use std::process;

use clap::Parser;
use rigr::{Defect, domain::validate::by_document};
use tracing::instrument;

use super::{Context, OutputFormat, print_json, terminal::Colorize};

/// Exit code used when the records have defects.
const DEFECTS_FOUND: i32 = 2;

#[derive(Debug, Parser, Default)]
#[command(about = "Validate the records against the schema")]
pub struct Validate {
    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Only print the number of defects
    #[arg(long, short)]
    quiet: bool,
}

impl Validate {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;
        let defects = snapshot.defects();

        match self.output {
            OutputFormat::Json => print_json(&defects)?,
            OutputFormat::Table if self.quiet => println!("defects={}", defects.len()),
            OutputFormat::Table => Self::output_table(defects),
        }

        if !defects.is_empty() {
            process::exit(DEFECTS_FOUND);
        }
        Ok(())
    }

    fn output_table(defects: &[Defect]) {
        if defects.is_empty() {
            println!("No defects found ✅");
            return;
        }

        for (document, defects) in by_document(defects) {
            println!("{}", document.as_str().info());
            for defect in defects {
                println!(
                    "  {} {:<12} {}",
                    format!("{:<19}", defect.kind.name()).error(),
                    defect.item,
                    defect.detail
                );
            }
        }

        println!();
        println!("Defects: {} ⚠️", defects.len().to_string().warning());
    }
}

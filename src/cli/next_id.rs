use clap::Parser;
use rigr::domain::Allocator;
use tracing::instrument;

use super::Context;

#[derive(Debug, Parser)]
#[command(about = "Print the next free identifier(s)")]
pub struct NextId {
    /// How many identifiers to print
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,
}

impl NextId {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;
        let mut allocator =
            Allocator::seeded(snapshot.schema().id_format(), snapshot.graph().ids());

        for _ in 0..self.count {
            let Some(id) = allocator.next_id() else {
                anyhow::bail!("no identifiers left to allocate");
            };
            println!("{id}");
        }
        Ok(())
    }
}

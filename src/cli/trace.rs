use clap::Parser;
use rigr::Snapshot;
use tracing::instrument;

use super::{Context, OutputFormat, print_json, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Show an item, its related items, or a path between two items")]
pub struct Trace {
    /// The item to start from
    id: String,

    /// Only list items related through this link label (e.g. `satisfied_by`)
    #[arg(long, conflicts_with = "to")]
    label: Option<String>,

    /// Find the shortest path to this item
    #[arg(long)]
    to: Option<String>,

    /// Restrict the path to edges of these link options
    #[arg(long, value_name = "OPTION", requires = "to")]
    via: Vec<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

impl Trace {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let snapshot = context.load()?;

        if let Some(to) = &self.to {
            self.path(&snapshot, to)
        } else if let Some(label) = &self.label {
            self.related(&snapshot, label)
        } else {
            self.show(&snapshot)
        }
    }

    fn path(&self, snapshot: &Snapshot, to: &str) -> anyhow::Result<()> {
        let via: Vec<&str> = self.via.iter().map(String::as_str).collect();
        let path = snapshot.query().path(&self.id, to, &via)?;

        match self.output {
            OutputFormat::Json => print_json(&path)?,
            OutputFormat::Table => match path {
                Some(path) => {
                    let ids: Vec<_> = path.iter().map(ToString::to_string).collect();
                    println!("{}", ids.join(" -> ".dim().as_str()));
                }
                None => println!("{}", format!("No path from {} to {to}", self.id).warning()),
            },
        }
        Ok(())
    }

    fn related(&self, snapshot: &Snapshot, label: &str) -> anyhow::Result<()> {
        let related = snapshot.query().related(&self.id, label)?;

        match self.output {
            OutputFormat::Json => print_json(&related)?,
            OutputFormat::Table => {
                for item in &related {
                    println!(
                        "{:<14} {}",
                        item.id,
                        format!("({} {})", item.option, item.direction).dim()
                    );
                }
            }
        }
        Ok(())
    }

    fn show(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let Some(view) = snapshot.query().item_view(&self.id) else {
            anyhow::bail!("no item with identifier '{}'", self.id);
        };

        if matches!(self.output, OutputFormat::Json) {
            return print_json(&view);
        }

        let item = view.item;
        let schema = snapshot.schema();
        println!("{}", item.id().as_str().info());
        if let Some(title) = item.attribute("title") {
            println!("  {title}");
        }
        println!("  {:<10} {}", "type".dim(), item.kind());
        if let Some(level) = item.level() {
            println!("  {:<10} {level}", "level".dim());
        }
        println!(
            "  {:<10} {}",
            "status".dim(),
            item.status().hinted(view.status_color)
        );
        println!("  {:<10} {}", "document".dim(), item.document());

        for link in item.links() {
            let label = schema
                .link_type(&link.option)
                .map_or(link.option.as_str(), |link_type| link_type.outgoing.as_str());
            let exists = snapshot.graph().contains(&link.to);
            let target = if exists {
                link.to.to_string()
            } else {
                link.to.as_str().error()
            };
            println!("  {} {target}", format!("{label} →").dim());
        }
        for link in &view.incoming {
            let label = schema
                .link_type(&link.option)
                .map_or(link.option.as_str(), |link_type| link_type.incoming.as_str());
            println!("  {} {}", format!("{label} ←").dim(), link.from);
        }
        Ok(())
    }
}

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

mod edges;
mod matrix;
mod next_id;
mod orphans;
mod status;
mod terminal;
mod trace;
mod validate;

use anyhow::Context as _;
use clap::ArgAction;
use edges::Edges;
use matrix::Matrix;
use next_id::NextId;
use orphans::Orphans;
use rigr::{Directory, Schema, Snapshot, Workspace};
use status::Status;
use trace::Trace;
use tracing::instrument;
use validate::Validate;

/// The schema file looked up in the root when `--schema` is not given.
const DEFAULT_SCHEMA: &str = "rigr.toml";

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the root of the record directory
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// The schema file (defaults to `rigr.toml` in the root)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Additionally require edges of this link option to be acyclic
    #[arg(long = "acyclic", value_name = "OPTION", global = true)]
    acyclic: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let context = Context {
            schema: self
                .schema
                .unwrap_or_else(|| self.root.join(DEFAULT_SCHEMA)),
            root: self.root,
            acyclic: self.acyclic,
        };

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(&context)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

/// Where to find the records and how to check them.
#[derive(Debug)]
pub struct Context {
    root: PathBuf,
    schema: PathBuf,
    acyclic: Vec<String>,
}

impl Context {
    pub fn load_schema(&self) -> anyhow::Result<Schema> {
        Schema::load(&self.schema)
            .with_context(|| format!("failed to load schema from {}", self.schema.display()))
    }

    /// Scans the record directory and builds a validated snapshot.
    #[instrument(level = "debug", skip(self))]
    pub fn load(&self) -> anyhow::Result<Arc<Snapshot>> {
        let schema = self.load_schema()?;
        let changes = Directory::new(self.root.clone()).scan()?;

        let workspace = self
            .acyclic
            .iter()
            .fold(Workspace::new(schema), |workspace, option| {
                workspace.with_acyclic(option.clone())
            });
        Ok(workspace.apply(changes))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Prints any serializable value as pretty JSON.
pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show item counts and defect totals (default)
    Status(Status),

    /// Validate the records and list every defect
    ///
    /// Exits with code 2 if any defect is found.
    Validate(Validate),

    /// Show which items of one level are connected to another level
    Matrix(Matrix),

    /// List items without links of a given option
    Orphans(Orphans),

    /// List the edges of a link option with their style hints
    Edges(Edges),

    /// Show an item, its related items, or a path between two items
    Trace(Trace),

    /// Print the next free identifier(s)
    NextId(NextId),
}

impl Command {
    fn run(self, context: &Context) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(context)?,
            Self::Validate(command) => command.run(context)?,
            Self::Matrix(command) => command.run(context)?,
            Self::Orphans(command) => command.run(context)?,
            Self::Edges(command) => command.run(context)?,
            Self::Trace(command) => command.run(context)?,
            Self::NextId(command) => command.run(context)?,
        }
        Ok(())
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vitalis::cli::{self, OutputFormat, StoreKind};
use vitalis::config::{self, Settings};
use vitalis::csv_store::CsvStore;
use vitalis::db::{self, SqliteStore};
use vitalis::detect::InputKind;
use vitalis::parser::ExportParser;
use vitalis::query::{Condition, Filter, SortKey, Store};
use vitalis::stats::DEFAULT_BINS;

/// vitalis — Apple Health export conversion and local record querying.
#[derive(Parser)]
#[command(name = "vitalis", version, about)]
struct Cli {
    /// Path to a TOML config file (default: ./vitalis.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding per-tag CSV files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an export (export.xml or the exported ZIP) into per-tag CSV files.
    Convert {
        /// Path to export.xml or export.zip.
        input: PathBuf,

        /// Output directory (default: the data directory).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Override input detection (xml, zip).
        #[arg(long)]
        kind: Option<InputKind>,

        /// Only keep these tags. Repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Parse an export and store it in the database.
    Ingest {
        /// Path to export.xml or export.zip.
        input: PathBuf,

        /// Name for this import (default: filename).
        #[arg(long)]
        name: Option<String>,

        /// Override input detection (xml, zip).
        #[arg(long)]
        kind: Option<InputKind>,

        /// Only keep these tags. Repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Replace an existing import with the same name.
        #[arg(long)]
        overwrite: bool,
    },

    /// List all imports in the database.
    Imports,

    /// Delete an import from the database.
    Delete {
        /// Import name to delete.
        name: String,
    },

    /// List tags and their row counts.
    Tags {
        #[arg(long, value_enum, default_value = "csv")]
        store: StoreKind,
    },

    /// Fetch records matching a filter.
    Fetch {
        #[arg(long, value_enum, default_value = "csv")]
        store: StoreKind,

        #[command(flatten)]
        query: QueryArgs,

        /// Comma-separated fields to output.
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,

        /// Field to sort by.
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending.
        #[arg(long, requires = "sort")]
        desc: bool,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Summarize a numeric field and draw its histogram.
    Stats {
        /// Field to summarize, e.g. value.
        #[arg(long)]
        field: String,

        #[arg(long, value_enum, default_value = "csv")]
        store: StoreKind,

        #[command(flatten)]
        query: QueryArgs,

        /// Number of histogram bins.
        #[arg(long, default_value_t = DEFAULT_BINS)]
        bins: usize,
    },
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Restrict to one tag (default: all tags).
    #[arg(long)]
    tag: Option<String>,

    /// Condition such as "value>=1000" or "sourceName~Watch". Repeatable.
    #[arg(long = "where")]
    conditions: Vec<Condition>,
}

impl QueryArgs {
    fn into_filter(self) -> Filter {
        Filter {
            tag: self.tag,
            conditions: self.conditions,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("info"),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref()).context("Failed to load config")?;
    let settings = Settings::resolve(config, cli.data_dir, cli.db);
    tracing::debug!(?settings, "resolved settings");

    let out = match cli.command {
        Commands::Convert {
            input,
            out,
            kind,
            tags,
        } => {
            let output_dir = out.unwrap_or_else(|| settings.data_dir.clone());
            let parser = build_parser(&settings, tags);
            let result = cli::cmd_convert(&input, &output_dir, kind, &parser);
            parser.finish_progress();
            result?
        }
        Commands::Ingest {
            input,
            name,
            kind,
            tags,
            overwrite,
        } => {
            let mut conn = open_db(&settings.database)?;
            let parser = build_parser(&settings, tags);
            let result = cli::cmd_ingest(&mut conn, &input, kind, name.as_deref(), &parser, overwrite);
            parser.finish_progress();
            result?
        }
        Commands::Imports => cli::cmd_imports(&open_db(&settings.database)?)?,
        Commands::Delete { name } => cli::cmd_delete(&mut open_db(&settings.database)?, &name)?,
        Commands::Tags { store } => with_store(&settings, store, |s| cli::cmd_tags(s))?,
        Commands::Fetch {
            store,
            query,
            select,
            sort,
            desc,
            limit,
            offset,
            format,
        } => {
            let filter = Filter {
                select: (!select.is_empty()).then_some(select),
                sort: sort.map(|field| SortKey {
                    field,
                    descending: desc,
                }),
                limit,
                offset,
                ..query.into_filter()
            };
            with_store(&settings, store, |s| cli::cmd_fetch(s, &filter, format))?
        }
        Commands::Stats {
            field,
            store,
            query,
            bins,
        } => {
            let filter = query.into_filter();
            with_store(&settings, store, |s| cli::cmd_stats(s, &filter, &field, bins))?
        }
    };

    print!("{out}");
    Ok(())
}

/// Open (creating if needed) the database for write commands.
fn open_db(path: &Path) -> Result<Connection> {
    config::ensure_db_dir(path)?;
    let conn = db::open(path).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;
    Ok(conn)
}

/// Run `f` against the requested backend. Read commands never create a store.
fn with_store<F>(settings: &Settings, kind: StoreKind, f: F) -> Result<String>
where
    F: FnOnce(&dyn Store) -> Result<String>,
{
    match kind {
        StoreKind::Csv => {
            let store = CsvStore::open(&settings.data_dir)?;
            f(&store)
        }
        StoreKind::Sqlite => {
            let conn = db::open_existing(&settings.database)?;
            f(&SqliteStore::new(&conn))
        }
    }
}

fn build_parser(settings: &Settings, cli_tags: Vec<String>) -> ExportParser {
    let include = settings.tags_or(cli_tags);
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} {msg} {pos} elements ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message("Processing");
    progress.enable_steady_tick(Duration::from_millis(120));
    ExportParser::new(include.as_deref()).with_progress(progress)
}

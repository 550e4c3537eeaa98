mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "recollect")]
#[command(about = "Hybrid semantic + keyword search over personal journal entries", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the journal database
    #[arg(long, global = true, default_value = "journal.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import journal entries from a directory of JSON export files
    Import {
        dir: PathBuf,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Search entries with fused semantic + keyword ranking
    Search {
        query: String,
        #[arg(long, help = "Earliest calendar day (YYYY-MM-DD)")]
        from: Option<String>,
        #[arg(long, help = "Latest calendar day, inclusive (YYYY-MM-DD)")]
        to: Option<String>,
        #[arg(long, help = "Only entries written in this city")]
        city: Option<String>,
        #[arg(long, help = "Only starred (true) or unstarred (false) entries")]
        starred: Option<bool>,
        #[arg(long = "tag", help = "Require at least one of these tags")]
        tags: Vec<String>,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Find entries similar to one source entry
    Similar {
        uuid: String,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show store statistics
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Start MCP server for assistant integration
    #[cfg(feature = "mcp")]
    Mcp,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import { dir, json } => commands::import::run(&dir, &cli.db, json),
        Commands::Search {
            query,
            from,
            to,
            city,
            starred,
            tags,
            limit,
            json,
        } => commands::search::run(&query, &cli.db, from, to, city, starred, tags, limit, json),
        Commands::Similar { uuid, limit, json } => {
            commands::similar::run(&uuid, &cli.db, limit, json)
        }
        Commands::Status { json } => commands::status::run(&cli.db, json),
        #[cfg(feature = "mcp")]
        Commands::Mcp => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(mcp::run_mcp_server(cli.db.clone()))
        }
    }
}

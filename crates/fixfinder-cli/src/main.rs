//! Fixfinder CLI - technical-knowledge retrieval for equipment service docs.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fixfinder - find the right fix for any machine
#[derive(Parser)]
#[command(name = "fixfinder")]
#[command(version)]
#[command(about = "Retrieval engine for equipment service documentation", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize fixfinder (create config and database)
    Init,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Search across bulletins, manuals, and the error-code catalog
    Search {
        /// Search query (error codes are detected automatically)
        query: String,

        /// Restrict to a manufacturer
        #[arg(short, long)]
        manufacturer: Option<String>,

        /// Restrict to an equipment series
        #[arg(short, long)]
        series: Option<String>,

        /// Restrict to a document type (bulletin, manual)
        #[arg(short = 't', long = "type")]
        doc_type: Option<String>,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Look up an error code in the catalog
    Lookup {
        /// Error code (case and dash insensitive, e.g. C-2801 or c2801)
        code: String,

        /// Restrict to a manufacturer
        #[arg(short, long)]
        manufacturer: Option<String>,
    },

    /// Manage the error-code catalog
    #[command(subcommand)]
    Codes(CodesCommands),

    /// Ingest a document file or directory
    Ingest {
        /// Path to a file or directory
        path: String,

        /// Document type (bulletin, manual)
        #[arg(short = 't', long = "type", default_value = "manual")]
        doc_type: String,

        /// Title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Manufacturer identifier
        #[arg(short, long)]
        manufacturer: Option<String>,

        /// Equipment series identifier
        #[arg(short, long)]
        series: Option<String>,

        /// Queue the ingestion instead of processing immediately
        #[arg(short, long)]
        queue: bool,
    },

    /// Check whether content is already stored (dedup lookup)
    Content {
        /// SHA-256 hex hash, or a local file to hash
        hash_or_path: String,
    },

    /// Inspect and manage the task queue
    #[command(subcommand)]
    Tasks(TaskCommands),

    /// Run queue workers
    Worker {
        /// Number of worker threads
        #[arg(short, long, default_value = "2")]
        count: usize,

        /// Drain the queue once and exit instead of polling
        #[arg(long)]
        once: bool,
    },

    /// Show the audit trail
    Audit {
        /// Entity id to trace
        #[arg(short, long)]
        id: Option<String>,

        /// Entity table name (resources, chunks, error_codes, tasks, ...)
        #[arg(short, long)]
        entity: Option<String>,

        /// Show entries from the last N hours
        #[arg(long, default_value = "24")]
        hours: i64,
    },

    /// Show queue status
    Status,

    /// Show database statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print config and database paths
    Path,
}

#[derive(Subcommand)]
enum CodesCommands {
    /// Mark a catalog record as human-verified
    Verify {
        /// Error-code record id
        id: String,

        /// Reviewer name recorded on the record
        #[arg(long)]
        by: String,
    },

    /// Mark a record as superseded by a newer one
    Supersede {
        /// Record being replaced
        old_id: String,

        /// Replacement record
        new_id: String,
    },

    /// Show folded duplicate candidates
    Duplicates,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks
    List {
        /// Filter by status (pending, processing, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one task
    Show {
        /// Task id
        id: String,
    },

    /// Cancel a task
    Cancel {
        /// Task id
        id: String,
    },

    /// List terminally failed tasks
    DeadLetter,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fixfinder=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fixfinder=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::Path => commands::config::path(),
        },
        Commands::Search {
            query,
            manufacturer,
            series,
            doc_type,
            limit,
        } => commands::search::run(&query, manufacturer, series, doc_type, limit),
        Commands::Lookup { code, manufacturer } => commands::lookup::run(&code, manufacturer),
        Commands::Codes(cmd) => match cmd {
            CodesCommands::Verify { id, by } => commands::codes::verify(&id, &by),
            CodesCommands::Supersede { old_id, new_id } => {
                commands::codes::supersede(&old_id, &new_id)
            }
            CodesCommands::Duplicates => commands::codes::duplicates(),
        },
        Commands::Ingest {
            path,
            doc_type,
            title,
            manufacturer,
            series,
            queue,
        } => commands::ingest::run(&path, &doc_type, title, manufacturer, series, queue),
        Commands::Content { hash_or_path } => commands::content::run(&hash_or_path),
        Commands::Tasks(cmd) => match cmd {
            TaskCommands::List { status, limit } => commands::tasks::list(status, limit),
            TaskCommands::Show { id } => commands::tasks::show(&id),
            TaskCommands::Cancel { id } => commands::tasks::cancel(&id),
            TaskCommands::DeadLetter => commands::tasks::dead_letter(),
        },
        Commands::Worker { count, once } => commands::worker::run(count, once),
        Commands::Audit { id, entity, hours } => commands::audit::run(id, entity, hours),
        Commands::Status => commands::status::run(),
        Commands::Stats => commands::stats::run(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

//! dirsync CLI
//!
//! Backup, restore and two-way sync of directories over TCP.
//!
//! # Commands
//!
//! - `serve` - Run the server from a settings file
//! - `backup` / `restore` - Copy a directory to or from a server folder
//! - `sync` - Reconcile a directory with a two-way server folder
//! - `analyze` / `compact` - Maintain a root's operation log
//! - `compare` - Show what a sync between two roots would do

mod commands;

use clap::{Args, Parser, Subcommand};
use commands::transfer::Remote;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Directory backup and two-way sync.
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Server connection options.
#[derive(Args)]
struct RemoteArgs {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8090")]
    server: String,

    /// User name
    #[arg(short, long)]
    user: String,

    /// Password
    #[arg(short, long)]
    password: String,

    /// Virtual folder on the server
    #[arg(short, long)]
    folder: String,

    /// Dry run - acknowledge transfers without writing
    #[arg(short, long)]
    dry_run: bool,

    /// Local directory
    path: PathBuf,
}

impl RemoteArgs {
    fn split(self) -> (Remote, PathBuf) {
        let remote = Remote {
            server: self.server,
            user: self.user,
            password: self.password,
            folder: self.folder,
            dry_run: self.dry_run,
        };
        (remote, self.path)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {
        /// Settings file (created with defaults if missing)
        #[arg(short, long, default_value = "dirsync-settings.json")]
        settings: PathBuf,

        /// Dry run - acknowledge transfers without writing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Back up a directory to a server folder
    Backup(RemoteArgs),

    /// Restore a server folder into a directory
    Restore(RemoteArgs),

    /// Two-way sync a directory with a server folder
    Sync(RemoteArgs),

    /// Record changes of a root in its operation log
    Analyze {
        /// Sync root
        root: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Collapse a root's operation log to its latest entries
    Compact {
        /// Sync root
        root: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compare a root's log with another root's log
    Compare {
        /// Sync root
        root: PathBuf,

        /// Operation log of the other root
        other_log: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { settings, dry_run } => commands::serve::run(&settings, dry_run)?,
        Commands::Backup(args) => {
            let (remote, path) = args.split();
            commands::transfer::backup(&remote, &path)?;
        }
        Commands::Restore(args) => {
            let (remote, path) = args.split();
            commands::transfer::restore(&remote, &path)?;
        }
        Commands::Sync(args) => {
            let (remote, path) = args.split();
            commands::transfer::sync(&remote, &path)?;
        }
        Commands::Analyze { root, format } => commands::analyze::analyze(&root, &format)?,
        Commands::Compact { root, format } => commands::analyze::compact(&root, &format)?,
        Commands::Compare {
            root,
            other_log,
            format,
        } => commands::compare::run(&root, &other_log, &format)?,
        Commands::Version => {
            println!("dirsync v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Protocol: {} message types",
                dirsync_protocol::MessageType::ALL.len()
            );
        }
    }

    Ok(())
}

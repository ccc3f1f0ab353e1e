mod client;
mod daemon;
mod server;

use clap::{Parser, Subcommand};
use client::Render;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "jscope",
    version,
    about = "A JavaScript symbol indexer and query daemon",
    long_about = "jscope indexes JavaScript sources into per-file symbol tables \
                  (definitions, references, lexical scopes) and answers navigation \
                  queries over a WebSocket connection, re-indexing files as they \
                  change on disk. Run `jscope daemon` once, then point the query \
                  subcommands at it."
)]
pub struct Cli {
    /// Daemon port
    #[arg(long, global = true, default_value_t = jscope_core::DEFAULT_PORT)]
    pub port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the indexing daemon
    #[command(
        long_about = "Starts the daemon: re-indexes everything recorded in the data \
                      directory, then accepts WebSocket connections and keeps indexes \
                      fresh against file changes."
    )]
    Daemon {
        /// Directory for persisted state (defaults to ~/.jscope)
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        /// Wipe the data directory instead of replaying it
        #[arg(long)]
        clear: bool,

        /// Log to this file instead of ~/.jscope/logs
        #[arg(long, value_name = "FILE")]
        logfile: Option<PathBuf>,

        /// Exit after this many seconds
        #[arg(long, value_name = "SECS")]
        quit_after: Option<u64>,

        /// Log debug detail
        #[arg(long)]
        verbose: bool,

        /// Keep the console quiet; log only to the file
        #[arg(long)]
        silent: bool,
    },
    /// Index a file
    Index {
        /// Path to the JavaScript file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Drop a file's index
    Unindex {
        /// Path to the previously indexed file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Jump from the occurrence at an offset to its definition
    FollowSymbol {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Byte offset of the cursor
        #[arg(value_name = "OFFSET")]
        offset: usize,
        /// Print bare locations without their source line
        #[arg(long)]
        no_context: bool,
    },
    /// List every reference of the symbol at an offset
    FindReferences {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Byte offset of the cursor
        #[arg(value_name = "OFFSET")]
        offset: usize,
        /// Print bare locations without their source line
        #[arg(long)]
        no_context: bool,
    },
    /// Show the symbol at an offset: location, name, kind, references
    CursorInfo {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Byte offset of the cursor
        #[arg(value_name = "OFFSET")]
        offset: usize,
        /// Print bare locations without their source line
        #[arg(long)]
        no_context: bool,
    },
    /// Find a symbol's definitions by name
    FindSymbol {
        #[arg(value_name = "NAME")]
        name: String,
        /// Search only this indexed file
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
        /// Print bare locations without their source line
        #[arg(long)]
        no_context: bool,
    },
    /// List known symbol names
    ListSymbols {
        /// Only names starting with this prefix
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<String>,
        /// List only this indexed file
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Dump one index as JSON, or summarize all of them
    Dump {
        /// Path to the indexed file; omit to list every index
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Stream the daemon's log lines
    Log {
        /// Include debug lines
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;
    let port = cli.port;

    match cli.command {
        Commands::Daemon {
            data_dir,
            clear,
            logfile,
            quit_after,
            verbose,
            silent,
        } => rt.block_on(daemon::run(daemon::Options {
            port,
            data_dir,
            clear,
            logfile,
            quit_after,
            verbose,
            silent,
        })),
        Commands::Index { file } => rt.block_on(client::run(
            port,
            json!({"type": "index", "file": absolute(file)}),
            Render::Quiet,
        )),
        Commands::Unindex { file } => rt.block_on(client::run(
            port,
            json!({"type": "unindex", "file": absolute(file)}),
            Render::Quiet,
        )),
        Commands::FollowSymbol {
            file,
            offset,
            no_context,
        } => rt.block_on(client::run(
            port,
            json!({
                "type": "follow-symbol",
                "location": {"file": absolute(file), "offset": offset},
            }),
            Render::Target {
                context: !no_context,
            },
        )),
        Commands::FindReferences {
            file,
            offset,
            no_context,
        } => rt.block_on(client::run(
            port,
            json!({
                "type": "find-references",
                "location": {"file": absolute(file), "offset": offset},
            }),
            Render::Locations {
                key: "references",
                context: !no_context,
            },
        )),
        Commands::CursorInfo {
            file,
            offset,
            no_context,
        } => rt.block_on(client::run(
            port,
            json!({
                "type": "cursor-info",
                "location": {"file": absolute(file), "offset": offset},
            }),
            Render::CursorInfo {
                context: !no_context,
            },
        )),
        Commands::FindSymbol {
            name,
            file,
            no_context,
        } => {
            let mut message = json!({"type": "find-symbol", "symbolName": name});
            if let Some(file) = file {
                message["file"] = json!(absolute(file));
            }
            rt.block_on(client::run(
                port,
                message,
                Render::Locations {
                    key: "locations",
                    context: !no_context,
                },
            ))
        }
        Commands::ListSymbols { prefix, file } => {
            let mut message = json!({"type": "list-symbols"});
            if let Some(prefix) = prefix {
                message["prefix"] = json!(prefix);
            }
            if let Some(file) = file {
                message["file"] = json!(absolute(file));
            }
            rt.block_on(client::run(port, message, Render::Names))
        }
        Commands::Dump { file } => {
            let mut message = json!({"type": "dump"});
            if let Some(file) = file {
                message["file"] = json!(absolute(file));
            }
            rt.block_on(client::run(port, message, Render::Dump))
        }
        Commands::Log { verbose } => rt.block_on(client::run(
            port,
            json!({"type": "log", "verbose": verbose}),
            Render::Log,
        )),
    }
}

/// The daemon keys databases by the path the client sends, so every path
/// goes out absolute.
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

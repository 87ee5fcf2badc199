//! `invex` - batch invoice extraction from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use invex::logging::{init_logging, LogFormat};
use invex::{load_config, Config};

mod commands;
mod error;
mod selection;

use error::CliError;

#[derive(Parser)]
#[command(
    name = "invex",
    version,
    about = "Extract structured data from invoices in batches",
    after_help = "FILES:\n  \
                  A file may carry the pages that start a new invoice:\n  \
                  invex extract scans.pdf:1,3,6 receipt.jpg\n\n  \
                  Pages before the first marked page are skipped."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON config file
    #[arg(short, long, global = true, default_value = "invex.json")]
    config: PathBuf,

    /// Override the data directory (database and stored files)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch extraction job over one or more files
    Extract {
        /// Files to extract, optionally as `path:pages`
        #[arg(required = true)]
        files: Vec<String>,

        /// Override `batch.max_concurrent` from the config
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Extract a single file and print the response as it streams in
    Stream {
        file: PathBuf,

        /// Print only the parsed JSON once the response is complete
        #[arg(long)]
        parsed: bool,
    },

    /// Split a PDF into one file per invoice
    Split {
        /// PDF with marker pages, e.g. `scans.pdf:1,3`
        target: String,

        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Count the invoices described by marker pages
    Count {
        /// PDF with marker pages, e.g. `scans.pdf:1,3`
        target: String,
    },

    /// Browse saved extractions
    #[command(subcommand)]
    History(HistoryCommand),

    /// Browse job notifications
    #[command(subcommand)]
    Notifications(NotificationsCommand),
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List saved extractions, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Print one saved extraction as JSON
    Show { id: String },
    /// Delete a saved extraction and its stored file
    Delete { id: String },
    /// Write the stored source file of an extraction
    Blob {
        id: String,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum NotificationsCommand {
    /// List notifications, newest first
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification, or all of them, as read
    Read { id: Option<String> },
    /// Remove one notification
    Remove { id: String },
    /// Remove every notification
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_optional_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let developer_mode = cli.verbose || config.as_ref().is_some_and(|c| c.developer_mode);
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_logging(developer_mode, format) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Option<Config>) -> Result<(), CliError> {
    let data_dir = commands::resolve_data_dir(cli.data_dir.as_deref(), config.as_ref());

    match cli.command {
        Commands::Extract {
            files,
            max_concurrent,
        } => {
            let mut config = with_data_dir(require_config(config, &cli.config)?, cli.data_dir);
            if let Some(limit) = max_concurrent {
                config.batch.max_concurrent = limit.max(1);
            }
            commands::extract(&config, &files).await
        }
        Commands::Stream { file, parsed } => {
            let config = require_config(config, &cli.config)?;
            commands::stream(&config, &file, parsed).await
        }
        Commands::Split { target, out_dir } => commands::split(&target, &out_dir),
        Commands::Count { target } => commands::count(&target),
        Commands::History(command) => match command {
            HistoryCommand::List { limit, offset } => {
                commands::history_list(&data_dir, limit, offset)
            }
            HistoryCommand::Show { id } => commands::history_show(&data_dir, &id),
            HistoryCommand::Delete { id } => commands::history_delete(&data_dir, &id),
            HistoryCommand::Blob { id, out } => commands::history_blob(&data_dir, &id, &out),
        },
        Commands::Notifications(command) => match command {
            NotificationsCommand::List { unread } => {
                commands::notifications_list(&data_dir, unread)
            }
            NotificationsCommand::Read { id } => {
                commands::notifications_read(&data_dir, id.as_deref())
            }
            NotificationsCommand::Remove { id } => commands::notifications_remove(&data_dir, &id),
            NotificationsCommand::Clear => commands::notifications_clear(&data_dir),
        },
    }
}

/// Loads the config when the file exists; commands that only touch local
/// data work without one.
fn load_optional_config(path: &Path) -> Result<Option<Config>, CliError> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(load_config(path)?))
}

fn require_config(config: Option<Config>, path: &Path) -> Result<Config, CliError> {
    config.ok_or_else(|| CliError::MissingConfig(path.to_path_buf()))
}

fn with_data_dir(mut config: Config, data_dir: Option<PathBuf>) -> Config {
    if let Some(dir) = data_dir {
        config.storage.data_directory = Some(dir.to_string_lossy().into_owned());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_extract_with_pages() {
        let cli = Cli::parse_from(["invex", "extract", "a.pdf:1,3", "b.png"]);
        match cli.command {
            Commands::Extract {
                files,
                max_concurrent,
            } => {
                assert_eq!(files, vec!["a.pdf:1,3", "b.png"]);
                assert_eq!(max_concurrent, None);
            }
            _ => panic!("expected extract"),
        }
        assert_eq!(cli.config, PathBuf::from("invex.json"));
    }

    #[test]
    fn test_missing_config_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_optional_config(&dir.path().join("absent.json")).unwrap();
        assert!(config.is_none());
        assert!(matches!(
            require_config(config, Path::new("absent.json")),
            Err(CliError::MissingConfig(_))
        ));
    }
}

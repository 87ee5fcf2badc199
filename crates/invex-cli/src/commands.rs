//! Subcommand implementations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use invex::jobs::Job;
use invex::{
    count_invoices, normalize, page_count, split_by_pages, Config, ExtractionClient,
    FileSelection, HttpExtractionClient, InputFile, JobManager, NotificationEvent,
    NotificationFeed, SqliteHistoryStore,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::selection::parse_file_arg;

const FEED_CAPACITY: usize = 256;

/// Runs one batch job over `files` and follows it until it settles.
pub async fn extract(config: &Config, files: &[String]) -> Result<(), CliError> {
    let mut selections = Vec::with_capacity(files.len());
    for raw in files {
        let arg = parse_file_arg(raw)?;
        let file = InputFile::from_path(&arg.path)?;
        selections.push(FileSelection::new(file, arg.pages));
    }

    let client = HttpExtractionClient::new(config.extraction_config()?)?;
    let history = SqliteHistoryStore::open(&config.data_directory())?;
    let feed = NotificationFeed::with_database(history.database().clone(), FEED_CAPACITY);
    feed.load_from_database()?;
    let mut events = feed.subscribe();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let complete_tx = done_tx.clone();
    let manager = JobManager::builder(Arc::new(client), Arc::new(feed.clone()), Arc::new(history))
        .config(config.job_manager_config())
        .on_job_complete(move |job: &Job| {
            log::debug!("Job {} reported complete", job.id);
            let _ = complete_tx.send(());
        })
        .build();

    let job_id = manager.start_selected_batch(selections)?;
    log::info!("Started job {}", job_id);

    let cancel_manager = manager.clone();
    let cancel_id = job_id.clone();
    ctrlc::set_handler(move || {
        if cancel_manager.cancel_job(&cancel_id) {
            eprintln!("Cancelling job {}", cancel_id);
        }
        let _ = done_tx.send(());
    })?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event, &job_id),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Skipped {} notification events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = done_rx.recv() => break,
        }
    }

    let Some(job) = manager.get_job(&job_id) else {
        return Err(CliError::NotFound {
            kind: "job",
            id: job_id,
        });
    };

    let summary = job.summary();
    println!(
        "{}: {} succeeded, {} failed, {} cancelled, estimated cost ${:.4}",
        job.status,
        summary.succeeded(),
        summary.file_failures.len(),
        summary.cancelled_files.len(),
        summary.total_cost
    );
    for failure in &summary.file_failures {
        println!("  failed: {} ({})", failure.name, failure.error);
    }

    if job.status == invex::JobStatus::Completed {
        Ok(())
    } else {
        Err(CliError::JobEnded {
            id: job.id,
            status: job.status,
        })
    }
}

fn print_event(event: &NotificationEvent, job_id: &str) {
    let notification = match event {
        NotificationEvent::Added { notification } | NotificationEvent::Updated { notification } => {
            notification
        }
        NotificationEvent::Removed { .. } => return,
    };
    if notification.job_id.as_deref() != Some(job_id) {
        return;
    }
    println!(
        "[{}] {}: {}",
        notification.status, notification.title, notification.description
    );
}

/// Extracts a single file and prints text as it arrives.
pub async fn stream(config: &Config, path: &Path, parsed_only: bool) -> Result<(), CliError> {
    let file = InputFile::from_path(path)?;
    let client = HttpExtractionClient::new(config.extraction_config()?)?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let on_text = |text: &str| {
        if !parsed_only {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    };
    let extraction = client.extract_streaming(&file, &cancel, &on_text).await?;

    if parsed_only {
        match normalize(Some(&extraction.data)).and_then(|n| n.parsed) {
            Some(parsed) => println!("{}", serde_json::to_string_pretty(&parsed)?),
            None => log::warn!("Response for '{}' is not valid JSON", file.name),
        }
    } else {
        println!();
    }

    log::info!(
        "{} tokens in {} ms, estimated cost ${:.4}",
        extraction.usage.total_tokens,
        extraction.usage.duration_ms,
        extraction.usage.estimated_cost
    );
    Ok(())
}

/// Writes one PDF per invoice marked in `target`.
pub fn split(target: &str, out_dir: &Path) -> Result<(), CliError> {
    let arg = parse_file_arg(target)?;
    let file = InputFile::from_path(&arg.path)?;
    let derived = split_by_pages(&file, &arg.pages)?;

    std::fs::create_dir_all(out_dir).map_err(|e| CliError::Write {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    for part in derived {
        let path = out_dir.join(&part.name);
        std::fs::write(&path, part.bytes()).map_err(|e| CliError::Write {
            path: path.clone(),
            source: e,
        })?;
        println!("{}", path.display());
    }
    Ok(())
}

/// Prints how many invoices the marked pages of `target` describe.
pub fn count(target: &str) -> Result<(), CliError> {
    let arg = parse_file_arg(target)?;
    let file = InputFile::from_path(&arg.path)?;
    let total_pages = page_count(&file)?;
    let invoices = count_invoices(&arg.pages, total_pages);
    println!("{} invoice(s) across {} page(s)", invoices, total_pages);
    Ok(())
}

pub fn history_list(data_dir: &Path, limit: u64, offset: u64) -> Result<(), CliError> {
    let store = SqliteHistoryStore::open(data_dir)?;
    let total = store.count()?;
    for item in store.list(limit, offset)? {
        println!(
            "{}  {}  {}  ${:.4}",
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M:%S"),
            item.file_name,
            item.usage.estimated_cost
        );
    }
    log::info!("{} item(s) in history", total);
    Ok(())
}

pub fn history_show(data_dir: &Path, id: &str) -> Result<(), CliError> {
    let store = SqliteHistoryStore::open(data_dir)?;
    let item = store.get(id)?.ok_or_else(|| CliError::NotFound {
        kind: "history item",
        id: id.to_string(),
    })?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub fn history_delete(data_dir: &Path, id: &str) -> Result<(), CliError> {
    let store = SqliteHistoryStore::open(data_dir)?;
    if !store.delete(id)? {
        return Err(CliError::NotFound {
            kind: "history item",
            id: id.to_string(),
        });
    }
    println!("Deleted {}", id);
    Ok(())
}

pub fn history_blob(data_dir: &Path, id: &str, out: &Path) -> Result<(), CliError> {
    let store = SqliteHistoryStore::open(data_dir)?;
    let bytes = store.read_blob(id)?;
    std::fs::write(out, bytes).map_err(|e| CliError::Write {
        path: out.to_path_buf(),
        source: e,
    })?;
    println!("{}", out.display());
    Ok(())
}

fn open_feed(data_dir: &Path) -> Result<NotificationFeed, CliError> {
    let store = SqliteHistoryStore::open(data_dir)?;
    let feed = NotificationFeed::with_database(store.database().clone(), FEED_CAPACITY);
    feed.load_from_database()?;
    Ok(feed)
}

pub fn notifications_list(data_dir: &Path, unread_only: bool) -> Result<(), CliError> {
    let feed = open_feed(data_dir)?;
    for notification in feed.list() {
        if unread_only && notification.read {
            continue;
        }
        println!(
            "{} {}  [{}] {}: {}",
            if notification.read { " " } else { "*" },
            notification.id,
            notification.status,
            notification.title,
            notification.description
        );
    }
    log::info!("{} unread", feed.unread_count());
    Ok(())
}

pub fn notifications_read(data_dir: &Path, id: Option<&str>) -> Result<(), CliError> {
    let feed = open_feed(data_dir)?;
    match id {
        Some(id) => {
            if !feed.mark_read(id) {
                return Err(CliError::NotFound {
                    kind: "notification",
                    id: id.to_string(),
                });
            }
        }
        None => {
            let marked = feed.mark_all_read();
            println!("Marked {} notification(s) as read", marked);
        }
    }
    Ok(())
}

pub fn notifications_remove(data_dir: &Path, id: &str) -> Result<(), CliError> {
    let feed = open_feed(data_dir)?;
    if !feed.remove(id) {
        return Err(CliError::NotFound {
            kind: "notification",
            id: id.to_string(),
        });
    }
    println!("Removed {}", id);
    Ok(())
}

pub fn notifications_clear(data_dir: &Path) -> Result<(), CliError> {
    let feed = open_feed(data_dir)?;
    feed.clear();
    println!("Cleared notifications");
    Ok(())
}

/// Data directory from an explicit flag, then the config, then `~/.invex`.
pub fn resolve_data_dir(explicit: Option<&Path>, config: Option<&Config>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(config) = config {
        return config.data_directory();
    }
    invex::db::default_data_directory().unwrap_or_else(|| PathBuf::from(".invex"))
}

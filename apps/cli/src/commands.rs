//! Command implementations

use crate::output::{format_bytes, print_event_json};
use crate::progress::DownloadProgress;
use crate::settings;
use crate::{ConfigAction, EngineArgs, OutputFormat};
use anyhow::{bail, Context, Result};
use console::style;
use ferry_core::{DownloadEngine, DownloadError, EngineConfig};
use ferry_types::{DownloadRequest, Settings};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

type Outcome = (DownloadRequest, Result<PathBuf, DownloadError>);

/// Download a single URL
pub async fn get(
    loaded: &Settings,
    args: &EngineArgs,
    url: &str,
    output: Option<PathBuf>,
    sha256: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let destination = output.unwrap_or_else(|| default_destination(url));
    let force_verify = sha256.is_some();

    let mut request = DownloadRequest::new(url, destination);
    if let Some(digest) = sha256 {
        request = request.with_expected_digest(digest);
    }

    let outcomes = run_downloads(loaded, args, vec![request], force_verify, format).await?;
    report(&outcomes, format).await
}

/// Download every request in a JSON file
pub async fn batch(
    loaded: &Settings,
    args: &EngineArgs,
    file: &Path,
    format: OutputFormat,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let requests: Vec<DownloadRequest> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid request list in {}", file.display()))?;

    if requests.is_empty() {
        if let OutputFormat::Human = format {
            println!("{}", style("Nothing to download").dim());
        }
        return Ok(());
    }
    ensure_distinct_destinations(&requests)?;

    let outcomes = run_downloads(loaded, args, requests, false, format).await?;
    report(&outcomes, format).await
}

/// Concurrent runs writing the same file would clobber each other, and
/// progress bars are keyed by request
fn ensure_distinct_destinations(requests: &[DownloadRequest]) -> Result<()> {
    let mut seen = HashSet::new();
    for request in requests {
        if !seen.insert(&request.destination) {
            bail!(
                "More than one entry downloads to {}",
                request.destination.display()
            );
        }
    }
    Ok(())
}

/// Print the SHA-256 of a local file
pub async fn hash(path: &Path, format: OutputFormat) -> Result<()> {
    let digest = ferry_core::sha256_file(path).await?;

    match format {
        OutputFormat::Human => println!("{}  {}", digest, path.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "path": path, "sha256": digest })
        ),
    }

    Ok(())
}

/// Inspect settings
pub fn config_action(
    loaded: &Settings,
    path: Option<&Path>,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            if let OutputFormat::Human = format {
                let source = path
                    .filter(|p| p.exists())
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "built-in defaults".to_string());
                println!("{} {}", style("Settings from").bold(), source);
            }
            println!("{}", serde_json::to_string_pretty(loaded)?);
        }

        ConfigAction::Get { key } => match settings::get_key(loaded, &key) {
            Some(value) => println!("{}", value),
            None => bail!("Unknown setting: {}", key),
        },

        ConfigAction::Path => match (path, format) {
            (Some(p), OutputFormat::Human) => println!("{}", p.display()),
            (Some(p), OutputFormat::Json) => println!("{}", serde_json::json!({ "path": p })),
            (None, _) => bail!("No configuration directory on this platform"),
        },
    }

    Ok(())
}

/// Submit all requests to one engine and render its events until every
/// submission has finished
async fn run_downloads(
    loaded: &Settings,
    args: &EngineArgs,
    requests: Vec<DownloadRequest>,
    force_verify: bool,
    format: OutputFormat,
) -> Result<Vec<Outcome>> {
    let config = EngineConfig::builder()
        .settings(&settings::engine_settings(loaded, args, force_verify))
        .transport_settings(&loaded.transport)
        .build()?;
    let engine = DownloadEngine::new(config);
    let mut events = engine.subscribe();

    let progress = DownloadProgress::new();
    if let OutputFormat::Human = format {
        for request in &requests {
            progress.add_download(request).await;
        }
    }

    let handles: Vec<_> = requests.into_iter().map(|r| engine.submit(r)).collect();
    let waiter = tokio::spawn(async move {
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let request = handle.request().clone();
            outcomes.push((request, handle.wait().await));
        }
        outcomes
    });
    tokio::pin!(waiter);

    let mut interrupted = false;
    let outcomes = loop {
        tokio::select! {
            outcomes = &mut waiter => break outcomes?,

            event = events.recv() => match event {
                Ok(event) => render(&progress, &event, format).await?,
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} progress events", skipped),
                Err(RecvError::Closed) => break (&mut waiter).await?,
            },

            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                warn!("Interrupted, cancelling downloads");
                let engine = engine.clone();
                tokio::spawn(async move { engine.shutdown().await });
            }
        }
    };

    // Terminal events are sent before each task finishes, so they are
    // already buffered here.
    loop {
        match events.try_recv() {
            Ok(event) => render(&progress, &event, format).await?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    Ok(outcomes)
}

async fn render(
    progress: &DownloadProgress,
    event: &ferry_types::DownloadEvent,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Human => progress.handle_event(event).await,
        OutputFormat::Json => print_event_json(event)?,
    }
    Ok(())
}

/// Print a summary and fail if any download failed
async fn report(outcomes: &[Outcome], format: OutputFormat) -> Result<()> {
    let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();

    if let OutputFormat::Human = format {
        println!();
        for (request, result) in outcomes {
            match result {
                Ok(path) => {
                    let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
                    println!(
                        "{} {} ({})",
                        style("✓").green().bold(),
                        path.display(),
                        format_bytes(size)
                    );
                }
                Err(e) => println!("{} {}: {}", style("✗").red().bold(), request.url, e),
            }
        }
    }

    match failed {
        0 => Ok(()),
        1 if outcomes.len() == 1 => bail!("Download failed"),
        n => bail!("{} of {} downloads failed", n, outcomes.len()),
    }
}

/// Last path segment of the URL, or `download` when there is none
fn default_destination(url: &str) -> PathBuf {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);

    match path.split_once('/') {
        Some((_, rest)) => rest
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("download")),
        None => PathBuf::from("download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destination() {
        assert_eq!(
            default_destination("https://example.com/files/archive.tar.gz"),
            PathBuf::from("archive.tar.gz")
        );
        assert_eq!(
            default_destination("https://example.com/files/report.pdf?token=abc"),
            PathBuf::from("report.pdf")
        );
        assert_eq!(
            default_destination("https://example.com/dir/"),
            PathBuf::from("dir")
        );
        assert_eq!(
            default_destination("https://example.com"),
            PathBuf::from("download")
        );
        assert_eq!(
            default_destination("https://example.com/"),
            PathBuf::from("download")
        );
    }

    #[test]
    fn test_duplicate_destinations_rejected() {
        let a = DownloadRequest::new("https://example.com/a", "out.bin");
        let b = DownloadRequest::new("https://example.com/b", "other.bin");

        assert!(ensure_distinct_destinations(&[a.clone(), b.clone()]).is_ok());
        assert!(ensure_distinct_destinations(&[a.clone(), b, a.clone()]).is_err());

        let mirror = DownloadRequest::new("https://mirror.example.com/a", "out.bin");
        assert!(ensure_distinct_destinations(&[a, mirror]).is_err());
    }

    #[test]
    fn test_get_unknown_key_fails() {
        let result = config_action(
            &Settings::default(),
            None,
            Some(ConfigAction::Get {
                key: "engine.nope".to_string(),
            }),
            OutputFormat::Json,
        );
        assert!(result.is_err());
    }
}

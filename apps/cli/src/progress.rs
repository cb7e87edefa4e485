//! Progress bar utilities for CLI downloads

use crate::output::{format_eta, format_speed};
use console::style;
use ferry_types::{DownloadEvent, DownloadRequest};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Manages progress bars for multiple downloads
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: Arc<RwLock<HashMap<DownloadRequest, ProgressBar>>>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a progress bar for a request
    pub async fn add_download(&self, request: &DownloadRequest) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));

        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );

        pb.set_message(request.destination.display().to_string());

        self.bars.write().await.insert(request.clone(), pb.clone());
        pb
    }

    /// Update a progress bar from an event
    pub async fn handle_event(&self, event: &DownloadEvent) {
        let bars = self.bars.read().await;
        let Some(pb) = bars.get(event.request()) else {
            return;
        };

        match event {
            DownloadEvent::Started { attempt, .. } if *attempt > 1 => {
                pb.set_position(0);
                pb.set_message(format!("{} attempt {}", style("↻").yellow(), attempt));
            }

            DownloadEvent::Progress { progress, .. } => {
                if let Some(total) = progress.content_length {
                    pb.set_length(total);
                }
                pb.set_position(progress.bytes_written);
                let eta = progress
                    .eta_secs()
                    .map(format_eta)
                    .unwrap_or_else(|| "—".to_string());
                pb.set_message(format!(
                    "{} ETA {}",
                    format_speed(progress.bytes_per_second),
                    eta
                ));
            }

            DownloadEvent::Completed { path, .. } => {
                pb.finish_with_message(format!(
                    "{} {}",
                    style("✓").green().bold(),
                    path.display()
                ));
            }

            DownloadEvent::Failed { message, .. } => {
                pb.abandon_with_message(format!(
                    "{} Failed: {}",
                    style("✗").red().bold(),
                    message
                ));
            }

            _ => {}
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

//! Transfer - streams one response body to its destination file
//!
//! A transfer is a single attempt: one GET, one file write. Retrying is
//! the job of the download task.

use crate::engine::progress::{ProgressMeter, ProgressThrottle};
use crate::error::DownloadError;
use crate::transport::{BodyStream, HttpTransport};
use ferry_types::{DownloadRequest, TransferProgress};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const WRITE_BUFFER: usize = 8 * 1024;

/// Download `request.url` into `request.destination`, overwriting it.
///
/// `on_progress` is called at most once per `report_interval`. Returns the
/// destination path once every byte is flushed to disk.
pub async fn transfer(
    request: &DownloadRequest,
    transport: &dyn HttpTransport,
    report_interval: Duration,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(&TransferProgress),
) -> Result<PathBuf, DownloadError> {
    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        response = transport.get(request.url()) => response?,
    };

    if !response.is_success() {
        return Err(DownloadError::BadStatus {
            status: response.status,
        });
    }
    if response.content_length == Some(0) {
        return Err(DownloadError::EmptyBody);
    }

    let file = File::create(&request.destination).await?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER, file);
    let mut meter = ProgressMeter::new(response.content_length);

    let streamed = stream_body(
        response.body,
        &mut writer,
        &mut meter,
        report_interval,
        cancel,
        &mut on_progress,
    )
    .await;

    // Flush on every path so no write is still in flight when the file is dropped
    let flushed = writer.flush().await;
    streamed?;
    flushed?;
    writer.into_inner().sync_all().await?;

    if let Some(expected) = response.content_length {
        if meter.bytes_written() < expected {
            return Err(DownloadError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "body ended after {} of {} bytes",
                    meter.bytes_written(),
                    expected
                ),
            )));
        }
    }

    info!(
        "Transferred {} bytes to {}",
        meter.bytes_written(),
        request.destination.display()
    );

    Ok(request.destination.clone())
}

async fn stream_body(
    mut body: BodyStream,
    writer: &mut BufWriter<File>,
    meter: &mut ProgressMeter,
    report_interval: Duration,
    cancel: &CancellationToken,
    on_progress: &mut impl FnMut(&TransferProgress),
) -> Result<(), DownloadError> {
    let mut throttle = ProgressThrottle::new(report_interval);

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            chunk = body.next() => chunk,
        };

        let Some(chunk) = chunk else {
            return Ok(());
        };
        let chunk = chunk?;

        writer.write_all(&chunk).await?;
        meter.record(chunk.len() as u64);

        if throttle.should_emit() {
            let progress = meter.snapshot();
            debug!(
                "Progress: {} bytes ({:?}%) at {} B/s",
                progress.bytes_written, progress.percent, progress.bytes_per_second
            );
            on_progress(&progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    /// Serves a fixed response; chunks are yielded `delay` apart
    struct Fixed {
        status: u16,
        content_length: Option<u64>,
        chunks: Vec<&'static str>,
        delay: Duration,
    }

    impl Fixed {
        fn ok(chunks: Vec<&'static str>) -> Self {
            let len = chunks.iter().map(|c| c.len() as u64).sum();
            Self {
                status: 200,
                content_length: Some(len),
                chunks,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl HttpTransport for Fixed {
        async fn get(&self, _url: &str) -> Result<HttpResponse, DownloadError> {
            let delay = self.delay;
            let chunks: Vec<Bytes> = self.chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect();
            let body = futures::stream::iter(chunks)
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, std::io::Error>(chunk)
                })
                .boxed();
            Ok(HttpResponse {
                status: self.status,
                content_length: self.content_length,
                body,
            })
        }
    }

    fn request(dir: &TempDir) -> DownloadRequest {
        DownloadRequest::new("http://example.com/file", dir.path().join("file"))
    }

    #[tokio::test]
    async fn test_writes_body_to_destination() {
        let dir = TempDir::new().unwrap();
        let request = request(&dir);
        let transport = Fixed::ok(vec!["hel", "lo"]);

        let path = transfer(
            &request,
            &transport,
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(path, request.destination);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let request = request(&dir);
        std::fs::write(&request.destination, b"a much longer previous file").unwrap();

        transfer(
            &request,
            &Fixed::ok(vec!["new"]),
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&request.destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_bad_status() {
        let dir = TempDir::new().unwrap();
        let mut transport = Fixed::ok(vec!["not found"]);
        transport.status = 404;

        let err = transfer(
            &request(&dir),
            &transport,
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::BadStatus { status: 404 }));
    }

    #[tokio::test]
    async fn test_declared_zero_length_is_empty_body() {
        let dir = TempDir::new().unwrap();
        let transport = Fixed::ok(vec![]);

        let err = transfer(
            &request(&dir),
            &transport,
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::EmptyBody));
    }

    #[tokio::test]
    async fn test_unknown_length_downloads_without_percent() {
        let dir = TempDir::new().unwrap();
        let mut transport = Fixed::ok(vec!["abc", "def", "ghi"]);
        transport.content_length = None;
        transport.delay = Duration::from_millis(30);

        let mut reports = Vec::new();
        transfer(
            &request(&dir),
            &transport,
            Duration::from_millis(10),
            &CancellationToken::new(),
            |p| reports.push(*p),
        )
        .await
        .unwrap();

        assert!(!reports.is_empty());
        assert!(reports.iter().all(|p| p.percent.is_none()));
    }

    #[tokio::test]
    async fn test_short_body_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut transport = Fixed::ok(vec!["abc"]);
        transport.content_length = Some(10);

        let err = transfer(
            &request(&dir),
            &transport,
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    struct Broken;

    #[async_trait]
    impl HttpTransport for Broken {
        async fn get(&self, _url: &str) -> Result<HttpResponse, DownloadError> {
            let body = futures::stream::iter(vec![
                Ok(Bytes::from_static(b"abc")),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )),
            ])
            .boxed();
            Ok(HttpResponse {
                status: 200,
                content_length: Some(10),
                body,
            })
        }
    }

    #[tokio::test]
    async fn test_read_failure_mid_body_is_io_error() {
        let dir = TempDir::new().unwrap();
        let request = request(&dir);

        let err = transfer(
            &request,
            &Broken,
            Duration::from_secs(1),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DownloadError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset));
        assert_eq!(std::fs::read(&request.destination).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_progress_is_throttled_and_bounded() {
        let dir = TempDir::new().unwrap();
        let mut transport = Fixed::ok(vec!["0123456789"; 10]);
        transport.delay = Duration::from_millis(20);

        let mut reports = Vec::new();
        transfer(
            &request(&dir),
            &transport,
            Duration::from_millis(50),
            &CancellationToken::new(),
            |p| reports.push(*p),
        )
        .await
        .unwrap();

        // ~200ms of streaming at a 50ms interval; never one report per chunk
        assert!(!reports.is_empty());
        assert!(reports.len() < 10);
        for pair in reports.windows(2) {
            assert!(pair[0].bytes_written <= pair[1].bytes_written);
        }
        assert!(reports.iter().all(|p| p.percent.unwrap() <= 100));
    }

    #[tokio::test]
    async fn test_fast_transfer_reports_nothing() {
        let dir = TempDir::new().unwrap();
        let mut reports = 0;
        transfer(
            &request(&dir),
            &Fixed::ok(vec!["quick"]),
            Duration::from_secs(60),
            &CancellationToken::new(),
            |_| reports += 1,
        )
        .await
        .unwrap();
        assert_eq!(reports, 0);
    }

    #[tokio::test]
    async fn test_cancelled_between_chunks() {
        let dir = TempDir::new().unwrap();
        let mut transport = Fixed::ok(vec!["0123456789"; 50]);
        transport.delay = Duration::from_millis(20);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let err = transfer(&request(&dir), &transport, Duration::from_secs(1), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use crate::errors::FetchError;
use crate::models::{DownloadTask, ProgressEvent};

const DEFAULT_MAX_REDIRECTS: usize = 10;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;

/// Progress sink for one fetch. Unbounded so a slow consumer can never
/// stall the transfer.
pub type ProgressSink = mpsc::UnboundedSender<ProgressEvent>;

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // The handle is gone; cancellation can never arrive.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Streams one HTTP(S) GET to disk, following 301/302 redirects itself so
/// the hop count stays bounded and the original target filename survives
/// the chain.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_redirects: usize,
    idle_timeout: Duration,
}

impl Fetcher {
    pub fn new() -> Self {
        let idle_timeout_secs = env_u64("DOOMDASH_HTTP_IDLE_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
            .clamp(1, 3600);
        let connect_timeout_secs = env_u64("DOOMDASH_HTTP_CONNECT_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS)
            .clamp(1, 120);

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .build()
            .expect("http client");

        Self {
            client,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Downloads `task` to `target_directory/target_filename` and returns
    /// the final path. Progress events carry cumulative byte counts; the
    /// terminal `Finished` event is sent only after the file is flushed and
    /// closed. Every failure path removes the partial file — the target
    /// directory itself is left alone.
    pub async fn fetch(
        &self,
        task: DownloadTask,
        progress: Option<ProgressSink>,
        mut cancel: CancelToken,
    ) -> Result<PathBuf, FetchError> {
        tokio::fs::create_dir_all(&task.target_directory).await?;

        let mut task = task;
        for _ in 0..=self.max_redirects {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            tracing::info!("fetching {}", task.url);
            let response = match timeout(self.idle_timeout, self.client.get(task.url.clone()).send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) if err.is_timeout() => return Err(FetchError::Timeout),
                Ok(Err(err)) => return Err(FetchError::Network(err)),
                Err(_) => return Err(FetchError::Timeout),
            };

            let status = response.status();
            if status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    // The body of the redirect response is dropped here;
                    // nothing has touched the disk yet.
                    let next = task
                        .url
                        .join(&location)
                        .map_err(|_| FetchError::InvalidUrl(location))?;
                    tracing::info!("redirected to {}", next);
                    task = task.redirected(next);
                    continue;
                }
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            if status != StatusCode::OK {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            return self
                .stream_to_disk(response, &task, progress.as_ref(), &mut cancel)
                .await;
        }

        Err(FetchError::TooManyRedirects(self.max_redirects))
    }

    async fn stream_to_disk(
        &self,
        response: reqwest::Response,
        task: &DownloadTask,
        progress: Option<&ProgressSink>,
        cancel: &mut CancelToken,
    ) -> Result<PathBuf, FetchError> {
        let total_bytes = response.content_length().unwrap_or(0);
        let target_path = task.target_path();
        let mut file = tokio::fs::File::create(&target_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded_bytes = 0u64;

        loop {
            if cancel.is_cancelled() {
                return abort_partial(file, &target_path, FetchError::Cancelled).await;
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    return abort_partial(file, &target_path, FetchError::Cancelled).await;
                }
                next = timeout(self.idle_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(bytes))) => bytes,
                Ok(Some(Err(err))) => {
                    let err = if err.is_timeout() {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(err)
                    };
                    return abort_partial(file, &target_path, err).await;
                }
                Ok(None) => break,
                Err(_) => return abort_partial(file, &target_path, FetchError::Timeout).await,
            };

            if let Err(err) = file.write_all(&chunk).await {
                return abort_partial(file, &target_path, FetchError::Io(err)).await;
            }
            downloaded_bytes += chunk.len() as u64;

            if let Some(sink) = progress {
                let _ = sink.send(ProgressEvent::downloading(
                    &task.target_filename,
                    total_bytes,
                    downloaded_bytes,
                ));
            }
        }

        if let Err(err) = finalize(&mut file).await {
            return abort_partial(file, &target_path, FetchError::Io(err)).await;
        }
        drop(file);

        if let Some(sink) = progress {
            let _ = sink.send(ProgressEvent::finished(
                &task.target_filename,
                total_bytes,
                downloaded_bytes,
            ));
        }
        tracing::info!(
            "downloaded {} ({} bytes) to {}",
            task.target_filename,
            downloaded_bytes,
            target_path.display()
        );
        Ok(target_path)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn finalize(file: &mut tokio::fs::File) -> std::io::Result<()> {
    file.flush().await?;
    file.sync_all().await
}

async fn abort_partial(
    file: tokio::fs::File,
    target_path: &Path,
    err: FetchError,
) -> Result<PathBuf, FetchError> {
    drop(file);
    // Only the partial file goes; the destination directory stays.
    let _ = tokio::fs::remove_file(target_path).await;
    Err(err)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgressPhase;
    use reqwest::Url;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("doomdash-fetch-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp directory");
        dir
    }

    fn task_for(url: &str, dir: &Path) -> DownloadTask {
        DownloadTask::new(Url::parse(url).expect("parse url"), dir)
    }

    #[tokio::test]
    async fn streams_the_body_and_reports_monotonic_progress() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![0xAB_u8; 64 * 1024];
        let mock = server
            .mock("GET", "/pkg.zip")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = temp_dir();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel, token) = cancel_pair();
        let fetcher = Fetcher::new();
        let path = fetcher
            .fetch(
                task_for(&format!("{}/pkg.zip", server.url()), &dir),
                Some(tx),
                token,
            )
            .await
            .expect("fetch succeeds");

        assert_eq!(path, dir.join("pkg.zip"));
        assert_eq!(std::fs::read(&path).expect("read downloaded file"), body);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let last = events.last().expect("at least the terminal event");
        assert_eq!(last.phase, ProgressPhase::Finished);
        assert_eq!(last.percentage, 100.0);
        assert_eq!(last.downloaded_bytes, body.len() as u64);
        assert_eq!(
            events.iter().filter(|event| event.phase == ProgressPhase::Finished).count(),
            1
        );
        let mut previous = 0;
        for event in &events {
            assert!(event.downloaded_bytes >= previous);
            previous = event.downloaded_bytes;
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn follows_redirects_and_keeps_the_original_filename() {
        let mut server = mockito::Server::new_async().await;
        let body = b"redirected payload".to_vec();
        let hop = server
            .mock("GET", "/pkg.zip")
            .with_status(302)
            .with_header("location", &format!("{}/mirror/pkg-final.zip", server.url()))
            .create_async()
            .await;
        let target = server
            .mock("GET", "/mirror/pkg-final.zip")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = temp_dir();
        let (_cancel, token) = cancel_pair();
        let fetcher = Fetcher::new();
        let path = fetcher
            .fetch(
                task_for(&format!("{}/pkg.zip", server.url()), &dir),
                None,
                token,
            )
            .await
            .expect("fetch succeeds");

        assert_eq!(path, dir.join("pkg.zip"));
        assert_eq!(std::fs::read(&path).expect("read downloaded file"), body);
        assert!(!dir.join("pkg-final.zip").exists());
        hop.assert_async().await;
        target.assert_async().await;
    }

    #[tokio::test]
    async fn bails_out_of_a_redirect_loop() {
        let mut server = mockito::Server::new_async().await;
        let _loop_mock = server
            .mock("GET", "/loop.zip")
            .with_status(302)
            .with_header("location", &format!("{}/loop.zip", server.url()))
            .create_async()
            .await;

        let dir = temp_dir();
        let (_cancel, token) = cancel_pair();
        let fetcher = Fetcher::new();
        let err = fetcher
            .fetch(
                task_for(&format!("{}/loop.zip", server.url()), &dir),
                None,
                token,
            )
            .await
            .expect_err("loop must fail");

        assert!(matches!(err, FetchError::TooManyRedirects(_)));
        assert!(!dir.join("loop.zip").exists());
    }

    #[tokio::test]
    async fn surfaces_non_success_statuses() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.zip")
            .with_status(404)
            .create_async()
            .await;

        let dir = temp_dir();
        let (_cancel, token) = cancel_pair();
        let fetcher = Fetcher::new();
        let err = fetcher
            .fetch(
                task_for(&format!("{}/missing.zip", server.url()), &dir),
                None,
                token,
            )
            .await
            .expect_err("404 must fail");

        assert!(matches!(err, FetchError::HttpStatus(404)));
        assert!(!dir.join("missing.zip").exists());
    }

    #[tokio::test]
    async fn a_redirect_without_a_location_is_an_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/nowhere.zip")
            .with_status(302)
            .create_async()
            .await;

        let dir = temp_dir();
        let (_cancel, token) = cancel_pair();
        let fetcher = Fetcher::new();
        let err = fetcher
            .fetch(
                task_for(&format!("{}/nowhere.zip", server.url()), &dir),
                None,
                token,
            )
            .await
            .expect_err("must fail");

        assert!(matches!(err, FetchError::HttpStatus(302)));
    }

    #[tokio::test]
    async fn times_out_against_a_stalled_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        std::thread::spawn(move || {
            // Accept and hold the socket open without ever answering.
            let _conn = listener.accept();
            std::thread::sleep(Duration::from_secs(5));
        });

        let dir = temp_dir();
        let (_cancel, token) = cancel_pair();
        let fetcher = Fetcher::new().with_idle_timeout(Duration::from_millis(200));
        let err = fetcher
            .fetch(
                task_for(&format!("http://{}/slow.zip", addr), &dir),
                None,
                token,
            )
            .await
            .expect_err("must time out");

        assert!(matches!(err, FetchError::Timeout));
        assert!(!dir.join("slow.zip").exists());
    }

    #[tokio::test]
    async fn a_cancelled_token_stops_the_fetch_before_it_writes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/cancel.zip")
            .with_status(200)
            .with_body("data")
            .create_async()
            .await;

        let (handle, token) = cancel_pair();
        handle.cancel();

        let dir = temp_dir();
        let fetcher = Fetcher::new();
        let err = fetcher
            .fetch(
                task_for(&format!("{}/cancel.zip", server.url()), &dir),
                None,
                token,
            )
            .await
            .expect_err("must be cancelled");

        assert!(matches!(err, FetchError::Cancelled));
        assert!(!dir.join("cancel.zip").exists());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Client};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

const CHALLENGE_MARKER: &str = "<title>Just a moment...</title>";
const NOT_FOUND_MARKER: &str = "/en-US/not-found";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("too many retries for {url} after {attempts} attempts, last body in {}", dump.display())]
    TooManyRetries { url: String, attempts: u32, dump: PathBuf },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("wrong status for getting {url}: {status}")]
    Status { url: String, status: u16 },
    #[error("failed to dump response of {url} into {}: {source}", path.display())]
    Dump {
        url: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Raw GET access to the remote services. Kept behind a trait so the
/// resolution pipeline can run against canned pages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the body whatever the status; challenge pages come back as 403s
    /// and still have to be inspected.
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    /// Streams the body of a successful (< 400) response.
    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { client: build_client()? })
    }
}

fn build_client() -> anyhow::Result<Client> {
    let mut headers = header::HeaderMap::new();
    let browser = [
        ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
        ("accept-language", "en-CA,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("dnt", "1"),
        ("pragma", "no-cache"),
        ("priority", "u=0, i"),
        ("sec-ch-ua", r#""Not;A=Brand";v="24", "Chromium";v="128""#),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Linux""#),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "none"),
        ("sec-fetch-user", "?1"),
        ("upgrade-insecure-requests", "1"),
    ];
    for (name, value) in browser {
        headers.insert(name, header::HeaderValue::from_static(value));
    }
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

    let client = Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;

    Ok(client)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let http = |source| FetchError::Http { url: url.to_string(), source };
        let resp = self.client.get(url).send().await.map_err(http)?;
        resp.text().await.map_err(http)
    }

    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http { url: url.to_string(), source })?;
        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        let owned = url.to_string();
        Ok(resp
            .bytes_stream()
            .map_err(move |source| FetchError::Http { url: owned.clone(), source })
            .boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Content,
    NotFound,
    Challenge,
}

pub fn classify(body: &str) -> PageKind {
    if body.contains(NOT_FOUND_MARKER) {
        PageKind::NotFound
    } else if body.contains(CHALLENGE_MARKER) {
        PageKind::Challenge
    } else {
        PageKind::Content
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Found(String),
    NotFound,
}

/// Store fetcher: retries challenge pages with exponential backoff and keeps
/// the not-found page apart from real content.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    retries: u32,
    backoff: Duration,
    dump_dir: PathBuf,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, retries: u32, backoff: Duration, dump_dir: PathBuf) -> Self {
        Self {
            transport,
            retries: retries.max(1),
            backoff,
            dump_dir,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let mut delay = self.backoff;
        let mut last = String::new();
        for attempt in 1..=self.retries {
            let body = self.transport.get_text(url).await?;
            match classify(&body) {
                PageKind::Content => return Ok(Fetched::Found(body)),
                PageKind::NotFound => return Ok(Fetched::NotFound),
                PageKind::Challenge => {
                    debug!(url, attempt, "challenge page served");
                    last = body;
                    if attempt < self.retries {
                        sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        let path = dump_path(&self.dump_dir, url);
        tokio::fs::write(&path, last.as_bytes())
            .await
            .map_err(|source| FetchError::Dump {
                url: url.to_string(),
                path: path.clone(),
                source,
            })?;
        Err(FetchError::TooManyRetries {
            url: url.to_string(),
            attempts: self.retries,
            dump: path,
        })
    }
}

pub fn dump_path(dir: &Path, url: &str) -> PathBuf {
    let flat: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect();
    dir.join(format!("epic{flat}.html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use tokio::time::Instant;

    const CHALLENGE: &str = "<html><head><title>Just a moment...</title></head></html>";

    fn fetcher(transport: Arc<FakeTransport>, dir: &Path) -> Fetcher {
        Fetcher::new(transport, 3, Duration::from_millis(300), dir.to_path_buf())
    }

    #[test]
    fn not_found_wins_over_challenge() {
        assert_eq!(classify("<a href=\"/en-US/not-found\">"), PageKind::NotFound);
        assert_eq!(classify(&format!("{CHALLENGE}/en-US/not-found")), PageKind::NotFound);
        assert_eq!(classify(CHALLENGE), PageKind::Challenge);
        assert_eq!(classify("<html>ok</html>"), PageKind::Content);
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_exhausts_retry_budget() {
        let dir = std::env::temp_dir().join("store-linker-fetch-test");
        std::fs::create_dir_all(&dir).unwrap();
        let transport = Arc::new(FakeTransport::new().page("https://store/p/x", CHALLENGE));
        let fetcher = fetcher(transport.clone(), &dir);

        let started = Instant::now();
        let err = fetcher.fetch("https://store/p/x").await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(transport.calls("https://store/p/x"), 3);
        assert!(elapsed >= Duration::from_millis(900), "slept {elapsed:?}");
        match err {
            FetchError::TooManyRetries { attempts, dump, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(std::fs::read_to_string(dump).unwrap(), CHALLENGE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_a_challenge() {
        let transport = Arc::new(
            FakeTransport::new()
                .page("https://store/p/x", CHALLENGE)
                .page("https://store/p/x", "<html>game</html>"),
        );
        let fetcher = fetcher(transport.clone(), &std::env::temp_dir());
        let got = fetcher.fetch("https://store/p/x").await.unwrap();
        assert_eq!(got, Fetched::Found("<html>game</html>".to_string()));
        assert_eq!(transport.calls("https://store/p/x"), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let transport = Arc::new(FakeTransport::new().page("https://store/p/x", "redirect to /en-US/not-found"));
        let fetcher = fetcher(transport.clone(), &std::env::temp_dir());
        assert_eq!(fetcher.fetch("https://store/p/x").await.unwrap(), Fetched::NotFound);
        assert_eq!(transport.calls("https://store/p/x"), 1);
    }

    #[test]
    fn dump_path_is_flat() {
        let path = dump_path(Path::new("/tmp"), "https://store.epicgames.com/en-US/p/my-game");
        assert_eq!(path, Path::new("/tmp/epichttps---store.epicgames.com-en-US-p-my-game.html"));
    }
}

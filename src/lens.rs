//! Reverse image search on the entity logo.
//!
//! The interesting links sit early in a very large script payload, so the
//! response is scanned chunk by chunk and abandoned as soon as three result
//! links have been captured.

use std::sync::LazyLock;

use futures::StreamExt;
use regex::bytes::Regex;
use thiserror::Error;
use url::Url;

use crate::fetch::{FetchError, Transport};
use crate::model::CandidateItem;

pub const MAX_LINKS: usize = 3;
const CHUNK_SIZE: usize = 1024;
const MAX_WINDOW: usize = 256 * 1024;

const ANCHOR_TEXT: &str = r#""Show less","See more","Show less Similar images","See more Similar images""#;
const ANCHOR: &[u8] = ANCHOR_TEXT.as_bytes();

static LINKS: LazyLock<Regex> = LazyLock::new(|| {
    const LINK: &str = r#".*?,"(https?://[^"]+)""#;
    let pattern = format!(
        r"(?-u)^{anchor}{link}.*?\[\[{link}.*?\[\[{link}",
        anchor = regex::escape(ANCHOR_TEXT),
        link = LINK,
    );
    Regex::new(&pattern).unwrap()
});

#[derive(Debug, Error)]
pub enum LensError {
    #[error("bad visual search url for logo {logo}: {source}")]
    Url {
        logo: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to read visual search result: {0}")]
    Fetch(#[from] FetchError),
}

/// Accumulates response bytes and re-runs the link pattern after each chunk.
/// Bytes before the payload anchor are discarded as they arrive; once anchored,
/// at most `window` bytes are retained before the anchor is given up on.
pub struct LensScanner {
    buf: Vec<u8>,
    anchored: bool,
    window: usize,
}

impl LensScanner {
    pub fn new(window: usize) -> Self {
        Self {
            buf: Vec::with_capacity(CHUNK_SIZE * 2),
            anchored: false,
            window: window.max(ANCHOR.len()),
        }
    }

    /// Returns the distinct links once the pattern matched.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Vec<String>> {
        self.buf.extend_from_slice(chunk);
        loop {
            if !self.anchored {
                match find(&self.buf, ANCHOR) {
                    Some(pos) => {
                        self.buf.drain(..pos);
                        self.anchored = true;
                    }
                    None => {
                        let keep = ANCHOR.len() - 1;
                        if self.buf.len() > keep {
                            self.buf.drain(..self.buf.len() - keep);
                        }
                        return None;
                    }
                }
            }

            if let Some(caps) = LINKS.captures(&self.buf) {
                let mut links: Vec<String> = Vec::with_capacity(MAX_LINKS);
                for m in caps.iter().skip(1).flatten() {
                    let link = String::from_utf8_lossy(m.as_bytes()).into_owned();
                    if !links.contains(&link) {
                        links.push(link);
                    }
                }
                return Some(links);
            }

            if self.buf.len() <= self.window {
                return None;
            }
            // Too far from this anchor; retry from the next occurrence.
            self.buf.drain(..1);
            self.anchored = false;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn lens_url(endpoint: &str, logo: &str) -> Result<String, LensError> {
    Url::parse_with_params(endpoint, [("url", logo), ("hl", "en-CA")])
        .map(String::from)
        .map_err(|source| LensError::Url { logo: logo.to_string(), source })
}

/// Looks the logo up and appends up to three new link-only candidates.
/// Returns how many were added; zero is a normal outcome.
pub async fn search_by_logo(
    transport: &dyn Transport,
    endpoint: &str,
    logo: &str,
    candidates: &mut Vec<CandidateItem>,
) -> Result<usize, LensError> {
    let url = lens_url(endpoint, logo)?;
    let mut body = transport.get_stream(&url).await?;
    let mut scanner = LensScanner::new(MAX_WINDOW);

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for piece in chunk.chunks(CHUNK_SIZE) {
            if let Some(links) = scanner.feed(piece) {
                let before = candidates.len();
                for link in links {
                    if candidates.iter().any(|c| c.link == link) {
                        continue;
                    }
                    candidates.push(CandidateItem {
                        name: String::new(),
                        link,
                        rank: 0,
                    });
                }
                return Ok(candidates.len() - before);
            }
        }
    }
    Ok(0)
}

use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use crate::extract::{descend, step, ExtractError, Step};
use crate::fetch::{FetchError, Fetched, Fetcher};
use crate::model::CandidateItem;

const SEPARATORS: [char; 3] = [':', '-', ' '];
const ITEM_PATH: [Step; 3] = [step("div", 1), step("div", 1), step("a", 1)];

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]+").unwrap());
static RESULT_LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("section > section > ul").unwrap());
static RESULT_ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{name}: no separator (':', '-' or space) found")]
    NoSeparator { name: String },
    #[error("bad store url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to search {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("search page for {url} is a not-found page")]
    NotFound { url: String },
    #[error("no result list found in {url}")]
    NoContainer { url: String },
    #[error("no result items found in {url}")]
    NoItems { url: String },
    #[error("result {index}: {source}")]
    Structure {
        index: usize,
        #[source]
        source: ExtractError,
    },
    #[error("result {index}: {attr} not found")]
    MissingAttribute { index: usize, attr: &'static str },
}

#[derive(Debug)]
pub enum SearchOutcome {
    Exact(CandidateItem),
    /// Candidates were left ranked in the caller's buffer; unusable entries
    /// are reported here instead of aborting the search.
    Ranked { skipped: Vec<SearchError> },
}

/// Store catalog: the direct page probe and the browse search.
#[derive(Clone)]
pub struct Catalog {
    fetcher: Fetcher,
    host: String,
    page_size: usize,
}

impl Catalog {
    pub fn new(fetcher: Fetcher, host: impl Into<String>, page_size: usize) -> Self {
        Self {
            fetcher,
            host: host.into(),
            page_size,
        }
    }

    pub fn probe_url(&self, name: &str) -> String {
        format!("{}/en-US/p/{}", self.host, slug(name))
    }

    pub fn search_url(&self, query: &str) -> Result<String, SearchError> {
        let base = format!("{}/en-US/browse", self.host);
        let count = self.page_size.to_string();
        Url::parse_with_params(
            &base,
            [
                ("q", query),
                ("sortBy", "relevancy"),
                ("sortDir", "DESC"),
                ("count", count.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|source| SearchError::Url { url: base, source })
    }

    /// Guesses the product page from the name. `Ok(None)` means the store
    /// answered with its not-found page.
    pub async fn probe(&self, name: &str) -> Result<Option<String>, FetchError> {
        let link = self.probe_url(name);
        match self.fetcher.fetch(&link).await? {
            Fetched::Found(_) => Ok(Some(link)),
            Fetched::NotFound => Ok(None),
        }
    }

    /// Runs the plain browse query. Candidates land in `out` (cleared first)
    /// ranked best first, unless an exact name match short-circuits the scan.
    pub async fn search(&self, query: &str, out: &mut Vec<CandidateItem>) -> Result<SearchOutcome, SearchError> {
        out.clear();
        let (url, body, base) = self.browse(query).await?;
        parse_results(&body, &url, &base, query, out)
    }

    /// Runs a loose browse query: every usable result is ranked into `out`
    /// (cleared first), an exact name included. Returns the skipped items.
    pub async fn search_fuzzy(
        &self,
        query: &str,
        out: &mut Vec<CandidateItem>,
    ) -> Result<Vec<SearchError>, SearchError> {
        out.clear();
        let (url, body, base) = self.browse(query).await?;
        parse_ranked(&body, &url, &base, query, out)
    }

    async fn browse(&self, query: &str) -> Result<(String, String, Url), SearchError> {
        let url = self.search_url(query)?;
        let body = match self.fetcher.fetch(&url).await {
            Ok(Fetched::Found(body)) => body,
            Ok(Fetched::NotFound) => return Err(SearchError::NotFound { url }),
            Err(source) => return Err(SearchError::Fetch { url, source }),
        };
        let base = Url::parse(&self.host).map_err(|source| SearchError::Url {
            url: self.host.clone(),
            source,
        })?;
        Ok((url, body, base))
    }
}

pub fn slug(name: &str) -> String {
    NON_WORD.replace_all(&name.to_lowercase(), "-").into_owned()
}

/// Cuts the name before the first `:`, then `-`, then space, in that order of
/// preference.
pub fn fuzzy_prefix(name: &str) -> Result<String, SearchError> {
    SEPARATORS
        .iter()
        .filter_map(|sep| name.find(*sep))
        .map(|idx| name[..idx].trim())
        .find(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SearchError::NoSeparator { name: name.to_string() })
}

pub fn parse_results(
    body: &str,
    url: &str,
    base: &Url,
    query: &str,
    out: &mut Vec<CandidateItem>,
) -> Result<SearchOutcome, SearchError> {
    let flow = scan_results(body, url, base, |item| {
        if item.name == query {
            return ControlFlow::Break(item);
        }
        out.push(item);
        ControlFlow::Continue(())
    })?;
    match flow {
        ControlFlow::Break(item) => {
            out.clear();
            Ok(SearchOutcome::Exact(item))
        }
        ControlFlow::Continue(skipped) => {
            rank(out, query);
            Ok(SearchOutcome::Ranked { skipped })
        }
    }
}

pub fn parse_ranked(
    body: &str,
    url: &str,
    base: &Url,
    query: &str,
    out: &mut Vec<CandidateItem>,
) -> Result<Vec<SearchError>, SearchError> {
    let flow = scan_results(body, url, base, |item| {
        out.push(item);
        ControlFlow::<Infallible>::Continue(())
    })?;
    let skipped = match flow {
        ControlFlow::Continue(skipped) => skipped,
        ControlFlow::Break(never) => match never {},
    };
    rank(out, query);
    Ok(skipped)
}

/// Walks the result list in page order, handing each usable item to `visit`
/// until it breaks. Items whose markup drifted are collected, not fatal.
fn scan_results<B>(
    body: &str,
    url: &str,
    base: &Url,
    mut visit: impl FnMut(CandidateItem) -> ControlFlow<B>,
) -> Result<ControlFlow<B, Vec<SearchError>>, SearchError> {
    let doc = Html::parse_document(body);
    let list = doc
        .select(&RESULT_LIST)
        .next()
        .ok_or_else(|| SearchError::NoContainer { url: url.to_string() })?;

    let mut skipped = Vec::new();
    let mut seen_items = false;
    for (index, li) in list.select(&RESULT_ITEM).enumerate() {
        seen_items = true;
        let anchor = match descend(&li, &ITEM_PATH) {
            Ok(a) => a,
            Err(source) => {
                skipped.push(SearchError::Structure { index, source });
                continue;
            }
        };
        let Some(name) = anchor.value().attr("aria-label").and_then(label_name) else {
            skipped.push(SearchError::MissingAttribute { index, attr: "aria-label" });
            continue;
        };
        let Some(href) = anchor.value().attr("href").filter(|h| !h.trim().is_empty()) else {
            skipped.push(SearchError::MissingAttribute { index, attr: "href" });
            continue;
        };
        let link = base
            .join(href.trim())
            .map(String::from)
            .unwrap_or_else(|_| href.to_string());

        if let ControlFlow::Break(b) = visit(CandidateItem { name, link, rank: 0 }) {
            return Ok(ControlFlow::Break(b));
        }
    }
    if !seen_items {
        return Err(SearchError::NoItems { url: url.to_string() });
    }
    Ok(ControlFlow::Continue(skipped))
}

/// Store labels read "<badge>, <name>, <price>" or carry one more leading
/// field; the name position differs between the two.
fn label_name(label: &str) -> Option<String> {
    let parts: Vec<&str> = label.split(", ").collect();
    let name = if parts.len() == 3 { parts[1] } else { parts.get(2).copied()? };
    Some(name.to_string()).filter(|n| !n.is_empty())
}

/// Substring matches first in their original order, then the rest by edit
/// distance to the query.
pub fn rank(items: &mut [CandidateItem], query: &str) {
    for item in items.iter_mut() {
        item.rank = if contains_either(&item.name, query) {
            0
        } else {
            strsim::levenshtein(&item.name, query)
        };
    }
    items.sort_by_key(|item| item.rank);
}

fn contains_either(a: &str, b: &str) -> bool {
    let (long, short) = if a.len() < b.len() { (b, a) } else { (a, b) };
    long.contains(short)
}

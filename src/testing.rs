use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::fetch::{ByteStream, FetchError, Transport};
use crate::prompt::{PromptError, Prompter};

/// Canned responses keyed by exact URL. The last queued page repeats.
#[derive(Default)]
pub struct FakeTransport {
    pages: Mutex<HashMap<String, VecDeque<String>>>,
    streams: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(body.to_string());
        self
    }

    pub fn stream(self, url: &str, chunks: &[&[u8]]) -> Self {
        self.streams
            .lock()
            .unwrap()
            .insert(url.to_string(), chunks.iter().map(|c| c.to_vec()).collect());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn record(&self, url: &str) {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.record(url);
        let mut pages = self.pages.lock().unwrap();
        let queue = pages
            .get_mut(url)
            .ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })?;
        let body = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        body.ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })
    }

    async fn get_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        self.record(url);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })?;
        Ok(futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed())
    }
}

#[derive(Debug, Clone)]
pub enum Answer {
    /// Pick the option whose label starts with this text.
    Pick(&'static str),
    Index(usize),
    Abandon,
    Line(&'static str),
}

/// Operator stand-in replaying a fixed script and recording every menu shown.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Answer>>,
    menus: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            menus: Mutex::new(Vec::new()),
        })
    }

    pub fn menus(&self) -> Vec<Vec<String>> {
        self.menus.lock().unwrap().clone()
    }

    fn next(&self) -> Option<Answer> {
        self.answers.lock().unwrap().pop_front()
    }
}

impl Prompter for ScriptedPrompter {
    fn pick(&self, _title: &str, options: &[String]) -> Result<usize, PromptError> {
        self.menus.lock().unwrap().push(options.to_vec());
        match self.next() {
            Some(Answer::Index(i)) => Ok(i),
            Some(Answer::Pick(label)) => options
                .iter()
                .position(|o| o.starts_with(label))
                .ok_or(PromptError::NothingSelected),
            _ => Err(PromptError::NothingSelected),
        }
    }

    fn read_line(&self, _prompt: &str) -> Result<String, PromptError> {
        match self.next() {
            Some(Answer::Line(line)) => Ok(line.to_string()),
            _ => Ok(String::new()),
        }
    }
}

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Entity {
    #[serde(rename = "applicationName")]
    pub name: String,
    #[serde(rename = "logo")]
    pub logo: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, logo: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            logo: logo.into(),
        }
    }
}

/// One search hit. `rank == 0` marks a substring match, anything else is an
/// edit distance to the query. Visual-search hits carry an empty name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateItem {
    pub name: String,
    pub link: String,
    pub rank: usize,
}

impl CandidateItem {
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            format!("{}; {}", BY_LOGO_LABEL, self.link)
        } else {
            format!("{}; {}", self.name, self.link)
        }
    }
}

pub const BY_LOGO_LABEL: &str = "BY LOGO SEARCH";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved { url: String, text: String },
    ResolvedNoLink { text: String },
    Skipped,
    Failed { reason: String },
}

impl Resolution {
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Resolved { .. } => "resolved",
            Resolution::ResolvedNoLink { .. } => "no link",
            Resolution::Skipped => "skipped",
            Resolution::Failed { .. } => "failed",
        }
    }
}

/// Scratch state reused across entities. Cleared by truncation so the
/// allocations survive between uses.
#[derive(Debug, Default)]
pub struct Slot {
    pub id: usize,
    pub candidates: Vec<CandidateItem>,
    pub display: Vec<String>,
}

impl Slot {
    pub fn with_capacity(id: usize, capacity: usize) -> Self {
        Self {
            id,
            candidates: Vec::with_capacity(capacity),
            display: Vec::with_capacity(capacity + 4),
        }
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.display.clear();
    }
}

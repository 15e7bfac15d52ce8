use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::activity::ActivityLog;
use crate::fetch::Transport;
use crate::lens;
use crate::model::{Entity, Resolution, Slot};
use crate::prompt::{PromptError, Prompter};

pub const SEARCH_BY_LOGO: &str = "Search by logo";
pub const NO_LINK: &str = "No link";
pub const TYPE_LINK: &str = "Type link";
pub const SKIP_ITEM: &str = "Skip item";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Candidate(usize),
    SearchByLogo,
    NoLink,
    TypeLink,
    Skip,
}

/// Fills `slot.display` with the menu and returns what each line means.
fn present(slot: &mut Slot, offer_logo_search: bool) -> Vec<Choice> {
    slot.display.clear();
    let mut choices = Vec::with_capacity(slot.candidates.len() + 4);
    for (i, candidate) in slot.candidates.iter().enumerate() {
        slot.display.push(candidate.display());
        choices.push(Choice::Candidate(i));
    }
    if offer_logo_search {
        slot.display.push(SEARCH_BY_LOGO.to_string());
        choices.push(Choice::SearchByLogo);
    }
    for (label, choice) in [(NO_LINK, Choice::NoLink), (TYPE_LINK, Choice::TypeLink), (SKIP_ITEM, Choice::Skip)] {
        slot.display.push(label.to_string());
        choices.push(choice);
    }
    choices
}

/// Interactive resolution of an entity the catalog could not match on its
/// own. Prompts are serialized through the terminal lock.
pub struct Disambiguator {
    prompter: Arc<dyn Prompter>,
    terminal: Arc<Mutex<()>>,
    transport: Arc<dyn Transport>,
    lens_endpoint: String,
}

impl Disambiguator {
    pub fn new(
        prompter: Arc<dyn Prompter>,
        terminal: Arc<Mutex<()>>,
        transport: Arc<dyn Transport>,
        lens_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            prompter,
            terminal,
            transport,
            lens_endpoint: lens_endpoint.into(),
        }
    }

    pub async fn resolve(&self, entity: &Entity, slot: &mut Slot, log: &ActivityLog) -> Resolution {
        let mut logo_searched = false;
        if slot.candidates.is_empty() {
            logo_searched = true;
            self.search_by_logo(entity, slot, log).await;
        }

        loop {
            let choices = present(slot, !logo_searched);
            let title = format!("pick one for {}", entity.name);
            let index = match self.pick(title, slot.display.clone()).await {
                Ok(i) => i,
                Err(e) => {
                    return Resolution::Failed {
                        reason: format!("you didn't select anything for {}: {e}", entity.name),
                    }
                }
            };

            match choices.get(index).copied() {
                Some(Choice::Candidate(i)) => {
                    let candidate = &slot.candidates[i];
                    return Resolution::Resolved {
                        url: candidate.link.clone(),
                        text: entity.name.clone(),
                    };
                }
                Some(Choice::SearchByLogo) => {
                    logo_searched = true;
                    self.search_by_logo(entity, slot, log).await;
                }
                Some(Choice::NoLink) => {
                    return Resolution::ResolvedNoLink {
                        text: entity.name.clone(),
                    }
                }
                Some(Choice::TypeLink) => return self.typed_link(entity).await,
                Some(Choice::Skip) => return Resolution::Skipped,
                None => {
                    return Resolution::Failed {
                        reason: format!("invalid pick {index} for {}", entity.name),
                    }
                }
            }
        }
    }

    async fn typed_link(&self, entity: &Entity) -> Resolution {
        let prompt = format!("type a link for {}:", entity.name);
        match self.read_line(prompt).await {
            Ok(link) if !link.trim().is_empty() => Resolution::Resolved {
                url: link.trim().to_string(),
                text: entity.name.clone(),
            },
            Ok(_) => Resolution::Failed {
                reason: format!("you didn't type anything for {}, skipping", entity.name),
            },
            Err(e) => Resolution::Failed {
                reason: format!("reading a link for {} failed: {e}", entity.name),
            },
        }
    }

    async fn search_by_logo(&self, entity: &Entity, slot: &mut Slot, log: &ActivityLog) {
        if entity.logo.trim().is_empty() {
            log.push_log(format!("{}: no logo to search by", entity.name)).await;
            return;
        }
        match lens::search_by_logo(
            self.transport.as_ref(),
            &self.lens_endpoint,
            &entity.logo,
            &mut slot.candidates,
        )
        .await
        {
            Ok(0) => log.push_log(format!("{}: search by logo found nothing new", entity.name)).await,
            Ok(added) => debug!(name = %entity.name, added, "search by logo"),
            Err(e) => log.push_log(format!("{}: {e}", entity.name)).await,
        }
    }

    async fn pick(&self, title: String, options: Vec<String>) -> Result<usize, PromptError> {
        let _terminal = self.terminal.lock().await;
        let prompter = Arc::clone(&self.prompter);
        tokio::task::spawn_blocking(move || prompter.pick(&title, &options))
            .await
            .map_err(|e| PromptError::Io(io::Error::other(e)))?
    }

    async fn read_line(&self, prompt: String) -> Result<String, PromptError> {
        let _terminal = self.terminal.lock().await;
        let prompter = Arc::clone(&self.prompter);
        tokio::task::spawn_blocking(move || prompter.read_line(&prompt))
            .await
            .map_err(|e| PromptError::Io(io::Error::other(e)))?
    }
}

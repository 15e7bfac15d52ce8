use std::fmt;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError};

use tokio::sync::{AcquireError, Mutex, Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::activity::ActivityLog;
use crate::catalog::{fuzzy_prefix, Catalog, SearchOutcome};
use crate::config::Config;
use crate::disambiguate::Disambiguator;
use crate::fetch::{Fetcher, Transport};
use crate::model::{Entity, Resolution, Slot};
use crate::prompt::Prompter;
use crate::sink::HtmlSink;

/// Fixed set of reusable slots. Holding a slot is what admits an entity into
/// the search and pick phase.
pub struct SlotPool {
    slots: std::sync::Mutex<Vec<Slot>>,
    permits: Semaphore,
    capacity: usize,
}

impl SlotPool {
    pub fn new(size: usize, capacity: usize) -> Self {
        let slots = (0..size).map(|id| Slot::with_capacity(id, capacity)).collect();
        Self {
            slots: std::sync::Mutex::new(slots),
            permits: Semaphore::new(size),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<SlotGuard<'_>, AcquireError> {
        let permit = self.permits.acquire().await?;
        let mut slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Slot::with_capacity(usize::MAX, self.capacity));
        slot.clear();
        Ok(SlotGuard {
            pool: self,
            slot: Some(slot),
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn idle(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Returns its slot to the pool when dropped, on every exit path.
pub struct SlotGuard<'a> {
    pool: &'a SlotPool,
    slot: Option<Slot>,
    _permit: SemaphorePermit<'a>,
}

impl Deref for SlotGuard<'_> {
    type Target = Slot;

    fn deref(&self) -> &Slot {
        self.slot.as_ref().unwrap_or_else(|| unreachable!("slot taken before drop"))
    }
}

impl DerefMut for SlotGuard<'_> {
    fn deref_mut(&mut self) -> &mut Slot {
        self.slot.as_mut().unwrap_or_else(|| unreachable!("slot taken before drop"))
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(slot);
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub resolved: usize,
    pub no_link: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    fn add(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Resolved { .. } => self.resolved += 1,
            Resolution::ResolvedNoLink { .. } => self.no_link += 1,
            Resolution::Skipped => self.skipped += 1,
            Resolution::Failed { .. } => self.failed += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resolved, {} without link, {} skipped, {} failed",
            self.resolved, self.no_link, self.skipped, self.failed
        )
    }
}

pub struct Resolver<W: Write + Send> {
    config: Config,
    catalog: Catalog,
    disambiguator: Disambiguator,
    slots: SlotPool,
    sink: Arc<HtmlSink<W>>,
    terminal: Arc<Mutex<()>>,
}

impl<W: Write + Send + 'static> Resolver<W> {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        prompter: Arc<dyn Prompter>,
        sink: Arc<HtmlSink<W>>,
    ) -> Self {
        let terminal = Arc::new(Mutex::new(()));
        let fetcher = Fetcher::new(
            Arc::clone(&transport),
            config.retries,
            config.delay,
            config.dump_dir.clone(),
        );
        let catalog = Catalog::new(fetcher, config.host.clone(), config.page_size);
        let disambiguator = Disambiguator::new(
            prompter,
            Arc::clone(&terminal),
            transport,
            config.lens_endpoint.clone(),
        );
        let slots = SlotPool::new(config.slots, config.page_size);
        Self {
            config,
            catalog,
            disambiguator,
            slots,
            sink,
            terminal,
        }
    }

    /// Resolves every entity, one task each, dispatched `config.delay` apart.
    /// Returns once all tasks finished and the activity log is drained.
    pub async fn run(self: Arc<Self>, entities: Vec<Entity>) -> Summary {
        let (log, consumer) = ActivityLog::channel(Arc::clone(&self.terminal));
        log.push_log(format!(
            "Resolving {} games, {} at a time in the search phase",
            entities.len(),
            self.config.slots
        ))
        .await;

        let mut tasks = JoinSet::new();
        for (i, entity) in entities.into_iter().enumerate() {
            if i > 0 {
                sleep(self.config.delay).await;
            }
            let resolver = Arc::clone(&self);
            let log = log.clone();
            tasks.spawn(async move {
                let resolution = resolver.resolve(&entity, &log).await;
                resolver.record(&entity, &resolution, &log).await;
                resolution
            });
        }

        let mut summary = Summary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(resolution) => summary.add(&resolution),
                Err(e) => {
                    summary.failed += 1;
                    log.push_log(format!("resolution task failed: {e}")).await;
                }
            }
        }

        debug!(available = self.slots.available(), idle = self.slots.idle(), "slot pool after run");
        log.push_log(format!("Done: {summary}")).await;
        drop(log);
        match consumer.await {
            Ok(printed) => debug!(printed, "activity log drained"),
            Err(e) => warn!("activity log consumer failed: {e}"),
        }
        summary
    }

    async fn resolve(&self, entity: &Entity, log: &ActivityLog) -> Resolution {
        match self.catalog.probe(&entity.name).await {
            Ok(Some(url)) => {
                return Resolution::Resolved {
                    url,
                    text: entity.name.clone(),
                }
            }
            Ok(None) => log.push_log(format!("naive link doesn't work for {}", entity.name)).await,
            Err(e) => {
                log.push_log(format!("failed to probe naive link for {}: {e}", entity.name))
                    .await
            }
        }

        let mut slot = match self.slots.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                return Resolution::Failed {
                    reason: format!("no slot for {}: {e}", entity.name),
                }
            }
        };
        debug!(slot = slot.id, name = %entity.name, "search phase");
        sleep(self.config.delay).await;

        let mut ranked = false;
        match self.catalog.search(&entity.name, &mut slot.candidates).await {
            Ok(SearchOutcome::Exact(item)) => {
                return Resolution::Resolved {
                    url: item.link,
                    text: entity.name.clone(),
                }
            }
            Ok(SearchOutcome::Ranked { skipped }) => {
                ranked = true;
                for e in skipped {
                    log.push_log(format!("{}: {e}", entity.name)).await;
                }
                log.push_log(format!(
                    "no exact match for {} among {} results",
                    entity.name,
                    slot.candidates.len()
                ))
                .await;
            }
            Err(e) => log.push_log(format!("{}: {e}", entity.name)).await,
        }

        let query = match fuzzy_prefix(&entity.name) {
            Ok(query) => Some(query),
            Err(e) => {
                log.push_log(e.to_string()).await;
                // Same query again only helps if the first attempt failed.
                (!ranked).then(|| entity.name.clone())
            }
        };
        if let Some(query) = query {
            // Earlier results stay in the slot unless the loose query finds candidates.
            let mut found = Vec::with_capacity(self.config.page_size);
            match self.catalog.search_fuzzy(&query, &mut found).await {
                Ok(skipped) => {
                    for e in skipped {
                        log.push_log(format!("{}: {e}", entity.name)).await;
                    }
                    if !found.is_empty() {
                        std::mem::swap(&mut slot.candidates, &mut found);
                    }
                }
                Err(e) => log.push_log(format!("{}: {e}", entity.name)).await,
            }
        }

        self.disambiguator.resolve(entity, &mut slot, log).await
    }

    async fn record(&self, entity: &Entity, resolution: &Resolution, log: &ActivityLog) {
        debug!(name = %entity.name, outcome = resolution.kind(), "entity finished");
        if let Resolution::Failed { reason } = resolution {
            log.push_log(reason.clone()).await;
            return;
        }
        if let Err(e) = self.sink.write(entity, resolution).await {
            log.push_log(format!("failed to write result for {}: {e}", entity.name)).await;
        }
    }
}

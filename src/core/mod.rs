//! Engine core
//!
//! [`Core`] owns the catalog, the picture and price-guide caches, the worker
//! pool and the subscriber list. It lives on one home thread: every mutation
//! goes through `&mut self`, workers only report back through the pool's
//! completion channel, and subscribers are called synchronously while
//! completions are processed.

pub mod artifact;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod header;
pub mod pool;
pub mod storage;
pub mod transfer;

use crate::artifact::{
    ArtifactKey, ArtifactKind, Locator, PictureData, PictureRef, PriceGuideData, PriceGuideRef,
};
use crate::cache::{ArtifactCache, CacheStats};
use crate::catalog::{Catalog, Color, Item, SnapshotReader};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::ArtifactExecutor;
use crate::pool::{Completion, WorkerPool};
use crate::storage::ArtifactStorage;
use crate::transfer::Transfer;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Notification delivered to subscribers on the home thread
#[derive(Debug, Clone)]
pub enum CoreEvent {
    PictureUpdated(PictureRef),
    PriceGuideUpdated(PriceGuideRef),
}

impl CoreEvent {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            CoreEvent::PictureUpdated(_) => ArtifactKind::Picture,
            CoreEvent::PriceGuideUpdated(_) => ArtifactKind::PriceGuide,
        }
    }

    pub fn locator(&self) -> &Locator {
        match self {
            CoreEvent::PictureUpdated(pic) => pic.locator(),
            CoreEvent::PriceGuideUpdated(pg) => pg.locator(),
        }
    }
}

pub type Subscriber = Box<dyn FnMut(&CoreEvent) + Send>;

pub struct Core {
    config: EngineConfig,
    catalog: Arc<Catalog>,
    pictures: ArtifactCache<PictureData>,
    price_guides: ArtifactCache<PriceGuideData>,
    subscribers: Vec<Subscriber>,
    pool: WorkerPool,
}

impl Core {
    /// Load the configured catalog snapshot and start the workers
    ///
    /// Fails without side effects if the configuration is invalid or the
    /// snapshot cannot be loaded.
    pub fn open(
        config: EngineConfig,
        storage: Arc<dyn ArtifactStorage>,
        transfer: Arc<dyn Transfer>,
    ) -> Result<Self> {
        config.check()?;
        let catalog = SnapshotReader::read(config.database_path())?;
        Self::with_catalog(config, Arc::new(catalog), storage, transfer)
    }

    /// Start on an already loaded catalog
    pub fn with_catalog(
        config: EngineConfig,
        catalog: Arc<Catalog>,
        storage: Arc<dyn ArtifactStorage>,
        transfer: Arc<dyn Transfer>,
    ) -> Result<Self> {
        config.check()?;

        let executor = ArtifactExecutor::new(storage, transfer, config.urls.clone());
        let pool = WorkerPool::new(config.worker_threads, Arc::new(executor));

        let mut pictures =
            ArtifactCache::new(config.pictures.capacity, config.pictures.update_interval_secs);
        let mut price_guides = ArtifactCache::new(
            config.price_guides.capacity,
            config.price_guides.update_interval_secs,
        );
        pictures.set_online(config.online);
        price_guides.set_online(config.online);

        info!(
            "Core started: {} items, {} workers, {}",
            catalog.items().len(),
            pool.threads(),
            if config.online { "online" } else { "offline" }
        );

        Ok(Core {
            config,
            catalog,
            pictures,
            price_guides,
            subscribers: Vec::new(),
            pool,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Picture of `item` in `color`
    ///
    /// `None` only if the item (or color) is not part of the loaded catalog.
    /// Otherwise the returned picture may still be loading; subscribers are
    /// told once it changes.
    pub fn picture(
        &mut self,
        item: &Item,
        color: Option<&Color>,
        high_priority: bool,
    ) -> Option<PictureRef> {
        let (key, locator) = locate(&self.catalog, item, color, false)?;
        Some(self.pictures.get(key, locator, high_priority, &self.pool))
    }

    /// Color-less large picture of `item`
    pub fn large_picture(&mut self, item: &Item, high_priority: bool) -> Option<PictureRef> {
        let (key, locator) = locate(&self.catalog, item, None, true)?;
        Some(self.pictures.get(key, locator, high_priority, &self.pool))
    }

    pub fn price_guide(
        &mut self,
        item: &Item,
        color: Option<&Color>,
        high_priority: bool,
    ) -> Option<PriceGuideRef> {
        let (key, locator) = locate(&self.catalog, item, color, false)?;
        Some(self.price_guides.get(key, locator, high_priority, &self.pool))
    }

    pub fn update_picture(&mut self, picture: &PictureRef, high_priority: bool) {
        if let Some(pic) = self.pictures.update(picture, high_priority, &self.pool) {
            self.notify(CoreEvent::PictureUpdated(pic));
        }
    }

    pub fn update_price_guide(&mut self, price_guide: &PriceGuideRef, high_priority: bool) {
        if let Some(pg) = self.price_guides.update(price_guide, high_priority, &self.pool) {
            self.notify(CoreEvent::PriceGuideUpdated(pg));
        }
    }

    pub fn cancel_picture_transfers(&mut self) {
        for pic in self.pictures.cancel_transfers(&self.pool) {
            self.notify(CoreEvent::PictureUpdated(pic));
        }
    }

    pub fn cancel_price_guide_transfers(&mut self) {
        for pg in self.price_guides.cancel_transfers(&self.pool) {
            self.notify(CoreEvent::PriceGuideUpdated(pg));
        }
    }

    pub fn online_status(&self) -> bool {
        self.config.online
    }

    /// Going offline cancels outstanding transfers; cached data stays usable
    pub fn set_online_status(&mut self, online: bool) {
        if online == self.config.online {
            return;
        }
        info!("Switching to {} mode", if online { "online" } else { "offline" });

        self.config.online = online;
        self.pictures.set_online(online);
        self.price_guides.set_online(online);

        if !online {
            self.cancel_picture_transfers();
            self.cancel_price_guide_transfers();
        }
    }

    /// Per-kind refresh intervals in seconds; applies to later lookups only
    pub fn set_update_intervals(&mut self, intervals: &HashMap<ArtifactKind, u64>) {
        for (&kind, &secs) in intervals {
            self.config.cache_mut(kind).update_interval_secs = secs;
            match kind {
                ArtifactKind::Picture => self.pictures.set_update_interval(secs),
                ArtifactKind::PriceGuide => self.price_guides.set_update_interval(secs),
            }
        }
    }

    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&CoreEvent) + Send + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    /// Apply every completion that has arrived, without blocking
    ///
    /// Returns the number of completions handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(completion) = self.pool.try_recv() {
            self.dispatch(completion);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for the first completion, then drain the rest
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        match self.pool.recv_timeout(timeout) {
            Some(completion) => {
                self.dispatch(completion);
                1 + self.process_events()
            }
            None => 0,
        }
    }

    /// Process completions until no job is outstanding
    ///
    /// Returns `false` if `timeout` expired first.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_events();
            if self.pending_jobs() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_for_events(deadline - now);
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.pictures.pending_jobs() + self.price_guides.pending_jobs()
    }

    /// Replace the catalog with the snapshot at `path`
    ///
    /// On failure the current catalog and caches are untouched. On success
    /// every cached artifact is dropped and outstanding jobs are cancelled,
    /// since artifact keys are indices into the old catalog. Artifacts whose
    /// job was cancelled end up `UpdateFailed` and are announced once the new
    /// catalog is in place.
    pub fn reload_database<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let catalog = SnapshotReader::read(path.as_ref())?;

        let pictures = self.pictures.clear(&self.pool);
        let price_guides = self.price_guides.clear(&self.pool);
        self.catalog = Arc::new(catalog);

        for pic in pictures {
            self.notify(CoreEvent::PictureUpdated(pic));
        }
        for pg in price_guides {
            self.notify(CoreEvent::PriceGuideUpdated(pg));
        }

        info!(
            "Reloaded catalog from {} ({} items)",
            path.as_ref().display(),
            self.catalog.items().len()
        );
        Ok(())
    }

    pub fn picture_stats(&self) -> CacheStats {
        self.pictures.stats()
    }

    pub fn price_guide_stats(&self) -> CacheStats {
        self.price_guides.stats()
    }

    pub fn set_cache_capacity(&mut self, kind: ArtifactKind, capacity: usize) {
        let capacity = capacity.max(1);
        self.config.cache_mut(kind).capacity = capacity;
        match kind {
            ArtifactKind::Picture => self.pictures.set_capacity(capacity),
            ArtifactKind::PriceGuide => self.price_guides.set_capacity(capacity),
        }
    }

    fn dispatch(&mut self, completion: Completion) {
        match completion.kind {
            ArtifactKind::Picture => {
                if let Some(pic) = self.pictures.complete(completion, &self.pool) {
                    self.notify(CoreEvent::PictureUpdated(pic));
                }
            }
            ArtifactKind::PriceGuide => {
                if let Some(pg) = self.price_guides.complete(completion, &self.pool) {
                    self.notify(CoreEvent::PriceGuideUpdated(pg));
                }
            }
        }
    }

    fn notify(&mut self, event: CoreEvent) {
        debug!("{} updated: {}", event.kind(), event.locator());
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("catalog", &self.catalog)
            .field("online", &self.config.online)
            .field("pictures", &self.pictures.stats())
            .field("price_guides", &self.price_guides.stats())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Cache key and locator of `item`/`color` in `catalog`
fn locate(
    catalog: &Catalog,
    item: &Item,
    color: Option<&Color>,
    large: bool,
) -> Option<(ArtifactKey, Locator)> {
    let item = catalog.resolve(item)?;
    let color = match color {
        Some(c) => Some(catalog.color(c.id())?),
        None => None,
    };
    let picture_type = catalog
        .item_type_of(item)
        .map_or(item.item_type_id(), |t| t.picture_id());

    let key = if large {
        ArtifactKey::large(item.index())
    } else {
        ArtifactKey::new(item.index(), color.map(|c| c.index()))
    };
    let locator = Locator {
        item_type: item.item_type_id(),
        picture_type,
        item_id: item.id().to_string(),
        color_id: if large { None } else { color.map(|c| c.id()) },
        large,
    };
    Some((key, locator))
}

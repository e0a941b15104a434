//! Generic artifact cache
//!
//! One instance per artifact kind. Entries live in an LRU list with a cost
//! each; a pending map keyed like the cache holds the single outstanding job
//! per key so concurrent requesters attach to it instead of spawning another.
//!
//! Every scheduled job holds one reference on its artifact until its
//! completion is applied (or it is cancelled), so an entry with work in
//! flight is never evicted. Eviction walks least recently used first and
//! skips anything still referenced; if only pinned entries remain the cache
//! stays over capacity until they are released.
//!
//! All methods run on the home thread. Workers never see this structure.

use crate::artifact::{Artifact, ArtifactKey, ArtifactPayload, ArtifactRef, Locator, UpdateStatus};
use crate::pool::{Completion, Job, JobHandle, JobId, JobOutcome, JobStep, Priority, Scheduler};
use ahash::AHashMap;
use chrono::Utc;
use lru::LruCache;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct Entry<P> {
    artifact: Arc<Artifact<P>>,
    cost: usize,
}

struct Pending<P> {
    handle: JobHandle,
    step: JobStep,
    /// Refresh from the network once a pending disk load finishes
    force_refresh: bool,
    high_priority: bool,
    artifact: Arc<Artifact<P>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Requests satisfied by an already outstanding job
    pub coalesced: u64,
    pub entries: usize,
    pub total_cost: usize,
    pub capacity: usize,
    pub pending: usize,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

pub struct ArtifactCache<P: ArtifactPayload> {
    entries: LruCache<ArtifactKey, Entry<P>>,
    pending: AHashMap<ArtifactKey, Pending<P>>,
    jobs: AHashMap<JobId, ArtifactKey>,
    capacity: usize,
    total_cost: usize,
    update_interval: u64,
    online: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
    coalesced: u64,
}

impl<P: ArtifactPayload> ArtifactCache<P> {
    /// `capacity` in cost units, `update_interval` in seconds (0 = never refresh)
    pub fn new(capacity: usize, update_interval: u64) -> Self {
        ArtifactCache {
            entries: LruCache::unbounded(),
            pending: AHashMap::new(),
            jobs: AHashMap::new(),
            capacity: capacity.max(1),
            total_cost: 0,
            update_interval,
            online: true,
            hits: 0,
            misses: 0,
            evictions: 0,
            coalesced: 0,
        }
    }

    /// Look up `key`, creating a loading placeholder on a miss
    ///
    /// Never blocks. A miss schedules a disk load; a stale hit schedules a
    /// network refresh (when online and nothing is pending) and returns the
    /// existing object, which is updated in place.
    pub fn get(
        &mut self,
        key: ArtifactKey,
        locator: Locator,
        high_priority: bool,
        scheduler: &dyn Scheduler,
    ) -> ArtifactRef<P> {
        if let Some(entry) = self.entries.get(&key) {
            let artifact = Arc::clone(&entry.artifact);
            self.hits += 1;

            if self.pending.contains_key(&key) {
                self.coalesced += 1;
            } else if self.online && artifact.needs_update(self.update_interval, Utc::now()) {
                artifact.set_status(UpdateStatus::Updating);
                self.schedule(key, &artifact, JobStep::NetworkFetch, high_priority, scheduler);
            }
            trace!("{} cache hit {}", P::KIND, artifact.locator());
            return ArtifactRef::new(artifact);
        }

        self.misses += 1;
        let artifact = Arc::new(Artifact::new(key, locator));
        let handle = ArtifactRef::new(Arc::clone(&artifact));

        self.entries.push(
            key,
            Entry {
                artifact: Arc::clone(&artifact),
                cost: 1,
            },
        );
        self.total_cost += 1;
        self.schedule(key, &artifact, JobStep::DiskLoad, high_priority, scheduler);
        self.trim();

        handle
    }

    /// Cached artifact for `key`, without scheduling anything or touching recency
    pub fn peek(&self, key: &ArtifactKey) -> Option<ArtifactRef<P>> {
        self.entries
            .peek(key)
            .map(|entry| ArtifactRef::new(Arc::clone(&entry.artifact)))
    }

    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.entries.contains(key)
    }

    /// Force a refresh of `artifact`
    ///
    /// Coalesces with an outstanding job. Returns the artifact when a
    /// notification is due right away (offline: marked `UpdateFailed`).
    pub fn update(
        &mut self,
        artifact: &ArtifactRef<P>,
        high_priority: bool,
        scheduler: &dyn Scheduler,
    ) -> Option<ArtifactRef<P>> {
        let key = artifact.key();
        let owned = self
            .entries
            .peek(&key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.artifact, artifact.arc()));
        if !owned {
            debug!("Ignoring update of {} {} not owned by this cache", P::KIND, artifact.locator());
            return None;
        }

        if let Some(pending) = self.pending.get_mut(&key) {
            pending.force_refresh = true;
            pending.high_priority |= high_priority;
            self.coalesced += 1;
            return None;
        }

        if !self.online {
            artifact.mark_failed();
            return Some(artifact.clone());
        }

        artifact.set_status(UpdateStatus::Updating);
        let arc = Arc::clone(artifact.arc());
        self.schedule(key, &arc, JobStep::NetworkFetch, high_priority, scheduler);
        None
    }

    /// Apply a finished job
    ///
    /// Returns the artifact when its holders should be notified. Results of
    /// jobs this cache no longer tracks (cancelled, cleared) are dropped.
    pub fn complete(
        &mut self,
        completion: Completion,
        scheduler: &dyn Scheduler,
    ) -> Option<ArtifactRef<P>> {
        let Some(key) = self.jobs.remove(&completion.id) else {
            debug!("Discarding late {} result of job {}", P::KIND, completion.id);
            return None;
        };
        let pending = self.pending.remove(&key)?;
        let artifact = pending.artifact;

        let notify = match (pending.step, completion.outcome) {
            (JobStep::DiskLoad, outcome) => {
                let mut applied = false;
                match outcome {
                    JobOutcome::Loaded { payload, fetched } => {
                        applied = self.apply(&artifact, P::from_any(payload), fetched);
                    }
                    JobOutcome::NotFound => {}
                    JobOutcome::Failed(message) => {
                        warn!("Loading {} {} from disk failed: {}", P::KIND, artifact.locator(), message);
                    }
                    JobOutcome::Cancelled => {}
                }

                let wanted = pending.force_refresh
                    || artifact.needs_update(self.update_interval, Utc::now());
                if self.online && wanted {
                    artifact.set_status(UpdateStatus::Updating);
                    self.schedule(key, &artifact, JobStep::NetworkFetch, pending.high_priority, scheduler);
                    applied
                } else {
                    let status = if artifact.is_valid() {
                        UpdateStatus::Ok
                    } else {
                        UpdateStatus::UpdateFailed
                    };
                    artifact.set_status(status);
                    true
                }
            }
            (JobStep::NetworkFetch, JobOutcome::Loaded { payload, fetched }) => {
                if !self.apply(&artifact, P::from_any(payload), fetched) {
                    artifact.mark_failed();
                }
                true
            }
            (JobStep::NetworkFetch, outcome) => {
                if let JobOutcome::Failed(message) = &outcome {
                    warn!("Update of {} {} failed: {}", P::KIND, artifact.locator(), message);
                }
                artifact.mark_failed();
                true
            }
        };

        // The job's reference
        artifact.release();
        self.update_cost(&key, &artifact);
        self.trim();

        notify.then(|| ArtifactRef::new(artifact))
    }

    /// Cancel every outstanding network job
    ///
    /// Their artifacts are marked `UpdateFailed` and returned for
    /// notification. Disk loads keep running but drop any refresh that was
    /// requested on top of them.
    pub fn cancel_transfers(&mut self, scheduler: &dyn Scheduler) -> Vec<ArtifactRef<P>> {
        for pending in self.pending.values_mut() {
            if pending.step == JobStep::DiskLoad {
                pending.force_refresh = false;
            }
        }

        let keys: Vec<ArtifactKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.step == JobStep::NetworkFetch)
            .map(|(key, _)| *key)
            .collect();

        let mut cancelled = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(pending) = self.pending.remove(&key) else {
                continue;
            };
            self.jobs.remove(&pending.handle.id());
            scheduler.cancel(&pending.handle);

            pending.artifact.mark_failed();
            pending.artifact.release();
            cancelled.push(ArtifactRef::new(pending.artifact));
        }

        if !cancelled.is_empty() {
            debug!("Cancelled {} {} transfers", cancelled.len(), P::KIND);
        }
        cancelled
    }

    /// Drop every entry and cancel every job (database reload)
    ///
    /// Artifacts whose job was cancelled are marked `UpdateFailed` and
    /// returned for notification.
    pub fn clear(&mut self, scheduler: &dyn Scheduler) -> Vec<ArtifactRef<P>> {
        let mut cancelled = Vec::with_capacity(self.pending.len());
        for (_, pending) in self.pending.drain() {
            scheduler.cancel(&pending.handle);
            pending.artifact.mark_failed();
            pending.artifact.release();
            cancelled.push(ArtifactRef::new(pending.artifact));
        }
        self.jobs.clear();
        self.entries.clear();
        self.total_cost = 0;
        cancelled
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn set_update_interval(&mut self, secs: u64) {
        self.update_interval = secs;
    }

    pub fn update_interval(&self) -> u64 {
        self.update_interval
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            coalesced: self.coalesced,
            entries: self.entries.len(),
            total_cost: self.total_cost,
            capacity: self.capacity,
            pending: self.pending.len(),
        }
    }

    fn schedule(
        &mut self,
        key: ArtifactKey,
        artifact: &Arc<Artifact<P>>,
        step: JobStep,
        high_priority: bool,
        scheduler: &dyn Scheduler,
    ) {
        artifact.add_ref();
        let handle = scheduler.schedule(Job {
            kind: P::KIND,
            step,
            locator: artifact.locator().clone(),
            priority: Priority::from_high(high_priority),
        });
        debug!("Scheduled {:?} job {} for {} {}", step, handle.id(), P::KIND, artifact.locator());

        self.jobs.insert(handle.id(), key);
        self.pending.insert(
            key,
            Pending {
                handle,
                step,
                force_refresh: false,
                high_priority,
                artifact: Arc::clone(artifact),
            },
        );
    }

    fn apply(
        &self,
        artifact: &Artifact<P>,
        payload: Option<P>,
        fetched: chrono::DateTime<Utc>,
    ) -> bool {
        match payload {
            Some(payload) => {
                artifact.apply(payload, fetched);
                true
            }
            None => {
                warn!("Payload of wrong kind delivered to {} cache", P::KIND);
                false
            }
        }
    }

    fn update_cost(&mut self, key: &ArtifactKey, artifact: &Arc<Artifact<P>>) {
        if let Some(entry) = self.entries.peek_mut(key) {
            if Arc::ptr_eq(&entry.artifact, artifact) {
                let cost = artifact.cost();
                self.total_cost = self.total_cost - entry.cost + cost;
                entry.cost = cost;
            }
        }
    }

    /// Evict unreferenced entries, least recently used first, until the
    /// total cost fits the capacity or nothing evictable is left
    fn trim(&mut self) {
        if self.total_cost <= self.capacity {
            return;
        }

        let mut excess = self.total_cost - self.capacity;
        let mut victims = Vec::new();
        for (key, entry) in self.entries.iter().rev() {
            if excess == 0 {
                break;
            }
            if entry.artifact.is_detachable() && !self.pending.contains_key(key) {
                victims.push(*key);
                excess = excess.saturating_sub(entry.cost);
            }
        }

        for key in victims {
            if let Some(entry) = self.entries.pop(&key) {
                self.total_cost -= entry.cost;
                self.evictions += 1;
                trace!("Evicted {} {}", P::KIND, entry.artifact.locator());
            }
        }

        if self.total_cost > self.capacity {
            debug!(
                "{} cache over capacity ({} > {}), remaining entries are pinned",
                P::KIND,
                self.total_cost,
                self.capacity
            );
        }
    }
}

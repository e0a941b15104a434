//! Reference-counted derived artifacts
//!
//! Pictures and price guides share one shape: a key, an explicit external
//! reference count and a lock-protected state block that only the home
//! thread writes. The cache keeps its own `Arc` for bookkeeping; the
//! counter tracks holders outside the cache (callers and in-flight jobs) and
//! decides whether an entry may be evicted.

pub mod picture;
pub mod price_guide;

pub use picture::{ImageFormat, PictureData};
pub use price_guide::{Condition, Price, PriceGuideData, Time};

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::warn;

pub type Picture = Artifact<PictureData>;
pub type PriceGuide = Artifact<PriceGuideData>;
pub type PictureRef = ArtifactRef<PictureData>;
pub type PriceGuideRef = ArtifactRef<PriceGuideData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Picture,
    PriceGuide,
}

impl ArtifactKind {
    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::Picture => "Picture",
            ArtifactKind::PriceGuide => "PriceGuide",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Picture" | "picture" | "pictures" => Ok(ArtifactKind::Picture),
            "PriceGuide" | "price_guide" | "price_guides" => Ok(ArtifactKind::PriceGuide),
            other => Err(EngineError::Config(format!("unknown artifact kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Normal,
    /// Color-less large picture
    Large,
}

/// Cache key: dense indices of the current database generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub item: u32,
    pub color: Option<u32>,
    pub variant: Variant,
}

impl ArtifactKey {
    pub fn new(item: u32, color: Option<u32>) -> Self {
        ArtifactKey {
            item,
            color,
            variant: Variant::Normal,
        }
    }

    pub fn large(item: u32) -> Self {
        ArtifactKey {
            item,
            color: None,
            variant: Variant::Large,
        }
    }
}

/// Textual coordinates a job needs for disk and network access
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub item_type: char,
    pub picture_type: char,
    pub item_id: String,
    pub color_id: Option<u32>,
    pub large: bool,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.item_type, self.item_id)?;
        match (self.large, self.color_id) {
            (true, _) => f.write_str("/large"),
            (false, Some(color)) => write!(f, "@{}", color),
            (false, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpdateStatus {
    Ok,
    Loading,
    Updating,
    UpdateFailed,
}

/// Payload stored inside an artifact
pub trait ArtifactPayload: Sized + Send + Sync + 'static {
    const KIND: ArtifactKind;

    fn parse(bytes: &[u8]) -> Result<Self>;

    /// Capacity units charged to the owning cache
    fn cost(&self) -> usize;

    fn from_any(any: AnyPayload) -> Option<Self>;
}

/// Parsed payload travelling from a worker back to the home thread
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPayload {
    Picture(PictureData),
    PriceGuide(PriceGuideData),
}

impl AnyPayload {
    pub fn parse(kind: ArtifactKind, bytes: &[u8]) -> Result<Self> {
        match kind {
            ArtifactKind::Picture => PictureData::parse(bytes).map(AnyPayload::Picture),
            ArtifactKind::PriceGuide => PriceGuideData::parse(bytes).map(AnyPayload::PriceGuide),
        }
    }
}

struct ArtifactState<P> {
    fetched: Option<DateTime<Utc>>,
    valid: bool,
    status: UpdateStatus,
    payload: Option<Arc<P>>,
}

pub struct Artifact<P> {
    key: ArtifactKey,
    locator: Locator,
    refs: AtomicU32,
    state: RwLock<ArtifactState<P>>,
}

impl<P: ArtifactPayload> Artifact<P> {
    /// New placeholder in `Loading` state with no payload
    pub fn new(key: ArtifactKey, locator: Locator) -> Self {
        Artifact {
            key,
            locator,
            refs: AtomicU32::new(0),
            state: RwLock::new(ArtifactState {
                fetched: None,
                valid: false,
                status: UpdateStatus::Loading,
                payload: None,
            }),
        }
    }

    pub fn key(&self) -> ArtifactKey {
        self.key
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub(crate) fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference
    ///
    /// A release at zero is rejected and leaves the count untouched.
    pub(crate) fn release(&self) -> bool {
        let result = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if result.is_err() {
            warn!("Rejected release of unreferenced {} {}", P::KIND, self.locator);
            return false;
        }
        true
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Evictable only while nobody outside the cache holds it
    pub fn is_detachable(&self) -> bool {
        self.ref_count() == 0
    }

    pub fn status(&self) -> UpdateStatus {
        self.state.read().status
    }

    pub fn is_valid(&self) -> bool {
        self.state.read().valid
    }

    pub fn fetched(&self) -> Option<DateTime<Utc>> {
        self.state.read().fetched
    }

    pub fn payload(&self) -> Option<Arc<P>> {
        self.state.read().payload.clone()
    }

    pub fn cost(&self) -> usize {
        self.state.read().payload.as_ref().map_or(1, |p| p.cost().max(1))
    }

    /// Whether a refresh is due under `interval_secs` (0 disables refresh)
    pub fn needs_update(&self, interval_secs: u64, now: DateTime<Utc>) -> bool {
        if interval_secs == 0 {
            return false;
        }
        let state = self.state.read();
        match (state.valid, state.fetched) {
            (true, Some(fetched)) => (now - fetched).num_seconds() > interval_secs as i64,
            _ => true,
        }
    }

    pub(crate) fn set_status(&self, status: UpdateStatus) {
        self.state.write().status = status;
    }

    /// Replace the payload in place; holders observe it on their next read
    pub(crate) fn apply(&self, payload: P, fetched: DateTime<Utc>) {
        let mut state = self.state.write();
        state.payload = Some(Arc::new(payload));
        state.fetched = Some(fetched);
        state.valid = true;
        state.status = UpdateStatus::Ok;
    }

    /// Failed refresh: a previously valid payload is kept
    pub(crate) fn mark_failed(&self) {
        self.state.write().status = UpdateStatus::UpdateFailed;
    }
}

impl<P: ArtifactPayload> fmt::Debug for Artifact<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Artifact")
            .field("kind", &P::KIND)
            .field("locator", &self.locator)
            .field("refs", &self.ref_count())
            .field("status", &state.status)
            .field("valid", &state.valid)
            .field("fetched", &state.fetched)
            .finish()
    }
}

/// Counted handle that pins an artifact in its cache while held
pub struct ArtifactRef<P: ArtifactPayload> {
    inner: Arc<Artifact<P>>,
}

impl<P: ArtifactPayload> ArtifactRef<P> {
    pub fn new(inner: Arc<Artifact<P>>) -> Self {
        inner.add_ref();
        ArtifactRef { inner }
    }

    /// Same underlying object
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn arc(&self) -> &Arc<Artifact<P>> {
        &self.inner
    }
}

impl<P: ArtifactPayload> Clone for ArtifactRef<P> {
    fn clone(&self) -> Self {
        ArtifactRef::new(Arc::clone(&self.inner))
    }
}

impl<P: ArtifactPayload> Drop for ArtifactRef<P> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl<P: ArtifactPayload> Deref for ArtifactRef<P> {
    type Target = Artifact<P>;

    fn deref(&self) -> &Artifact<P> {
        &self.inner
    }
}

impl<P: ArtifactPayload> fmt::Debug for ArtifactRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn locator() -> Locator {
        Locator {
            item_type: 'P',
            picture_type: 'P',
            item_id: "3001".to_string(),
            color_id: Some(5),
            large: false,
        }
    }

    fn guide() -> PriceGuide {
        PriceGuide::new(ArtifactKey::new(0, Some(0)), locator())
    }

    #[test]
    fn test_release_at_zero_rejected() {
        let pg = guide();
        assert_eq!(pg.ref_count(), 0);
        assert!(!pg.release());
        assert_eq!(pg.ref_count(), 0);

        pg.add_ref();
        pg.add_ref();
        assert!(pg.release());
        assert!(pg.release());
        assert!(!pg.release());
        assert_eq!(pg.ref_count(), 0);
    }

    #[test]
    fn test_handle_pins_and_unpins() {
        let pg = Arc::new(guide());
        let a = ArtifactRef::new(Arc::clone(&pg));
        let b = a.clone();
        assert_eq!(pg.ref_count(), 2);
        assert!(!pg.is_detachable());
        assert!(ArtifactRef::ptr_eq(&a, &b));

        drop(a);
        drop(b);
        assert!(pg.is_detachable());
    }

    #[test]
    fn test_failed_refresh_keeps_payload() {
        let pg = guide();
        assert_eq!(pg.status(), UpdateStatus::Loading);
        assert!(!pg.is_valid());

        let now = Utc::now();
        pg.apply(PriceGuideData::default(), now);
        assert!(pg.is_valid());
        assert_eq!(pg.status(), UpdateStatus::Ok);

        pg.mark_failed();
        assert_eq!(pg.status(), UpdateStatus::UpdateFailed);
        assert!(pg.is_valid());
        assert!(pg.payload().is_some());
        assert_eq!(pg.fetched(), Some(now));
    }

    #[test]
    fn test_needs_update() {
        let pg = guide();
        let now = Utc::now();

        assert!(pg.needs_update(60, now));
        assert!(!pg.needs_update(0, now));

        pg.apply(PriceGuideData::default(), now - Duration::seconds(30));
        assert!(!pg.needs_update(60, now));
        assert!(pg.needs_update(10, now));
        assert!(!pg.needs_update(0, now));
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Picture".parse::<ArtifactKind>().unwrap(), ArtifactKind::Picture);
        assert_eq!(
            "price_guides".parse::<ArtifactKind>().unwrap(),
            ArtifactKind::PriceGuide
        );
        assert!("Inventory".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(locator().to_string(), "P/3001@5");
        let large = Locator {
            large: true,
            color_id: None,
            ..locator()
        };
        assert_eq!(large.to_string(), "P/3001/large");
    }
}

//! # catalog-engine - Catalog Data Engine
//!
//! In-process engine behind a collectibles inventory manager:
//!
//! - **Packed catalog store**: item types, categories, colors and items in
//!   sorted tables, with bill-of-materials and appears-in relations packed
//!   into flat `u64`/`u32` arenas and addressed by dense indices
//! - **Versioned snapshots**: checksummed, optionally LZ4 compressed binary
//!   images of the catalog, loaded atomically
//! - **Artifact caches**: reference-counted pictures and price guides with at
//!   most one fetch in flight per key and LRU eviction that never touches an
//!   entry somebody still holds
//! - **Worker pool**: disk and network I/O off the home thread, with results
//!   applied back on it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catalog_engine::{Core, CoreEvent, EngineConfig, FsStorage, OfflineTransfer, Result};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let config = EngineConfig::from_file("catalog.toml")?;
//! let storage = Arc::new(FsStorage::new(&config.data_dir));
//! let mut core = Core::open(config, storage, Arc::new(OfflineTransfer))?;
//!
//! core.subscribe(|event: &CoreEvent| println!("updated: {}", event.locator()));
//!
//! let catalog = Arc::clone(core.catalog());
//! if let Some(brick) = catalog.item('P', "3001") {
//!     let red = catalog.color(5);
//!     let picture = core.picture(brick, red, true);
//!     core.run_until_idle(Duration::from_secs(5));
//!     println!("{:?}", picture.map(|p| p.status()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    artifact, cache, catalog, config, error, executor, header, pool, storage, transfer,
};

pub use crate::core::{
    artifact::{
        AnyPayload, Artifact, ArtifactKey, ArtifactKind, ArtifactPayload, ArtifactRef, Condition,
        ImageFormat, Locator, Picture, PictureData, PictureRef, Price, PriceGuide, PriceGuideData,
        PriceGuideRef, Time, UpdateStatus, Variant,
    },
    cache::{ArtifactCache, CacheStats},
    catalog::{
        AppearsInLine, BomLine, BomPart, Catalog, CatalogBuilder, CatalogStats, CatalogTables,
        Category, Color, ColorType, Item, ItemType, SnapshotReader, SnapshotWriter,
    },
    config::{CacheConfig, EngineConfig},
    error::{EngineError, Result},
    header::SnapshotHeader,
    pool::{
        CancelToken, Completion, Job, JobExecutor, JobHandle, JobId, JobOutcome, JobStep, Priority,
        Scheduler, WorkerPool,
    },
    storage::{ArtifactStorage, FsStorage, StoredArtifact},
    transfer::{OfflineTransfer, Transfer, TransferRequest, UrlScheme},
    Core, CoreEvent, Subscriber,
};

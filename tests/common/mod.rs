//! Shared fixtures for the integration tests

#![allow(dead_code)]

use catalog_engine::{
    ArtifactKind, ArtifactStorage, BomPart, CancelToken, Catalog, CatalogBuilder, Category, Color,
    Core, CoreEvent, EngineConfig, EngineError, Item, ItemType, Locator, Result, StoredArtifact,
    Transfer, TransferRequest, UpdateStatus, UrlScheme,
};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PART_COUNT: u32 = 20;

/// Small catalog: parts p0..p19, two bricks, one set
pub fn sample_catalog() -> Catalog {
    builder().build().unwrap()
}

pub fn builder() -> CatalogBuilder {
    let mut b = CatalogBuilder::new()
        .info("integration fixture")
        .item_type(ItemType::new('P', "Part").with_colors(true).with_categories([5]))
        .item_type(ItemType::new('S', "Set").with_inventories(true))
        .category(Category::new(5, "Brick"))
        .category(Category::new(65, "Town"))
        .color(Color::new(1, "White").with_ldraw_id(15))
        .color(Color::new(5, "Red").with_ldraw_id(4))
        .color(Color::new(11, "Black").with_ldraw_id(0))
        .item(Item::new('P', "3001", "Brick 2 x 4").with_categories([5]).with_default_color(5))
        .item(Item::new('P', "3003", "Brick 2 x 2").with_categories([5]))
        .item(
            Item::new('S', "6000-1", "Town Set")
                .with_categories([65])
                .with_year(1980)
                .with_inventory_update(1_500_000_000),
        )
        .consists_of(
            'S',
            "6000-1",
            vec![
                BomPart::new(4, 'P', "3001", 5),
                BomPart::new(2, 'P', "3003", 11),
                BomPart::new(1, 'P', "3003", 1).extra(),
            ],
        );
    for n in 0..PART_COUNT {
        b = b.item(Item::new('P', format!("p{}", n), format!("Part {}", n)));
    }
    b
}

pub fn locator(item_type: char, id: &str, color: Option<u32>) -> Locator {
    Locator {
        item_type,
        picture_type: item_type,
        item_id: id.to_string(),
        color_id: color,
        large: false,
    }
}

/// Minimal PNG: signature plus IHDR header, padded to `size`
pub fn png(width: u32, height: u32, size: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    if bytes.len() < size {
        bytes.resize(size, 0);
    }
    bytes
}

pub const PRICE_GUIDE: &str = "P\tN\t10\t2\t0.10\t0.20\t0.15\t0.50\n\
                               C\tU\t99\t7\t0.01\t0.05\t0.04\t0.25\n";

pub fn mock_urls() -> UrlScheme {
    UrlScheme {
        picture: "mock://picture/{type}/{item}/{color}".to_string(),
        large_picture: "mock://large/{type}/{item}".to_string(),
        price_guide: "mock://priceguide/{type}/{item}/{color}".to_string(),
    }
}

pub fn config(workers: usize) -> EngineConfig {
    let mut config = EngineConfig::new("/nonexistent");
    config.worker_threads = workers;
    config.urls = mock_urls();
    config
}

/// Transfer serving canned bodies by URL prefix
///
/// Can be closed to hold fetches until reopened, and switched to failing.
pub struct MockTransfer {
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    failing: AtomicBool,
    open: Mutex<bool>,
    opened: Condvar,
}

impl MockTransfer {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransfer {
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            open: Mutex::new(true),
            opened: Condvar::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn close(&self) {
        *self.open.lock() = false;
    }

    pub fn reopen(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Wait until at least `n` fetches have started
    pub fn wait_for_calls(&self, n: usize) {
        for _ in 0..500 {
            if self.calls() >= n {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("expected {} transfer calls, saw {}", n, self.calls());
    }
}

impl Transfer for MockTransfer {
    fn fetch(&self, request: &TransferRequest, _cancel: &CancelToken) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(request.url.clone());

        {
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Transfer {
                url: request.url.clone(),
                message: "HTTP 503".to_string(),
            });
        }
        if request.url.starts_with("mock://priceguide/") {
            Ok(PRICE_GUIDE.as_bytes().to_vec())
        } else {
            Ok(png(64, 48, 2048))
        }
    }
}

/// In-memory storage with call counters
#[derive(Default)]
pub struct MemStorage {
    files: Mutex<HashMap<(ArtifactKind, Locator), StoredArtifact>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, kind: ArtifactKind, locator: Locator, bytes: Vec<u8>, modified: DateTime<Utc>) {
        self.files
            .lock()
            .insert((kind, locator), StoredArtifact { bytes, modified });
    }

    pub fn get(&self, kind: ArtifactKind, locator: &Locator) -> Option<StoredArtifact> {
        self.files.lock().get(&(kind, locator.clone())).cloned()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ArtifactStorage for MemStorage {
    fn load(&self, kind: ArtifactKind, locator: &Locator) -> Result<Option<StoredArtifact>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(kind, locator))
    }

    fn save(&self, kind: ArtifactKind, locator: &Locator, bytes: &[u8]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(kind, locator.clone(), bytes.to_vec(), Utc::now());
        Ok(())
    }
}

/// What a subscriber saw; holds no reference so nothing stays pinned
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub kind: ArtifactKind,
    pub locator: Locator,
    pub status: UpdateStatus,
}

pub type EventLog = Arc<Mutex<Vec<Seen>>>;

/// Core over the sample catalog plus a log of delivered events
pub fn core_with(
    config: EngineConfig,
    storage: Arc<MemStorage>,
    transfer: Arc<MockTransfer>,
) -> (Core, EventLog) {
    let mut core =
        Core::with_catalog(config, Arc::new(sample_catalog()), storage, transfer).unwrap();
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    core.subscribe(move |event: &CoreEvent| {
        let status = match event {
            CoreEvent::PictureUpdated(pic) => pic.status(),
            CoreEvent::PriceGuideUpdated(pg) => pg.status(),
        };
        sink.lock().push(Seen {
            kind: event.kind(),
            locator: event.locator().clone(),
            status,
        });
    });
    (core, events)
}

pub const IDLE: Duration = Duration::from_secs(10);

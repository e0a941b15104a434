#![no_main]
use catalog_engine::{Catalog, SnapshotReader};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must be rejected cleanly, and anything accepted must be
// safe to walk
fuzz_target!(|data: &[u8]| {
    let catalog: Catalog = match SnapshotReader::from_bytes(data) {
        Ok(c) => c,
        Err(_) => return,
    };

    for item in catalog.items() {
        let _ = catalog.consists_of(item);
        let _ = catalog.appears_in(item, None);
        let _ = catalog.categories_of(item).count();
    }
});

#![no_main]
use catalog_engine::{AnyPayload, ArtifactKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(AnyPayload::PriceGuide(pg)) = AnyPayload::parse(ArtifactKind::PriceGuide, data) {
        let _ = pg.to_text();
    }
    let _ = AnyPayload::parse(ArtifactKind::Picture, data);
});

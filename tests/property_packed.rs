//! Property tests for the packed relation records

use catalog_engine::core::catalog::packed::{
    decode_appears_in, AppearsInRecord, ConsistsOf, ConsistsOfRecord, MAX_ALT_ID,
    MAX_COLOR_INDEX, MAX_ITEM_INDEX, MAX_QUANTITY,
};
use catalog_engine::EngineError;
use proptest::prelude::*;

fn any_edge() -> impl Strategy<Value = ConsistsOf> {
    (
        0..=MAX_QUANTITY as u16,
        0..=MAX_ITEM_INDEX,
        0..=MAX_COLOR_INDEX,
        any::<bool>(),
        any::<bool>(),
        0..=MAX_ALT_ID as u8,
        any::<bool>(),
    )
        .prop_map(
            |(quantity, item, color, extra, alternate, alt_id, counterpart)| ConsistsOf {
                quantity,
                item,
                color,
                extra,
                alternate,
                alt_id,
                counterpart,
            },
        )
}

proptest! {
    #[test]
    fn prop_edges_survive_packing(edge in any_edge()) {
        let record = ConsistsOfRecord::encode(&edge).unwrap();
        prop_assert!(!record.has_reserved_bits());
        prop_assert_eq!(record.decode(), edge);
        prop_assert_eq!(ConsistsOfRecord::from_bits(record.bits()), record);
    }

    #[test]
    fn prop_oversized_fields_are_rejected(
        edge in any_edge(),
        quantity in (MAX_QUANTITY + 1) as u16..=u16::MAX,
        item in MAX_ITEM_INDEX + 1..=u32::MAX,
    ) {
        let wide_qty = ConsistsOf { quantity, ..edge };
        let is_overflow = matches!(
            ConsistsOfRecord::encode(&wide_qty),
            Err(EngineError::PackedFieldOverflow { field: "quantity", .. })
        );
        prop_assert!(is_overflow);

        let wide_item = ConsistsOf { item, ..edge };
        prop_assert!(ConsistsOfRecord::encode(&wide_item).is_err());
    }

    #[test]
    fn prop_appears_in_groups_filter_by_color(
        groups in prop::collection::btree_map(
            0..=MAX_COLOR_INDEX,
            prop::collection::vec((1..=MAX_QUANTITY, 0..=MAX_ITEM_INDEX), 1..8),
            0..6,
        ),
        probe in 0..=MAX_COLOR_INDEX,
    ) {
        let mut words = Vec::new();
        for (&color, entries) in &groups {
            words.push(AppearsInRecord::header(color, entries.len() as u32).unwrap().bits());
            for &(qty, item) in entries {
                words.push(AppearsInRecord::entry(qty, item).unwrap().bits());
            }
        }

        let all = decode_appears_in(&words, None).unwrap();
        let total: usize = groups.values().map(Vec::len).sum();
        prop_assert_eq!(all.len(), total);

        let some = decode_appears_in(&words, Some(probe)).unwrap();
        prop_assert_eq!(some.len(), groups.get(&probe).map_or(0, Vec::len));
        prop_assert!(some.iter().all(|e| e.color == probe));
    }

    #[test]
    fn prop_truncated_group_is_detected(
        color in 0..=MAX_COLOR_INDEX,
        count in 2u32..64,
    ) {
        let mut words = vec![AppearsInRecord::header(color, count).unwrap().bits()];
        for n in 0..count - 1 {
            words.push(AppearsInRecord::entry(1, n).unwrap().bits());
        }
        prop_assert!(decode_appears_in(&words, None).is_none());
    }

    #[test]
    fn prop_large_quantities_saturate(qty in MAX_QUANTITY..=u32::MAX, item in 0..=MAX_ITEM_INDEX) {
        let record = AppearsInRecord::entry(qty, item).unwrap();
        prop_assert_eq!(record.low(), MAX_QUANTITY);
        prop_assert_eq!(record.high(), item);
    }
}

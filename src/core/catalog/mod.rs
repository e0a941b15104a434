//! Bit-packed catalog store
//!
//! The catalog holds the reference database: item types, categories,
//! colors and items, plus the consists-of (bill of materials) and
//! appears-in (reverse index) relations packed into flat arenas.
//!
//! Tables are immutable after construction. A [`Catalog`] is only ever
//! produced fully validated, either by [`CatalogBuilder::build`] or by the
//! snapshot reader, so a failed load never leaves partial state behind.
//!
//! Lookups never fail: absence is `None` or an empty list.

pub mod builder;
pub mod packed;
pub mod snapshot;
pub mod types;

pub use builder::{BomPart, CatalogBuilder};
pub use packed::{AppearsIn, AppearsInRecord, ConsistsOf, ConsistsOfRecord};
pub use snapshot::{SnapshotReader, SnapshotWriter};
pub use types::{Category, Color, ColorType, Item, ItemType, PackedSpan};

use crate::error::{EngineError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Raw catalog tables, exactly as stored in a snapshot body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogTables {
    /// Free-form description of the data source
    pub info: String,
    /// Sorted by id
    pub item_types: Vec<ItemType>,
    pub categories: Vec<Category>,
    /// Sorted by id, `index` equals position
    pub colors: Vec<Color>,
    /// Sorted by (type, id), `index` equals position
    pub items: Vec<Item>,
    pub consists_of: Vec<ConsistsOfRecord>,
    pub appears_in: Vec<u32>,
}

/// Resolved bill-of-materials line
#[derive(Debug, Clone, Copy)]
pub struct BomLine<'a> {
    pub quantity: u16,
    pub item: &'a Item,
    pub color: &'a Color,
    pub extra: bool,
    pub alternate: bool,
    pub alt_id: u8,
    pub counterpart: bool,
}

/// Resolved appears-in line: `item` contains the part `quantity` times in `color`
#[derive(Debug, Clone, Copy)]
pub struct AppearsInLine<'a> {
    pub color: &'a Color,
    pub quantity: u16,
    pub item: &'a Item,
}

/// Table sizes and arena footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub item_types: usize,
    pub categories: usize,
    pub colors: usize,
    pub items: usize,
    pub consists_of_edges: usize,
    pub appears_in_words: usize,
    /// Bytes used by the two packed arenas
    pub packed_bytes: usize,
}

pub struct Catalog {
    tables: CatalogTables,
    colors_by_id: AHashMap<u32, u32>,
    categories_by_id: AHashMap<u32, u32>,
    consists_of_memo: Vec<OnceLock<Box<[ConsistsOf]>>>,
}

impl Catalog {
    /// Validate raw tables and build the lookup structures
    pub fn from_tables(tables: CatalogTables) -> Result<Self> {
        validate_limits(&tables)?;

        if !tables.item_types.windows(2).all(|w| w[0].id < w[1].id) {
            return Err(EngineError::Corrupt(
                "item types are not sorted by id".to_string(),
            ));
        }

        let mut categories_by_id = AHashMap::with_capacity(tables.categories.len());
        for (pos, cat) in tables.categories.iter().enumerate() {
            if categories_by_id.insert(cat.id, pos as u32).is_some() {
                return Err(EngineError::Corrupt(format!(
                    "duplicate category id {}",
                    cat.id
                )));
            }
        }

        let mut colors_by_id = AHashMap::with_capacity(tables.colors.len());
        for (pos, color) in tables.colors.iter().enumerate() {
            if color.index as usize != pos {
                return Err(EngineError::Corrupt(format!(
                    "color {} has index {} at position {}",
                    color.id, color.index, pos
                )));
            }
            if colors_by_id.insert(color.id, pos as u32).is_some() {
                return Err(EngineError::Corrupt(format!(
                    "duplicate color id {}",
                    color.id
                )));
            }
        }

        for itt in &tables.item_types {
            if let Some(cat) = itt.categories.iter().find(|&&c| !categories_by_id.contains_key(&c)) {
                return Err(EngineError::UnknownReference(format!(
                    "item type '{}' references category {}",
                    itt.id, cat
                )));
            }
        }

        validate_items(&tables, &categories_by_id, &colors_by_id)?;
        validate_relations(&tables)?;

        let consists_of_memo = (0..tables.items.len()).map(|_| OnceLock::new()).collect();

        Ok(Catalog {
            tables,
            colors_by_id,
            categories_by_id,
            consists_of_memo,
        })
    }

    pub(crate) fn tables(&self) -> &CatalogTables {
        &self.tables
    }

    pub fn info(&self) -> &str {
        &self.tables.info
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            item_types: self.tables.item_types.len(),
            categories: self.tables.categories.len(),
            colors: self.tables.colors.len(),
            items: self.tables.items.len(),
            consists_of_edges: self.tables.consists_of.len(),
            appears_in_words: self.tables.appears_in.len(),
            packed_bytes: self.tables.consists_of.len() * 8 + self.tables.appears_in.len() * 4,
        }
    }

    pub fn item_types(&self) -> &[ItemType] {
        &self.tables.item_types
    }

    pub fn categories(&self) -> &[Category] {
        &self.tables.categories
    }

    pub fn colors(&self) -> &[Color] {
        &self.tables.colors
    }

    pub fn items(&self) -> &[Item] {
        &self.tables.items
    }

    pub fn item_type(&self, id: char) -> Option<&ItemType> {
        let types = &self.tables.item_types;
        types
            .binary_search_by(|t| t.id.cmp(&id))
            .ok()
            .map(|pos| &types[pos])
    }

    pub fn category(&self, id: u32) -> Option<&Category> {
        self.categories_by_id
            .get(&id)
            .map(|&pos| &self.tables.categories[pos as usize])
    }

    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        self.tables
            .categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn color(&self, id: u32) -> Option<&Color> {
        self.colors_by_id
            .get(&id)
            .map(|&pos| &self.tables.colors[pos as usize])
    }

    pub fn color_by_index(&self, index: u32) -> Option<&Color> {
        self.tables.colors.get(index as usize)
    }

    pub fn color_by_name(&self, name: &str) -> Option<&Color> {
        self.tables
            .colors
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn color_by_ldraw_id(&self, ldraw_id: i32) -> Option<&Color> {
        if ldraw_id < 0 {
            return None;
        }
        self.tables.colors.iter().find(|c| c.ldraw_id == ldraw_id)
    }

    pub fn item(&self, item_type: char, id: &str) -> Option<&Item> {
        let items = &self.tables.items;
        items
            .binary_search_by(|i| i.sort_key().cmp(&(item_type, id)))
            .ok()
            .map(|pos| &items[pos])
    }

    pub fn item_by_index(&self, index: u32) -> Option<&Item> {
        self.tables.items.get(index as usize)
    }

    /// All items of one type, in id order
    pub fn items_of_type(&self, item_type: char) -> &[Item] {
        let items = &self.tables.items;
        let start = items.partition_point(|i| i.item_type < item_type);
        let end = items.partition_point(|i| i.item_type <= item_type);
        &items[start..end]
    }

    pub fn item_type_of(&self, item: &Item) -> Option<&ItemType> {
        self.item_type(item.item_type)
    }

    pub fn default_color_of(&self, item: &Item) -> Option<&Color> {
        item.default_color.and_then(|id| self.color(id))
    }

    pub fn categories_of<'a>(&'a self, item: &'a Item) -> impl Iterator<Item = &'a Category> + 'a {
        item.categories.iter().filter_map(move |&id| self.category(id))
    }

    /// Map an item (possibly from an older generation) to this catalog's record
    pub fn resolve(&self, item: &Item) -> Option<&Item> {
        match self.item_by_index(item.index) {
            Some(own) if std::ptr::eq(own, item) => Some(own),
            _ => self.item(item.item_type, &item.id),
        }
    }

    /// Bill of materials of `item`
    ///
    /// The packed span is decoded once and memoized; every call resolves
    /// the compact entries to table references.
    pub fn consists_of(&self, item: &Item) -> Vec<BomLine<'_>> {
        let Some(item) = self.resolve(item) else {
            return Vec::new();
        };

        let decoded = self.consists_of_memo[item.index as usize].get_or_init(|| {
            self.tables.consists_of[item.consists_of.range()]
                .iter()
                .map(|rec| rec.decode())
                .collect()
        });

        decoded
            .iter()
            .filter_map(|e| {
                Some(BomLine {
                    quantity: e.quantity,
                    item: self.item_by_index(e.item)?,
                    color: self.color_by_index(e.color)?,
                    extra: e.extra,
                    alternate: e.alternate,
                    alt_id: e.alt_id,
                    counterpart: e.counterpart,
                })
            })
            .collect()
    }

    /// Items that contain `item`, optionally restricted to one color
    pub fn appears_in(&self, item: &Item, color: Option<&Color>) -> Vec<AppearsInLine<'_>> {
        let Some(item) = self.resolve(item) else {
            return Vec::new();
        };
        let color_index = match color {
            Some(c) => match self.color(c.id) {
                Some(own) => Some(own.index),
                None => return Vec::new(),
            },
            None => None,
        };

        let words = &self.tables.appears_in[item.appears_in.range()];
        packed::decode_appears_in(words, color_index)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| {
                Some(AppearsInLine {
                    color: self.color_by_index(e.color)?,
                    quantity: e.quantity,
                    item: self.item_by_index(e.item)?,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("info", &self.tables.info)
            .field("stats", &self.stats())
            .finish()
    }
}

fn validate_limits(tables: &CatalogTables) -> Result<()> {
    if tables.items.len() > packed::MAX_ITEM_INDEX as usize + 1 {
        return Err(EngineError::PackedFieldOverflow {
            field: "item_count",
            value: tables.items.len() as u64,
            max: packed::MAX_ITEM_INDEX as u64 + 1,
        });
    }
    if tables.colors.len() > packed::MAX_COLOR_INDEX as usize + 1 {
        return Err(EngineError::PackedFieldOverflow {
            field: "color_count",
            value: tables.colors.len() as u64,
            max: packed::MAX_COLOR_INDEX as u64 + 1,
        });
    }
    Ok(())
}

fn validate_items(
    tables: &CatalogTables,
    categories_by_id: &AHashMap<u32, u32>,
    colors_by_id: &AHashMap<u32, u32>,
) -> Result<()> {
    for (pos, item) in tables.items.iter().enumerate() {
        if item.index as usize != pos {
            return Err(EngineError::Corrupt(format!(
                "item {}/{} has index {} at position {}",
                item.item_type, item.id, item.index, pos
            )));
        }
        if pos > 0 && tables.items[pos - 1].sort_key() >= item.sort_key() {
            return Err(EngineError::Corrupt(format!(
                "items not sorted at {}/{}",
                item.item_type, item.id
            )));
        }
        if tables
            .item_types
            .binary_search_by(|t| t.id.cmp(&item.item_type))
            .is_err()
        {
            return Err(EngineError::UnknownReference(format!(
                "item {}/{} has unknown type",
                item.item_type, item.id
            )));
        }
        if let Some(cat) = item.categories.iter().find(|&&c| !categories_by_id.contains_key(&c)) {
            return Err(EngineError::UnknownReference(format!(
                "item {}/{} references category {}",
                item.item_type, item.id, cat
            )));
        }
        if let Some(color) = item.default_color {
            if !colors_by_id.contains_key(&color) {
                return Err(EngineError::UnknownReference(format!(
                    "item {}/{} references color {}",
                    item.item_type, item.id, color
                )));
            }
        }
        if item.consists_of.end() > tables.consists_of.len() as u64
            || item.appears_in.end() > tables.appears_in.len() as u64
        {
            return Err(EngineError::Corrupt(format!(
                "item {}/{} relation span out of bounds",
                item.item_type, item.id
            )));
        }
    }
    Ok(())
}

fn validate_relations(tables: &CatalogTables) -> Result<()> {
    let item_count = tables.items.len() as u32;
    let color_count = tables.colors.len() as u32;

    for rec in &tables.consists_of {
        let e = rec.decode();
        if rec.has_reserved_bits() || e.item >= item_count || e.color >= color_count {
            return Err(EngineError::Corrupt(format!(
                "invalid consists-of record {:#018x}",
                rec.bits()
            )));
        }
    }

    for item in &tables.items {
        let words = &tables.appears_in[item.appears_in.range()];
        let entries = packed::decode_appears_in(words, None).ok_or_else(|| {
            EngineError::Corrupt(format!(
                "appears-in span of {}/{} is malformed",
                item.item_type, item.id
            ))
        })?;
        if entries
            .iter()
            .any(|e| e.item >= item_count || e.color >= color_count)
        {
            return Err(EngineError::Corrupt(format!(
                "appears-in span of {}/{} references unknown rows",
                item.item_type, item.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        CatalogBuilder::new()
            .info("unit test")
            .item_type(ItemType::new('P', "Part").with_colors(true).with_categories([5]))
            .item_type(ItemType::new('S', "Set").with_inventories(true))
            .category(Category::new(5, "Brick"))
            .category(Category::new(65, "Town"))
            .color(Color::new(11, "Black").with_ldraw_id(0))
            .color(Color::new(5, "Red").with_ldraw_id(4))
            .item(Item::new('P', "3001", "Brick 2 x 4").with_categories([5]))
            .item(Item::new('P', "3003", "Brick 2 x 2").with_categories([5]))
            .item(
                Item::new('S', "6000-1", "Town Set")
                    .with_categories([65])
                    .with_inventory_update(1_500_000_000),
            )
            .consists_of(
                'S',
                "6000-1",
                vec![
                    BomPart::new(4, 'P', "3001", 5),
                    BomPart::new(2, 'P', "3003", 11),
                    BomPart::new(1, 'P', "3003", 5).alternate(1),
                ],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookups() {
        let cat = sample();

        assert_eq!(cat.item_type('P').unwrap().name(), "Part");
        assert!(cat.item_type('X').is_none());
        assert_eq!(cat.category(65).unwrap().name(), "Town");
        assert!(cat.category(1).is_none());
        assert_eq!(cat.color(5).unwrap().name(), "Red");
        assert_eq!(cat.color_by_name("black").unwrap().id(), 11);
        assert_eq!(cat.color_by_ldraw_id(4).unwrap().id(), 5);
        assert!(cat.color_by_ldraw_id(-1).is_none());
        assert_eq!(cat.category_by_name("BRICK").unwrap().id(), 5);

        let item = cat.item('P', "3003").unwrap();
        assert_eq!(item.name(), "Brick 2 x 2");
        assert_eq!(cat.item_by_index(item.index()).unwrap().id(), "3003");
        assert!(cat.item('P', "9999").is_none());
        assert!(cat.item('S', "3001").is_none());
    }

    #[test]
    fn test_dense_indices() {
        let cat = sample();

        // Colors sorted by id: 5 (Red), 11 (Black)
        assert_eq!(cat.color(5).unwrap().index(), 0);
        assert_eq!(cat.color(11).unwrap().index(), 1);

        for (pos, item) in cat.items().iter().enumerate() {
            assert_eq!(item.index() as usize, pos);
        }
        assert_eq!(cat.items_of_type('P').len(), 2);
        assert_eq!(cat.items_of_type('S').len(), 1);
        assert!(cat.items_of_type('M').is_empty());
    }

    #[test]
    fn test_consists_of_resolves() {
        let cat = sample();
        let set = cat.item('S', "6000-1").unwrap();

        let bom = cat.consists_of(set);
        assert_eq!(bom.len(), 3);
        assert_eq!(bom[0].quantity, 4);
        assert_eq!(bom[0].item.id(), "3001");
        assert_eq!(bom[0].color.name(), "Red");
        assert!(bom[2].alternate);
        assert_eq!(bom[2].alt_id, 1);

        // Memoized decode gives the same answer
        assert_eq!(cat.consists_of(set).len(), 3);

        let brick = cat.item('P', "3001").unwrap();
        assert!(cat.consists_of(brick).is_empty());
    }

    #[test]
    fn test_appears_in_reverse_index() {
        let cat = sample();
        let part = cat.item('P', "3003").unwrap();

        let all = cat.appears_in(part, None);
        // The alternate does not count as an appearance
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].item.id(), "6000-1");
        assert_eq!(all[0].quantity, 2);
        assert_eq!(all[0].color.name(), "Black");

        let red = cat.color(5).unwrap();
        assert!(cat.appears_in(part, Some(red)).is_empty());
    }

    #[test]
    fn test_resolve_foreign_item() {
        let cat = sample();
        let foreign = Item::new('P', "3001", "copy");
        let own = cat.resolve(&foreign).unwrap();
        assert_eq!(own.name(), "Brick 2 x 4");

        assert!(cat.resolve(&Item::new('P', "nope", "")).is_none());
        assert!(cat.consists_of(&Item::new('P', "nope", "")).is_empty());
    }

    #[test]
    fn test_rejects_unsorted_items() {
        let mut tables = sample().tables().clone();
        tables.items.swap(0, 1);
        assert!(matches!(
            Catalog::from_tables(tables),
            Err(EngineError::Corrupt(_))
        ));
    }

    #[test]
    fn test_rejects_dangling_record() {
        let mut tables = sample().tables().clone();
        tables.consists_of[0] =
            ConsistsOfRecord::encode(&ConsistsOf::new(1, 999, 0)).unwrap();
        assert!(matches!(
            Catalog::from_tables(tables),
            Err(EngineError::Corrupt(_))
        ));
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.items, 3);
        assert_eq!(stats.consists_of_edges, 3);
        assert_eq!(stats.packed_bytes, 3 * 8 + stats.appears_in_words * 4);
    }
}

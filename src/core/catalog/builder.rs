//! Catalog table construction
//!
//! Used by import tooling (and tests) to turn readable records into the
//! sorted, index-addressed, packed tables a [`Catalog`] is made of. The
//! appears-in reverse index is derived here from the consists-of lists.

use super::packed::{AppearsInRecord, ConsistsOf, ConsistsOfRecord};
use super::types::{Category, Color, Item, ItemType, PackedSpan};
use super::{Catalog, CatalogTables};
use crate::error::{EngineError, Result};
use ahash::AHashMap;
use std::collections::BTreeMap;

/// One bill-of-materials line addressed by textual ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomPart {
    pub quantity: u16,
    pub item_type: char,
    pub item_id: String,
    pub color_id: u32,
    pub extra: bool,
    pub alternate: bool,
    pub alt_id: u8,
    pub counterpart: bool,
}

impl BomPart {
    pub fn new(quantity: u16, item_type: char, item_id: impl Into<String>, color_id: u32) -> Self {
        BomPart {
            quantity,
            item_type,
            item_id: item_id.into(),
            color_id,
            extra: false,
            alternate: false,
            alt_id: 0,
            counterpart: false,
        }
    }

    pub fn extra(mut self) -> Self {
        self.extra = true;
        self
    }

    pub fn alternate(mut self, alt_id: u8) -> Self {
        self.alternate = true;
        self.alt_id = alt_id;
        self
    }

    pub fn counterpart(mut self) -> Self {
        self.counterpart = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    info: String,
    item_types: Vec<ItemType>,
    categories: Vec<Category>,
    colors: Vec<Color>,
    items: Vec<Item>,
    consists_of: Vec<(char, String, Vec<BomPart>)>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn item_type(mut self, item_type: ItemType) -> Self {
        self.item_types.push(item_type);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.colors.push(color);
        self
    }

    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Set the bill of materials of item `(item_type, item_id)`
    pub fn consists_of(
        mut self,
        item_type: char,
        item_id: impl Into<String>,
        parts: Vec<BomPart>,
    ) -> Self {
        self.consists_of.push((item_type, item_id.into(), parts));
        self
    }

    pub fn build(self) -> Result<Catalog> {
        Catalog::from_tables(self.into_tables()?)
    }

    /// Sort, index and pack everything into snapshot tables
    pub fn into_tables(self) -> Result<CatalogTables> {
        let CatalogBuilder {
            info,
            mut item_types,
            mut categories,
            mut colors,
            mut items,
            consists_of,
        } = self;

        item_types.sort_by_key(|t| t.id);
        if let Some(w) = item_types.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(EngineError::Corrupt(format!(
                "duplicate item type '{}'",
                w[0].id
            )));
        }

        categories.sort_by_key(|c| c.id);

        colors.sort_by_key(|c| c.id);
        let mut color_index = AHashMap::with_capacity(colors.len());
        for (pos, color) in colors.iter_mut().enumerate() {
            color.index = pos as u32;
            color_index.insert(color.id, pos as u32);
        }

        items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        if let Some(w) = items.windows(2).find(|w| w[0].sort_key() == w[1].sort_key()) {
            return Err(EngineError::Corrupt(format!(
                "duplicate item {}/{}",
                w[0].item_type, w[0].id
            )));
        }
        for (pos, item) in items.iter_mut().enumerate() {
            item.index = pos as u32;
            item.consists_of = PackedSpan::default();
            item.appears_in = PackedSpan::default();
        }

        let find_item = |item_type: char, id: &str| -> Result<u32> {
            items
                .binary_search_by(|i| i.sort_key().cmp(&(item_type, id)))
                .map(|pos| pos as u32)
                .map_err(|_| EngineError::UnknownReference(format!("item {}/{}", item_type, id)))
        };

        // Resolve every list before touching the arena
        let mut resolved: BTreeMap<u32, Vec<ConsistsOf>> = BTreeMap::new();
        for (item_type, item_id, parts) in &consists_of {
            let parent = find_item(*item_type, item_id)?;
            let mut entries = Vec::with_capacity(parts.len());
            for part in parts {
                let color = *color_index.get(&part.color_id).ok_or_else(|| {
                    EngineError::UnknownReference(format!(
                        "color {} in inventory of {}/{}",
                        part.color_id, item_type, item_id
                    ))
                })?;
                entries.push(ConsistsOf {
                    quantity: part.quantity,
                    item: find_item(part.item_type, &part.item_id)?,
                    color,
                    extra: part.extra,
                    alternate: part.alternate,
                    alt_id: part.alt_id,
                    counterpart: part.counterpart,
                });
            }
            resolved.insert(parent, entries);
        }

        let mut consists_arena = Vec::new();
        // child -> color -> parent -> quantity
        let mut reverse: BTreeMap<u32, BTreeMap<u32, BTreeMap<u32, u32>>> = BTreeMap::new();

        for (&parent, entries) in &resolved {
            let offset = consists_arena.len() as u32;
            for entry in entries {
                consists_arena.push(ConsistsOfRecord::encode(entry)?);

                if !entry.alternate {
                    *reverse
                        .entry(entry.item)
                        .or_default()
                        .entry(entry.color)
                        .or_default()
                        .entry(parent)
                        .or_default() += entry.quantity as u32;
                }
            }
            items[parent as usize].consists_of = PackedSpan {
                offset,
                len: entries.len() as u32,
            };
        }

        let mut appears_arena = Vec::new();
        for (&child, by_color) in &reverse {
            let offset = appears_arena.len() as u32;
            for (&color, parents) in by_color {
                appears_arena.push(AppearsInRecord::header(color, parents.len() as u32)?.bits());
                for (&parent, &qty) in parents {
                    appears_arena.push(AppearsInRecord::entry(qty, parent)?.bits());
                }
            }
            items[child as usize].appears_in = PackedSpan {
                offset,
                len: appears_arena.len() as u32 - offset,
            };
        }

        Ok(CatalogTables {
            info,
            item_types,
            categories,
            colors,
            items,
            consists_of: consists_arena,
            appears_in: appears_arena,
        })
    }
}

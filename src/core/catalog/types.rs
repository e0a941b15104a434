//! Catalog record types
//!
//! All records are immutable once a [`Catalog`](super::Catalog) is built.
//! Cross references are stored as ids or dense indices, never pointers, so
//! the tables can be written to and read from a snapshot verbatim.

use serde::{Deserialize, Serialize};

/// Item type (part, set, minifig, ...), identified by a single character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub(crate) id: char,
    pub(crate) picture_id: char,
    pub(crate) name: String,
    pub(crate) has_inventories: bool,
    pub(crate) has_colors: bool,
    pub(crate) has_weight: bool,
    pub(crate) has_year: bool,
    pub(crate) has_subconditions: bool,
    pub(crate) categories: Vec<u32>,
}

impl ItemType {
    pub fn new(id: char, name: impl Into<String>) -> Self {
        ItemType {
            id,
            picture_id: id,
            name: name.into(),
            has_inventories: false,
            has_colors: false,
            has_weight: false,
            has_year: false,
            has_subconditions: false,
            categories: Vec::new(),
        }
    }

    pub fn with_picture_id(mut self, picture_id: char) -> Self {
        self.picture_id = picture_id;
        self
    }

    pub fn with_inventories(mut self, yes: bool) -> Self {
        self.has_inventories = yes;
        self
    }

    pub fn with_colors(mut self, yes: bool) -> Self {
        self.has_colors = yes;
        self
    }

    pub fn with_weight(mut self, yes: bool) -> Self {
        self.has_weight = yes;
        self
    }

    pub fn with_year(mut self, yes: bool) -> Self {
        self.has_year = yes;
        self
    }

    pub fn with_subconditions(mut self, yes: bool) -> Self {
        self.has_subconditions = yes;
        self
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = u32>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    pub fn id(&self) -> char {
        self.id
    }

    /// Character used in picture URLs (differs from `id` for a few types)
    pub fn picture_id(&self) -> char {
        self.picture_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with spaces replaced, as used by the marketplace API
    pub fn api_name(&self) -> String {
        self.name.replace(' ', "_")
    }

    pub fn has_inventories(&self) -> bool {
        self.has_inventories
    }

    pub fn has_colors(&self) -> bool {
        self.has_colors
    }

    pub fn has_weight(&self) -> bool {
        self.has_weight
    }

    pub fn has_year_released(&self) -> bool {
        self.has_year
    }

    pub fn has_subconditions(&self) -> bool {
        self.has_subconditions
    }

    /// Ids of the categories used by items of this type
    pub fn category_ids(&self) -> &[u32] {
        &self.categories
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub(crate) id: u32,
    pub(crate) name: String,
}

impl Category {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Category {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Color finish flags
///
/// Stored as a bit set; unknown bits are masked off on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorType(u16);

impl ColorType {
    pub const SOLID: ColorType = ColorType(0x0001);
    pub const TRANSPARENT: ColorType = ColorType(0x0002);
    pub const GLITTER: ColorType = ColorType(0x0004);
    pub const SPECKLE: ColorType = ColorType(0x0008);
    pub const METALLIC: ColorType = ColorType(0x0010);
    pub const CHROME: ColorType = ColorType(0x0020);
    pub const PEARL: ColorType = ColorType(0x0040);
    pub const MILKY: ColorType = ColorType(0x0080);
    pub const MODULEX: ColorType = ColorType(0x0100);

    const MASK: u16 = 0x01ff;

    pub fn from_bits(bits: u16) -> Self {
        ColorType(bits & Self::MASK)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, other: ColorType) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn union(self, other: ColorType) -> Self {
        ColorType(self.0 | other.0)
    }

    /// Display name of a single flag
    pub fn name(self) -> &'static str {
        match self {
            ColorType::SOLID => "Solid",
            ColorType::TRANSPARENT => "Transparent",
            ColorType::GLITTER => "Glitter",
            ColorType::SPECKLE => "Speckle",
            ColorType::METALLIC => "Metallic",
            ColorType::CHROME => "Chrome",
            ColorType::PEARL => "Pearl",
            ColorType::MILKY => "Milky",
            ColorType::MODULEX => "Modulex",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub(crate) id: u32,
    /// Dense position in the color table, assigned at build time
    pub(crate) index: u32,
    pub(crate) name: String,
    pub(crate) ldraw_id: i32,
    pub(crate) rgb: u32,
    pub(crate) color_type: ColorType,
    pub(crate) popularity: f32,
    pub(crate) year_from: u16,
    pub(crate) year_to: u16,
}

impl Color {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Color {
            id,
            index: 0,
            name: name.into(),
            ldraw_id: -1,
            rgb: 0,
            color_type: ColorType::SOLID,
            popularity: 0.0,
            year_from: 0,
            year_to: 0,
        }
    }

    pub fn with_ldraw_id(mut self, ldraw_id: i32) -> Self {
        self.ldraw_id = ldraw_id;
        self
    }

    pub fn with_rgb(mut self, rgb: u32) -> Self {
        self.rgb = rgb & 0x00ff_ffff;
        self
    }

    pub fn with_type(mut self, color_type: ColorType) -> Self {
        self.color_type = color_type;
        self
    }

    pub fn with_popularity(mut self, popularity: f32) -> Self {
        self.popularity = popularity;
        self
    }

    pub fn with_years(mut self, from: u16, to: u16) -> Self {
        self.year_from = from;
        self.year_to = to;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// LDraw color id, or -1 when the color has no LDraw equivalent
    pub fn ldraw_id(&self) -> i32 {
        self.ldraw_id
    }

    /// 0xRRGGBB
    pub fn rgb(&self) -> u32 {
        self.rgb
    }

    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    pub fn is_solid(&self) -> bool {
        self.color_type.contains(ColorType::SOLID)
    }

    pub fn is_transparent(&self) -> bool {
        self.color_type.contains(ColorType::TRANSPARENT)
    }

    pub fn is_glitter(&self) -> bool {
        self.color_type.contains(ColorType::GLITTER)
    }

    pub fn is_speckle(&self) -> bool {
        self.color_type.contains(ColorType::SPECKLE)
    }

    pub fn is_metallic(&self) -> bool {
        self.color_type.contains(ColorType::METALLIC)
    }

    pub fn is_chrome(&self) -> bool {
        self.color_type.contains(ColorType::CHROME)
    }

    pub fn is_pearl(&self) -> bool {
        self.color_type.contains(ColorType::PEARL)
    }

    pub fn is_milky(&self) -> bool {
        self.color_type.contains(ColorType::MILKY)
    }

    pub fn is_modulex(&self) -> bool {
        self.color_type.contains(ColorType::MODULEX)
    }

    /// Relative popularity in `0.0..=1.0`; negative values read as 0
    pub fn popularity(&self) -> f32 {
        self.popularity.max(0.0)
    }

    pub fn year_from(&self) -> u16 {
        self.year_from
    }

    pub fn year_to(&self) -> u16 {
        self.year_to
    }
}

/// Offset/length pair into one of the packed relation arenas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedSpan {
    pub offset: u32,
    pub len: u32,
}

impl PackedSpan {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn end(&self) -> u64 {
        self.offset as u64 + self.len as u64
    }

    pub(crate) fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.len as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) item_type: char,
    pub(crate) categories: Vec<u32>,
    pub(crate) default_color: Option<u32>,
    pub(crate) weight: f32,
    /// Release year, 0 when unknown
    pub(crate) year: u16,
    /// Unix seconds of the last inventory change, if the item has one
    pub(crate) last_inventory_update: Option<i64>,
    /// Dense position in the item table, assigned at build time
    pub(crate) index: u32,
    pub(crate) consists_of: PackedSpan,
    pub(crate) appears_in: PackedSpan,
}

impl Item {
    pub fn new(item_type: char, id: impl Into<String>, name: impl Into<String>) -> Self {
        Item {
            id: id.into(),
            name: name.into(),
            item_type,
            categories: Vec::new(),
            default_color: None,
            weight: 0.0,
            year: 0,
            last_inventory_update: None,
            index: 0,
            consists_of: PackedSpan::default(),
            appears_in: PackedSpan::default(),
        }
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = u32>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    pub fn with_default_color(mut self, color_id: u32) -> Self {
        self.default_color = Some(color_id);
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = year;
        self
    }

    pub fn with_inventory_update(mut self, unix_secs: i64) -> Self {
        self.last_inventory_update = Some(unix_secs);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_type_id(&self) -> char {
        self.item_type
    }

    /// Primary category id
    pub fn category_id(&self) -> Option<u32> {
        self.categories.first().copied()
    }

    pub fn category_ids(&self) -> &[u32] {
        &self.categories
    }

    pub fn has_category(&self, category_id: u32) -> bool {
        self.categories.contains(&category_id)
    }

    pub fn default_color_id(&self) -> Option<u32> {
        self.default_color
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn year_released(&self) -> Option<u16> {
        (self.year != 0).then_some(self.year)
    }

    pub fn has_inventory(&self) -> bool {
        self.last_inventory_update.is_some()
    }

    pub fn inventory_updated(&self) -> Option<i64> {
        self.last_inventory_update
    }

    /// Position in the item table of the current database generation
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn sort_key(&self) -> (char, &str) {
        (self.item_type, self.id.as_str())
    }
}

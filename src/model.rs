//! Normalized menu model and batch result types.
//!
//! This is the stable output schema: whatever shape the upstream payload
//! takes, consumers only ever see these types. Everything derives both
//! `Serialize` and `Deserialize` so a menu round-trips through the cache
//! unchanged.

use serde::{Deserialize, Serialize};

/// Geographic point used to localize the upstream request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single orderable item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    /// Empty string when the upstream omits it.
    pub description: String,
    pub price: f64,
}

/// A named group of items within a menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuCategory {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub menu_items: Vec<MenuItem>,
}

/// One of a vendor's menus (most vendors have exactly one).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Menu {
    pub id: i64,
    pub menu_categories: Vec<MenuCategory>,
}

/// The normalized menu document for one vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorMenu {
    pub name: String,
    pub code: String,
    pub web_path: String,
    pub menus: Vec<Menu>,
}

/// One entry in a batch response: either a full menu or an inline error
/// descriptor for that vendor code. Serialized untagged so successes keep
/// the plain menu shape on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum BatchEntry {
    Menu(VendorMenu),
    Error { code: String, error: String },
}

impl BatchEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

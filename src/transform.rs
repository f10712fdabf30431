//! Raw upstream payload decoding and normalization.
//!
//! The upstream schema is uncontrolled and unversioned, so decoding is
//! lenient by default: every "missing field → default" decision is made
//! here, once, in the raw types — missing `description` becomes `""`,
//! any collection that is absent or not a sequence becomes empty, and a
//! nested element that fails to decode is dropped rather than failing the
//! whole payload. The transform fails only when the mandatory identity
//! fields (chain name, vendor code, web path) are absent.

use crate::error::ScrapeError;
use crate::model::{Menu, MenuCategory, MenuItem, VendorMenu};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize a sequence leniently: a missing or non-array value becomes
/// an empty vec, and elements that fail to decode are skipped.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    data: Option<RawVendor>,
}

#[derive(Debug, Deserialize)]
struct RawVendor {
    code: Option<String>,
    web_path: Option<String>,
    chain: Option<RawChain>,
    #[serde(default, deserialize_with = "lenient_seq")]
    menus: Vec<RawMenu>,
}

#[derive(Debug, Deserialize)]
struct RawChain {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMenu {
    #[serde(default)]
    id: i64,
    #[serde(default, deserialize_with = "lenient_seq")]
    menu_categories: Vec<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_seq")]
    products: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    display_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_seq")]
    product_variations: Vec<RawVariation>,
}

#[derive(Debug, Deserialize)]
struct RawVariation {
    #[serde(default)]
    price: Option<f64>,
}

impl RawProduct {
    /// Price precedence: explicit display price, else the first listed
    /// variation's price, else zero.
    fn resolved_price(&self) -> f64 {
        self.display_price
            .or_else(|| self.product_variations.first().and_then(|v| v.price))
            .unwrap_or(0.0)
    }
}

/// Normalize a raw upstream payload into a [`VendorMenu`].
///
/// Deterministic and idempotent: the same input value always produces an
/// identical output.
pub fn vendor_menu(payload: &Value) -> Result<VendorMenu, ScrapeError> {
    let envelope: RawEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| ScrapeError::Transform(format!("unreadable payload envelope: {e}")))?;

    let vendor = envelope
        .data
        .ok_or_else(|| ScrapeError::Transform("response missing 'data' field".into()))?;

    let name = vendor
        .chain
        .and_then(|c| c.name)
        .ok_or_else(|| ScrapeError::Transform("vendor missing chain name".into()))?;
    let code = vendor
        .code
        .ok_or_else(|| ScrapeError::Transform("vendor missing code".into()))?;
    let web_path = vendor
        .web_path
        .ok_or_else(|| ScrapeError::Transform("vendor missing web_path".into()))?;

    let menus = vendor
        .menus
        .into_iter()
        .map(|menu| Menu {
            id: menu.id,
            menu_categories: menu
                .menu_categories
                .into_iter()
                .map(|category| MenuCategory {
                    id: category.id,
                    name: category.name,
                    description: category.description.unwrap_or_default(),
                    menu_items: category
                        .products
                        .into_iter()
                        .map(|product| MenuItem {
                            price: product.resolved_price(),
                            id: product.id,
                            name: product.name,
                            description: product.description.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(VendorMenu {
        name,
        code,
        web_path,
        menus,
    })
}

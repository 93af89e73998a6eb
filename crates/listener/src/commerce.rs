//! Commerce product-update payloads.
//!
//! The platform sends numeric ids alongside a global id
//! (`admin_graphql_api_id`), and tags as one comma-separated string. Older
//! deliveries and test fixtures sometimes carry tags as an array, so both are
//! accepted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use league::{InventoryPolicy, ProductId, ProductSnapshot, VariantId, VariantSnapshot};
use serde::Deserialize;

use crate::IntakeError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Tags {
    Joined(String),
    List(Vec<String>),
}

impl Default for Tags {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Tags {
    fn into_set(self) -> BTreeSet<String> {
        let raw: Vec<String> = match self {
            Self::Joined(s) => s.split(',').map(str::to_string).collect(),
            Self::List(v) => v,
        };
        raw.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct VariantPayload {
    id: u64,
    #[serde(default)]
    admin_graphql_api_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    inventory_quantity: i64,
    #[serde(default)]
    inventory_policy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductPayload {
    id: u64,
    #[serde(default)]
    admin_graphql_api_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    variants: Vec<VariantPayload>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Prefers the global id and falls back to the numeric one.
fn reference(global: Option<String>, numeric: u64) -> String {
    global
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| numeric.to_string())
}

fn policy(raw: Option<&str>) -> InventoryPolicy {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("continue") => InventoryPolicy::Continue,
        _ => InventoryPolicy::Deny,
    }
}

/// Decodes a product-update webhook body into a [`ProductSnapshot`].
pub fn decode_product_update(body: &[u8]) -> Result<ProductSnapshot, IntakeError> {
    let payload: ProductPayload = serde_json::from_slice(body).map_err(IntakeError::unparseable)?;

    let id = ProductId::new(reference(payload.admin_graphql_api_id, payload.id))
        .ok_or_else(|| IntakeError::unparseable("product id is empty"))?;

    let variants = payload
        .variants
        .into_iter()
        .map(|v| {
            let id = VariantId::new(reference(v.admin_graphql_api_id, v.id))
                .ok_or_else(|| IntakeError::unparseable("variant id is empty"))?;
            Ok(VariantSnapshot {
                id,
                title: v.title,
                inventory_quantity: v.inventory_quantity,
                inventory_policy: policy(v.inventory_policy.as_deref()),
            })
        })
        .collect::<Result<Vec<_>, IntakeError>>()?;

    Ok(ProductSnapshot {
        id,
        title: payload.title,
        tags: payload.tags.into_set(),
        variants,
        published_at: payload.published_at,
        updated_at: payload.updated_at,
    })
}

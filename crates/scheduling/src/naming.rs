//! Deterministic trigger names.
//!
//! A trigger's name is derived only from what it schedules, so submitting the
//! same request twice targets the same names and replaces the earlier triggers
//! instead of adding new ones.
//!
//! The distinguishing suffix (`-tier-<n>`) is never truncated. Catalog ids too
//! long to fit are shortened and tagged with a digest of the full id, so two
//! different ids never share a name.

use league::{ProductId, TriggerName, VariantId};
use sha2::{Digest, Sha256};

/// Longest name the facility accepts.
pub const MAX_TRIGGER_NAME_LEN: usize = 64;

/// Hex characters of the id digest appended to shortened ids.
const DIGEST_LEN: usize = 10;

/// Name of the trigger for price tier `tier` of `product`:
/// `price-<product>-tier-<tier>`.
pub fn price_trigger_name(product: &ProductId, tier: u32) -> Option<TriggerName> {
    bounded_name("price-", product.short(), &format!("-tier-{tier}"))
}

/// Name of the go-live trigger moving inventory from `source` to
/// `destination`: `inventory-<source>-to-<destination>`.
pub fn inventory_trigger_name(source: &VariantId, destination: &VariantId) -> Option<TriggerName> {
    let key = format!("{}-to-{}", source.short(), destination.short());
    bounded_name("inventory-", &key, "")
}

/// Joins `prefix`, the sanitized `key`, and `suffix` within
/// [`MAX_TRIGGER_NAME_LEN`].
///
/// Returns `None` when even a shortened key cannot fit.
fn bounded_name(prefix: &str, key: &str, suffix: &str) -> Option<TriggerName> {
    let clean = sanitize(key);
    let fixed = prefix.len() + suffix.len();

    if fixed + clean.len() <= MAX_TRIGGER_NAME_LEN {
        return TriggerName::new(format!("{prefix}{clean}{suffix}"));
    }

    // `-` plus the digest
    let room = MAX_TRIGGER_NAME_LEN.checked_sub(fixed + 1 + DIGEST_LEN)?;
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let head = clean[..room].trim_end_matches('-');
    let shortened = if head.is_empty() {
        digest[..DIGEST_LEN].to_string()
    } else {
        format!("{head}-{}", &digest[..DIGEST_LEN])
    };
    TriggerName::new(format!("{prefix}{shortened}{suffix}"))
}

/// Restricts `raw` to the facility's name alphabet (`[A-Za-z0-9-_.]`).
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

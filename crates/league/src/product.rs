//! Sold-out evaluation of product-update webhooks.
//!
//! [`ProductStateEvaluator::evaluate`] makes a stateless decision per delivery:
//!
//! 1. Products tagged as waitlist-only need nothing further.
//! 2. Only *relevant* variants count: registration tiers whose title mentions
//!    an inclusion keyword and no exclusion keyword.
//! 3. Any relevant variant with stock left means the product is not sold out.
//! 4. Otherwise the product is sold out, and the result carries the directives
//!    a caller needs to notify staff and swap in the sport's sold-out image.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{ProductId, VariantId, BUSINESS_TZ};

/// Tag that marks a product as accepting waitlist registrations only.
pub const WAITLIST_ONLY_TAG: &str = "waitlist-only";

/// Title keywords that make a variant count toward sold-out determination.
pub const INCLUSION_KEYWORDS: &[&str] = &["vet", "bipoc", "trans", "early", "open"];

/// Title keywords that exclude a variant even when an inclusion keyword matches.
pub const EXCLUSION_KEYWORDS: &[&str] = &["wait", "team"];

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// What the store does when a variant's inventory reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryPolicy {
    /// Stop selling.
    Deny,
    /// Keep selling into negative inventory.
    Continue,
}

/// One variant as delivered in a product-update webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    /// Variant id.
    pub id: VariantId,
    /// Variant title (e.g. `"Veteran Registration"`).
    pub title: String,
    /// Units available; negative when oversold.
    pub inventory_quantity: i64,
    /// Out-of-stock behaviour.
    pub inventory_policy: InventoryPolicy,
}

/// A product as delivered in a product-update webhook.
///
/// Reconstructed per delivery and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product id.
    pub id: ProductId,
    /// Product title.
    pub title: String,
    /// Product tags.
    pub tags: BTreeSet<String>,
    /// Variants in catalog order.
    pub variants: Vec<VariantSnapshot>,
    /// When the product was published, if it is.
    pub published_at: Option<DateTime<Utc>>,
    /// When the product was last modified.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProductSnapshot {
    /// Returns `true` if any tag carries the waitlist-only marker.
    pub fn is_waitlist_only(&self) -> bool {
        self.tags
            .iter()
            .any(|t| t.to_lowercase().contains(WAITLIST_ONLY_TAG))
    }
}

impl VariantSnapshot {
    /// Returns `true` if this variant counts toward sold-out determination.
    pub fn is_relevant(&self) -> bool {
        let title = self.title.to_lowercase();
        INCLUSION_KEYWORDS.iter().any(|k| title.contains(k))
            && !EXCLUSION_KEYWORDS.iter().any(|k| title.contains(k))
    }
}

// ---------------------------------------------------------------------------
// Sports
// ---------------------------------------------------------------------------

/// Sports the league sells products for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    /// Dodgeball leagues.
    Dodgeball,
    /// Kickball leagues.
    Kickball,
    /// Pickleball leagues.
    Pickleball,
    /// Bowling leagues.
    Bowling,
}

impl Sport {
    /// All sports, in detection order.
    pub const ALL: [Sport; 4] = [
        Sport::Dodgeball,
        Sport::Kickball,
        Sport::Pickleball,
        Sport::Bowling,
    ];

    /// Lowercase name matched against titles and tags.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Dodgeball => "dodgeball",
            Self::Kickball => "kickball",
            Self::Pickleball => "pickleball",
            Self::Bowling => "bowling",
        }
    }

    /// Detects the sport from the product title, falling back to tags.
    pub fn detect(product: &ProductSnapshot) -> Option<Self> {
        let title = product.title.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|s| title.contains(s.keyword()))
            .or_else(|| {
                let tags: Vec<String> = product.tags.iter().map(|t| t.to_lowercase()).collect();
                Self::ALL
                    .into_iter()
                    .find(|s| tags.iter().any(|t| t.contains(s.keyword())))
            })
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why an evaluation reached its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    /// The product already accepts waitlist registrations only.
    AlreadyWaitlisted,
    /// No variant counts toward sold-out determination.
    NoRelevantVariants,
    /// At least one relevant variant still has stock.
    ProductNotSoldOut,
    /// Every relevant variant is at or below zero.
    ProductSoldOut,
}

/// A follow-up the caller should perform for a sold-out product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequiredAction {
    /// Tell staff the product sold out.
    NotifySoldOut,
    /// Replace the product image with the sport's sold-out artwork.
    SwapImage {
        /// Image reference to install.
        image: String,
    },
}

/// Everything a caller needs to act on a sold-out product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldOutDirectives {
    /// Detected sport, if any keyword matched.
    pub sport: Option<Sport>,
    /// Sold-out image for the sport, if one is configured.
    pub sold_out_image: Option<String>,
    /// Admin URL of the product.
    pub product_url: String,
    /// Product title, for display.
    pub product_title: String,
    /// Last-updated time formatted for display.
    pub updated_display: Option<String>,
    /// Relevant variants that were checked.
    pub relevant_variants: Vec<VariantId>,
}

impl SoldOutDirectives {
    /// The follow-up actions implied by these directives.
    pub fn actions(&self) -> Vec<RequiredAction> {
        let mut actions = vec![RequiredAction::NotifySoldOut];
        if let Some(image) = &self.sold_out_image {
            actions.push(RequiredAction::SwapImage {
                image: image.clone(),
            });
        }
        actions
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether any follow-up is required.
    pub action_needed: bool,
    /// Why.
    pub reason: EvaluationReason,
    /// Present only when `reason` is [`EvaluationReason::ProductSoldOut`].
    pub directives: Option<SoldOutDirectives>,
}

impl Evaluation {
    fn no_action(reason: EvaluationReason) -> Self {
        Self {
            action_needed: false,
            reason,
            directives: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Configuration for [`ProductStateEvaluator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Base URL of the commerce admin (e.g. `https://admin.shopify.com/store/my-store`).
    pub admin_base_url: String,
    /// Sold-out image reference per sport.
    pub sold_out_images: BTreeMap<Sport, String>,
    /// Timezone used for display timestamps.
    pub display_timezone: Tz,
}

impl EvaluatorConfig {
    /// Creates a configuration with the default image references.
    pub fn new(admin_base_url: impl Into<String>) -> Self {
        let sold_out_images = Sport::ALL
            .into_iter()
            .map(|s| (s, format!("sold-out/{}.png", s.keyword())))
            .collect();
        Self {
            admin_base_url: admin_base_url.into(),
            sold_out_images,
            display_timezone: BUSINESS_TZ,
        }
    }
}

/// Decides what, if anything, a product update requires.
#[derive(Debug, Clone)]
pub struct ProductStateEvaluator {
    config: EvaluatorConfig,
}

impl ProductStateEvaluator {
    /// Creates an evaluator.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Evaluates one product snapshot.
    pub fn evaluate(&self, product: &ProductSnapshot) -> Evaluation {
        if product.is_waitlist_only() {
            tracing::debug!(product = %product.id, "Product already waitlist-only");
            return Evaluation::no_action(EvaluationReason::AlreadyWaitlisted);
        }

        let relevant: Vec<&VariantSnapshot> =
            product.variants.iter().filter(|v| v.is_relevant()).collect();
        if relevant.is_empty() {
            tracing::debug!(product = %product.id, "No relevant variants to evaluate");
            return Evaluation::no_action(EvaluationReason::NoRelevantVariants);
        }

        if relevant.iter().any(|v| v.inventory_quantity > 0) {
            return Evaluation::no_action(EvaluationReason::ProductNotSoldOut);
        }

        let sport = Sport::detect(product);
        let directives = SoldOutDirectives {
            sport,
            sold_out_image: sport.and_then(|s| self.config.sold_out_images.get(&s).cloned()),
            product_url: self.product_url(&product.id),
            product_title: product.title.clone(),
            updated_display: product.updated_at.map(|t| self.display_time(t)),
            relevant_variants: relevant.iter().map(|v| v.id.clone()).collect(),
        };
        tracing::info!(
            product = %product.id,
            sport = ?sport,
            relevant = directives.relevant_variants.len(),
            "Product sold out"
        );

        Evaluation {
            action_needed: true,
            reason: EvaluationReason::ProductSoldOut,
            directives: Some(directives),
        }
    }

    fn product_url(&self, id: &ProductId) -> String {
        format!(
            "{}/products/{}",
            self.config.admin_base_url.trim_end_matches('/'),
            id.short()
        )
    }

    fn display_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.config.display_timezone)
            .format("%B %-d, %Y at %-I:%M %p %Z")
            .to_string()
    }
}

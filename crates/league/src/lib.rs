//! Core domain for season scheduling and webhook evaluation.
//!
//! This crate contains every domain concept used by the league services: the
//! newtype identifiers, the price schedule calculator, the trigger model and the
//! port to the external trigger facility, the sold-out evaluator, and webhook
//! signature verification. Infrastructure crates implement the traits defined
//! here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`ProductId`, `TriggerName`, etc.) |
//! | [`types`] | Shared value types (`Price`, `Environment`) and timezone helpers |
//! | [`errors`] | Per-component error enums and the retry policy |
//! | [`schedule`] | Date parsing, price decay, request validation, `ScheduleCalculator` |
//! | [`triggers`] | `ScheduledTrigger`, the facility wire form, the `TriggerFacility` port |
//! | [`product`] | Product snapshots and `ProductStateEvaluator` |
//! | [`signature`] | Webhook envelopes, secret resolution, `SignatureVerifier` |

pub mod errors;
pub mod identifiers;
pub mod product;
pub mod schedule;
pub mod signature;
pub mod triggers;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{
    FacilityError, FieldProblem, LeagueError, RetryPolicy, ScheduleError, VerificationError,
};
pub use identifiers::{
    ActionId, ConfirmationId, ProductId, RequestId, SecretIdentity, TriggerGroup, TriggerName,
    VariantId,
};
pub use product::{
    Evaluation, EvaluationReason, EvaluatorConfig, InventoryPolicy, ProductSnapshot,
    ProductStateEvaluator, RequiredAction, SoldOutDirectives, Sport, VariantSnapshot,
};
pub use schedule::request::{InventoryMoveRequest, PriceScheduleRequest, ValidatedPriceSchedule};
pub use schedule::{
    InventoryMoveEvent, LinearDecay, PriceDecay, PriceEvent, ScheduleCalculator, SeasonParameters,
    TableDecay, DEFAULT_MAX_TIERS,
};
pub use signature::{
    NamedSecret, Provider, SecretResolver, SecretValue, SignatureVerifier, Verified,
    WebhookEnvelope,
};
pub use triggers::{
    default_safety_offset, InstalledTrigger, ScheduledTrigger, TriggerExpression,
    TriggerFacility, TriggerLifecycle, TriggerSpec, TriggerTarget,
};
pub use types::{localize, Environment, Price, BUSINESS_TZ};

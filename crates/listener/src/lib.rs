//! Inbound webhook intake.
//!
//! Every delivery follows the same path: build a [`league::WebhookEnvelope`]
//! from the raw body and headers, verify its signature, and only then decode
//! the body. Commerce product updates continue into
//! [`league::ProductStateEvaluator`]; chat requests are decoded into a
//! [`ChatRequest`] for the caller to act on.
//!
//! | Provider | Scheme | Body | Module |
//! |----------|--------|------|--------|
//! | Commerce | body-keyed HMAC, base64 | product JSON | [`commerce`] |
//! | Chat | timestamp-keyed HMAC, `v0=` hex | form-encoded or JSON | [`chat`] |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Wire formats and header handling live here. The
//! [`league`] crate sees only decoded [`league::ProductSnapshot`]s.

pub mod chat;
pub mod commerce;
pub mod errors;
pub mod intake;

pub use chat::{decode_chat_request, ChatRequest};
pub use commerce::decode_product_update;
pub use errors::IntakeError;
pub use intake::{ChatDelivery, ProductDecision, WebhookIntake};

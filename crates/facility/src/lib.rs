//! Timed-trigger facility infrastructure adapters.
//!
//! Implements the [`league::TriggerFacility`] port twice:
//!
//! - [`HttpTriggerFacility`] talks to the external scheduling facility over
//!   HTTP with a bearer credential held in a [`CachedCredential`].
//! - [`InMemoryTriggerFacility`] keeps triggers in process. It enforces the
//!   same name-uniqueness rule as the real facility and can fire due triggers,
//!   which makes it the facility of choice for tests and for local runs that
//!   have no facility URL configured.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response parsing,
//! and status-code classification live here. The [`league`] crate sees only
//! [`league::TriggerFacility`].

pub mod credential;
pub mod http;
pub mod memory;

pub use credential::{CachedCredential, CredentialError, CredentialSource, EnvCredential, FacilityToken, StaticCredential};
pub use http::{HttpFacilityConfig, HttpTriggerFacility};
pub use memory::InMemoryTriggerFacility;

//! Trigger registration and season scheduling orchestration.
//!
//! [`TriggerRegistrar`] owns every interaction with the external trigger
//! facility: idempotent upserts (delete-if-exists, then create), cancellation,
//! lookup, and bounded-concurrency batch installs that attribute each failure
//! to the event that caused it. [`SchedulingOrchestrator`] composes the
//! registrar with [`league::ScheduleCalculator`] to turn a validated request
//! into a set of installed triggers and a [`ScheduleResponse`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** This crate sequences calls between business logic
//! in the [`league`] crate and the [`league::TriggerFacility`] port. It
//! contains no domain rules of its own.

pub mod naming;
pub mod orchestrator;
pub mod registrar;

pub use naming::{inventory_trigger_name, price_trigger_name, MAX_TRIGGER_NAME_LEN};
pub use orchestrator::{
    FailureReport, RetiredTrigger, RetirementFailure, ScheduleResponse, ScheduledEntry,
    SchedulingOrchestrator, TriggerRouting,
};
pub use registrar::{
    BatchOutcome, CommittedTrigger, RegistrarConfig, TriggerInstallFailure, TriggerRegistrar,
};

//! Season scheduling: validate, compute, install, report.
//!
//! A request is validated in full before any facility call. The computed
//! events become triggers with deterministic names and are installed as one
//! batch; the [`ScheduleResponse`] lists every event and, when some failed,
//! exactly which ones and why.
//!
//! A price schedule owns every tier name of its product up to the tier limit.
//! Tiers a resubmission no longer produces are cancelled before the new
//! batch is installed, so a shorter season never leaves an older tier behind.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use league::{
    ActionId, ConfirmationId, FieldProblem, InventoryMoveRequest, Price, PriceScheduleRequest,
    ProductId, RequestId, RetryPolicy, ScheduleCalculator, ScheduleError, ScheduledTrigger,
    TriggerExpression, TriggerGroup, TriggerLifecycle, TriggerName, TriggerTarget,
};
use serde::Serialize;
use serde_json::json;
use tracing::Instrument;

use crate::naming::{inventory_trigger_name, price_trigger_name};
use crate::registrar::{BatchOutcome, TriggerInstallFailure, TriggerRegistrar};

/// Where each kind of scheduled event is installed and what it invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRouting {
    /// Group holding price-change triggers.
    pub price_group: TriggerGroup,
    /// Downstream action that applies a price.
    pub price_action: ActionId,
    /// Group holding inventory-move triggers.
    pub inventory_group: TriggerGroup,
    /// Downstream action that moves inventory.
    pub inventory_action: ActionId,
}

// ---------------------------------------------------------------------------
// Response wire shape
// ---------------------------------------------------------------------------

/// One event of a schedule, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEntry {
    /// Position in the schedule, earliest first.
    pub index: usize,
    /// Trigger name.
    pub name: TriggerName,
    /// Intended fire instant.
    pub fire_at: DateTime<Tz>,
    /// Expression sent to the facility.
    pub expression: TriggerExpression,
    /// Price tier, for price events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<u32>,
    /// New price, for price events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    /// Spots moved, for inventory events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Facility confirmation; absent when this event failed to install.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<ConfirmationId>,
    /// `Pending` once installed, `Failed` otherwise.
    pub lifecycle: TriggerLifecycle,
}

/// One event that failed to install.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// Position of the failed event in the schedule.
    pub index: usize,
    /// Trigger name.
    pub name: TriggerName,
    /// Intended fire instant.
    pub fire_at: DateTime<Tz>,
    /// Failure description.
    pub error: String,
    /// Whether resubmitting unchanged may succeed.
    pub retryable: bool,
}

impl From<&TriggerInstallFailure> for FailureReport {
    fn from(f: &TriggerInstallFailure) -> Self {
        Self {
            index: f.index,
            name: f.name.clone(),
            fire_at: f.fire_at,
            error: f.error.to_string(),
            retryable: matches!(f.error.retry_policy(), RetryPolicy::Retryable { .. }),
        }
    }
}

/// A trigger from an earlier submission that the new schedule dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetiredTrigger {
    /// Trigger name.
    pub name: TriggerName,
    /// Always `Cancelled`.
    pub lifecycle: TriggerLifecycle,
}

/// A stale trigger that could not be cancelled and may still fire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementFailure {
    pub name: TriggerName,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of a scheduling request.
///
/// Serializes as `{"status":"scheduled","schedule":[...]}` or
/// `{"status":"partial_failure","schedule":[...],"failures":[...]}`. Either
/// form carries `retired` when stale tiers were cancelled; the partial form
/// carries `retirementFailures` when some could not be.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleResponse {
    /// Every event was installed and every stale tier retired.
    Scheduled {
        /// The full schedule.
        schedule: Vec<ScheduledEntry>,
        /// Stale triggers cancelled by this submission.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        retired: Vec<RetiredTrigger>,
    },
    /// At least one event failed to install or one stale tier survived.
    PartialFailure {
        /// The full schedule; failed entries carry no confirmation id.
        schedule: Vec<ScheduledEntry>,
        /// The failed events.
        failures: Vec<FailureReport>,
        /// Stale triggers cancelled by this submission.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        retired: Vec<RetiredTrigger>,
        /// Stale triggers still installed.
        #[serde(rename = "retirementFailures", skip_serializing_if = "Vec::is_empty")]
        retirement_failures: Vec<RetirementFailure>,
    },
}

impl ScheduleResponse {
    /// The computed schedule.
    pub fn schedule(&self) -> &[ScheduledEntry] {
        match self {
            Self::Scheduled { schedule, .. } | Self::PartialFailure { schedule, .. } => schedule,
        }
    }

    /// The failed events; empty when everything was installed.
    pub fn failures(&self) -> &[FailureReport] {
        match self {
            Self::Scheduled { .. } => &[],
            Self::PartialFailure { failures, .. } => failures,
        }
    }

    /// Stale triggers this submission cancelled.
    pub fn retired(&self) -> &[RetiredTrigger] {
        match self {
            Self::Scheduled { retired, .. } | Self::PartialFailure { retired, .. } => retired,
        }
    }

    /// Stale triggers that could not be cancelled.
    pub fn retirement_failures(&self) -> &[RetirementFailure] {
        match self {
            Self::Scheduled { .. } => &[],
            Self::PartialFailure {
                retirement_failures, ..
            } => retirement_failures,
        }
    }

    /// Returns `true` when every event was installed.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Scheduled { .. })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Composes the schedule calculator and the trigger registrar.
#[derive(Debug, Clone)]
pub struct SchedulingOrchestrator {
    calculator: ScheduleCalculator,
    registrar: TriggerRegistrar,
    routing: TriggerRouting,
}

impl SchedulingOrchestrator {
    /// Creates an orchestrator.
    pub fn new(calculator: ScheduleCalculator, registrar: TriggerRegistrar, routing: TriggerRouting) -> Self {
        Self {
            calculator,
            registrar,
            routing,
        }
    }

    /// The registrar, for direct cancel and lookup.
    pub fn registrar(&self) -> &TriggerRegistrar {
        &self.registrar
    }

    /// Trigger groups and actions in use.
    pub fn routing(&self) -> &TriggerRouting {
        &self.routing
    }

    /// Validates `request`, computes its price schedule as of `now`, and
    /// installs one trigger per price event.
    ///
    /// Tier names from the event count up to the calculator's tier limit are
    /// cancelled first. Invalid input fails before any facility call. Install
    /// and cancellation failures do not fail the call; they are listed in the
    /// returned response.
    pub async fn schedule_price_changes(
        &self,
        request: &PriceScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<ScheduleResponse, ScheduleError> {
        let request_id = RequestId::new_random();
        let span = tracing::info_span!(
            "schedule_price_changes",
            %request_id,
            product = %request.product_ref
        );
        async move {
            let tz = self.calculator.timezone();
            let validated = request.validate(tz, now.with_timezone(&tz))?;
            let events = self.calculator.compute(&validated.season, now.with_timezone(&tz));
            tracing::info!(events = events.len(), "Computed price schedule");

            let variants = [validated.open_variant.to_string(), validated.waitlist_variant.to_string()];
            let mut triggers = Vec::with_capacity(events.len());
            for event in &events {
                let name = price_trigger_name(&validated.product, event.tier)
                    .ok_or_else(|| invalid("productRef", "cannot derive a trigger name"))?;
                let payload = json!({
                    "product": validated.product,
                    "variants": variants,
                    "price": event.price,
                    "tier": event.tier,
                });
                triggers.push(ScheduledTrigger::pending(
                    name,
                    self.routing.price_group.clone(),
                    event.fire_at,
                    TriggerTarget {
                        action: self.routing.price_action.clone(),
                        payload,
                    },
                ));
            }

            let produced = u32::try_from(events.len()).unwrap_or(u32::MAX);
            let (retired, retirement_failures) = self.retire_stale_tiers(&validated.product, produced).await;

            let outcome = self.registrar.upsert_batch(&triggers).await;
            let response = self.respond(&mut triggers, &outcome, retired, retirement_failures, |index| {
                let event = &events[index];
                (Some(event.tier), Some(event.price), None)
            });
            Ok::<_, ScheduleError>(response)
        }
        .instrument(span)
        .await
    }

    /// Validates `request` and installs its single go-live trigger.
    ///
    /// The response's only entry echoes the trigger expression and, on
    /// success, the facility confirmation id.
    pub async fn schedule_inventory_move(
        &self,
        request: &InventoryMoveRequest,
        now: DateTime<Utc>,
    ) -> Result<ScheduleResponse, ScheduleError> {
        let request_id = RequestId::new_random();
        let span = tracing::info_span!(
            "schedule_inventory_move",
            %request_id,
            source = %request.source_variant,
            destination = %request.destination_variant
        );
        async move {
            let tz = self.calculator.timezone();
            let event = request.validate(tz, now.with_timezone(&tz))?;

            let name = inventory_trigger_name(&event.source_variant, &event.destination_variant)
                .ok_or_else(|| invalid("sourceVariant", "cannot derive a trigger name"))?;
            let trigger = ScheduledTrigger::pending(
                name,
                self.routing.inventory_group.clone(),
                event.fire_at,
                TriggerTarget {
                    action: self.routing.inventory_action.clone(),
                    payload: json!({
                        "sourceVariant": event.source_variant,
                        "destinationVariant": event.destination_variant,
                        "quantity": event.quantity,
                    }),
                },
            );

            let mut triggers = [trigger];
            let outcome = self.registrar.upsert_batch(&triggers).await;
            Ok::<_, ScheduleError>(self.respond(&mut triggers, &outcome, Vec::new(), Vec::new(), |_| {
                (None, None, Some(event.quantity))
            }))
        }
        .instrument(span)
        .await
    }

    /// Cancels the tiers of `product` from `produced` up to the tier limit.
    async fn retire_stale_tiers(
        &self,
        product: &ProductId,
        produced: u32,
    ) -> (Vec<RetiredTrigger>, Vec<RetirementFailure>) {
        let stale: Vec<TriggerName> = (produced..self.calculator.max_tiers())
            .filter_map(|tier| price_trigger_name(product, tier))
            .collect();
        if stale.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let mut retired = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in self.registrar.cancel_batch(&stale, &self.routing.price_group).await {
            match result {
                Ok(true) => retired.push(RetiredTrigger {
                    name,
                    lifecycle: TriggerLifecycle::Cancelled,
                }),
                Ok(false) => {}
                Err(error) => failures.push(RetirementFailure {
                    name,
                    retryable: matches!(error.retry_policy(), RetryPolicy::Retryable { .. }),
                    error: error.to_string(),
                }),
            }
        }
        if !retired.is_empty() {
            tracing::info!(retired = retired.len(), "Retired stale price tiers");
        }
        (retired, failures)
    }

    fn respond(
        &self,
        triggers: &mut [ScheduledTrigger],
        outcome: &BatchOutcome,
        retired: Vec<RetiredTrigger>,
        retirement_failures: Vec<RetirementFailure>,
        details: impl Fn(usize) -> (Option<u32>, Option<Price>, Option<u32>),
    ) -> ScheduleResponse {
        let config = self.registrar.config();
        for failure in &outcome.failures {
            if let Some(trigger) = triggers.get_mut(failure.index) {
                trigger.lifecycle = TriggerLifecycle::Failed;
            }
        }
        let schedule = triggers
            .iter()
            .enumerate()
            .map(|(index, trigger)| {
                let committed = outcome
                    .committed
                    .iter()
                    .find(|(i, _)| *i == index)
                    .map(|(_, c)| c);
                let (tier, price, quantity) = details(index);
                ScheduledEntry {
                    index,
                    name: trigger.name.clone(),
                    fire_at: trigger.fire_at,
                    expression: committed.map(|c| c.expression.clone()).unwrap_or_else(|| {
                        TriggerExpression::at(trigger.fire_at, config.timezone, config.safety_offset)
                    }),
                    tier,
                    price,
                    quantity,
                    confirmation_id: committed.map(|c| c.confirmation_id.clone()),
                    lifecycle: trigger.lifecycle,
                }
            })
            .collect();

        if outcome.is_complete() && retirement_failures.is_empty() {
            ScheduleResponse::Scheduled { schedule, retired }
        } else {
            ScheduleResponse::PartialFailure {
                schedule,
                failures: outcome.failures.iter().map(FailureReport::from).collect(),
                retired,
                retirement_failures,
            }
        }
    }
}

fn invalid(field: &str, message: &str) -> ScheduleError {
    ScheduleError::InvalidScheduleInput {
        problems: vec![FieldProblem::new(field, message)],
    }
}

//! Scheduled triggers and the port to the external timed-trigger facility.
//!
//! A [`ScheduledTrigger`] is the domain view: a named, grouped instant that
//! invokes one downstream action. A [`TriggerSpec`] is what is actually sent to
//! the facility: the same trigger rendered into the facility's `at(...)`
//! expression syntax in a single fixed timezone.
//!
//! The facility forbids changing a trigger's time in place, so the only
//! mutating operations on [`TriggerFacility`] are `create` and `delete`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{localize, ActionId, ConfirmationId, FacilityError, TriggerGroup, TriggerName};

const EXPRESSION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Offset applied to every fire time so the downstream action runs at, or
/// just before, the intended instant despite facility dispatch latency.
pub fn default_safety_offset() -> Duration {
    Duration::minutes(1)
}

// ---------------------------------------------------------------------------
// Domain view
// ---------------------------------------------------------------------------

/// Lifecycle of a scheduled trigger as observed by this service.
///
/// The orchestrator marks entries it could not install as `Failed` and tiers
/// it retired as `Cancelled`; facilities report `Pending` for installed
/// triggers and `Fired` for spent ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerLifecycle {
    /// Installed and waiting to fire.
    Pending,
    /// Fired; the facility deletes spent triggers automatically.
    Fired,
    /// Removed before firing.
    Cancelled,
    /// Could not be installed.
    Failed,
}

/// The downstream action a trigger invokes, with its opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerTarget {
    /// Downstream action identifier.
    pub action: ActionId,
    /// Action input, delivered verbatim when the trigger fires.
    pub payload: serde_json::Value,
}

/// A named, time-fired invocation of one downstream action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTrigger {
    /// Unique key within `group`.
    pub name: TriggerName,
    /// Trigger namespace.
    pub group: TriggerGroup,
    /// Intended fire instant.
    pub fire_at: DateTime<Tz>,
    /// What runs when the trigger fires.
    pub target: TriggerTarget,
    /// Current lifecycle state.
    pub lifecycle: TriggerLifecycle,
}

impl ScheduledTrigger {
    /// Creates a pending trigger.
    pub fn pending(
        name: TriggerName,
        group: TriggerGroup,
        fire_at: DateTime<Tz>,
        target: TriggerTarget,
    ) -> Self {
        Self {
            name,
            group,
            fire_at,
            target,
            lifecycle: TriggerLifecycle::Pending,
        }
    }

    /// Renders this trigger into the facility's wire form.
    ///
    /// `fire_at` is converted to `timezone` after subtracting `safety_offset`.
    /// Spent triggers are always configured to delete themselves.
    pub fn to_spec(&self, timezone: Tz, safety_offset: Duration) -> TriggerSpec {
        TriggerSpec {
            name: self.name.clone(),
            group: self.group.clone(),
            expression: TriggerExpression::at(self.fire_at, timezone, safety_offset),
            timezone,
            target: self.target.clone(),
            delete_after_completion: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Facility wire form
// ---------------------------------------------------------------------------

/// A one-time schedule expression, e.g. `at(2026-11-05T18:59:00)`.
///
/// The timestamp carries no offset; the facility interprets it in the
/// timezone sent alongside it in [`TriggerSpec::timezone`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerExpression(String);

impl TriggerExpression {
    /// Builds the expression for `fire_at - safety_offset` in `timezone`.
    pub fn at(fire_at: DateTime<Tz>, timezone: Tz, safety_offset: Duration) -> Self {
        let local = (fire_at - safety_offset).with_timezone(&timezone);
        Self(format!("at({})", local.format(EXPRESSION_FORMAT)))
    }

    /// Accepts an expression read back from the facility.
    ///
    /// Returns `None` unless the text is a well-formed `at(...)` expression.
    pub fn parse(text: &str) -> Option<Self> {
        Self::local_time(text)?;
        Some(Self(text.to_string()))
    }

    /// The instant this expression fires at when evaluated in `timezone`.
    pub fn fire_instant(&self, timezone: Tz) -> Option<DateTime<Tz>> {
        let local = Self::local_time(&self.0)?;
        localize(timezone, local.date(), local.time())
    }

    fn local_time(text: &str) -> Option<NaiveDateTime> {
        let inner = text.strip_prefix("at(")?.strip_suffix(')')?;
        NaiveDateTime::parse_from_str(inner, EXPRESSION_FORMAT).ok()
    }

    /// Returns the expression text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TriggerExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the facility needs to create one trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Unique key within `group`.
    pub name: TriggerName,
    /// Trigger namespace.
    pub group: TriggerGroup,
    /// One-time `at(...)` expression.
    pub expression: TriggerExpression,
    /// Timezone the expression is evaluated in.
    pub timezone: Tz,
    /// What runs when the trigger fires.
    pub target: TriggerTarget,
    /// Whether the facility removes the trigger once it has fired.
    pub delete_after_completion: bool,
}

/// A trigger as currently installed in the facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledTrigger {
    /// The installed definition.
    pub spec: TriggerSpec,
    /// Facility-assigned identifier.
    pub confirmation_id: ConfirmationId,
    /// `Pending` until the trigger fires.
    pub lifecycle: TriggerLifecycle,
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// The external time-triggered execution facility.
///
/// Implementations perform network I/O and must bound every call with a
/// finite timeout, reporting expiry as [`FacilityError::Timeout`]. Name
/// uniqueness within a group is enforced by the facility itself: `create` on
/// an existing name fails with [`FacilityError::Conflict`].
#[async_trait]
pub trait TriggerFacility: Send + Sync {
    /// Returns the installed trigger, or `None` if no trigger has that name.
    async fn get(
        &self,
        group: &TriggerGroup,
        name: &TriggerName,
    ) -> Result<Option<InstalledTrigger>, FacilityError>;

    /// Creates a trigger. Fails with [`FacilityError::Conflict`] if the name
    /// is already taken in the group.
    async fn create(&self, spec: &TriggerSpec) -> Result<ConfirmationId, FacilityError>;

    /// Deletes a trigger. Returns `false` if it did not exist.
    async fn delete(&self, group: &TriggerGroup, name: &TriggerName) -> Result<bool, FacilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BUSINESS_TZ;
    use chrono::TimeZone;

    fn fire_at() -> DateTime<Tz> {
        BUSINESS_TZ.with_ymd_and_hms(2026, 11, 5, 19, 0, 0).unwrap()
    }

    #[test]
    fn expression_applies_safety_offset_in_target_timezone() {
        let expr = TriggerExpression::at(fire_at(), BUSINESS_TZ, default_safety_offset());
        assert_eq!(expr.as_str(), "at(2026-11-05T18:59:00)");

        let utc_expr = TriggerExpression::at(fire_at(), Tz::UTC, default_safety_offset());
        assert_eq!(utc_expr.as_str(), "at(2026-11-05T23:59:00)");
    }

    #[test]
    fn expressions_read_back_to_the_offset_instant() {
        let expr = TriggerExpression::at(fire_at(), BUSINESS_TZ, default_safety_offset());
        let parsed = TriggerExpression::parse(expr.as_str()).unwrap();
        assert_eq!(
            parsed.fire_instant(BUSINESS_TZ),
            Some(fire_at() - default_safety_offset())
        );

        assert!(TriggerExpression::parse("cron(0 19 * * ? *)").is_none());
        assert!(TriggerExpression::parse("at(2026-11-05 18:59)").is_none());
    }

    #[test]
    fn specs_always_delete_after_completion() {
        let trigger = ScheduledTrigger::pending(
            TriggerName::new("price-1-tier-0").unwrap(),
            TriggerGroup::new("price-changes").unwrap(),
            fire_at(),
            TriggerTarget {
                action: ActionId::new("update-price").unwrap(),
                payload: serde_json::json!({ "price": "120.00" }),
            },
        );
        let spec = trigger.to_spec(BUSINESS_TZ, default_safety_offset());
        assert!(spec.delete_after_completion);
        assert_eq!(spec.timezone, BUSINESS_TZ);
        assert_eq!(trigger.lifecycle, TriggerLifecycle::Pending);
    }
}

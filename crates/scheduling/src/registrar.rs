//! Idempotent registration of scheduled triggers.
//!
//! The facility forbids changing a trigger's fire time in place, so every
//! upsert deletes any trigger already holding the name and then creates the new
//! one. Re-submitting a trigger therefore moves it rather than duplicating it.
//!
//! Every facility call runs under a finite timeout. Batch installs run upserts
//! concurrently up to a configured limit and report every failure, tagged with
//! the index of the trigger that caused it; nothing is retried silently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use league::{
    default_safety_offset, ConfirmationId, FacilityError, InstalledTrigger, ScheduledTrigger,
    TriggerExpression, TriggerFacility, TriggerGroup, TriggerName, BUSINESS_TZ,
};
use serde::Serialize;
use thiserror::Error;

/// Registrar settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrarConfig {
    /// Timezone trigger expressions are rendered in.
    pub timezone: Tz,
    /// Subtracted from every fire time before rendering.
    pub safety_offset: chrono::Duration,
    /// Upper bound on each facility call.
    pub call_timeout: Duration,
    /// Maximum concurrent upserts in one batch.
    pub concurrency: usize,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            timezone: BUSINESS_TZ,
            safety_offset: default_safety_offset(),
            call_timeout: Duration::from_secs(10),
            concurrency: 4,
        }
    }
}

/// A trigger the facility accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedTrigger {
    /// Trigger name.
    pub name: TriggerName,
    /// Trigger group.
    pub group: TriggerGroup,
    /// Intended fire instant.
    pub fire_at: DateTime<Tz>,
    /// Expression as sent to the facility.
    pub expression: TriggerExpression,
    /// Identifier the facility assigned.
    pub confirmation_id: ConfirmationId,
}

/// One trigger that could not be installed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to install trigger '{name}' in group '{group}': {error}")]
pub struct TriggerInstallFailure {
    /// Position of the trigger in the submitted batch.
    pub index: usize,
    /// Trigger name.
    pub name: TriggerName,
    /// Trigger group.
    pub group: TriggerGroup,
    /// Intended fire instant.
    pub fire_at: DateTime<Tz>,
    /// What the facility reported.
    #[source]
    pub error: FacilityError,
}

/// Result of [`TriggerRegistrar::upsert_batch`].
///
/// Both lists are ordered by batch index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Installed triggers with their batch index.
    pub committed: Vec<(usize, CommittedTrigger)>,
    /// Triggers that failed to install.
    pub failures: Vec<TriggerInstallFailure>,
}

impl BatchOutcome {
    /// Returns `true` when every trigger in the batch was installed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Creates, replaces, cancels, and looks up triggers in the external facility.
#[derive(Clone)]
pub struct TriggerRegistrar {
    facility: Arc<dyn TriggerFacility>,
    config: RegistrarConfig,
}

impl std::fmt::Debug for TriggerRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistrar")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TriggerRegistrar {
    /// Creates a registrar over `facility`.
    pub fn new(facility: Arc<dyn TriggerFacility>, config: RegistrarConfig) -> Self {
        Self { facility, config }
    }

    /// The registrar's settings.
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Installs `trigger`, replacing any trigger already holding its name.
    #[tracing::instrument(skip_all, fields(name = %trigger.name, group = %trigger.group))]
    pub async fn upsert(&self, trigger: &ScheduledTrigger) -> Result<CommittedTrigger, TriggerInstallFailure> {
        self.upsert_at(0, trigger).await
    }

    /// Removes the trigger `name` from `group`.
    ///
    /// Returns `false` if no such trigger existed (already fired or never
    /// installed).
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, name: &TriggerName, group: &TriggerGroup) -> Result<bool, FacilityError> {
        let removed = self.bounded(self.facility.delete(group, name)).await?;
        tracing::info!(removed, "Trigger cancellation processed");
        Ok(removed)
    }

    /// Returns the installed trigger `name` in `group`, if any.
    #[tracing::instrument(skip(self))]
    pub async fn describe(
        &self,
        name: &TriggerName,
        group: &TriggerGroup,
    ) -> Result<Option<InstalledTrigger>, FacilityError> {
        self.bounded(self.facility.get(group, name)).await
    }

    /// Upserts every trigger, at most `concurrency` at a time.
    ///
    /// Failures do not stop the batch; each is reported with the index of the
    /// trigger it belongs to.
    #[tracing::instrument(skip_all, fields(count = triggers.len()))]
    pub async fn upsert_batch(&self, triggers: &[ScheduledTrigger]) -> BatchOutcome {
        let limit = self.config.concurrency.max(1);
        let results: Vec<(usize, Result<CommittedTrigger, TriggerInstallFailure>)> =
            stream::iter(triggers.iter().enumerate())
                .map(|(index, trigger)| async move { (index, self.upsert_at(index, trigger).await) })
                .buffer_unordered(limit)
                .collect()
                .await;

        let mut outcome = BatchOutcome::default();
        for (index, result) in results {
            match result {
                Ok(committed) => outcome.committed.push((index, committed)),
                Err(failure) => outcome.failures.push(failure),
            }
        }
        outcome.committed.sort_by_key(|(index, _)| *index);
        outcome.failures.sort_by_key(|f| f.index);

        if outcome.is_complete() {
            tracing::info!(installed = outcome.committed.len(), "Trigger batch installed");
        } else {
            tracing::warn!(
                installed = outcome.committed.len(),
                failed = outcome.failures.len(),
                "Trigger batch partially installed"
            );
        }
        outcome
    }

    /// Cancels every name in `names`, at most `concurrency` at a time.
    ///
    /// Results come back in the order of `names`; one failure does not stop
    /// the others.
    #[tracing::instrument(skip_all, fields(count = names.len(), group = %group))]
    pub async fn cancel_batch(
        &self,
        names: &[TriggerName],
        group: &TriggerGroup,
    ) -> Vec<(TriggerName, Result<bool, FacilityError>)> {
        let limit = self.config.concurrency.max(1);
        let mut results: Vec<(usize, Result<bool, FacilityError>)> = stream::iter(names.iter().enumerate())
            .map(|(index, name)| async move { (index, self.bounded(self.facility.delete(group, name)).await) })
            .buffer_unordered(limit)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let removed = results.iter().filter(|(_, r)| matches!(r, Ok(true))).count();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(removed, failed, "Trigger cancellations partially processed");
        } else {
            tracing::info!(removed, "Trigger cancellations processed");
        }

        results
            .into_iter()
            .map(|(index, result)| (names[index].clone(), result))
            .collect()
    }

    async fn upsert_at(&self, index: usize, trigger: &ScheduledTrigger) -> Result<CommittedTrigger, TriggerInstallFailure> {
        let fail = |error: FacilityError| TriggerInstallFailure {
            index,
            name: trigger.name.clone(),
            group: trigger.group.clone(),
            fire_at: trigger.fire_at,
            error,
        };

        let spec = trigger.to_spec(self.config.timezone, self.config.safety_offset);

        let replaced = self
            .bounded(self.facility.delete(&trigger.group, &trigger.name))
            .await
            .map_err(fail)?;
        if replaced {
            tracing::debug!(name = %trigger.name, "Replacing existing trigger");
        }

        let confirmation_id = self.bounded(self.facility.create(&spec)).await.map_err(|e| {
            tracing::warn!(name = %trigger.name, error = %e, "Trigger install failed");
            fail(e)
        })?;

        Ok(CommittedTrigger {
            name: spec.name,
            group: spec.group,
            fire_at: trigger.fire_at,
            expression: spec.expression,
            confirmation_id,
        })
    }

    /// Runs one facility call under the configured timeout.
    async fn bounded<T>(&self, call: impl Future<Output = Result<T, FacilityError>>) -> Result<T, FacilityError> {
        let limit = self.config.call_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(FacilityError::Timeout {
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use facility::InMemoryTriggerFacility;
    use league::{ActionId, TriggerSpec, TriggerTarget};

    fn trigger(name: &str, day: u32) -> ScheduledTrigger {
        ScheduledTrigger::pending(
            TriggerName::new(name).unwrap(),
            TriggerGroup::new("price-changes").unwrap(),
            BUSINESS_TZ.with_ymd_and_hms(2026, 10, day, 19, 0, 0).unwrap(),
            TriggerTarget {
                action: ActionId::new("update-price").unwrap(),
                payload: serde_json::json!({}),
            },
        )
    }

    /// Never answers.
    struct StalledFacility;

    #[async_trait]
    impl TriggerFacility for StalledFacility {
        async fn get(&self, _: &TriggerGroup, _: &TriggerName) -> Result<Option<InstalledTrigger>, FacilityError> {
            std::future::pending().await
        }

        async fn create(&self, _: &TriggerSpec) -> Result<ConfirmationId, FacilityError> {
            std::future::pending().await
        }

        async fn delete(&self, _: &TriggerGroup, _: &TriggerName) -> Result<bool, FacilityError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn second_upsert_moves_the_fire_time() {
        let facility = Arc::new(InMemoryTriggerFacility::new());
        let registrar = TriggerRegistrar::new(facility.clone(), RegistrarConfig::default());

        registrar.upsert(&trigger("price-1-tier-1", 22)).await.unwrap();
        let second = registrar.upsert(&trigger("price-1-tier-1", 29)).await.unwrap();

        let installed = facility.pending().await;
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].spec.expression.as_str(), "at(2026-10-29T18:59:00)");
        assert_eq!(installed[0].confirmation_id, second.confirmation_id);
    }

    #[tokio::test]
    async fn stalled_facility_times_out_with_a_typed_failure() {
        let config = RegistrarConfig {
            call_timeout: Duration::from_millis(50),
            ..RegistrarConfig::default()
        };
        let registrar = TriggerRegistrar::new(Arc::new(StalledFacility), config);

        let failure = registrar.upsert(&trigger("price-1-tier-1", 22)).await.unwrap_err();
        assert_eq!(failure.error, FacilityError::Timeout { after_ms: 50 });
        assert_eq!(failure.index, 0);

        let err = registrar
            .cancel(
                &TriggerName::new("price-1-tier-1").unwrap(),
                &TriggerGroup::new("price-changes").unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, FacilityError::Timeout { after_ms: 50 });
    }

    #[tokio::test]
    async fn cancel_and_describe_reflect_facility_state() {
        let facility = Arc::new(InMemoryTriggerFacility::new());
        let registrar = TriggerRegistrar::new(facility, RegistrarConfig::default());
        let t = trigger("inventory-41-to-42", 30);
        registrar.upsert(&t).await.unwrap();

        let found = registrar.describe(&t.name, &t.group).await.unwrap().unwrap();
        assert_eq!(found.spec.name, t.name);
        assert!(found.spec.delete_after_completion);

        assert!(registrar.cancel(&t.name, &t.group).await.unwrap());
        assert!(!registrar.cancel(&t.name, &t.group).await.unwrap());
        assert!(registrar.describe(&t.name, &t.group).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_batch_reports_each_name_in_order() {
        let facility = Arc::new(InMemoryTriggerFacility::new());
        let registrar = TriggerRegistrar::new(facility.clone(), RegistrarConfig::default());
        registrar.upsert(&trigger("price-1-tier-3", 22)).await.unwrap();
        registrar.upsert(&trigger("price-1-tier-5", 29)).await.unwrap();

        let group = TriggerGroup::new("price-changes").unwrap();
        let names: Vec<TriggerName> = (3..7)
            .map(|tier| TriggerName::new(format!("price-1-tier-{tier}")).unwrap())
            .collect();
        let results = registrar.cancel_batch(&names, &group).await;

        let removed: Vec<(&str, bool)> = results
            .iter()
            .map(|(name, result)| (name.as_str(), *result.as_ref().unwrap()))
            .collect();
        assert_eq!(
            removed,
            vec![
                ("price-1-tier-3", true),
                ("price-1-tier-4", false),
                ("price-1-tier-5", true),
                ("price-1-tier-6", false),
            ]
        );
        assert!(facility.pending().await.is_empty());
    }
}

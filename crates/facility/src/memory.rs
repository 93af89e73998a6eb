//! In-process trigger facility.
//!
//! Behaves like the external facility where it matters to callers: names are
//! unique per group (`create` on a taken name is a [`FacilityError::Conflict`]),
//! nothing is mutated in place, and triggers configured to delete themselves
//! disappear once fired.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use league::{
    ConfirmationId, FacilityError, InstalledTrigger, TriggerFacility, TriggerGroup, TriggerLifecycle,
    TriggerName, TriggerSpec,
};
use tokio::sync::Mutex;

type Key = (TriggerGroup, TriggerName);

#[derive(Debug, Default)]
struct State {
    pending: BTreeMap<Key, InstalledTrigger>,
    /// Fired triggers that were not configured to delete themselves.
    spent: BTreeMap<Key, InstalledTrigger>,
}

/// [`TriggerFacility`] held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTriggerFacility {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl InMemoryTriggerFacility {
    /// Creates an empty facility.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers waiting to fire, ordered by group then name.
    pub async fn pending(&self) -> Vec<InstalledTrigger> {
        self.state.lock().await.pending.values().cloned().collect()
    }

    /// Number of triggers waiting to fire.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Fires every pending trigger whose expression falls at or before `now`.
    ///
    /// Returns the fired triggers in fire order. Self-deleting triggers are
    /// removed; the rest are kept as spent and never fire again.
    pub async fn fire_due(&self, now: DateTime<Tz>) -> Vec<InstalledTrigger> {
        let mut state = self.state.lock().await;

        let due: Vec<(Key, DateTime<Tz>)> = state
            .pending
            .iter()
            .filter_map(|(key, t)| {
                let at = t.spec.expression.fire_instant(t.spec.timezone)?;
                (at <= now).then(|| (key.clone(), at))
            })
            .collect();

        let mut fired: Vec<(DateTime<Tz>, InstalledTrigger)> = Vec::with_capacity(due.len());
        for (key, at) in due {
            if let Some(mut trigger) = state.pending.remove(&key) {
                trigger.lifecycle = TriggerLifecycle::Fired;
                if !trigger.spec.delete_after_completion {
                    state.spent.insert(key, trigger.clone());
                }
                fired.push((at, trigger));
            }
        }
        fired.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::debug!(count = fired.len(), "Fired due triggers");
        fired.into_iter().map(|(_, t)| t).collect()
    }
}

#[async_trait]
impl TriggerFacility for InMemoryTriggerFacility {
    async fn get(
        &self,
        group: &TriggerGroup,
        name: &TriggerName,
    ) -> Result<Option<InstalledTrigger>, FacilityError> {
        let key = (group.clone(), name.clone());
        Ok(self.state.lock().await.pending.get(&key).cloned())
    }

    async fn create(&self, spec: &TriggerSpec) -> Result<ConfirmationId, FacilityError> {
        let key = (spec.group.clone(), spec.name.clone());
        let mut state = self.state.lock().await;
        if state.pending.contains_key(&key) {
            return Err(FacilityError::Conflict {
                name: spec.name.clone(),
                group: spec.group.clone(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let confirmation_id = ConfirmationId::new(format!("mem-{n}-{}", uuid::Uuid::new_v4()))
            .ok_or_else(|| FacilityError::Transport {
                message: "failed to allocate a confirmation id".to_string(),
            })?;

        state.spent.remove(&key);
        state.pending.insert(
            key,
            InstalledTrigger {
                spec: spec.clone(),
                confirmation_id: confirmation_id.clone(),
                lifecycle: TriggerLifecycle::Pending,
            },
        );
        Ok(confirmation_id)
    }

    async fn delete(&self, group: &TriggerGroup, name: &TriggerName) -> Result<bool, FacilityError> {
        let key = (group.clone(), name.clone());
        Ok(self.state.lock().await.pending.remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use league::{default_safety_offset, ActionId, ScheduledTrigger, TriggerTarget, BUSINESS_TZ};

    fn spec(name: &str, day: u32) -> TriggerSpec {
        ScheduledTrigger::pending(
            TriggerName::new(name).unwrap(),
            TriggerGroup::new("price-changes").unwrap(),
            BUSINESS_TZ.with_ymd_and_hms(2026, 10, day, 19, 0, 0).unwrap(),
            TriggerTarget {
                action: ActionId::new("update-price").unwrap(),
                payload: serde_json::json!({ "price": "100.00" }),
            },
        )
        .to_spec(BUSINESS_TZ, default_safety_offset())
    }

    #[tokio::test]
    async fn creating_a_taken_name_is_a_conflict() {
        let facility = InMemoryTriggerFacility::new();
        facility.create(&spec("price-1-tier-1", 22)).await.unwrap();

        let err = facility.create(&spec("price-1-tier-1", 29)).await.unwrap_err();
        assert!(matches!(err, FacilityError::Conflict { .. }));
        assert_eq!(facility.pending_count().await, 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let facility = InMemoryTriggerFacility::new();
        let s = spec("price-1-tier-1", 22);
        facility.create(&s).await.unwrap();

        assert!(facility.delete(&s.group, &s.name).await.unwrap());
        assert!(!facility.delete(&s.group, &s.name).await.unwrap());
        assert!(facility.get(&s.group, &s.name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn due_triggers_fire_in_order_and_delete_themselves() {
        let facility = InMemoryTriggerFacility::new();
        facility.create(&spec("price-1-tier-0", 29)).await.unwrap();
        facility.create(&spec("price-1-tier-2", 15)).await.unwrap();
        facility.create(&spec("price-1-tier-1", 22)).await.unwrap();

        // 18:59 is when the 2026-10-22 trigger fires after the safety offset.
        let now = BUSINESS_TZ.with_ymd_and_hms(2026, 10, 22, 18, 59, 0).unwrap();
        let fired = facility.fire_due(now).await;
        let names: Vec<_> = fired.iter().map(|t| t.spec.name.as_str()).collect();
        assert_eq!(names, vec!["price-1-tier-2", "price-1-tier-1"]);
        assert!(fired.iter().all(|t| t.lifecycle == TriggerLifecycle::Fired));
        assert!(facility
            .pending()
            .await
            .iter()
            .all(|t| t.lifecycle == TriggerLifecycle::Pending));

        assert_eq!(facility.pending_count().await, 1);
        assert!(facility.fire_due(now + Duration::seconds(30)).await.is_empty());
    }
}

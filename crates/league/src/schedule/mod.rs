//! Season schedule computation.
//!
//! [`ScheduleCalculator::compute`] turns [`SeasonParameters`] into the ordered
//! list of future [`PriceEvent`]s for one league product. It is a pure function
//! of its inputs and the supplied `now`; calling it twice with the same
//! arguments yields the same list.
//!
//! ## Algorithm
//!
//! Walk backward from the season start date in steps of one week. Each step
//! whose date is an off date is skipped without consuming a price tier, so the
//! week before a blackout inherits the tier the blackout would have had. Every
//! other step receives the next tier and fires on that date at the sport start
//! time. The walk stops at the first step that would fire at or before `now`,
//! or once `max_tiers` events have been produced.

pub mod dates;
pub mod decay;
pub mod request;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{localize, FieldProblem, Price, ScheduleError, VariantId};

pub use decay::{LinearDecay, PriceDecay, TableDecay};

/// Default upper bound on the number of price tiers in one schedule.
pub const DEFAULT_MAX_TIERS: u32 = 8;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Validated season inputs for one scheduling request.
///
/// The season starts on `season_start` at `sport_start_time`, local business
/// time. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonParameters {
    season_start: NaiveDate,
    off_dates: BTreeSet<NaiveDate>,
    base_price: Price,
    sport_start_time: NaiveTime,
}

impl SeasonParameters {
    /// Creates season parameters.
    ///
    /// Fails with [`ScheduleError::InvalidScheduleInput`] if an off date equals
    /// the season start date, since the season-start tier must always exist.
    pub fn new(
        season_start: NaiveDate,
        off_dates: BTreeSet<NaiveDate>,
        base_price: Price,
        sport_start_time: NaiveTime,
    ) -> Result<Self, ScheduleError> {
        if off_dates.contains(&season_start) {
            return Err(ScheduleError::InvalidScheduleInput {
                problems: vec![FieldProblem::new(
                    "offDatesCommaSeparated",
                    format!("off date {season_start} is the season start date"),
                )],
            });
        }
        Ok(Self {
            season_start,
            off_dates,
            base_price,
            sport_start_time,
        })
    }

    /// First day of the season.
    pub fn season_start(&self) -> NaiveDate {
        self.season_start
    }

    /// Dates excluded from the weekly progression.
    pub fn off_dates(&self) -> &BTreeSet<NaiveDate> {
        &self.off_dates
    }

    /// Price charged from the season-start tier onward.
    pub fn base_price(&self) -> Price {
        self.base_price
    }

    /// Local time of day every event fires at.
    pub fn sport_start_time(&self) -> NaiveTime {
        self.sport_start_time
    }
}

/// One scheduled price change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceEvent {
    /// Instant the new price takes effect, in the business timezone.
    pub fire_at: DateTime<Tz>,
    /// Price from `fire_at` onward.
    pub price: Price,
    /// Tier index: `0` is the season-start week, higher is earlier.
    pub tier: u32,
}

/// A one-off release of held inventory from one variant to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryMoveEvent {
    /// Go-live instant.
    pub fire_at: DateTime<Tz>,
    /// Variant the spots are taken from.
    pub source_variant: VariantId,
    /// Variant the spots are released into.
    pub destination_variant: VariantId,
    /// Number of spots moved.
    pub quantity: u32,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Computes weekly price schedules.
///
/// Holds only configuration (decay policy, tier limit, timezone); safe to
/// share across threads and call concurrently.
#[derive(Debug, Clone)]
pub struct ScheduleCalculator {
    decay: Arc<dyn PriceDecay>,
    max_tiers: u32,
    timezone: Tz,
}

impl ScheduleCalculator {
    /// Creates a calculator with the given decay policy and limits.
    pub fn new(decay: Arc<dyn PriceDecay>, max_tiers: u32, timezone: Tz) -> Self {
        Self {
            decay,
            max_tiers,
            timezone,
        }
    }

    /// Timezone season dates are interpreted in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Most events a single schedule can hold.
    pub fn max_tiers(&self) -> u32 {
        self.max_tiers
    }

    /// Returns the future price events for `params`, ordered by strictly
    /// increasing `fire_at`.
    ///
    /// Events at or before `now` are never produced. The last event (if the
    /// season has not yet started) fires at the season start and carries the
    /// base price exactly.
    pub fn compute(&self, params: &SeasonParameters, now: DateTime<Tz>) -> Vec<PriceEvent> {
        let mut events = Vec::new();
        let mut tier: u32 = 0;
        let mut weeks_back: i64 = 0;

        while tier < self.max_tiers {
            let Some(date) = params
                .season_start
                .checked_sub_signed(Duration::weeks(weeks_back))
            else {
                break;
            };
            weeks_back += 1;

            let Some(fire_at) = localize(self.timezone, date, params.sport_start_time) else {
                break;
            };
            if fire_at <= now {
                break;
            }
            if params.off_dates.contains(&date) {
                tracing::debug!(%date, tier, "Skipping off date");
                continue;
            }

            events.push(PriceEvent {
                fire_at,
                price: self.decay.price_for_tier(tier, params.base_price),
                tier,
            });
            tier += 1;
        }

        events.reverse();
        events
    }
}

impl Default for ScheduleCalculator {
    fn default() -> Self {
        Self::new(
            Arc::new(LinearDecay::default()),
            DEFAULT_MAX_TIERS,
            crate::BUSINESS_TZ,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BUSINESS_TZ;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seven_pm() -> NaiveTime {
        NaiveTime::from_hms_opt(19, 0, 0).unwrap()
    }

    fn base() -> Price {
        Price::new(Decimal::new(12_000, 2)).unwrap()
    }

    fn params(start: NaiveDate, off: &[NaiveDate]) -> SeasonParameters {
        SeasonParameters::new(start, off.iter().copied().collect(), base(), seven_pm()).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        BUSINESS_TZ.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn unlimited() -> ScheduleCalculator {
        ScheduleCalculator::new(Arc::new(LinearDecay::default()), 52, BUSINESS_TZ)
    }

    #[test]
    fn empty_off_dates_yield_one_event_per_week_ending_at_season_start() {
        // Season starts Thursday 2026-11-05; now is the evening of Monday 2026-10-12.
        let start = ymd(2026, 11, 5);
        let events = unlimited().compute(&params(start, &[]), at(2026, 10, 12, 20));

        let dates: Vec<_> = events.iter().map(|e| e.fire_at.date_naive()).collect();
        assert_eq!(
            dates,
            vec![ymd(2026, 10, 15), ymd(2026, 10, 22), ymd(2026, 10, 29), start]
        );
        for pair in dates.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::weeks(1));
        }

        let last = events.last().unwrap();
        assert_eq!(last.price, base());
        assert_eq!(last.tier, 0);
        assert_eq!(last.fire_at, at(2026, 11, 5, 19));
    }

    #[test]
    fn prices_never_decrease_as_the_season_approaches() {
        let events = unlimited().compute(&params(ymd(2026, 11, 5), &[]), at(2026, 9, 1, 0));
        assert!(events.windows(2).all(|w| w[0].price <= w[1].price));
        assert!(events.windows(2).all(|w| w[0].fire_at < w[1].fire_at));
    }

    #[test]
    fn off_dates_are_skipped_without_consuming_a_tier() {
        let start = ymd(2026, 11, 5);
        let off = ymd(2026, 10, 29);
        let events = unlimited().compute(&params(start, &[off]), at(2026, 10, 12, 20));

        let dates: Vec<_> = events.iter().map(|e| e.fire_at.date_naive()).collect();
        assert_eq!(dates, vec![ymd(2026, 10, 15), ymd(2026, 10, 22), start]);
        assert!(!dates.contains(&off));

        // The week before the blackout takes tier 1, not tier 2.
        let tiers: Vec<_> = events.iter().map(|e| e.tier).collect();
        assert_eq!(tiers, vec![2, 1, 0]);
    }

    #[test]
    fn event_count_equals_future_weeks_minus_off_weeks() {
        let start = ymd(2026, 12, 3);
        let now = at(2026, 10, 19, 12);
        let all_weeks = unlimited().compute(&params(start, &[]), now).len();

        let off = [ymd(2026, 11, 26), ymd(2026, 11, 12), ymd(2027, 1, 7)];
        let with_off = unlimited().compute(&params(start, &off), now);

        // 2027-01-07 is after the season start and never on the backward walk.
        assert_eq!(with_off.len(), all_weeks - 2);
        for event in &with_off {
            assert!(!off.contains(&event.fire_at.date_naive()));
        }
    }

    #[test]
    fn events_at_or_before_now_are_never_scheduled() {
        let start = ymd(2026, 11, 5);
        // Exactly the fire time of the 2026-10-29 tier.
        let now = at(2026, 10, 29, 19);
        let events = unlimited().compute(&params(start, &[]), now);
        assert_eq!(events.len(), 1);
        assert!(events.iter().all(|e| e.fire_at > now));
    }

    #[test]
    fn season_already_started_yields_nothing() {
        let events = unlimited().compute(&params(ymd(2026, 10, 1), &[]), at(2026, 10, 19, 9));
        assert!(events.is_empty());
    }

    #[test]
    fn tier_limit_caps_the_schedule() {
        let calc = ScheduleCalculator::new(Arc::new(LinearDecay::default()), 3, BUSINESS_TZ);
        let events = calc.compute(&params(ymd(2027, 3, 4), &[]), at(2026, 10, 19, 9));
        assert_eq!(events.len(), 3);
        assert_eq!(events.last().unwrap().fire_at.date_naive(), ymd(2027, 3, 4));
    }

    #[test]
    fn local_fire_time_is_stable_across_daylight_saving_change() {
        // 2026-11-01 is the fall-back date; local time must stay 19:00.
        let events = unlimited().compute(&params(ymd(2026, 11, 12), &[]), at(2026, 10, 19, 9));
        assert!(events
            .iter()
            .all(|e| e.fire_at.time() == seven_pm()));
    }

    #[test]
    fn compute_is_deterministic_for_identical_inputs() {
        let calc = ScheduleCalculator::default();
        let p = params(ymd(2026, 11, 5), &[ymd(2026, 10, 22)]);
        let now = at(2026, 9, 20, 8);
        assert_eq!(calc.compute(&p, now), calc.compute(&p, now));
    }

    #[test]
    fn off_date_on_season_start_is_rejected() {
        let start = ymd(2026, 11, 5);
        let err = SeasonParameters::new(
            start,
            [start].into_iter().collect(),
            base(),
            seven_pm(),
        )
        .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidScheduleInput { .. }));
    }
}

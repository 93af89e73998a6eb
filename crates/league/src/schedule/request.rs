//! Wire-level scheduling requests and their aggregating validators.
//!
//! Requests arrive as JSON from an operator or a collaborator system. Each
//! `validate` method checks every field and reports all problems together in
//! one [`ScheduleError::InvalidScheduleInput`]; nothing is rejected piecemeal.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::dates::{parse_date, parse_date_list, parse_time};
use super::{InventoryMoveEvent, SeasonParameters};
use crate::{localize, FieldProblem, Price, ProductId, ScheduleError, VariantId};

// ---------------------------------------------------------------------------
// Price schedule
// ---------------------------------------------------------------------------

/// Request to install the weekly price schedule for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceScheduleRequest {
    /// First day of the season (`YYYY-MM-DD` or `M/D/YY`).
    pub season_start_date: String,
    /// Comma-joined off dates.
    #[serde(default)]
    pub off_dates_comma_separated: Option<String>,
    /// Local time the sport starts (`HH:MM:SS`).
    pub sport_start_time: String,
    /// Price charged from the season start onward.
    pub base_price: f64,
    /// Product whose variants are repriced.
    pub product_ref: String,
    /// Open-registration variant.
    pub open_variant_ref: String,
    /// Waitlist variant.
    pub waitlist_variant_ref: String,
}

/// A [`PriceScheduleRequest`] that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPriceSchedule {
    /// Product whose variants are repriced.
    pub product: ProductId,
    /// Open-registration variant.
    pub open_variant: VariantId,
    /// Waitlist variant.
    pub waitlist_variant: VariantId,
    /// Season inputs for the calculator.
    pub season: SeasonParameters,
}

impl PriceScheduleRequest {
    /// Validates every field, collecting all problems.
    ///
    /// `now` is used to reject seasons that have already started; `tz` is the
    /// timezone season dates are interpreted in.
    pub fn validate(&self, tz: Tz, now: DateTime<Tz>) -> Result<ValidatedPriceSchedule, ScheduleError> {
        let mut problems = Vec::new();

        let season_start = parse_date(&self.season_start_date)
            .map_err(|e| problems.push(FieldProblem::new("seasonStartDate", e.to_string())))
            .ok();

        let off_dates = match self.off_dates_comma_separated.as_deref() {
            None => Some(Default::default()),
            Some(raw) => parse_date_list(raw)
                .map_err(|errors| {
                    problems.extend(
                        errors
                            .into_iter()
                            .map(|e| FieldProblem::new("offDatesCommaSeparated", e.to_string())),
                    )
                })
                .ok(),
        };

        let sport_start_time = parse_time(&self.sport_start_time);
        if sport_start_time.is_none() {
            problems.push(FieldProblem::new(
                "sportStartTime",
                format!("'{}' is not a time of day (expected HH:MM:SS)", self.sport_start_time),
            ));
        }

        let base_price = Price::from_f64(self.base_price);
        if base_price.is_none() {
            problems.push(FieldProblem::new(
                "basePrice",
                format!("{} is not a non-negative amount", self.base_price),
            ));
        }

        let product = required_ref::<ProductId>(&mut problems, "productRef", &self.product_ref, ProductId::new);
        let open_variant =
            required_ref(&mut problems, "openVariantRef", &self.open_variant_ref, VariantId::new);
        let waitlist_variant = required_ref(
            &mut problems,
            "waitlistVariantRef",
            &self.waitlist_variant_ref,
            VariantId::new,
        );

        if let (Some(start), Some(off)) = (season_start, off_dates.as_ref()) {
            if off.contains(&start) {
                problems.push(FieldProblem::new(
                    "offDatesCommaSeparated",
                    format!("off date {start} is the season start date"),
                ));
            }
        }

        if let (Some(start), Some(time)) = (season_start, sport_start_time) {
            match localize(tz, start, time) {
                Some(starts_at) if starts_at <= now => problems.push(FieldProblem::new(
                    "seasonStartDate",
                    format!("season start {starts_at} is not in the future"),
                )),
                Some(_) => {}
                None => problems.push(FieldProblem::new(
                    "seasonStartDate",
                    format!("{start} {time} does not exist in {tz}"),
                )),
            }
        }

        match (season_start, off_dates, sport_start_time, base_price, product, open_variant, waitlist_variant) {
            (Some(start), Some(off), Some(time), Some(price), Some(product), Some(open), Some(waitlist))
                if problems.is_empty() =>
            {
                Ok(ValidatedPriceSchedule {
                    product,
                    open_variant: open,
                    waitlist_variant: waitlist,
                    season: SeasonParameters::new(start, off, price, time)?,
                })
            }
            _ => Err(ScheduleError::InvalidScheduleInput { problems }),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory move
// ---------------------------------------------------------------------------

/// Request to release held inventory at a go-live instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryMoveRequest {
    /// Variant holding the reserved spots.
    pub source_variant: String,
    /// Variant the spots are released into.
    pub destination_variant: String,
    /// Go-live instant, ISO 8601 in UTC.
    pub new_datetime: String,
    /// Total spots on the product.
    pub total_inventory: i64,
    /// Reserved spots to release at go-live.
    pub vet_spots_to_release: i64,
}

impl InventoryMoveRequest {
    /// Validates every field, collecting all problems, and produces the single
    /// go-live event expressed in `tz`.
    pub fn validate(&self, tz: Tz, now: DateTime<Tz>) -> Result<InventoryMoveEvent, ScheduleError> {
        let mut problems = Vec::new();

        let source = required_ref(&mut problems, "sourceVariant", &self.source_variant, VariantId::new);
        let destination = required_ref(
            &mut problems,
            "destinationVariant",
            &self.destination_variant,
            VariantId::new,
        );
        if let (Some(s), Some(d)) = (&source, &destination) {
            if s == d {
                problems.push(FieldProblem::new(
                    "destinationVariant",
                    "destination must differ from the source variant",
                ));
            }
        }

        let fire_at = match parse_utc_datetime(&self.new_datetime) {
            Some(instant) => {
                let local = instant.with_timezone(&tz);
                if local <= now {
                    problems.push(FieldProblem::new(
                        "newDatetime",
                        format!("{} is not in the future", self.new_datetime),
                    ));
                }
                Some(local)
            }
            None => {
                problems.push(FieldProblem::new(
                    "newDatetime",
                    format!("'{}' is not an ISO 8601 timestamp", self.new_datetime),
                ));
                None
            }
        };

        if self.total_inventory <= 0 {
            problems.push(FieldProblem::new("totalInventory", "must be greater than zero"));
        }
        let quantity = u32::try_from(self.vet_spots_to_release).ok().filter(|q| *q > 0);
        if quantity.is_none() {
            problems.push(FieldProblem::new("vetSpotsToRelease", "must be a positive count"));
        } else if self.vet_spots_to_release > self.total_inventory {
            problems.push(FieldProblem::new(
                "vetSpotsToRelease",
                format!(
                    "{} exceeds total inventory {}",
                    self.vet_spots_to_release, self.total_inventory
                ),
            ));
        }

        match (source, destination, fire_at, quantity) {
            (Some(source_variant), Some(destination_variant), Some(fire_at), Some(quantity))
                if problems.is_empty() =>
            {
                Ok(InventoryMoveEvent {
                    fire_at,
                    source_variant,
                    destination_variant,
                    quantity,
                })
            }
            _ => Err(ScheduleError::InvalidScheduleInput { problems }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn required_ref<T>(
    problems: &mut Vec<FieldProblem>,
    field: &str,
    value: &str,
    make: impl FnOnce(String) -> Option<T>,
) -> Option<T> {
    let id = make(value.trim().to_string());
    if id.is_none() {
        problems.push(FieldProblem::new(field, "must not be empty"));
    }
    id
}

/// Parses an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC.
fn parse_utc_datetime(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BUSINESS_TZ;
    use chrono::NaiveDate;

    fn now() -> DateTime<Tz> {
        BUSINESS_TZ.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn price_request() -> PriceScheduleRequest {
        PriceScheduleRequest {
            season_start_date: "2026-11-05".to_string(),
            off_dates_comma_separated: Some("10/29/26".to_string()),
            sport_start_time: "19:00:00".to_string(),
            base_price: 120.0,
            product_ref: "gid://shopify/Product/7350937321566".to_string(),
            open_variant_ref: "gid://shopify/ProductVariant/1".to_string(),
            waitlist_variant_ref: "gid://shopify/ProductVariant/2".to_string(),
        }
    }

    fn problem_fields(err: ScheduleError) -> Vec<String> {
        match err {
            ScheduleError::InvalidScheduleInput { problems } => {
                problems.into_iter().map(|p| p.field).collect()
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn valid_price_request_produces_season_parameters() {
        let validated = price_request().validate(BUSINESS_TZ, now()).unwrap();
        assert_eq!(validated.product.short(), "7350937321566");
        assert_eq!(
            validated.season.season_start(),
            NaiveDate::from_ymd_opt(2026, 11, 5).unwrap()
        );
        assert_eq!(validated.season.off_dates().len(), 1);
    }

    #[test]
    fn every_invalid_field_is_reported_together() {
        let mut req = price_request();
        req.season_start_date = "13/45/26".to_string();
        req.sport_start_time = "seven".to_string();
        req.base_price = -5.0;
        req.open_variant_ref = String::new();

        let fields = problem_fields(req.validate(BUSINESS_TZ, now()).unwrap_err());
        assert_eq!(
            fields,
            vec!["seasonStartDate", "sportStartTime", "basePrice", "openVariantRef"]
        );
    }

    #[test]
    fn unparseable_off_date_names_the_offending_string() {
        let mut req = price_request();
        req.off_dates_comma_separated = Some("10/29/26, thanksgiving".to_string());

        let err = req.validate(BUSINESS_TZ, now()).unwrap_err();
        assert!(err.to_string().contains("thanksgiving"));
    }

    #[test]
    fn off_date_on_season_start_is_rejected() {
        let mut req = price_request();
        req.off_dates_comma_separated = Some("11/5/26".to_string());

        let fields = problem_fields(req.validate(BUSINESS_TZ, now()).unwrap_err());
        assert_eq!(fields, vec!["offDatesCommaSeparated"]);
    }

    #[test]
    fn past_season_start_is_rejected() {
        let mut req = price_request();
        req.season_start_date = "2026-10-01".to_string();

        let fields = problem_fields(req.validate(BUSINESS_TZ, now()).unwrap_err());
        assert_eq!(fields, vec!["seasonStartDate"]);
    }

    #[test]
    fn request_deserializes_from_camel_case_json() {
        let req: PriceScheduleRequest = serde_json::from_str(
            r#"{
                "seasonStartDate": "2026-11-05",
                "sportStartTime": "19:00:00",
                "basePrice": 95,
                "productRef": "1",
                "openVariantRef": "2",
                "waitlistVariantRef": "3"
            }"#,
        )
        .unwrap();
        assert!(req.off_dates_comma_separated.is_none());
        assert!(req.validate(BUSINESS_TZ, now()).is_ok());
    }

    fn move_request() -> InventoryMoveRequest {
        InventoryMoveRequest {
            source_variant: "gid://shopify/ProductVariant/10".to_string(),
            destination_variant: "gid://shopify/ProductVariant/11".to_string(),
            new_datetime: "2026-10-28T23:00:00Z".to_string(),
            total_inventory: 60,
            vet_spots_to_release: 12,
        }
    }

    #[test]
    fn inventory_move_converts_utc_to_business_time() {
        let event = move_request().validate(BUSINESS_TZ, now()).unwrap();
        assert_eq!(event.quantity, 12);
        assert_eq!(event.fire_at.naive_local().to_string(), "2026-10-28 19:00:00");
    }

    #[test]
    fn naive_inventory_datetime_is_taken_as_utc() {
        let mut req = move_request();
        req.new_datetime = "2026-10-28T23:00:00".to_string();
        let event = req.validate(BUSINESS_TZ, now()).unwrap();
        assert_eq!(event.fire_at.naive_local().to_string(), "2026-10-28 19:00:00");
    }

    #[test]
    fn inventory_move_collects_all_problems() {
        let req = InventoryMoveRequest {
            source_variant: "10".to_string(),
            destination_variant: "10".to_string(),
            new_datetime: "tomorrow".to_string(),
            total_inventory: 0,
            vet_spots_to_release: -1,
        };
        let fields = problem_fields(req.validate(BUSINESS_TZ, now()).unwrap_err());
        assert_eq!(
            fields,
            vec!["destinationVariant", "newDatetime", "totalInventory", "vetSpotsToRelease"]
        );
    }

    #[test]
    fn releasing_more_than_total_is_rejected() {
        let mut req = move_request();
        req.vet_spots_to_release = 61;
        let fields = problem_fields(req.validate(BUSINESS_TZ, now()).unwrap_err());
        assert_eq!(fields, vec!["vetSpotsToRelease"]);
    }
}

//! Shared value types for the league domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (prices are non-negative, deployment
//! environments come from a closed set) and participate in domain computations.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A catalog price in the store currency.
///
/// Always non-negative. Arithmetic results are rounded to cents with
/// [`Price::rounded`] before they leave the domain. Serialized as a string
/// with two decimal places (`"108.00"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    /// Creates a [`Price`], returning `None` if `value` is negative.
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Creates a [`Price`] from a float as it arrives in JSON requests.
    ///
    /// Returns `None` if `value` is negative, infinite, or NaN.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_f64(value).and_then(|d| Self::new(d.normalize()))
    }

    /// A price of exactly zero.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal amount.
    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Multiplies this price by `factor`, rounding to cents.
    ///
    /// Negative factors clamp to zero.
    pub fn scaled(self, factor: Decimal) -> Self {
        let factor = factor.max(Decimal::ZERO);
        Self(self.0 * factor).rounded()
    }

    /// Rounds to two decimal places, midpoint away from zero.
    pub fn rounded(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Price::new(value).ok_or_else(|| serde::de::Error::custom("price must not be negative"))
    }
}

// ---------------------------------------------------------------------------
// Deployment environment
// ---------------------------------------------------------------------------

/// The deployment environment of the owning service.
///
/// Controls the non-production conveniences (unsigned webhooks accepted when
/// no secret is configured, in-memory trigger facility).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development.
    Development,
    /// Shared pre-production environment.
    Staging,
    /// Live store.
    Production,
}

impl Environment {
    /// Returns `true` only for [`Environment::Production`].
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the lowercase configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "unknown environment '{other}'; expected development, staging, or production"
            )),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// The timezone all season dates and sport start times are expressed in.
pub const BUSINESS_TZ: Tz = chrono_tz::America::New_York;

/// Resolves a local wall-clock date and time to an instant in `tz`.
///
/// Ambiguous times (the repeated hour when clocks fall back) resolve to the
/// earlier instant. Times inside a spring-forward gap do not exist and are
/// shifted forward by one hour.
pub fn localize(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let local: NaiveDateTime = date.and_time(time);
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::str::FromStr;

    #[test]
    fn negative_prices_are_rejected() {
        assert!(Price::new(Decimal::new(-1, 2)).is_none());
        assert!(Price::from_f64(-0.5).is_none());
        assert!(Price::from_f64(f64::NAN).is_none());
        assert_eq!(Price::from_f64(0.0), Some(Price::zero()));
    }

    #[test]
    fn scaling_rounds_to_cents() {
        let base = Price::new(Decimal::new(9999, 2)).unwrap();
        let scaled = base.scaled(Decimal::new(9, 1));
        assert_eq!(scaled.as_decimal(), Decimal::new(8999, 2));
        assert_eq!(scaled.to_string(), "89.99");
    }

    #[test]
    fn prices_serialize_with_two_decimal_places() {
        let whole = Price::from_f64(120.0).unwrap();
        assert_eq!(serde_json::to_value(whole).unwrap(), serde_json::json!("120.00"));

        let back: Price = serde_json::from_value(serde_json::json!("108.50")).unwrap();
        assert_eq!(back, Price::new(Decimal::new(10850, 2)).unwrap());
        assert!(serde_json::from_value::<Price>(serde_json::json!("-1.00")).is_err());
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!(Environment::from_str("PROD").unwrap(), Environment::Production);
        assert_eq!(Environment::from_str("dev").unwrap(), Environment::Development);
        assert!(Environment::from_str("qa").is_err());
    }

    #[test]
    fn localize_shifts_times_inside_spring_forward_gap() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let resolved = localize(BUSINESS_TZ, date, time).unwrap();
        assert_eq!(resolved.hour(), 3);
        assert_eq!(resolved.minute(), 30);
    }
}

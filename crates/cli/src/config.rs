//! Service configuration read from the process environment.
//!
//! Every setting has a default except the ones production cannot run without.
//! A `.env` file in the working directory is loaded by `main` before this
//! module reads anything.

use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use league::{
    ActionId, Environment, EvaluatorConfig, LeagueError, LinearDecay, Provider,
    ScheduleCalculator, SecretIdentity, SecretResolver, SecretValue, TriggerGroup, BUSINESS_TZ,
    DEFAULT_MAX_TIERS,
};
use scheduling::{RegistrarConfig, TriggerRouting};
use url::Url;

/// Environment variable holding the facility bearer token.
///
/// Read lazily by the credential cache, never by [`AppConfig`].
pub const FACILITY_TOKEN_VAR: &str = "LEAGUE_FACILITY_TOKEN";

const DEV_ADMIN_BASE_URL: &str = "http://localhost/admin";

/// Fully validated service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub log_level: String,
    pub admin_base_url: String,
    /// Trigger facility root; `None` selects the in-memory facility.
    pub facility_url: Option<Url>,
    pub facility_timeout: Duration,
    pub facility_concurrency: usize,
    pub trigger_timezone: Tz,
    pub routing: TriggerRouting,
    pub commerce_secrets: Vec<(SecretIdentity, SecretValue)>,
    pub chat_secrets: Vec<(SecretIdentity, SecretValue)>,
    pub max_price_tiers: u32,
    pub discount_step_percent: u32,
    pub discount_floor_percent: u32,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, LeagueError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the raw value
    /// of a variable or `None` when it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LeagueError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match var("LEAGUE_ENVIRONMENT") {
            Some(raw) => raw
                .parse::<Environment>()
                .map_err(|e| config_error(format!("LEAGUE_ENVIRONMENT: {e}")))?,
            None => Environment::Development,
        };

        let log_level = var("LEAGUE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "LEAGUE_LOG_LEVEL: '{log_level}' must be one of {valid_log_levels:?}"
            )));
        }

        let admin_base_url = match var("LEAGUE_ADMIN_BASE_URL") {
            Some(raw) => {
                Url::parse(&raw).map_err(|e| config_error(format!("LEAGUE_ADMIN_BASE_URL: {e}")))?;
                raw
            }
            None if environment.is_production() => {
                return Err(config_error("LEAGUE_ADMIN_BASE_URL is required in production"));
            }
            None => DEV_ADMIN_BASE_URL.to_string(),
        };

        let facility_url = match var("LEAGUE_FACILITY_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| config_error(format!("LEAGUE_FACILITY_URL: {e}")))?),
            None if environment.is_production() => {
                return Err(config_error("LEAGUE_FACILITY_URL is required in production"));
            }
            None => None,
        };

        let facility_timeout_secs: u64 = parse_or(&var, "LEAGUE_FACILITY_TIMEOUT_SECS", 10)?;
        if facility_timeout_secs == 0 {
            return Err(config_error("LEAGUE_FACILITY_TIMEOUT_SECS must be greater than 0"));
        }
        let facility_concurrency: usize = parse_or(&var, "LEAGUE_FACILITY_CONCURRENCY", 4)?;
        if facility_concurrency == 0 {
            return Err(config_error("LEAGUE_FACILITY_CONCURRENCY must be greater than 0"));
        }

        let trigger_timezone = match var("LEAGUE_TRIGGER_TIMEZONE") {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|e| config_error(format!("LEAGUE_TRIGGER_TIMEZONE: {e}")))?,
            None => BUSINESS_TZ,
        };

        let routing = TriggerRouting {
            price_group: id_or(&var, "LEAGUE_PRICE_GROUP", "price-changes", |s| TriggerGroup::new(s))?,
            price_action: id_or(&var, "LEAGUE_PRICE_ACTION", "update-price", |s| ActionId::new(s))?,
            inventory_group: id_or(&var, "LEAGUE_INVENTORY_GROUP", "inventory-moves", |s| TriggerGroup::new(s))?,
            inventory_action: id_or(&var, "LEAGUE_INVENTORY_ACTION", "move-inventory", |s| ActionId::new(s))?,
        };

        let commerce_secrets = parse_secrets("LEAGUE_COMMERCE_SECRETS", var("LEAGUE_COMMERCE_SECRETS"))?;
        let chat_secrets = parse_secrets("LEAGUE_CHAT_SECRETS", var("LEAGUE_CHAT_SECRETS"))?;

        let max_price_tiers: u32 = parse_or(&var, "LEAGUE_MAX_PRICE_TIERS", DEFAULT_MAX_TIERS)?;
        if max_price_tiers == 0 {
            return Err(config_error("LEAGUE_MAX_PRICE_TIERS must be greater than 0"));
        }
        let discount_step_percent: u32 = parse_or(&var, "LEAGUE_DISCOUNT_STEP_PERCENT", 10)?;
        let discount_floor_percent: u32 = parse_or(&var, "LEAGUE_DISCOUNT_FLOOR_PERCENT", 50)?;
        if LinearDecay::from_percentages(discount_step_percent, discount_floor_percent).is_none() {
            return Err(config_error(
                "LEAGUE_DISCOUNT_STEP_PERCENT and LEAGUE_DISCOUNT_FLOOR_PERCENT must be between 0 and 100",
            ));
        }

        Ok(Self {
            environment,
            log_level,
            admin_base_url,
            facility_url,
            facility_timeout: Duration::from_secs(facility_timeout_secs),
            facility_concurrency,
            trigger_timezone,
            routing,
            commerce_secrets,
            chat_secrets,
            max_price_tiers,
            discount_step_percent,
            discount_floor_percent,
        })
    }

    /// Builds the secret store for webhook verification.
    pub fn secret_resolver(&self) -> SecretResolver {
        let with_commerce = self
            .commerce_secrets
            .iter()
            .fold(SecretResolver::new(self.environment), |r, (identity, secret)| {
                r.with_secret(Provider::Commerce, identity.clone(), secret.clone())
            });
        self.chat_secrets.iter().fold(with_commerce, |r, (identity, secret)| {
            r.with_secret(Provider::Chat, identity.clone(), secret.clone())
        })
    }

    /// Builds the schedule calculator with the configured decay policy.
    pub fn calculator(&self) -> ScheduleCalculator {
        let decay = LinearDecay::from_percentages(self.discount_step_percent, self.discount_floor_percent)
            .unwrap_or_default();
        ScheduleCalculator::new(Arc::new(decay), self.max_price_tiers, BUSINESS_TZ)
    }

    /// Registrar settings derived from the facility options.
    pub fn registrar_config(&self) -> RegistrarConfig {
        RegistrarConfig {
            timezone: self.trigger_timezone,
            call_timeout: self.facility_timeout,
            concurrency: self.facility_concurrency,
            ..RegistrarConfig::default()
        }
    }

    /// Evaluator settings.
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig::new(self.admin_base_url.clone())
    }
}

fn config_error(message: impl Into<String>) -> LeagueError {
    LeagueError::ConfigurationError {
        message: message.into(),
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, LeagueError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| config_error(format!("{key}: '{raw}' is invalid: {e}"))),
        None => Ok(default),
    }
}

fn id_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
    make: fn(String) -> Option<T>,
) -> Result<T, LeagueError> {
    let raw = var(key).unwrap_or_else(|| default.to_string());
    make(raw).ok_or_else(|| config_error(format!("{key} must not be empty")))
}

/// Parses an ordered `identity=secret,identity=secret` list.
fn parse_secrets(key: &str, raw: Option<String>) -> Result<Vec<(SecretIdentity, SecretValue)>, LeagueError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (identity, secret) = entry
                .split_once('=')
                .ok_or_else(|| config_error(format!("{key}: entry without '=' separator")))?;
            let identity = SecretIdentity::new(identity.trim())
                .ok_or_else(|| config_error(format!("{key}: entry with an empty identity")))?;
            let secret = SecretValue::new(secret.trim())
                .ok_or_else(|| config_error(format!("{key}: empty secret for '{identity}'")))?;
            Ok((identity, secret))
        })
        .collect()
}

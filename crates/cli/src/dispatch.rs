//! Line-delimited JSON request loop.
//!
//! Each input line is one operation:
//!
//! ```text
//! {"op":"schedule_prices","request":{"seasonStartDate":"11/5/26", ...}}
//! {"op":"schedule_inventory_move","request":{"sourceVariant":"...", ...}}
//! {"op":"cancel_trigger","name":"price-7350937321566-tier-0","group":"price-changes"}
//! {"op":"product_webhook","headers":{"X-Shopify-Hmac-Sha256":"..."},"body":"{...}"}
//! {"op":"chat_webhook","headers":{...},"body":"command=%2Fwaitlist","identity":"registrations-bot"}
//! ```
//!
//! Each produces exactly one output line, `{"status":"ok","result":...}` or
//! `{"status":"error","kind":...,"message":...}`. A failing operation never
//! stops the loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use facility::{
    CachedCredential, EnvCredential, HttpFacilityConfig, HttpTriggerFacility, InMemoryTriggerFacility,
};
use league::{
    FacilityError, InventoryMoveRequest, PriceScheduleRequest, ProductStateEvaluator, Provider,
    ScheduleError, SecretIdentity, TriggerFacility, TriggerGroup, TriggerName, WebhookEnvelope,
};
use listener::{IntakeError, WebhookIntake};
use scheduling::{SchedulingOrchestrator, TriggerRegistrar};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{AppConfig, FACILITY_TOKEN_VAR};

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// A raw webhook delivery as handed to the service.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookDelivery {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Secret owner to verify against; all configured secrets are tried when absent.
    #[serde(default)]
    pub identity: Option<SecretIdentity>,
}

impl WebhookDelivery {
    fn envelope(&self, provider: Provider) -> WebhookEnvelope {
        WebhookEnvelope::from_parts(provider, self.body.as_bytes(), &self.headers)
    }
}

/// One request line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SchedulePrices { request: PriceScheduleRequest },
    ScheduleInventoryMove { request: InventoryMoveRequest },
    CancelTrigger { name: TriggerName, group: TriggerGroup },
    ProductWebhook(WebhookDelivery),
    ChatWebhook(WebhookDelivery),
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok {
        result: serde_json::Value,
    },
    Error {
        kind: &'static str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl Reply {
    fn ok(result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self::Ok { result },
            Err(e) => Self::error("internal", e, None),
        }
    }

    fn error(kind: &'static str, message: impl std::fmt::Display, details: Option<serde_json::Value>) -> Self {
        Self::Error {
            kind,
            message: message.to_string(),
            details,
        }
    }
}

impl From<ScheduleError> for Reply {
    fn from(e: ScheduleError) -> Self {
        match &e {
            ScheduleError::InvalidScheduleInput { problems } => {
                Self::error("invalid_schedule_input", &e, serde_json::to_value(problems).ok())
            }
            ScheduleError::InvalidDateFormat { .. } => Self::error("invalid_date_format", &e, None),
        }
    }
}

impl From<FacilityError> for Reply {
    fn from(e: FacilityError) -> Self {
        Self::error("facility_error", &e, serde_json::to_value(e.retry_policy()).ok())
    }
}

impl From<IntakeError> for Reply {
    fn from(e: IntakeError) -> Self {
        match &e {
            IntakeError::Unauthenticated(_) => Self::error("unauthenticated", &e, None),
            IntakeError::UnparseableWebhookBody { .. } => Self::error("unparseable_webhook_body", &e, None),
        }
    }
}

// ---------------------------------------------------------------------------
// Service root
// ---------------------------------------------------------------------------

/// Everything a request needs, built once at startup.
pub struct Service {
    orchestrator: SchedulingOrchestrator,
    intake: WebhookIntake,
}

impl Service {
    /// Wires the service from its configuration.
    pub fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let facility: Arc<dyn TriggerFacility> = match &config.facility_url {
            Some(base_url) => {
                tracing::info!(%base_url, "Using HTTP trigger facility");
                let credential = Arc::new(CachedCredential::new(EnvCredential::new(FACILITY_TOKEN_VAR)));
                Arc::new(HttpTriggerFacility::new(
                    HttpFacilityConfig {
                        base_url: base_url.clone(),
                        timeout: config.facility_timeout,
                    },
                    credential,
                )?)
            }
            None => {
                tracing::warn!(
                    environment = %config.environment,
                    "No facility URL configured; triggers are held in memory and lost on exit"
                );
                Arc::new(InMemoryTriggerFacility::new())
            }
        };
        Ok(Self::with_facility(config, facility))
    }

    /// Wires the service over an explicit facility.
    pub fn with_facility(config: &AppConfig, facility: Arc<dyn TriggerFacility>) -> Self {
        let registrar = TriggerRegistrar::new(facility, config.registrar_config());
        let orchestrator = SchedulingOrchestrator::new(config.calculator(), registrar, config.routing.clone());
        let intake = WebhookIntake::new(
            Arc::new(config.secret_resolver()),
            ProductStateEvaluator::new(config.evaluator_config()),
        );
        Self { orchestrator, intake }
    }

    /// Decodes and runs one request line.
    pub async fn dispatch(&self, line: &str, now: DateTime<Utc>) -> Reply {
        match serde_json::from_str::<Operation>(line) {
            Ok(op) => self.execute(op, now).await,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable request line");
                Reply::error("invalid_request", e, None)
            }
        }
    }

    async fn execute(&self, op: Operation, now: DateTime<Utc>) -> Reply {
        match op {
            Operation::SchedulePrices { request } => {
                match self.orchestrator.schedule_price_changes(&request, now).await {
                    Ok(response) => Reply::ok(response),
                    Err(e) => e.into(),
                }
            }
            Operation::ScheduleInventoryMove { request } => {
                match self.orchestrator.schedule_inventory_move(&request, now).await {
                    Ok(response) => Reply::ok(response),
                    Err(e) => e.into(),
                }
            }
            Operation::CancelTrigger { name, group } => {
                match self.orchestrator.registrar().cancel(&name, &group).await {
                    Ok(removed) => Reply::ok(serde_json::json!({ "name": name, "group": group, "removed": removed })),
                    Err(e) => e.into(),
                }
            }
            Operation::ProductWebhook(delivery) => {
                let envelope = delivery.envelope(Provider::Commerce);
                match self.intake.handle_product_update(&envelope, delivery.identity.as_ref()) {
                    Ok(decision) => Reply::ok(decision),
                    Err(e) => e.into(),
                }
            }
            Operation::ChatWebhook(delivery) => {
                let envelope = delivery.envelope(Provider::Chat);
                match self.intake.handle_chat_request(&envelope, delivery.identity.as_ref()) {
                    Ok(delivery) => Reply::ok(delivery),
                    Err(e) => e.into(),
                }
            }
        }
    }
}

/// Serves request lines from `input` until end of input.
pub async fn run<R, W>(service: &Service, input: R, mut output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut served: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = service.dispatch(&line, Utc::now()).await;
        let mut encoded = serde_json::to_string(&reply)?;
        encoded.push('\n');
        output.write_all(encoded.as_bytes()).await?;
        output.flush().await?;
        served += 1;
    }

    tracing::info!(served, "Input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use league::signature::sign_body;
    use league::SecretValue;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    fn service(facility: Arc<InMemoryTriggerFacility>) -> Service {
        Service::with_facility(
            &config(&[("LEAGUE_COMMERCE_SECRETS", "store=shpss_store")]),
            facility,
        )
    }

    fn schedule_line(season_start: &str) -> String {
        serde_json::json!({
            "op": "schedule_prices",
            "request": {
                "seasonStartDate": season_start,
                "offDatesCommaSeparated": "",
                "sportStartTime": "19:00",
                "basePrice": 100.0,
                "productRef": "7350937321566",
                "openVariantRef": "41",
                "waitlistVariantRef": "42"
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn schedule_then_cancel_through_the_loop() {
        let facility = Arc::new(InMemoryTriggerFacility::new());
        let service = service(facility.clone());

        let mut input = schedule_line("2030-05-02");
        input.push('\n');
        input.push_str(r#"{"op":"cancel_trigger","name":"price-7350937321566-tier-0","group":"price-changes"}"#);
        input.push('\n');

        let mut output = Vec::new();
        run(&service, input.as_bytes(), &mut output).await.unwrap();

        let replies: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["status"], "ok");
        assert_eq!(replies[0]["result"]["status"], "scheduled");
        assert_eq!(replies[0]["result"]["schedule"].as_array().unwrap().len(), 8);
        assert_eq!(replies[1]["result"]["removed"], true);
        assert_eq!(facility.pending_count().await, 7);
    }

    #[tokio::test]
    async fn bad_lines_produce_error_replies() {
        let service = service(Arc::new(InMemoryTriggerFacility::new()));

        let reply = service.dispatch("{not json", Utc::now()).await;
        assert!(matches!(reply, Reply::Error { kind: "invalid_request", .. }));

        let reply = service.dispatch(&schedule_line("31/31/31"), Utc::now()).await;
        match reply {
            Reply::Error { kind, details, .. } => {
                assert_eq!(kind, "invalid_schedule_input");
                assert_eq!(details.unwrap()[0]["field"], "seasonStartDate");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn product_webhooks_are_verified_before_evaluation() {
        let service = service(Arc::new(InMemoryTriggerFacility::new()));
        let body = r#"{"id":1,"title":"Sunday Bowling","tags":"bowling","variants":[{"id":7,"title":"Open Registration","inventory_quantity":0}]}"#;
        let secret = SecretValue::new("shpss_store").unwrap();

        let line = serde_json::json!({
            "op": "product_webhook",
            "headers": { "X-Shopify-Hmac-Sha256": sign_body(&secret, body.as_bytes()) },
            "body": body,
        });
        match service.dispatch(&line.to_string(), Utc::now()).await {
            Reply::Ok { result } => {
                assert_eq!(result["evaluation"]["action_needed"], true);
                assert_eq!(result["verified"]["identity"], "store");
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let forged = serde_json::json!({
            "op": "product_webhook",
            "headers": { "X-Shopify-Hmac-Sha256": "AAAA" },
            "body": body,
        });
        assert!(matches!(
            service.dispatch(&forged.to_string(), Utc::now()).await,
            Reply::Error { kind: "unauthenticated", .. }
        ));
    }
}

//! Verify-then-decode intake for both webhook providers.

use std::sync::Arc;

use league::{
    Evaluation, ProductId, ProductStateEvaluator, Provider, SecretIdentity, SecretResolver,
    SignatureVerifier, Verified, WebhookEnvelope,
};
use serde::Serialize;

use crate::chat::{decode_chat_request, ChatRequest};
use crate::commerce::decode_product_update;
use crate::IntakeError;

/// Outcome of a product-update delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDecision {
    /// How the delivery was authenticated.
    pub verified: Verified,
    /// Product the delivery was about.
    pub product: ProductId,
    /// The evaluator's decision.
    pub evaluation: Evaluation,
}

/// A verified, decoded chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatDelivery {
    /// How the delivery was authenticated.
    pub verified: Verified,
    /// The decoded request.
    pub request: ChatRequest,
}

/// Authenticates and decodes inbound webhooks.
///
/// Bodies are never decoded before their signature checks out.
#[derive(Debug, Clone)]
pub struct WebhookIntake {
    resolver: Arc<SecretResolver>,
    evaluator: ProductStateEvaluator,
}

impl WebhookIntake {
    /// Creates an intake over the service's secrets and evaluator.
    pub fn new(resolver: Arc<SecretResolver>, evaluator: ProductStateEvaluator) -> Self {
        Self { resolver, evaluator }
    }

    /// Verifies a commerce product-update delivery and evaluates the product.
    #[tracing::instrument(skip_all, fields(provider = "commerce", identity = ?identity))]
    pub fn handle_product_update(
        &self,
        envelope: &WebhookEnvelope,
        identity: Option<&SecretIdentity>,
    ) -> Result<ProductDecision, IntakeError> {
        let verified = self.authenticate(Provider::Commerce, envelope, identity)?;

        let snapshot = decode_product_update(envelope.raw_body()).map_err(|e| {
            tracing::warn!(error = %e, "Product update body rejected");
            e
        })?;
        let evaluation = self.evaluator.evaluate(&snapshot);
        tracing::info!(
            product = %snapshot.id,
            action_needed = evaluation.action_needed,
            reason = ?evaluation.reason,
            "Product update evaluated"
        );

        Ok(ProductDecision {
            verified,
            product: snapshot.id,
            evaluation,
        })
    }

    /// Verifies a chat-platform delivery and decodes its body.
    #[tracing::instrument(skip_all, fields(provider = "chat", identity = ?identity))]
    pub fn handle_chat_request(
        &self,
        envelope: &WebhookEnvelope,
        identity: Option<&SecretIdentity>,
    ) -> Result<ChatDelivery, IntakeError> {
        let verified = self.authenticate(Provider::Chat, envelope, identity)?;
        let request = decode_chat_request(envelope.raw_body(), envelope.header("content-type"))?;
        Ok(ChatDelivery { verified, request })
    }

    fn authenticate(
        &self,
        provider: Provider,
        envelope: &WebhookEnvelope,
        identity: Option<&SecretIdentity>,
    ) -> Result<Verified, IntakeError> {
        SignatureVerifier::new(provider)
            .check(envelope, &self.resolver, identity)
            .map_err(|e| {
                tracing::warn!(%provider, error = %e, "Webhook verification failed");
                IntakeError::from(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use league::signature::{sign_body, sign_timestamped};
    use league::{Environment, EvaluationReason, EvaluatorConfig, SecretValue, VerificationError};

    const PRODUCT: &str = r#"{
        "id": 7350937321566,
        "title": "Thursday Kickball - Fall 2026",
        "tags": "kickball",
        "updated_at": "2026-10-19T09:05:00-04:00",
        "variants": [
            {"id": 41, "title": "Veteran Registration", "inventory_quantity": 0, "inventory_policy": "deny"},
            {"id": 42, "title": "Open Registration", "inventory_quantity": 0, "inventory_policy": "deny"},
            {"id": 43, "title": "Waitlist Registration", "inventory_quantity": 25, "inventory_policy": "deny"}
        ]
    }"#;

    fn secret(s: &str) -> SecretValue {
        SecretValue::new(s).unwrap()
    }

    fn intake(environment: Environment) -> WebhookIntake {
        let resolver = SecretResolver::new(environment)
            .with_secret(
                Provider::Commerce,
                SecretIdentity::new("store").unwrap(),
                secret("shpss_store"),
            )
            .with_secret(
                Provider::Chat,
                SecretIdentity::new("registrations-bot").unwrap(),
                secret("chat-secret"),
            );
        WebhookIntake::new(
            Arc::new(resolver),
            ProductStateEvaluator::new(EvaluatorConfig::new("https://admin.shopify.com/store/league")),
        )
    }

    fn commerce(body: &[u8], signature: String) -> WebhookEnvelope {
        WebhookEnvelope::from_parts(Provider::Commerce, body.to_vec(), [("X-Shopify-Hmac-Sha256", signature)])
    }

    #[test]
    fn authentic_sold_out_product_yields_directives() {
        let body = PRODUCT.as_bytes();
        let envelope = commerce(body, sign_body(&secret("shpss_store"), body));

        let decision = intake(Environment::Production)
            .handle_product_update(&envelope, None)
            .unwrap();

        assert_eq!(decision.evaluation.reason, EvaluationReason::ProductSoldOut);
        let directives = decision.evaluation.directives.unwrap();
        assert!(directives.product_url.ends_with("/products/7350937321566"));
        assert_eq!(
            decision.verified,
            Verified::Matched {
                identity: SecretIdentity::new("store").unwrap()
            }
        );
    }

    #[test]
    fn forged_deliveries_are_rejected_before_decoding() {
        let envelope = commerce(b"not even json", sign_body(&secret("wrong"), b"not even json"));
        let err = intake(Environment::Production)
            .handle_product_update(&envelope, None)
            .unwrap_err();
        assert_eq!(err, IntakeError::Unauthenticated(VerificationError::SignatureMismatch));
    }

    #[test]
    fn authentic_but_malformed_bodies_are_unparseable() {
        let body = br#"{"title": "missing id"}"#;
        let envelope = commerce(body, sign_body(&secret("shpss_store"), body));
        assert!(matches!(
            intake(Environment::Production).handle_product_update(&envelope, None),
            Err(IntakeError::UnparseableWebhookBody { .. })
        ));
    }

    #[test]
    fn chat_requests_are_verified_with_the_timestamp_scheme() {
        let body = b"command=%2Fwaitlist&text=kickball";
        let ts = "1792400000";
        let envelope = WebhookEnvelope::from_parts(
            Provider::Chat,
            body.to_vec(),
            [
                ("X-Slack-Request-Timestamp", ts.to_string()),
                ("X-Slack-Signature", sign_timestamped(&secret("chat-secret"), ts, body)),
                ("Content-Type", "application/x-www-form-urlencoded".to_string()),
            ],
        );

        let delivery = intake(Environment::Production)
            .handle_chat_request(&envelope, None)
            .unwrap();
        assert!(matches!(delivery.request, ChatRequest::Command { ref command, .. } if command == "/waitlist"));
    }

    #[test]
    fn unsigned_deliveries_pass_in_development_without_secrets() {
        let intake = WebhookIntake::new(
            Arc::new(SecretResolver::new(Environment::Development)),
            ProductStateEvaluator::new(EvaluatorConfig::new("https://admin.example.com")),
        );
        let envelope = WebhookEnvelope::from_parts(Provider::Commerce, PRODUCT.as_bytes().to_vec(), Vec::<(String, String)>::new());

        let decision = intake.handle_product_update(&envelope, None).unwrap();
        assert_eq!(decision.verified, Verified::Unchecked);
    }
}

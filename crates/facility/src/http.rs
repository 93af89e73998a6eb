//! HTTP adapter for the external timed-trigger facility.
//!
//! Resources live at `{base}/groups/{group}/triggers[/{name}]`:
//!
//! | Operation | Request | Success |
//! |-----------|---------|---------|
//! | `get` | `GET .../triggers/{name}` | `200` with the trigger, `404` when absent |
//! | `create` | `POST .../triggers` | `200`/`201` with `{"confirmationId": ...}` |
//! | `delete` | `DELETE .../triggers/{name}` | `200`/`204`, `404` when absent |
//!
//! Every request carries the cached bearer credential and a finite timeout. A
//! `401`/`403` invalidates the credential before the error is returned, so a
//! caller's retry fetches a fresh one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use league::{
    ActionId, ConfirmationId, FacilityError, InstalledTrigger, TriggerExpression, TriggerFacility,
    TriggerGroup, TriggerLifecycle, TriggerName, TriggerSpec, TriggerTarget,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credential::CachedCredential;

/// Connection settings for [`HttpTriggerFacility`].
#[derive(Debug, Clone)]
pub struct HttpFacilityConfig {
    /// Facility API root, e.g. `https://scheduler.example.com/v1`.
    pub base_url: Url,
    /// Upper bound on each request, connect through body.
    pub timeout: Duration,
}

/// [`TriggerFacility`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTriggerFacility {
    config: HttpFacilityConfig,
    client: reqwest::Client,
    credential: Arc<CachedCredential>,
}

impl HttpTriggerFacility {
    /// Creates an adapter. Fails only if the HTTP client cannot be built.
    pub fn new(config: HttpFacilityConfig, credential: Arc<CachedCredential>) -> Result<Self, FacilityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FacilityError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            config,
            client,
            credential,
        })
    }

    fn triggers_url(&self, group: &TriggerGroup, name: Option<&TriggerName>) -> Result<Url, FacilityError> {
        triggers_url(&self.config.base_url, group, name)
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Sends `request` with the bearer credential, mapping transport failures.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, FacilityError> {
        let token = self.credential.get().await?;
        request
            .bearer_auth(token.expose())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FacilityError::Timeout {
                        after_ms: self.timeout_ms(),
                    }
                } else {
                    FacilityError::Transport {
                        message: format!("HTTP request failed: {e}"),
                    }
                }
            })
    }

    /// Converts a non-success response into a [`FacilityError`].
    async fn failure(
        &self,
        response: reqwest::Response,
        group: &TriggerGroup,
        name: &TriggerName,
    ) -> FacilityError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        let error = classify_status(status, retry_after, body, group, name, self.timeout_ms());
        if matches!(error, FacilityError::Unauthorized) {
            self.credential.invalidate().await;
        }
        tracing::warn!(%status, %group, %name, error = %error, "Facility request failed");
        error
    }
}

#[async_trait]
impl TriggerFacility for HttpTriggerFacility {
    #[tracing::instrument(skip_all, fields(%group, %name))]
    async fn get(
        &self,
        group: &TriggerGroup,
        name: &TriggerName,
    ) -> Result<Option<InstalledTrigger>, FacilityError> {
        let url = self.triggers_url(group, Some(name))?;
        let response = self.send(self.client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.failure(response, group, name).await);
        }

        let wire: TriggerWire = response.json().await.map_err(|e| FacilityError::Transport {
            message: format!("failed to parse trigger: {e}"),
        })?;
        wire.into_installed().map(Some)
    }

    #[tracing::instrument(skip_all, fields(group = %spec.group, name = %spec.name, expression = %spec.expression))]
    async fn create(&self, spec: &TriggerSpec) -> Result<ConfirmationId, FacilityError> {
        let url = self.triggers_url(&spec.group, None)?;
        let body = TriggerWire::from_spec(spec)?;
        let response = self.send(self.client.post(url).json(&body)).await?;

        if !response.status().is_success() {
            return Err(self.failure(response, &spec.group, &spec.name).await);
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CreateResponse {
            confirmation_id: String,
        }

        let created: CreateResponse = response.json().await.map_err(|e| FacilityError::Transport {
            message: format!("failed to parse create response: {e}"),
        })?;
        let id = ConfirmationId::new(created.confirmation_id).ok_or_else(|| FacilityError::Transport {
            message: "facility returned an empty confirmation id".to_string(),
        })?;
        tracing::info!(confirmation_id = %id, "Trigger created");
        Ok(id)
    }

    #[tracing::instrument(skip_all, fields(%group, %name))]
    async fn delete(&self, group: &TriggerGroup, name: &TriggerName) -> Result<bool, FacilityError> {
        let url = self.triggers_url(group, Some(name))?;
        let response = self.send(self.client.delete(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => {
                tracing::info!("Trigger deleted");
                Ok(true)
            }
            _ => Err(self.failure(response, group, name).await),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum CompletionAction {
    Delete,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FlexibleTimeWindow {
    mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetWire {
    action: String,
    /// JSON-encoded action input; the facility delivers it as an opaque string.
    input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerWire {
    name: String,
    group: String,
    schedule_expression: String,
    schedule_expression_timezone: String,
    target: TargetWire,
    action_after_completion: CompletionAction,
    flexible_time_window: FlexibleTimeWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confirmation_id: Option<String>,
}

impl TriggerWire {
    fn from_spec(spec: &TriggerSpec) -> Result<Self, FacilityError> {
        let input = serde_json::to_string(&spec.target.payload).map_err(|e| FacilityError::Transport {
            message: format!("failed to encode trigger input: {e}"),
        })?;
        Ok(Self {
            name: spec.name.to_string(),
            group: spec.group.to_string(),
            schedule_expression: spec.expression.to_string(),
            schedule_expression_timezone: spec.timezone.name().to_string(),
            target: TargetWire {
                action: spec.target.action.to_string(),
                input,
            },
            action_after_completion: if spec.delete_after_completion {
                CompletionAction::Delete
            } else {
                CompletionAction::None
            },
            flexible_time_window: FlexibleTimeWindow {
                mode: "OFF".to_string(),
            },
            confirmation_id: None,
        })
    }

    fn into_installed(self) -> Result<InstalledTrigger, FacilityError> {
        let malformed = |what: &str| FacilityError::Transport {
            message: format!("facility returned a trigger with an invalid {what}"),
        };

        let timezone: Tz = self
            .schedule_expression_timezone
            .parse()
            .map_err(|_| malformed("timezone"))?;
        let payload = serde_json::from_str(&self.target.input).map_err(|_| malformed("target input"))?;

        let spec = TriggerSpec {
            name: TriggerName::new(self.name).ok_or_else(|| malformed("name"))?,
            group: TriggerGroup::new(self.group).ok_or_else(|| malformed("group"))?,
            expression: TriggerExpression::parse(&self.schedule_expression)
                .ok_or_else(|| malformed("schedule expression"))?,
            timezone,
            target: TriggerTarget {
                action: ActionId::new(self.target.action).ok_or_else(|| malformed("target action"))?,
                payload,
            },
            delete_after_completion: self.action_after_completion == CompletionAction::Delete,
        };
        let confirmation_id = self
            .confirmation_id
            .and_then(ConfirmationId::new)
            .ok_or_else(|| malformed("confirmation id"))?;

        Ok(InstalledTrigger {
            spec,
            confirmation_id,
            lifecycle: TriggerLifecycle::Pending,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn triggers_url(base: &Url, group: &TriggerGroup, name: Option<&TriggerName>) -> Result<Url, FacilityError> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| FacilityError::Transport {
            message: format!("facility base URL '{base}' cannot carry a path"),
        })?;
        segments.pop_if_empty().push("groups").push(group.as_str()).push("triggers");
        if let Some(name) = name {
            segments.push(name.as_str());
        }
    }
    Ok(url)
}

/// Maps a non-success HTTP status to a typed facility error.
fn classify_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
    group: &TriggerGroup,
    name: &TriggerName,
    timeout_ms: u64,
) -> FacilityError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FacilityError::Unauthorized,
        StatusCode::CONFLICT => FacilityError::Conflict {
            name: name.clone(),
            group: group.clone(),
        },
        StatusCode::TOO_MANY_REQUESTS => FacilityError::Throttled { retry_after_secs },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FacilityError::Timeout { after_ms: timeout_ms },
        s if s.is_server_error() => FacilityError::Transport {
            message: format!("facility returned {s}: {body}"),
        },
        s => FacilityError::Rejected {
            status: s.as_u16(),
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use league::{default_safety_offset, ScheduledTrigger, BUSINESS_TZ};

    fn group() -> TriggerGroup {
        TriggerGroup::new("price-changes").unwrap()
    }

    fn name() -> TriggerName {
        TriggerName::new("price-7350937321566-tier-0").unwrap()
    }

    fn spec() -> TriggerSpec {
        ScheduledTrigger::pending(
            name(),
            group(),
            BUSINESS_TZ.with_ymd_and_hms(2026, 11, 5, 19, 0, 0).unwrap(),
            TriggerTarget {
                action: ActionId::new("update-price").unwrap(),
                payload: serde_json::json!({ "price": "120.00" }),
            },
        )
        .to_spec(BUSINESS_TZ, default_safety_offset())
    }

    #[test]
    fn trigger_urls_nest_under_the_group() {
        let base = Url::parse("https://scheduler.example.com/v1/").unwrap();
        assert_eq!(
            triggers_url(&base, &group(), Some(&name())).unwrap().as_str(),
            "https://scheduler.example.com/v1/groups/price-changes/triggers/price-7350937321566-tier-0"
        );
        assert_eq!(
            triggers_url(&base, &group(), None).unwrap().as_str(),
            "https://scheduler.example.com/v1/groups/price-changes/triggers"
        );
    }

    #[test]
    fn status_codes_map_to_typed_errors() {
        let classify = |code: u16| {
            classify_status(
                StatusCode::from_u16(code).unwrap(),
                Some(5),
                "nope".to_string(),
                &group(),
                &name(),
                10_000,
            )
        };

        assert_eq!(classify(401), FacilityError::Unauthorized);
        assert_eq!(classify(403), FacilityError::Unauthorized);
        assert!(matches!(classify(409), FacilityError::Conflict { .. }));
        assert_eq!(
            classify(429),
            FacilityError::Throttled {
                retry_after_secs: Some(5)
            }
        );
        assert_eq!(classify(504), FacilityError::Timeout { after_ms: 10_000 });
        assert!(matches!(classify(503), FacilityError::Transport { .. }));
        assert_eq!(
            classify(422),
            FacilityError::Rejected {
                status: 422,
                message: "nope".to_string()
            }
        );
    }

    #[test]
    fn wire_form_carries_expression_timezone_and_self_deletion() {
        let wire = TriggerWire::from_spec(&spec()).unwrap();
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["scheduleExpression"], "at(2026-11-05T18:59:00)");
        assert_eq!(json["scheduleExpressionTimezone"], "America/New_York");
        assert_eq!(json["actionAfterCompletion"], "DELETE");
        assert_eq!(json["flexibleTimeWindow"]["mode"], "OFF");
        assert_eq!(json["target"]["input"], r#"{"price":"120.00"}"#);
        assert!(json.get("confirmationId").is_none());
    }

    #[test]
    fn installed_trigger_is_decoded_from_a_get_response() {
        let mut wire = TriggerWire::from_spec(&spec()).unwrap();
        wire.confirmation_id = Some("sched-41".to_string());

        let installed = wire.clone().into_installed().unwrap();
        assert_eq!(installed.spec, spec());
        assert_eq!(installed.confirmation_id.as_str(), "sched-41");
        assert_eq!(installed.lifecycle, TriggerLifecycle::Pending);

        wire.schedule_expression_timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(wire.into_installed(), Err(FacilityError::Transport { .. })));
    }
}

//! Chat-platform request bodies.
//!
//! Three shapes arrive at the same endpoint:
//!
//! - slash commands, form-encoded (`command=/waitlist&text=...`);
//! - interactive callbacks, form-encoded with the JSON document in a
//!   `payload` field;
//! - event deliveries and the endpoint-verification handshake, as raw JSON.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::IntakeError;

/// A decoded chat-platform request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatRequest {
    /// Endpoint-ownership handshake; the caller must echo `challenge`.
    UrlVerification {
        /// Value to echo back.
        challenge: String,
    },
    /// A slash command.
    Command {
        /// Command name, including the leading slash.
        command: String,
        /// Free text after the command.
        text: String,
        /// Every submitted form field.
        fields: BTreeMap<String, String>,
    },
    /// A button press or other interactive callback.
    Interaction {
        /// The decoded `payload` document.
        payload: serde_json::Value,
    },
    /// Any other JSON delivery.
    Event {
        /// The decoded body.
        payload: serde_json::Value,
    },
}

/// Decodes a verified chat request body.
///
/// `content_type` selects the decoder; when absent, a body starting with `{`
/// is treated as JSON and anything else as a form.
pub fn decode_chat_request(body: &[u8], content_type: Option<&str>) -> Result<ChatRequest, IntakeError> {
    let is_json = match content_type {
        Some(ct) => ct.to_ascii_lowercase().contains("json"),
        None => body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{'),
    };

    if is_json {
        decode_json(body)
    } else {
        decode_form(body)
    }
}

fn decode_json(body: &[u8]) -> Result<ChatRequest, IntakeError> {
    let payload: serde_json::Value = serde_json::from_slice(body).map_err(IntakeError::unparseable)?;
    if !payload.is_object() {
        return Err(IntakeError::unparseable("chat body is not a JSON object"));
    }

    if payload["type"] == "url_verification" {
        let challenge = payload["challenge"]
            .as_str()
            .ok_or_else(|| IntakeError::unparseable("url_verification without a challenge"))?;
        return Ok(ChatRequest::UrlVerification {
            challenge: challenge.to_string(),
        });
    }
    Ok(ChatRequest::Event { payload })
}

fn decode_form(body: &[u8]) -> Result<ChatRequest, IntakeError> {
    let fields: BTreeMap<String, String> = url::form_urlencoded::parse(body).into_owned().collect();

    if let Some(raw) = fields.get("payload") {
        let payload = serde_json::from_str(raw).map_err(IntakeError::unparseable)?;
        return Ok(ChatRequest::Interaction { payload });
    }

    let command = fields
        .get("command")
        .filter(|c| !c.is_empty())
        .cloned()
        .ok_or_else(|| IntakeError::unparseable("form body has neither a command nor a payload"))?;
    let text = fields.get("text").cloned().unwrap_or_default();

    Ok(ChatRequest::Command {
        command,
        text,
        fields,
    })
}

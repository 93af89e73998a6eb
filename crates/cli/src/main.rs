//! League scheduler entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Load configuration**: `.env` (if present) then the process
//!    environment, validated into an [`config::AppConfig`]. An invalid
//!    configuration aborts startup.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON layer on
//!    stderr and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an OpenTelemetry
//!    OTLP exporter.
//! 3. **Construct the service root**: secret resolver, trigger facility (HTTP
//!    or in-memory), registrar, orchestrator, and webhook intake.
//! 4. **Serve**: read one JSON operation per stdin line and write one JSON
//!    reply per stdout line until input closes.
//!
//! Only startup failures produce a non-zero exit code.

mod config;
mod dispatch;
mod telemetry;

use anyhow::Context;

use crate::config::AppConfig;
use crate::dispatch::Service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("reading .env");
        }
    }

    let config = AppConfig::from_env().context("loading configuration")?;
    let telemetry = telemetry::init(&config)?;
    tracing::info!(
        environment = %config.environment,
        facility = config.facility_url.as_ref().map(|u| u.as_str()).unwrap_or("in-memory"),
        trigger_timezone = %config.trigger_timezone,
        "League scheduler starting"
    );

    let service = Service::build(&config)?;
    let served = dispatch::run(&service, tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;

    telemetry.shutdown();
    served
}

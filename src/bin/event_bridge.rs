use webcam_ingest::config::BridgeConfig;
use webcam_ingest::services::event_bridge::run_bridge;
use webcam_ingest::services::{EventForwarder, HttpEventSink};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webcam_ingest=info,event_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bridge = &BridgeConfig::from_env();

    tracing::info!("Starting event bridge");
    tracing::info!("MQTT: {}:{}", bridge.mqtt_host, bridge.mqtt_port);
    tracing::info!("API: {}", bridge.api_url);
    if bridge.api_key.is_none() {
        tracing::warn!("WEBCAMORG_API_KEY not set, events will be logged but not forwarded");
    }

    let forwarder = EventForwarder::new(bridge, Box::new(HttpEventSink::new(bridge)?));
    run_bridge(bridge, &forwarder).await?;
    Ok(())
}

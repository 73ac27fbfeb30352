//! MQTT to HTTP event bridge.
//!
//! Listens for Frigate detection messages and forwards each one to the
//! backend as a [`DetectionEvent`]. Nothing here is fatal: failed posts
//! are logged and the MQTT connection is retried forever.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, SubscribeFilter};
use serde_json::Value;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::error::AppResult;
use crate::http_client::{upstream_status, HttpClient};
use crate::models::DetectionEvent;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "webcam.org-integration/1.0";

/// One message taken off the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Fields pulled out of a topic and payload before forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub camera: Option<String>,
    pub event_type: Option<String>,
    pub confidence: f64,
}

/// Topics to subscribe to: the aggregate events topic plus one wildcard per object.
pub fn subscriptions(config: &BridgeConfig) -> Vec<String> {
    let root = config.topic_root.trim_end_matches('/');
    let mut topics = vec![format!("{}/events", root)];
    topics.extend(config.objects.iter().map(|o| format!("{}/+/{}", root, o)));
    topics
}

/// Splits `{root}/{camera}/{category}` into its non-empty camera and category parts.
pub fn parse_topic<'a>(topic_root: &str, topic: &'a str) -> (Option<&'a str>, Option<&'a str>) {
    let rest = match topic.strip_prefix(topic_root.trim_end_matches('/')) {
        Some(r) if r.is_empty() || r.starts_with('/') => r,
        _ => topic,
    };
    let mut parts = rest.split('/').filter(|p| !p.is_empty());
    (parts.next(), parts.next())
}

/// `score`, then `confidence`, from a JSON object payload. Anything else is 0.
pub fn extract_confidence(payload: &Value) -> f64 {
    payload
        .as_object()
        .and_then(|obj| obj.get("score").or_else(|| obj.get("confidence")))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

pub fn parse_message(topic_root: &str, message: &BusMessage) -> ParsedEvent {
    let payload: Value = serde_json::from_slice(&message.payload).unwrap_or(Value::Null);
    let (camera, category) = parse_topic(topic_root, &message.topic);

    // The aggregate topic carries Frigate's before/after event envelope.
    if camera == Some("events") && category.is_none() {
        let after = payload.get("after").unwrap_or(&Value::Null);
        let text = |key: &str| {
            after
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let confidence = after
            .get("top_score")
            .or_else(|| after.get("score"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        return ParsedEvent {
            camera: text("camera"),
            event_type: text("label"),
            confidence,
        };
    }

    ParsedEvent {
        camera: camera.map(str::to_string),
        event_type: category.map(str::to_string),
        confidence: extract_confidence(&payload),
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &DetectionEvent) -> AppResult<()>;
}

/// Posts events to `{api_url}/api/events`.
pub struct HttpEventSink {
    http: HttpClient,
    endpoint: String,
}

impl HttpEventSink {
    pub fn new(config: &BridgeConfig) -> AppResult<Self> {
        Ok(Self {
            http: HttpClient::new(USER_AGENT, config.forward_timeout)?,
            endpoint: format!("{}/api/events", config.api_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn send(&self, event: &DetectionEvent) -> AppResult<()> {
        let response = self.http.post_json(&self.endpoint, event).await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_status(status, &body));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Forwarded,
    SkippedNoCredential,
    SkippedNoCamera,
    Failed,
}

pub struct EventForwarder {
    topic_root: String,
    api_key: Option<String>,
    sink: Box<dyn EventSink>,
}

impl EventForwarder {
    pub fn new(config: &BridgeConfig, sink: Box<dyn EventSink>) -> Self {
        Self {
            topic_root: config.topic_root.clone(),
            api_key: config.api_key.clone(),
            sink,
        }
    }

    pub async fn handle(&self, message: &BusMessage, now: DateTime<Utc>) -> ForwardOutcome {
        let parsed = parse_message(&self.topic_root, message);
        tracing::info!(
            "Event {}: camera={:?} type={:?} confidence={}",
            message.topic,
            parsed.camera,
            parsed.event_type,
            parsed.confidence
        );

        if self.api_key.is_none() {
            tracing::warn!("No WEBCAMORG_API_KEY configured, not forwarding");
            return ForwardOutcome::SkippedNoCredential;
        }
        let Some(camera) = parsed.camera.as_deref() else {
            tracing::debug!("No camera in {}, skipping", message.topic);
            return ForwardOutcome::SkippedNoCamera;
        };

        let event = DetectionEvent::new(
            camera,
            parsed.event_type.as_deref(),
            parsed.confidence,
            now,
        );
        match self.sink.send(&event).await {
            Ok(()) => {
                tracing::info!("Forwarded {} event for {}", event.event_type, event.camera);
                ForwardOutcome::Forwarded
            }
            Err(e) => {
                tracing::warn!("Failed to forward event: {}", e);
                ForwardOutcome::Failed
            }
        }
    }
}

/// Sends every subscription in one request; the client's request queue is bounded.
pub async fn subscribe_all(client: &AsyncClient, topics: &[String]) -> AppResult<()> {
    let filters = topics
        .iter()
        .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtMostOnce));
    client.subscribe_many(filters).await?;
    Ok(())
}

/// Connects to the broker and forwards messages until the process is stopped.
pub async fn run_bridge(config: &BridgeConfig, forwarder: &EventForwarder) -> AppResult<()> {
    let mut options = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt_host.clone(),
        config.mqtt_port,
    );
    options.set_keep_alive(KEEP_ALIVE);

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    let topics = subscriptions(config);
    tracing::info!("Connecting to MQTT at {}:{}", config.mqtt_host, config.mqtt_port);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!("Connected to MQTT ({:?})", ack.code);
                match subscribe_all(&client, &topics).await {
                    Ok(()) => tracing::info!("Subscribed to {}", topics.join(", ")),
                    Err(e) => tracing::error!("Subscribe failed: {}", e),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BusMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                };
                forwarder.handle(&message, Utc::now()).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("MQTT connection failed: {}", e);
                tracing::info!("Retrying in {:?}", config.reconnect_delay);
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }
    }
}

//! Outbound customer notification consumer
//!
//! Subscribes to the event bus and forwards ready-song notifications to the
//! customer-facing collaborator. Delivery failures are logged and dropped;
//! notification is best-effort and never feeds back into pipeline state.

use std::time::Duration;
use tokio::task::JoinHandle;
use tunegift_common::events::{EventBus, PipelineEvent};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "TuneGift/0.1.0 (+https://tunegift.example.com)";

/// Spawn the notification consumer. Returns immediately; the handle is only
/// used for shutdown.
pub fn spawn_notifier(event_bus: EventBus, notify_url: Option<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(notify_url) = notify_url else {
            tracing::info!("Notification endpoint not configured, notifier idle");
            return;
        };

        let http_client = match reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build notifier HTTP client");
                return;
            }
        };

        let mut rx = event_bus.subscribe();
        tracing::info!(notify_url = %notify_url, "Notification consumer started");

        loop {
            match rx.recv().await {
                Ok(PipelineEvent::SongReady { order_id, song_id, variant, .. }) => {
                    let body = serde_json::json!({
                        "order_id": order_id,
                        "song_id": song_id,
                        "variant": variant,
                    });
                    match http_client.post(&notify_url).json(&body).send().await {
                        Ok(response) if response.status().is_success() => {
                            tracing::info!(%order_id, %song_id, "Song-ready notification delivered");
                        }
                        Ok(response) => {
                            tracing::warn!(
                                %order_id,
                                %song_id,
                                status = response.status().as_u16(),
                                "Song-ready notification rejected"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(%order_id, %song_id, error = %e, "Song-ready notification failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification consumer lagged, events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification consumer stopping");
                    return;
                }
            }
        }
    })
}

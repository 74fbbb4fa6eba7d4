use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::models::{CampaignOutput, RunMetrics};

pub type EventSender = broadcast::Sender<String>;

pub const CAMPAIGN_STARTED: &str = "campaign.started";
pub const CAMPAIGN_COMPLETED: &str = "campaign.completed";

/// Bus the monitoring side subscribes to. Publishing without subscribers is a no-op.
pub fn event_bus() -> (EventSender, broadcast::Receiver<String>) {
    broadcast::channel(256)
}

pub fn encode_event(event: &str, payload: Value) -> String {
    json!({
        "event": event,
        "payload": payload,
    })
    .to_string()
}

pub fn publish(sender: &EventSender, event: &str, payload: Value) {
    let _ = sender.send(encode_event(event, payload));
}

pub fn campaign_started(sender: &EventSender, campaign_id: &str, total_expected: usize) {
    publish(
        sender,
        CAMPAIGN_STARTED,
        json!({
            "campaign_id": campaign_id,
            "total_expected": total_expected,
        }),
    );
}

pub fn campaign_completed(sender: &EventSender, output: &CampaignOutput) {
    publish(
        sender,
        CAMPAIGN_COMPLETED,
        json!({
            "campaign_id": output.campaign_id,
            "output_directory": output.output_directory,
            "errors": output.summary.errors,
            "metrics": metrics_payload(&output.metrics),
        }),
    );
}

fn metrics_payload(metrics: &RunMetrics) -> Value {
    serde_json::to_value(metrics).unwrap_or(Value::Null)
}

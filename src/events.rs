//! The structured event stream a UI collaborator subscribes to.
//!
//! `pipeline::run` owns the sending half; callers get the receiving half
//! back from `pipeline::run_with_events` so this crate never has an
//! opinion on transport (SSE, websocket, polling — all external).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    Started,
    Completed,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub job_id: String,
    pub layer: String,
    pub status: LayerStatus,
    pub duration_ms: u64,
    pub tokens: u32,
    pub cost_usd_millis: u64,
    pub degradation_flags: Vec<String>,
}

pub type EventSender = mpsc::UnboundedSender<TraceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TraceEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Emits a started/completed pair around `f`, regardless of whether the
/// sender has any live receiver (a dropped receiver just means the sends
/// become no-ops, per `mpsc::UnboundedSender::send`'s `Err` being ignored).
pub async fn trace_layer<F, Fut, T>(
    tx: &EventSender,
    job_id: &str,
    layer: &str,
    f: F,
) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = (T, u32, u64, Vec<String>)>,
{
    let start = std::time::Instant::now();
    let _ = tx.send(TraceEvent {
        job_id: job_id.to_string(),
        layer: layer.to_string(),
        status: LayerStatus::Started,
        duration_ms: 0,
        tokens: 0,
        cost_usd_millis: 0,
        degradation_flags: Vec::new(),
    });

    let (result, tokens, cost_usd_millis, degradation_flags) = f().await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = if degradation_flags.is_empty() { LayerStatus::Completed } else { LayerStatus::Degraded };

    let _ = tx.send(TraceEvent {
        job_id: job_id.to_string(),
        layer: layer.to_string(),
        status,
        duration_ms,
        tokens,
        cost_usd_millis,
        degradation_flags,
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trace_layer_emits_started_and_completed() {
        let (tx, mut rx) = channel();
        let result = trace_layer(&tx, "job-1", "evidence", || async { (42, 10, 0, Vec::new()) }).await;
        assert_eq!(result, 42);

        let started = rx.recv().await.unwrap();
        assert_eq!(started.status, LayerStatus::Started);
        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.status, LayerStatus::Completed);
        assert_eq!(completed.tokens, 10);
    }

    #[tokio::test]
    async fn trace_layer_marks_degraded_when_flags_present() {
        let (tx, mut rx) = channel();
        trace_layer(&tx, "job-1", "bullets", || async { ((), 0, 0, vec!["role skipped".to_string()]) }).await;
        rx.recv().await.unwrap();
        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.status, LayerStatus::Degraded);
    }
}

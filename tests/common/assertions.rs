//! Event helpers for integration tests

use rippl::{Event, WorkerExit, WorkerState};
use std::time::Duration;
use tokio::sync::broadcast;

/// Wait for the first event matching `pred`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut pred: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Wait until `source` reports `state`
pub async fn wait_for_state(
    events: &mut broadcast::Receiver<Event>,
    source: &str,
    state: WorkerState,
) -> bool {
    wait_for_event(events, Duration::from_secs(5), |event| {
        matches!(event, Event::WorkerState { source: s, state: st } if s == source && *st == state)
    })
    .await
    .is_some()
}

/// Exit recorded for `source` in a report
pub fn exit_of<'a>(exits: &'a [(String, WorkerExit)], source: &str) -> &'a WorkerExit {
    exits
        .iter()
        .find(|(s, _)| s == source)
        .map(|(_, exit)| exit)
        .unwrap_or_else(|| panic!("no exit recorded for {source}"))
}

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::core::store::{event_types, Db, ScanEvent};

use super::super::AppState;
use super::error_response;

/// Reconnect hint sent in the `ready` frame.
const RETRY_HINT: Duration = Duration::from_secs(3);
/// Idle poll cadence.
const POLL_SLEEP: Duration = Duration::from_millis(1200);
/// Check the scan row every this many idle polls (~every 5s).
const STATUS_CHECK_EVERY: u64 = 4;
/// Comment heartbeat when nothing has been sent for this long.
const HEARTBEAT_AFTER: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    after: i64,
}

fn frame(event: &ScanEvent) -> Event {
    Event::default()
        .id(event.id.to_string())
        .event(event.event_type.clone())
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()))
}

/// Replay-then-tail stream of one scan's events. The cursor resumes from the
/// larger of the `after` query parameter and the `Last-Event-ID` header; a
/// client disconnect only stops this tail loop, never the backing run.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    match state.db.get_scan(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "scan not found"),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let last_event_id: i64 = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let cursor = query.after.max(last_event_id);

    let (tx, rx) = tokio::sync::mpsc::channel::<Event>(64);
    let db = state.db.clone();
    tokio::spawn(async move {
        tail_events(db, id, cursor, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).into_response()
}

async fn tail_events(db: Db, scan_id: String, mut cursor: i64, tx: tokio::sync::mpsc::Sender<Event>) {
    let ready = Event::default()
        .event(event_types::READY)
        .data(serde_json::json!({ "scanId": scan_id, "cursor": cursor }).to_string())
        .retry(RETRY_HINT);
    if tx.send(ready).await.is_err() {
        return;
    }

    let mut idle_polls: u64 = 0;
    let mut last_sent = Instant::now();

    loop {
        let events = match db.list_events_after(&scan_id, cursor).await {
            Ok(events) => events,
            Err(e) => {
                debug!("stream for {} stopping on store error: {}", scan_id, e);
                return;
            }
        };

        let mut saw_terminal = false;
        for event in &events {
            cursor = event.id;
            if event_types::is_terminal(&event.event_type) {
                saw_terminal = true;
            }
            if tx.send(frame(event)).await.is_err() {
                return; // client went away
            }
            last_sent = Instant::now();
        }

        if saw_terminal {
            send_end(&tx, cursor).await;
            return;
        }

        if events.is_empty() {
            idle_polls += 1;

            // The run may have died without a terminal event reaching us yet;
            // check the row and flush one trailing read before closing.
            if idle_polls % STATUS_CHECK_EVERY == 0 {
                let terminal = matches!(
                    db.get_scan(&scan_id).await,
                    Ok(Some(scan)) if scan.status.is_terminal()
                );
                if terminal {
                    if let Ok(trailing) = db.list_events_after(&scan_id, cursor).await {
                        for event in &trailing {
                            cursor = event.id;
                            if tx.send(frame(event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    send_end(&tx, cursor).await;
                    return;
                }
            }

            if last_sent.elapsed() >= HEARTBEAT_AFTER {
                if tx.send(Event::default().comment("heartbeat")).await.is_err() {
                    return;
                }
                last_sent = Instant::now();
            }
        } else {
            idle_polls = 0;
        }

        tokio::time::sleep(POLL_SLEEP).await;
    }
}

async fn send_end(tx: &tokio::sync::mpsc::Sender<Event>, cursor: i64) {
    let _ = tx
        .send(
            Event::default()
                .event(event_types::END)
                .data(serde_json::json!({ "cursor": cursor }).to_string()),
        )
        .await;
}

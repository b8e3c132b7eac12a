//! Realtime endpoints for admin dashboards.

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse, web};
use async_stream::stream;
use desa_sos_realtime::sse::{KEEP_ALIVE_FRAME, encode_event, retry_frame};
use desa_sos_server_models::PollParams;

use crate::AppState;
use crate::handlers::error_response;

/// Most events returned by one long-poll response.
const MAX_POLL_BATCH: usize = 100;

/// `GET /admin/realtime/emergencies`
///
/// Streams lifecycle events as Server-Sent Events. A comment frame is
/// sent whenever the channel has been quiet for the keep-alive interval.
pub async fn event_stream(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let principal = match state.sessions.require_admin(&req) {
        Ok(principal) => principal,
        Err(e) => return error_response(&e),
    };

    // Subscribe before responding so nothing published after the
    // handshake is missed.
    let mut subscription = state.service.hub().subscribe();
    let keep_alive = state.realtime.keep_alive();
    let retry = retry_frame(state.realtime.retry_millis);
    log::info!("Realtime stream opened for {}", principal.user_id);

    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from(retry));
        loop {
            match tokio::time::timeout(keep_alive, subscription.next()).await {
                Ok(Some(event)) => match encode_event(&event) {
                    Ok(frame) => yield Ok::<Bytes, actix_web::Error>(Bytes::from(frame)),
                    Err(e) => log::error!("Failed to encode {} event: {e}", event.name()),
                },
                Ok(None) => break,
                Err(_) => {
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(
                        KEEP_ALIVE_FRAME.as_bytes(),
                    ));
                }
            }
        }
        log::debug!("Realtime stream for {} ended", principal.user_id);
    };

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream)
}

/// `GET /admin/realtime/emergencies/poll?wait_secs=N&since=C`
///
/// Long-polling fallback. Returns every event published after cursor `C`
/// at once if there are any, otherwise waits up to `wait_secs` for the
/// next one. The response carries the cursor to send on the next poll.
/// Without `since` the poll starts at the newest event; `wait_secs=0`
/// then doubles as the connection handshake.
pub async fn poll(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<PollParams>,
) -> HttpResponse {
    if let Err(e) = state.sessions.require_admin(&req) {
        return error_response(&e);
    }

    let hub = state.service.hub();
    let newest = hub.cursor();
    // A cursor ahead of the hub was issued before a server restart.
    let since = params.since.map_or(newest, |since| since.min(newest));

    let wait = state.realtime.poll_wait(params.wait_secs);
    if !wait.is_zero() {
        hub.wait_past(since, wait).await;
    }

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .json(hub.since(since, MAX_POLL_BATCH))
}

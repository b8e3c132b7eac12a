#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Realtime fan-out of emergency lifecycle events.
//!
//! The server side is an [`hub::EventHub`]: every event published on it
//! reaches every subscribed admin session. Delivery is at-most-once; a
//! dashboard that is not connected when an event is published has to
//! resynchronize with a full list fetch.
//!
//! Events travel over Server-Sent Events ([`sse`]) or, when a streaming
//! connection cannot be established, over long-polling. Long-poll clients
//! echo back the [`PollBatch::cursor`] they last received and get every
//! event published since, as long as it is still in the hub's bounded
//! backlog. The [`client::RealtimeClient`] picks the first transport that
//! works and reports connectivity through [`client::RealtimeListener`]
//! hooks.

pub mod client;
pub mod hub;
pub mod sse;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use desa_sos_emergency_models::EmergencyEvent;

/// Path of the Server-Sent Events endpoint.
pub const EVENT_STREAM_PATH: &str = "/admin/realtime/emergencies";

/// Path of the long-polling endpoint.
pub const LONG_POLL_PATH: &str = "/admin/realtime/emergencies/poll";

/// Name of the session cookie carried by every realtime request.
pub const SESSION_COOKIE: &str = "session";

/// One long-poll response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBatch {
    /// Sequence number of the last event included, or the caller's own
    /// cursor when nothing new arrived. Sent back as `since` on the next
    /// poll.
    pub cursor: u64,
    /// Events published after the caller's cursor, oldest first.
    pub events: Vec<EmergencyEvent>,
}

/// How events are carried from the server to a dashboard.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transport {
    /// A single long-lived `text/event-stream` response.
    EventStream,
    /// Repeated requests that each wait for the next batch of events.
    LongPoll,
}

impl Transport {
    /// Default preference order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::EventStream, Self::LongPoll]
    }
}

/// Errors raised while connecting to or reading from the realtime channel.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The session cookie is missing or expired.
    #[error("Realtime channel rejected the session")]
    Unauthorized,

    /// The server refused the connection with a non-success status.
    #[error("Realtime channel refused the connection with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// Transport failure.
    #[error("Realtime transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// An event payload could not be decoded.
    #[error("Realtime payload error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The event stream sent more than `limit` bytes without ending a
    /// frame.
    #[error("Realtime frame exceeded {limit} bytes ({pending} pending)")]
    FrameTooLarge {
        /// Bytes buffered when the limit was hit.
        pending: usize,
        /// The configured limit.
        limit: usize,
    },
}

impl RealtimeError {
    /// Whether retrying cannot help (the credentials are the problem).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Rejected { status: 403 })
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Admin live map and dashboard.
//!
//! [`Dashboard`] holds the state an admin screen renders: the mirrored
//! report set, the list filter, the selected report with the map view
//! centered on it, and whether the realtime feed is live. The initial
//! list comes from the query API; after that the mirror is kept current
//! by realtime events alone. When the feed is down the dashboard is
//! [`ConnectionState::Degraded`] and the admin refreshes by hand.

pub mod map;
pub mod mirror;

use std::sync::Arc;

use desa_sos_client::{ClientError, EmergencyBackend};
use desa_sos_emergency_models::{EmergencyEvent, EmergencyReport};
use desa_sos_realtime::Transport;
use desa_sos_realtime::client::{DisconnectReason, RealtimeSignal};
use desa_sos_server_models::{ApiEmergencyCount, ListEmergenciesParams, MAX_PAGE_LIMIT};
use geojson::FeatureCollection;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::map::{MapConfig, MapView};
use crate::mirror::EmergencyMirror;

/// Errors raised while setting up a dashboard.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// The `[dashboard]` table could not be parsed.
    #[error("Invalid dashboard config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Dashboard settings, the `[dashboard]` table of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Map center and zoom levels.
    #[serde(flatten)]
    pub map: MapConfig,
    /// Reports fetched per list call.
    pub page_limit: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            map: MapConfig::default(),
            page_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl DashboardConfig {
    /// Reads the `[dashboard]` table of a TOML document. A missing table
    /// yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Config`] if the document is not valid.
    pub fn from_toml_str(text: &str) -> Result<Self, DashboardError> {
        #[derive(Deserialize)]
        struct Document {
            #[serde(default)]
            dashboard: DashboardConfig,
        }

        Ok(toml::from_str::<Document>(text)?.dashboard)
    }
}

/// Result of the last list fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// A fetch is in flight or none has finished yet.
    Loading,
    /// The mirror holds the last fetched list.
    Ready,
    /// The fetch failed; `retryable` is false when retrying cannot help,
    /// e.g. the session is gone.
    Failed {
        /// Whether another refresh may succeed.
        retryable: bool,
        /// Text to show the admin.
        message: String,
    },
}

/// Realtime feed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// The realtime client has not reported yet.
    Connecting,
    /// Events arrive over the given transport.
    Live(Transport),
    /// No feed; the list is only as fresh as the last manual refresh.
    Degraded(String),
}

/// Which reports the list and map show.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReportFilter {
    /// Reports not yet resolved.
    #[default]
    Unhandled,
    /// Every report.
    All,
}

impl ReportFilter {
    /// Whether `report` passes this filter.
    #[must_use]
    pub const fn matches(self, report: &EmergencyReport) -> bool {
        match self {
            Self::Unhandled => !report.is_handled,
            Self::All => true,
        }
    }

    const fn is_handled(self) -> Option<bool> {
        match self {
            Self::Unhandled => Some(false),
            Self::All => None,
        }
    }
}

/// State of one admin dashboard.
pub struct Dashboard {
    backend: Arc<dyn EmergencyBackend>,
    config: DashboardConfig,
    mirror: EmergencyMirror,
    load: LoadState,
    connection: ConnectionState,
    filter: ReportFilter,
    selected: Option<String>,
    view: MapView,
    counts: Option<ApiEmergencyCount>,
}

impl Dashboard {
    /// Creates a dashboard that has not fetched anything yet.
    #[must_use]
    pub fn new(backend: Arc<dyn EmergencyBackend>, config: DashboardConfig) -> Self {
        Self {
            backend,
            config,
            mirror: EmergencyMirror::new(),
            load: LoadState::Loading,
            connection: ConnectionState::Connecting,
            filter: ReportFilter::default(),
            selected: None,
            view: config.map.initial_view(),
            counts: None,
        }
    }

    /// Fetches the list for the current filter and replaces the mirror.
    /// Failures are kept in [`Dashboard::load_state`] rather than
    /// returned.
    pub async fn refresh(&mut self) {
        self.load = LoadState::Loading;

        let params = ListEmergenciesParams {
            page: Some(1),
            limit: Some(self.config.page_limit),
            is_handled: self.filter.is_handled(),
            status: None,
        };

        match self.backend.list(&params).await {
            Ok(list) => {
                log::debug!(
                    "Loaded {} of {} emergencies",
                    list.data.len(),
                    list.pagination.total
                );
                self.mirror.replace_all(list.data);
                self.load = LoadState::Ready;
                if self
                    .selected
                    .as_deref()
                    .is_some_and(|id| self.mirror.get(id).is_none())
                {
                    self.clear_selection();
                }
            }
            Err(e) => {
                log::error!("Failed to load emergencies: {e}");
                self.load = LoadState::Failed {
                    retryable: !matches!(e, ClientError::Unauthorized),
                    message: e.user_message(desa_sos_client::Locale::default()).to_string(),
                };
            }
        }
    }

    /// Fetches the badge counts.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the previous counts are kept.
    pub async fn refresh_counts(&mut self) -> Result<ApiEmergencyCount, ClientError> {
        let counts = self.backend.count().await?;
        self.counts = Some(counts);
        Ok(counts)
    }

    /// Changes the filter and refetches.
    pub async fn set_filter(&mut self, filter: ReportFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.refresh().await;
        }
    }

    /// Selects a report and centers the map on it when it has a location.
    /// Returns `false` for an unknown id.
    pub fn select(&mut self, id: &str) -> bool {
        let Some(report) = self.mirror.get(id) else {
            return false;
        };
        if let Some(view) = self.config.map.focus(report) {
            self.view = view;
        }
        self.selected = Some(id.to_string());
        true
    }

    /// Deselects the current report. The map view stays where it is.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Marks a report resolved, then refetches the list. The mirror is
    /// not touched until the server confirms; on failure the report stays
    /// as it was.
    ///
    /// # Errors
    ///
    /// Returns the backend error from the status update.
    pub async fn resolve(&mut self, id: &str) -> Result<EmergencyReport, ClientError> {
        let report = self.backend.acknowledge(id).await.inspect_err(|e| {
            log::warn!("Resolving emergency {id} failed: {e}");
        })?;
        self.refresh().await;
        Ok(report)
    }

    /// Applies one realtime signal.
    pub fn handle_signal(&mut self, signal: RealtimeSignal) {
        match signal {
            RealtimeSignal::Connected(transport) => {
                log::info!("Realtime feed live over {transport}");
                self.connection = ConnectionState::Live(transport);
            }
            RealtimeSignal::Disconnected(DisconnectReason::ClientDisconnect) => {
                self.connection = ConnectionState::Degraded("disconnected".to_string());
            }
            RealtimeSignal::Disconnected(reason) => {
                log::warn!("Realtime feed lost: {reason}");
                self.connection = ConnectionState::Degraded(reason.to_string());
            }
            RealtimeSignal::ConnectError(message) => {
                log::warn!("Realtime feed unavailable: {message}");
                self.connection = ConnectionState::Degraded(message);
            }
            RealtimeSignal::Event(event) => self.apply_event(&event),
        }
    }

    fn apply_event(&mut self, event: &EmergencyEvent) {
        if !self.mirror.apply(event) {
            return;
        }
        log::debug!("Applied {} for {}", event.name(), event.report_id());

        if matches!(event, EmergencyEvent::EmergencyDeleted(_))
            && self.selected.as_deref() == Some(event.report_id())
        {
            self.clear_selection();
        }
    }

    /// Waits for the next signal and applies it. Returns `false` once the
    /// channel is closed.
    pub async fn process_next(&mut self, signals: &mut UnboundedReceiver<RealtimeSignal>) -> bool {
        match signals.recv().await {
            Some(signal) => {
                self.handle_signal(signal);
                true
            }
            None => false,
        }
    }

    /// Applies every signal already queued. Returns how many were applied.
    pub fn drain(&mut self, signals: &mut UnboundedReceiver<RealtimeSignal>) -> usize {
        let mut applied = 0;
        while let Ok(signal) = signals.try_recv() {
            self.handle_signal(signal);
            applied += 1;
        }
        applied
    }

    /// Reports the list panel shows, newest first.
    pub fn visible(&self) -> impl Iterator<Item = &EmergencyReport> {
        let filter = self.filter;
        self.mirror.reports().iter().filter(move |r| filter.matches(r))
    }

    /// Map markers for the visible reports.
    #[must_use]
    pub fn markers(&self) -> FeatureCollection {
        map::markers(self.visible(), self.selected.as_deref())
    }

    /// Local copy of the fetched reports.
    #[must_use]
    pub const fn mirror(&self) -> &EmergencyMirror {
        &self.mirror
    }

    /// Outcome of the last list fetch.
    #[must_use]
    pub const fn load_state(&self) -> &LoadState {
        &self.load
    }

    /// Realtime feed status.
    #[must_use]
    pub const fn connection_state(&self) -> &ConnectionState {
        &self.connection
    }

    /// Whether the admin has to refresh by hand.
    #[must_use]
    pub const fn needs_manual_refresh(&self) -> bool {
        matches!(self.connection, ConnectionState::Degraded(_))
    }

    /// Active list filter.
    #[must_use]
    pub const fn filter(&self) -> ReportFilter {
        self.filter
    }

    /// Selected report, if it is still in the mirror.
    #[must_use]
    pub fn selected(&self) -> Option<&EmergencyReport> {
        self.selected.as_deref().and_then(|id| self.mirror.get(id))
    }

    /// Current map view.
    #[must_use]
    pub const fn view(&self) -> MapView {
        self.view
    }

    /// Badge counts from the last successful count fetch.
    #[must_use]
    pub const fn counts(&self) -> Option<ApiEmergencyCount> {
        self.counts
    }
}

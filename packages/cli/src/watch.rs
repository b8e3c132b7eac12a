//! Live feed for the admin console.
//!
//! Loads the unresolved list once, then prints every event as it arrives
//! until Ctrl-C. While the feed is down the list may be stale; it is
//! refetched when the feed comes back.

use std::sync::Arc;

use desa_sos_dashboard::{ConnectionState, Dashboard, LoadState};
use desa_sos_emergency_models::EmergencyEvent;
use desa_sos_realtime::Transport;
use desa_sos_realtime::client::{ChannelListener, RealtimeClient, RealtimeConfig, RealtimeSignal};

use crate::Settings;
use crate::admin::print_report;

/// `watch`
///
/// # Errors
///
/// Returns an error if the session prompt fails or the initial list cannot
/// be loaded.
pub async fn run(
    settings: &mut Settings,
    transports: Vec<Transport>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = settings.session()?;
    let api = settings.api()?;
    let mut dashboard = Dashboard::new(Arc::new(api), settings.dashboard);

    dashboard.refresh().await;
    if let LoadState::Failed { message, .. } = dashboard.load_state() {
        return Err(message.clone().into());
    }
    println!("{} unresolved reports", dashboard.visible().count());

    let mut config = RealtimeConfig::new(settings.url.clone(), Some(session));
    if !transports.is_empty() {
        config.transports = transports;
    }
    let (listener, mut signals) = ChannelListener::new();
    let mut connection = RealtimeClient::new(config).connect(Arc::new(listener));

    loop {
        tokio::select! {
            signal = signals.recv() => {
                let Some(signal) = signal else {
                    break;
                };
                let reconnected = matches!(signal, RealtimeSignal::Connected(_))
                    && dashboard.needs_manual_refresh();
                describe(&signal);
                dashboard.handle_signal(signal);
                if reconnected {
                    dashboard.refresh().await;
                }
                if let ConnectionState::Degraded(reason) = dashboard.connection_state() {
                    println!("Live feed unavailable ({reason}); list may be stale");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Stopping");
                break;
            }
        }
    }

    connection.disconnect();
    Ok(())
}

fn describe(signal: &RealtimeSignal) {
    match signal {
        RealtimeSignal::Connected(transport) => println!("Connected ({transport})"),
        RealtimeSignal::Disconnected(_) | RealtimeSignal::ConnectError(_) => {}
        RealtimeSignal::Event(EmergencyEvent::NewEmergency(report)) => {
            println!("\n*** NEW EMERGENCY ***");
            print_report(report);
        }
        RealtimeSignal::Event(EmergencyEvent::EmergencyUpdated(report)) => {
            println!("\n{} is now {}", report.id, report.status);
        }
        RealtimeSignal::Event(EmergencyEvent::EmergencyDeleted(deleted)) => {
            println!("\n{} was deleted", deleted.id);
        }
    }
}

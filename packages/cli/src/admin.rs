//! Admin console commands.

use std::sync::Arc;

use desa_sos_client::{EmergencyApiClient, EmergencyBackend as _};
use desa_sos_dashboard::Dashboard;
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus};
use desa_sos_server_models::ListEmergenciesParams;
use dialoguer::Confirm;

use crate::Settings;

fn print_header() {
    println!(
        "{:<36}  {:<11}  {:<19}  {:<16}  MESSAGE",
        "ID", "STATUS", "CREATED", "PHONE"
    );
    println!("{}", "-".repeat(110));
}

fn print_row(report: &EmergencyReport) {
    println!(
        "{:<36}  {:<11}  {:<19}  {:<16}  {}",
        report.id,
        report.status,
        report.created_at.format("%Y-%m-%d %H:%M:%S"),
        report.phone_number,
        report.message
    );
}

/// Prints every field of one report.
pub fn print_report(report: &EmergencyReport) {
    println!("ID:        {}", report.id);
    println!("Status:    {}", report.status);
    println!(
        "Reporter:  {}",
        report.reporter_name.as_deref().unwrap_or("-")
    );
    println!("Phone:     {}", report.phone_number);
    if report.coordinates().is_unresolved() {
        println!("Location:  unavailable");
    } else {
        println!("Location:  {}, {}", report.latitude, report.longitude);
    }
    println!("Message:   {}", report.message);
    println!("Created:   {}", report.created_at.to_rfc3339());
    println!("Updated:   {}", report.updated_at.to_rfc3339());
}

/// `types`
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
pub async fn types(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = EmergencyApiClient::new(settings.url.clone(), settings.session.clone());
    let types = api.emergency_types().await?;

    println!("{:<16} {:<20} DESCRIPTION", "KEY", "LABEL");
    println!("{}", "-".repeat(80));
    for entry in &types {
        println!("{:<16} {:<20} {}", entry.key, entry.label, entry.description);
    }
    Ok(())
}

/// `list`
///
/// # Errors
///
/// Returns an error if the list cannot be fetched.
pub async fn list(
    settings: &mut Settings,
    params: &ListEmergenciesParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let list = settings.api()?.list(params).await?;

    print_header();
    for report in &list.data {
        print_row(report);
    }
    println!(
        "\nPage {}/{} ({} reports)",
        list.pagination.page,
        list.pagination.total_pages.max(1),
        list.pagination.total
    );
    Ok(())
}

/// `show`
///
/// # Errors
///
/// Returns an error if the report cannot be fetched.
pub async fn show(settings: &mut Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = settings.api()?.get(id).await?;
    print_report(&report);
    Ok(())
}

/// `progress`
///
/// # Errors
///
/// Returns an error if the update is rejected.
pub async fn set_status(
    settings: &mut Settings,
    id: &str,
    status: EmergencyStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = settings.api()?.set_status(id, status).await?;
    println!("{} is now {}", report.id, report.status);
    Ok(())
}

/// `ack`: resolves through the dashboard so the list is refetched only
/// after the server confirms.
///
/// # Errors
///
/// Returns an error if the update is rejected.
pub async fn acknowledge(
    settings: &mut Settings,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = settings.api()?;
    let mut dashboard = Dashboard::new(Arc::new(api), settings.dashboard);

    let report = dashboard.resolve(id).await?;
    println!("{} is now {}", report.id, report.status);
    println!("{} unresolved reports left", dashboard.visible().count());
    Ok(())
}

/// `delete`
///
/// # Errors
///
/// Returns an error if the prompt fails or the report cannot be deleted.
pub async fn delete(
    settings: &mut Settings,
    id: &str,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = settings.api()?;

    if !yes
        && !Confirm::new()
            .with_prompt(format!("Delete emergency {id}?"))
            .default(false)
            .interact()?
    {
        println!("Aborted.");
        return Ok(());
    }

    api.delete(id).await?;
    println!("Deleted {id}");
    Ok(())
}

/// `count`
///
/// # Errors
///
/// Returns an error if the counts cannot be fetched.
pub async fn count(settings: &mut Settings) -> Result<(), Box<dyn std::error::Error>> {
    let counts = settings.api()?.count().await?;
    println!("Total:       {}", counts.total);
    println!("Open:        {}", counts.open);
    println!("In progress: {}", counts.in_progress);
    println!("Resolved:    {}", counts.resolved);
    println!("Unhandled:   {}", counts.unhandled);
    Ok(())
}

/// `map`
///
/// # Errors
///
/// Returns an error if the list cannot be fetched.
pub async fn map(settings: &mut Settings) -> Result<(), Box<dyn std::error::Error>> {
    let api = settings.api()?;
    let mut dashboard = Dashboard::new(Arc::new(api), settings.dashboard);
    dashboard.refresh().await;

    if let desa_sos_dashboard::LoadState::Failed { message, .. } = dashboard.load_state() {
        return Err(message.clone().into());
    }
    println!("{}", dashboard.markers());
    Ok(())
}

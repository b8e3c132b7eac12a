//! The SOS button.
//!
//! Press, confirm, choose the type, send. Cancelling the confirmation
//! counts toward the lockout, which is kept in the guard file so it
//! survives restarts.

use std::sync::Arc;

use desa_sos_client::geolocation::{FixedPosition, PositionProvider, UnsupportedPosition};
use desa_sos_client::{Locale, SosFlow, SubmissionForm};
use desa_sos_emergency_models::EmergencyType;
use desa_sos_guard::clock::SystemClock;
use desa_sos_guard::store::FileLockoutStore;
use desa_sos_guard::{AbuseGuard, CancelOutcome, PressOutcome};
use dialoguer::{Confirm, Input, Select};

use crate::Settings;

/// Options given on the command line.
pub struct SosArgs {
    pub kind: Option<EmergencyType>,
    pub info: Option<String>,
    pub phone: Option<String>,
    pub location: Option<(f64, f64)>,
    pub yes: bool,
}

/// Runs one press of the SOS button.
///
/// # Errors
///
/// Returns an error if the guard file cannot be used, a prompt fails or
/// the report cannot be sent.
pub async fn run(settings: &mut Settings, args: SosArgs) -> Result<(), Box<dyn std::error::Error>> {
    let locale = Locale::default();
    let guard = AbuseGuard::restore(
        Box::new(FileLockoutStore::new(settings.guard_file.clone())),
        Arc::new(SystemClock),
        settings.guard,
    )?;

    let geolocation: Arc<dyn PositionProvider> = match args.location {
        Some((latitude, longitude)) => Arc::new(FixedPosition {
            latitude,
            longitude,
        }),
        None => Arc::new(UnsupportedPosition),
    };
    let api = settings.api()?;
    let mut flow = SosFlow::new(Box::new(guard), Arc::new(api), geolocation);

    if let PressOutcome::Blocked { remaining_secs, .. } = flow.press()? {
        println!("Tombol SOS dikunci. Coba lagi dalam {remaining_secs} detik.");
        return Ok(());
    }

    let confirmed = args.yes
        || Confirm::new()
            .with_prompt("Kirim laporan darurat sekarang?")
            .default(false)
            .interact()?;

    if !confirmed {
        match flow.cancel()? {
            CancelOutcome::Cancelled { count } => {
                println!("Dibatalkan ({count}x).");
            }
            CancelOutcome::Warning { count } => {
                println!(
                    "Peringatan: Anda sudah membatalkan {count} kali. \
                     Penyalahgunaan tombol SOS akan dikunci sementara."
                );
            }
            CancelOutcome::Blocked {
                remaining_secs,
                force_logout_after,
                ..
            } => {
                println!(
                    "Terlalu banyak pembatalan. Tombol SOS dikunci selama {remaining_secs} detik."
                );
                tokio::time::sleep(force_logout_after).await;
                println!("Sesi diakhiri. Silakan masuk kembali.");
            }
        }
        return Ok(());
    }

    flow.confirm()?;

    let kind = match args.kind {
        Some(kind) => kind,
        None => select_type()?,
    };
    let info = match args.info {
        Some(info) => info,
        None if args.yes => String::new(),
        None => Input::new()
            .with_prompt("Keterangan tambahan (opsional)")
            .allow_empty(true)
            .interact_text()?,
    };

    let mut form = SubmissionForm::new()
        .with_type(kind)
        .with_additional_info(&info);
    if let Some(phone) = &args.phone {
        form = form.with_phone_number(phone);
    }

    println!("Mengirim laporan {}...", kind.label());
    match flow.submit(&form).await {
        Ok(report) => {
            println!("Laporan terkirim ({}).", report.id);
            if report.coordinates().is_unresolved() {
                println!("Lokasi tidak tersedia; petugas akan menghubungi {}.", report.phone_number);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Sending SOS failed: {e}");
            eprintln!("{}", e.user_message(locale));
            Err(e.into())
        }
    }
}

fn select_type() -> Result<EmergencyType, dialoguer::Error> {
    let labels: Vec<String> = EmergencyType::all()
        .iter()
        .map(|kind| format!("{} - {}", kind.label(), kind.description()))
        .collect();

    let idx = Select::new()
        .with_prompt("Jenis keadaan darurat")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(EmergencyType::all()[idx])
}

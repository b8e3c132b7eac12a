#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for desa-sos.
//!
//! `desa_sos sos` is the resident's SOS button: it runs the abuse guard,
//! asks for confirmation and the emergency type, and sends the report.
//! The remaining subcommands are the admin console: list, acknowledge and
//! delete reports, and `watch` the live feed.

mod admin;
mod sos;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use desa_sos_client::EmergencyApiClient;
use desa_sos_dashboard::DashboardConfig;
use desa_sos_emergency_models::{EmergencyStatus, EmergencyType};
use desa_sos_guard::GuardConfig;
use desa_sos_realtime::Transport;
use dialoguer::Password;

#[derive(Parser)]
#[command(name = "desa_sos", about = "Village emergency SOS client")]
struct Cli {
    /// Server origin
    #[arg(
        long,
        global = true,
        env = "DESA_SOS_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    url: String,

    /// Session token; prompted for when missing
    #[arg(long, global = true, env = "DESA_SOS_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// TOML file with `[guard]` and `[dashboard]` settings
    #[arg(
        long,
        global = true,
        env = "DESA_SOS_CONFIG",
        default_value = "desa_sos.toml"
    )]
    config: PathBuf,

    /// Where the SOS lockout is remembered between runs
    #[arg(
        long,
        global = true,
        env = "DESA_SOS_GUARD_FILE",
        default_value = desa_sos_guard::store::FileLockoutStore::DEFAULT_PATH
    )]
    guard_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Press the SOS button
    Sos {
        /// Emergency type key (e.g. `medis`); chosen interactively if omitted
        #[arg(long = "type")]
        kind: Option<EmergencyType>,
        /// Extra detail, up to 100 characters
        #[arg(long)]
        info: Option<String>,
        /// Contact number; defaults to the one on your profile
        #[arg(long)]
        phone: Option<String>,
        /// Latitude of the emergency
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        /// Longitude of the emergency
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// List the emergency types
    Types,
    /// List reports, newest first
    List {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        limit: u32,
        /// Include resolved reports
        #[arg(long)]
        all: bool,
        /// Only reports in this status (`OPEN`, `IN_PROGRESS`, `RESOLVED`)
        #[arg(long)]
        status: Option<EmergencyStatus>,
    },
    /// Show one report
    Show { id: String },
    /// Mark a report as being handled
    Progress { id: String },
    /// Mark a report resolved
    Ack { id: String },
    /// Delete a report
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Report counts
    Count,
    /// Print the unresolved reports as a `GeoJSON` `FeatureCollection`
    Map,
    /// Follow the live feed
    Watch {
        /// Transports to try, in order (`event_stream`, `long_poll`)
        #[arg(long, value_delimiter = ',')]
        transport: Vec<Transport>,
    },
}

/// Settings shared by every subcommand.
pub struct Settings {
    pub url: String,
    pub session: Option<String>,
    pub guard: GuardConfig,
    pub dashboard: DashboardConfig,
    pub guard_file: PathBuf,
}

impl Settings {
    fn load(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let (guard, dashboard) = match std::fs::read_to_string(&cli.config) {
            Ok(text) => (
                GuardConfig::from_toml_str(&text)?,
                DashboardConfig::from_toml_str(&text)?,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", cli.config.display());
                (GuardConfig::default(), DashboardConfig::default())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            url: cli.url.clone(),
            session: cli.session.clone(),
            guard,
            dashboard,
            guard_file: cli.guard_file.clone(),
        })
    }

    /// The session token, prompting for it if none was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails.
    pub fn session(&mut self) -> Result<String, dialoguer::Error> {
        if let Some(token) = &self.session {
            return Ok(token.clone());
        }
        let token = Password::new().with_prompt("Session token").interact()?;
        self.session = Some(token.clone());
        Ok(token)
    }

    /// API client carrying the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session prompt fails.
    pub fn api(&mut self) -> Result<EmergencyApiClient, dialoguer::Error> {
        let session = self.session()?;
        Ok(EmergencyApiClient::new(self.url.clone(), Some(session)))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();
    let mut settings = Settings::load(&cli)?;

    match cli.command {
        Commands::Sos {
            kind,
            info,
            phone,
            latitude,
            longitude,
            yes,
        } => {
            let request = sos::SosArgs {
                kind,
                info,
                phone,
                location: latitude.zip(longitude),
                yes,
            };
            sos::run(&mut settings, request).await?;
        }
        Commands::Types => admin::types(&settings).await?,
        Commands::List {
            page,
            limit,
            all,
            status,
        } => {
            let params = desa_sos_server_models::ListEmergenciesParams {
                page: Some(page),
                limit: Some(limit),
                is_handled: if all { None } else { Some(false) },
                status,
            };
            admin::list(&mut settings, &params).await?;
        }
        Commands::Show { id } => admin::show(&mut settings, &id).await?,
        Commands::Progress { id } => {
            admin::set_status(&mut settings, &id, EmergencyStatus::InProgress).await?;
        }
        Commands::Ack { id } => admin::acknowledge(&mut settings, &id).await?,
        Commands::Delete { id, yes } => admin::delete(&mut settings, &id, yes).await?,
        Commands::Count => admin::count(&mut settings).await?,
        Commands::Map => admin::map(&mut settings).await?,
        Commands::Watch { transport } => watch::run(&mut settings, transport).await?,
    }

    Ok(())
}

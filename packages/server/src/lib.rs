#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for village emergency (SOS) reports.
//!
//! Residents file reports under `/private`, admins list, count, move
//! through the status lifecycle and delete them under `/admin`, and every
//! change is pushed to connected admin dashboards over Server-Sent Events
//! or long-polling. Reports are persisted in a `SQLite` database at
//! `data/emergencies.db` unless configured otherwise.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod realtime;
pub mod service;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use desa_sos_database::sqlite::SqliteEmergencyStore;
use desa_sos_database::{DbError, EmergencyStore};
use desa_sos_realtime::hub::EventHub;

use crate::auth::SessionRegistry;
use crate::config::{ConfigError, RealtimeSettings, ServerConfig};
use crate::service::EmergencyService;

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be opened or seeded.
    #[error(transparent)]
    Store(#[from] DbError),

    /// Binding or serving failed.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state.
pub struct AppState {
    /// Emergency operations and the realtime hub.
    pub service: EmergencyService,
    /// Session lookup.
    pub sessions: SessionRegistry,
    /// Realtime tuning.
    pub realtime: RealtimeSettings,
}

impl AppState {
    /// Builds the state over an already-open store and records every
    /// configured session user in it so reports can show reporter names.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a user cannot be written.
    pub async fn new(
        store: Arc<dyn EmergencyStore>,
        sessions: SessionRegistry,
        realtime: RealtimeSettings,
    ) -> Result<Self, DbError> {
        for principal in sessions.principals() {
            store.upsert_user(&principal.to_user_row()).await?;
        }

        let hub = EventHub::new(realtime.capacity);
        Ok(Self {
            service: EmergencyService::new(store, hub),
            sessions,
            realtime,
        })
    }

    /// Opens the configured `SQLite` store and builds the state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or seeded.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, DbError> {
        log::info!("Opening emergency database at {}", config.database_path.display());
        let store = SqliteEmergencyStore::open(&config.database_path).await?;

        Self::new(
            Arc::new(store),
            SessionRegistry::from_entries(&config.sessions),
            config.realtime.clone(),
        )
        .await
    }
}

/// Registers every route. The state must already be attached to the app.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .service(
            web::scope("/public")
                .route("/emergency-types", web::get().to(handlers::emergency_types)),
        )
        .service(
            web::scope("/private")
                .route("/me", web::get().to(handlers::me))
                .route("/emergencies", web::post().to(handlers::create_emergency)),
        )
        .service(
            web::scope("/admin")
                .route("/emergencies", web::get().to(handlers::list_emergencies))
                .route(
                    "/emergencies/count",
                    web::get().to(handlers::count_emergencies),
                )
                .route("/emergencies/{id}", web::get().to(handlers::get_emergency))
                .route(
                    "/emergencies/{id}",
                    web::patch().to(handlers::update_emergency),
                )
                .route(
                    "/emergencies/{id}",
                    web::delete().to(handlers::delete_emergency),
                )
                .route(
                    "/realtime/emergencies",
                    web::get().to(realtime::event_stream),
                )
                .route("/realtime/emergencies/poll", web::get().to(realtime::poll)),
        );
}

/// Starts the emergency API server.
///
/// Loads configuration, opens the store and starts the Actix-Web HTTP
/// server. This is a regular async function; the caller provides the
/// runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if configuration or the store cannot be
/// loaded, or if the server fails to bind or run.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> Result<(), ServerError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::load()?;
    if config.sessions.is_empty() {
        log::warn!("No sessions configured; every private and admin request will be rejected");
    }

    let state = web::Data::new(AppState::from_config(&config).await?);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use desa_sos_database::memory::MemoryEmergencyStore;
    use desa_sos_emergency_models::{EmergencyEvent, EmergencyReport, EmergencyStatus};
    use desa_sos_realtime::{PollBatch, SESSION_COOKIE};
    use desa_sos_server_models::{
        ApiDeleted, ApiEmergencyCount, ApiEmergencyList, ApiEmergencyType, ApiError, ApiProfile,
        CreateEmergencyRequest, Role,
    };

    use super::*;
    use crate::auth::SessionEntry;

    async fn state() -> web::Data<AppState> {
        let sessions = SessionRegistry::from_entries(&[
            SessionEntry {
                token: "admin".to_string(),
                user_id: "admin-1".to_string(),
                display_name: "Pak Kades".to_string(),
                phone_number: None,
                role: Role::Admin,
            },
            SessionEntry {
                token: "warga".to_string(),
                user_id: "warga-1".to_string(),
                display_name: "Bu Sri".to_string(),
                phone_number: Some("081234567890".to_string()),
                role: Role::Warga,
            },
        ]);
        web::Data::new(
            AppState::new(
                Arc::new(MemoryEmergencyStore::new()),
                sessions,
                RealtimeSettings::default(),
            )
            .await
            .unwrap(),
        )
    }

    fn body(message: &str) -> CreateEmergencyRequest {
        CreateEmergencyRequest {
            phone_number: "081234567890".to_string(),
            latitude: Some("-7.80".to_string()),
            longitude: Some("110.37".to_string()),
            message: message.to_string(),
        }
    }

    fn session(token: &str) -> Cookie<'static> {
        Cookie::new(SESSION_COOKIE, token.to_string())
    }

    #[actix_web::test]
    async fn health_and_catalog_are_public() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/public/emergency-types")
            .to_request();
        let types: Vec<ApiEmergencyType> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(types.len(), 8);
    }

    #[actix_web::test]
    async fn private_routes_need_a_session() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/private/emergencies")
            .set_json(body("Banjir"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let err: ApiError = test::read_body_json(resp).await;
        assert_eq!(err.error, "unauthorized");
    }

    #[actix_web::test]
    async fn warga_creates_and_reads_profile() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::get()
            .uri("/private/me")
            .cookie(session("warga"))
            .to_request();
        let profile: ApiProfile = test::call_and_read_body_json(&app, req).await;
        assert_eq!(profile.phone_number.as_deref(), Some("081234567890"));

        let req = test::TestRequest::post()
            .uri("/private/emergencies")
            .cookie(session("warga"))
            .set_json(body("Banjir setinggi lutut"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let report: EmergencyReport = test::read_body_json(resp).await;
        assert_eq!(report.user_id.as_deref(), Some("warga-1"));
        assert_eq!(report.reporter_name.as_deref(), Some("Bu Sri"));
        assert_eq!(report.status, EmergencyStatus::Open);
    }

    #[actix_web::test]
    async fn invalid_report_is_bad_request() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/private/emergencies")
            .cookie(session("warga"))
            .set_json(body(""))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = test::read_body_json(resp).await;
        assert_eq!(err.error, "validation");
    }

    #[actix_web::test]
    async fn malformed_report_body_checks_session_first() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/private/emergencies")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"message\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let err: ApiError = test::read_body_json(resp).await;
        assert_eq!(err.error, "unauthorized");

        let req = test::TestRequest::post()
            .uri("/private/emergencies")
            .cookie(session("warga"))
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"message\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = test::read_body_json(resp).await;
        assert_eq!(err.error, "validation");
    }

    #[actix_web::test]
    async fn admin_routes_reject_warga() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::get()
            .uri("/admin/emergencies")
            .cookie(session("warga"))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::get()
            .uri("/admin/realtime/emergencies/poll?wait_secs=0")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn admin_lifecycle() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/private/emergencies")
            .cookie(session("warga"))
            .set_json(body("Kebakaran rumah"))
            .to_request();
        let created: EmergencyReport = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::get()
            .uri("/admin/emergencies?is_handled=false&limit=5")
            .cookie(session("admin"))
            .to_request();
        let list: ApiEmergencyList = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list.data.len(), 1);
        assert_eq!(list.pagination.limit, 5);

        let req = test::TestRequest::patch()
            .uri(&format!("/admin/emergencies/{}", created.id))
            .cookie(session("admin"))
            .set_json(serde_json::json!({ "status": "IN_PROGRESS" }))
            .to_request();
        let updated: EmergencyReport = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated.status, EmergencyStatus::InProgress);

        let req = test::TestRequest::patch()
            .uri(&format!("/admin/emergencies/{}", created.id))
            .cookie(session("admin"))
            .to_request();
        let resolved: EmergencyReport = test::call_and_read_body_json(&app, req).await;
        assert!(resolved.is_handled);

        let req = test::TestRequest::patch()
            .uri(&format!("/admin/emergencies/{}", created.id))
            .cookie(session("admin"))
            .set_json(serde_json::json!({ "status": "OPEN" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::get()
            .uri("/admin/emergencies/count")
            .cookie(session("admin"))
            .to_request();
        let counts: ApiEmergencyCount = test::call_and_read_body_json(&app, req).await;
        assert_eq!(counts.total, 1);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.unhandled, 0);

        let req = test::TestRequest::delete()
            .uri(&format!("/admin/emergencies/{}", created.id))
            .cookie(session("admin"))
            .to_request();
        let deleted: ApiDeleted = test::call_and_read_body_json(&app, req).await;
        assert_eq!(deleted.id, created.id);

        let req = test::TestRequest::get()
            .uri(&format!("/admin/emergencies/{}", created.id))
            .cookie(session("admin"))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn poll_returns_events_published_while_waiting() {
        let state = state().await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let publisher = state.clone();
        actix_rt::spawn(async move {
            actix_rt::time::sleep(std::time::Duration::from_millis(50)).await;
            publisher
                .service
                .create(None, body("Pohon tumbang"))
                .await
                .unwrap();
        });

        let req = test::TestRequest::get()
            .uri("/admin/realtime/emergencies/poll?wait_secs=5&since=0")
            .cookie(session("admin"))
            .to_request();
        let batch: PollBatch = test::call_and_read_body_json(&app, req).await;
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].name(), "new_emergency");
        assert_eq!(batch.cursor, 1);
    }

    #[actix_web::test]
    async fn events_between_polls_are_not_lost() {
        let state = state().await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::get()
            .uri("/admin/realtime/emergencies/poll?wait_secs=0")
            .cookie(session("admin"))
            .to_request();
        let handshake: PollBatch = test::call_and_read_body_json(&app, req).await;
        assert!(handshake.events.is_empty());

        // Nobody is waiting on the hub while these land.
        let first = state.service.create(None, body("Banjir")).await.unwrap();
        state
            .service
            .update_status(&first.id, EmergencyStatus::Resolved)
            .await
            .unwrap();

        let req = test::TestRequest::get()
            .uri(&format!(
                "/admin/realtime/emergencies/poll?wait_secs=5&since={}",
                handshake.cursor
            ))
            .cookie(session("admin"))
            .to_request();
        let batch: PollBatch = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = batch.events.iter().map(EmergencyEvent::name).collect();
        assert_eq!(names, ["new_emergency", "emergency_updated"]);

        let req = test::TestRequest::get()
            .uri(&format!(
                "/admin/realtime/emergencies/poll?wait_secs=0&since={}",
                batch.cursor
            ))
            .cookie(session("admin"))
            .to_request();
        let empty: PollBatch = test::call_and_read_body_json(&app, req).await;
        assert!(empty.events.is_empty());
        assert_eq!(empty.cursor, batch.cursor);
    }
}

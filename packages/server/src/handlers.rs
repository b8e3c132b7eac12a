//! HTTP handler functions for the emergency API.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use desa_sos_emergency_models::EmergencyType;
use desa_sos_server_models::{
    ApiDeleted, ApiEmergencyCount, ApiEmergencyType, ApiError, ApiHealth,
    CreateEmergencyRequest, ListEmergenciesParams, UpdateEmergencyRequest,
};

use crate::AppState;
use crate::service::ServiceError;

/// Maps a service error to its status code and JSON body.
///
/// Store failures are logged here and reported without their details.
pub fn error_response(err: &ServiceError) -> HttpResponse {
    let status = match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ServiceError::Forbidden => StatusCode::FORBIDDEN,
        ServiceError::Store(e) => {
            log::error!("Emergency store failure: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let message = match err {
        ServiceError::Store(_) => "Internal server error".to_string(),
        other => other.to_string(),
    };

    HttpResponse::build(status).json(ApiError {
        error: err.kind().to_string(),
        message,
    })
}

/// `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /public/emergency-types`
///
/// Returns the fixed emergency type catalog.
pub async fn emergency_types() -> HttpResponse {
    let types: Vec<ApiEmergencyType> = EmergencyType::all()
        .iter()
        .copied()
        .map(ApiEmergencyType::from)
        .collect();

    HttpResponse::Ok().json(types)
}

/// `GET /private/me`
pub async fn me(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match state.sessions.authenticate(&req) {
        Ok(principal) => HttpResponse::Ok().json(principal.to_profile()),
        Err(e) => error_response(&e),
    }
}

/// `POST /private/emergencies`
///
/// Records a new report for the session user and broadcasts it.
pub async fn create_emergency(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let principal = match state.sessions.authenticate(&req) {
        Ok(principal) => principal,
        Err(e) => return error_response(&e),
    };

    let request: CreateEmergencyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(&ServiceError::Validation(format!(
                "invalid request body: {e}"
            )));
        }
    };

    match state
        .service
        .create(Some(principal.user_id), request)
        .await
    {
        Ok(report) => HttpResponse::Created().json(report),
        Err(e) => error_response(&e),
    }
}

/// `GET /admin/emergencies`
///
/// Paginated list, newest first, optionally filtered by handled flag or
/// status.
pub async fn list_emergencies(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<ListEmergenciesParams>,
) -> HttpResponse {
    if let Err(e) = state.sessions.require_admin(&req) {
        return error_response(&e);
    }

    match state.service.list(&params).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => error_response(&e),
    }
}

/// `GET /admin/emergencies/count`
pub async fn count_emergencies(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Err(e) = state.sessions.require_admin(&req) {
        return error_response(&e);
    }

    match state.service.count().await {
        Ok(counts) => HttpResponse::Ok().json(ApiEmergencyCount::from(counts)),
        Err(e) => error_response(&e),
    }
}

/// `GET /admin/emergencies/{id}`
pub async fn get_emergency(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = state.sessions.require_admin(&req) {
        return error_response(&e);
    }

    match state.service.get(&path).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => error_response(&e),
    }
}

/// `PATCH /admin/emergencies/{id}`
///
/// The body is optional; without one the report is resolved.
pub async fn update_emergency(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    if let Err(e) = state.sessions.require_admin(&req) {
        return error_response(&e);
    }

    let update: UpdateEmergencyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        UpdateEmergencyRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(update) => update,
            Err(e) => {
                return error_response(&ServiceError::Validation(format!(
                    "invalid request body: {e}"
                )));
            }
        }
    };

    match state.service.update_status(&path, update.target()).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => error_response(&e),
    }
}

/// `DELETE /admin/emergencies/{id}`
pub async fn delete_emergency(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = state.sessions.require_admin(&req) {
        return error_response(&e);
    }

    let id = path.into_inner();
    match state.service.delete(&id).await {
        Ok(()) => HttpResponse::Ok().json(ApiDeleted { id }),
        Err(e) => error_response(&e),
    }
}

//! HTTP implementation of [`EmergencyBackend`].

use async_trait::async_trait;
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus};
use desa_sos_realtime::SESSION_COOKIE;
use desa_sos_server_models::{
    ApiDeleted, ApiEmergencyCount, ApiEmergencyList, ApiEmergencyType, ApiError, ApiProfile,
    CreateEmergencyRequest, ListEmergenciesParams, UpdateEmergencyRequest,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;

use crate::backend::EmergencyBackend;
use crate::error::ClientError;

/// Whether a failed call was a read or a write; they map to different
/// error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation<'a> {
    Read { id: Option<&'a str> },
    Write { id: Option<&'a str> },
}

impl<'a> Operation<'a> {
    const fn id(self) -> Option<&'a str> {
        match self {
            Self::Read { id } | Self::Write { id } => id,
        }
    }
}

/// Maps a non-success response to the client error taxonomy.
fn classify(status: StatusCode, body: Option<ApiError>, operation: Operation<'_>) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound {
            id: operation.id().unwrap_or_default().to_string(),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation {
            message: body.map_or_else(|| "request rejected".to_string(), |b| b.message),
        },
        _ => match operation {
            Operation::Read { .. } => ClientError::Fetch {
                status: status.as_u16(),
            },
            Operation::Write { .. } => ClientError::General {
                status: status.as_u16(),
                message: body.map_or_else(|| status.to_string(), |b| b.message),
            },
        },
    }
}

/// Client for the emergency REST API.
#[derive(Debug, Clone)]
pub struct EmergencyApiClient {
    base_url: String,
    session: Option<String>,
    client: reqwest::Client,
}

impl EmergencyApiClient {
    /// Creates a client for the server at `base_url`, authenticating with
    /// the `session` cookie when given.
    #[must_use]
    pub fn new(base_url: impl Into<String>, session: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            client: reqwest::Client::new(),
        }
    }

    /// Server origin.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Session token, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.session {
            Some(token) => builder.header(header::COOKIE, format!("{SESSION_COOKIE}={token}")),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: Operation<'_>,
    ) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let response = check(response, operation).await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| undecodable(status, &e, operation))
    }
}

/// Maps a success response whose body does not decode to the same error
/// kinds `classify` uses for failed statuses.
fn undecodable(
    status: StatusCode,
    err: &serde_json::Error,
    operation: Operation<'_>,
) -> ClientError {
    log::warn!("Emergency API returned an unreadable {status} body: {err}");
    match operation {
        Operation::Read { .. } => ClientError::Fetch {
            status: status.as_u16(),
        },
        Operation::Write { .. } => ClientError::General {
            status: status.as_u16(),
            message: "unreadable response body".to_string(),
        },
    }
}

async fn check(response: Response, operation: Operation<'_>) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ApiError>().await.ok();
    let err = classify(status, body, operation);
    log::warn!("Emergency API call failed: {err}");
    Err(err)
}

#[async_trait]
impl EmergencyBackend for EmergencyApiClient {
    async fn create(&self, request: &CreateEmergencyRequest) -> Result<EmergencyReport, ClientError> {
        let builder = self
            .request(Method::POST, "/private/emergencies")
            .json(request);
        self.send(builder, Operation::Write { id: None }).await
    }

    async fn list(&self, params: &ListEmergenciesParams) -> Result<ApiEmergencyList, ClientError> {
        let builder = self.request(Method::GET, "/admin/emergencies").query(params);
        self.send(builder, Operation::Read { id: None }).await
    }

    async fn get(&self, id: &str) -> Result<EmergencyReport, ClientError> {
        let builder = self.request(Method::GET, &format!("/admin/emergencies/{id}"));
        self.send(builder, Operation::Read { id: Some(id) }).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: EmergencyStatus,
    ) -> Result<EmergencyReport, ClientError> {
        let builder = self
            .request(Method::PATCH, &format!("/admin/emergencies/{id}"))
            .json(&UpdateEmergencyRequest {
                status: Some(status),
            });
        self.send(builder, Operation::Write { id: Some(id) }).await
    }

    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let builder = self.request(Method::DELETE, &format!("/admin/emergencies/{id}"));
        let _: ApiDeleted = self.send(builder, Operation::Write { id: Some(id) }).await?;
        Ok(())
    }

    async fn count(&self) -> Result<ApiEmergencyCount, ClientError> {
        let builder = self.request(Method::GET, "/admin/emergencies/count");
        self.send(builder, Operation::Read { id: None }).await
    }

    async fn profile(&self) -> Result<ApiProfile, ClientError> {
        let builder = self.request(Method::GET, "/private/me");
        self.send(builder, Operation::Read { id: None }).await
    }

    async fn emergency_types(&self) -> Result<Vec<ApiEmergencyType>, ClientError> {
        let builder = self.request(Method::GET, "/public/emergency-types");
        self.send(builder, Operation::Read { id: None }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(message: &str) -> Option<ApiError> {
        Some(ApiError {
            error: "x".to_string(),
            message: message.to_string(),
        })
    }

    #[test]
    fn auth_failures_are_unauthorized() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(
                classify(status, None, Operation::Write { id: None }),
                ClientError::Unauthorized
            ));
        }
    }

    #[test]
    fn not_found_carries_the_id() {
        let err = classify(StatusCode::NOT_FOUND, None, Operation::Write { id: Some("abc") });
        assert!(matches!(err, ClientError::NotFound { id } if id == "abc"));
    }

    #[test]
    fn bad_request_is_validation_with_server_text() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            body("message is required"),
            Operation::Write { id: None },
        );
        assert!(matches!(err, ClientError::Validation { message } if message == "message is required"));
    }

    #[test]
    fn server_errors_split_by_operation() {
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, None, Operation::Read { id: None }),
            ClientError::Fetch { status: 502 }
        ));
        assert!(matches!(
            classify(
                StatusCode::INTERNAL_SERVER_ERROR,
                body("Internal server error"),
                Operation::Write { id: None }
            ),
            ClientError::General { status: 500, .. }
        ));
    }

    async fn serve_malformed_json() -> (String, actix_web::dev::ServerHandle) {
        use actix_web::{App, HttpResponse, HttpServer, web};

        let server = HttpServer::new(|| {
            App::new().default_service(web::to(|| async {
                HttpResponse::Ok()
                    .content_type("application/json")
                    .body("{\"data\": [")
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);

        (format!("http://{addr}"), handle)
    }

    #[actix_web::test]
    async fn malformed_success_body_is_not_a_network_error() {
        let (base_url, server) = serve_malformed_json().await;
        let client = EmergencyApiClient::new(base_url, Some("token".to_string()));

        assert!(matches!(
            client.count().await,
            Err(ClientError::Fetch { status: 200 })
        ));
        assert!(matches!(
            client.get("abc").await,
            Err(ClientError::Fetch { status: 200 })
        ));
        assert!(matches!(
            client.delete("abc").await,
            Err(ClientError::General { status: 200, .. })
        ));

        server.stop(true).await;
    }

    #[test]
    fn base_url_is_normalized() {
        let client = EmergencyApiClient::new("http://localhost:8080/", None);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}

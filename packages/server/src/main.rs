#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server binary for desa-sos emergency reports.

#[actix_web::main]
async fn main() -> Result<(), desa_sos_server::ServerError> {
    desa_sos_server::run_server().await
}

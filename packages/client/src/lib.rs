#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Resident-side emergency client.
//!
//! A report goes through [`flow::SosFlow`]: the abuse guard has to be
//! armed, the [`form::SubmissionForm`] has to name a type, a position is
//! attempted with [`geolocation::acquire`], and the request is sent through
//! an [`backend::EmergencyBackend`], normally [`api::EmergencyApiClient`].

pub mod api;
pub mod backend;
pub mod error;
pub mod flow;
pub mod form;
pub mod geolocation;

pub use api::EmergencyApiClient;
pub use backend::EmergencyBackend;
pub use error::{ClientError, Locale};
pub use flow::SosFlow;
pub use form::SubmissionForm;

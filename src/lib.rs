//! Client for the CoCalc API and batch administration of course projects.
//!
//! Every API operation is a JSON POST to `{base_url}/api/v1/{operation}`
//! authenticated with the API key as basic-auth user name.

pub mod accounts;
pub mod batch;
pub mod client;
pub mod config;
pub mod course;
pub mod error;
pub mod exec;
pub mod ident;
pub mod projects;
pub mod responses;

pub use accounts::Invitation;
pub use client::{CallOverrides, CocalcClient, HttpTransport, Transport};
pub use config::UserConfig;
pub use error::{CocalcError, EntityKind, Result};
pub use exec::ExecOptions;
pub use ident::Ident;
pub use projects::{ProjectUsers, Upgrades, WakePolicy};
pub use responses::ExecOutput;

//! NextGCore MME Mobility and Session Control Core
//!
//! This crate holds the parts of the MME that decide which identity and which
//! session resources a UE gets, and keeps them consistent as the UE moves and
//! sets up or tears down sessions.
//!
//! # Features
//!
//! - GUTI reallocation with collision-checked M-TMSI allocation
//! - UE TAI list construction and incremental maintenance
//! - Local / neighbor MME tracking area checks
//! - EPS bearer context lifecycle with cascading default bearer release
//! - Multi-key UE context store (MME UE S1AP ID, IMSI, GUTI)
//! - Versioned capability snapshot built from the YAML configuration
//!
//! # Example
//!
//! ```rust
//! use mme_core::bearer_manager::{create_bearer, release_bearer, BearerRequest, ReleaseTarget};
//! use mme_core::ue_context::MmeUe;
//!
//! let mut ue = MmeUe::new(1);
//! let cid = ue.create_pdn_connection("internet", false).unwrap();
//!
//! let default = BearerRequest { pdn_cid: cid, ebi: 5, is_default: true, qci: 9, ..Default::default() };
//! let dedicated = BearerRequest { pdn_cid: cid, ebi: 6, qci: 1, ..Default::default() };
//! create_bearer(&mut ue, default).unwrap();
//! create_bearer(&mut ue, dedicated).unwrap();
//!
//! // Releasing the default bearer takes the dedicated bearer with it
//! assert_eq!(release_bearer(&mut ue, ReleaseTarget::ByIdentity(5)).unwrap(), 5);
//! assert_eq!(ue.n_active_ebrs(), 0);
//! ```

pub mod api;
pub mod bearer;
pub mod bearer_manager;
pub mod config;
pub mod error;
pub mod identity;
pub mod snapshot;
pub mod tai_list;
pub mod task;
pub mod tmsi;
pub mod types;
pub mod ue_context;
pub mod ue_store;

#[cfg(test)]
mod property_tests;

pub use config::{ConfigError, MmeConfig};
pub use error::{MmeError, MmeResult};
pub use snapshot::{CapabilitySnapshot, SnapshotHandle};
pub use task::{MmeEvent, MmeTask};

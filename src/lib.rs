//! Clinic-to-clinic patient referral bridge
//!
//! Sends a patient's demographic record to another clinic as a pipe-delimited
//! clinical message over TCP, and turns referrals received from other clinics
//! into local patient records.
//!
//! # Quick Start
//!
//! ## Referring a patient
//!
//! ```no_run
//! use clinic_referral::config::ClinicEndpoint;
//! use clinic_referral::io::ReferralClient;
//! use clinic_referral::patient::Patient;
//! use clinic_referral::AcknowledgmentResult;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), clinic_referral::ReferralError> {
//! let client = ReferralClient::builder().facility("CLINIC_A").build();
//! let patient = Patient::new("p-1", "john", "doe", "j@d.com");
//!
//! match client
//!     .send_referral(&patient, "CLINIC_B", &ClinicEndpoint::new("10.0.0.5", 7777))
//!     .await?
//! {
//!     AcknowledgmentResult::Accepted => println!("accepted"),
//!     AcknowledgmentResult::Rejected(reason) => println!("rejected: {}", reason),
//!     AcknowledgmentResult::TransportFailed(reason) => println!("not delivered: {}", reason),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Receiving referrals
//!
//! ```no_run
//! use clinic_referral::config::ReferralConfig;
//! use clinic_referral::inbound::InboundMessageHandler;
//! use clinic_referral::io::ReferralListener;
//! use clinic_referral::store::InMemoryPatientStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), clinic_referral::ReferralError> {
//! let config = ReferralConfig::from_env();
//! let handler = Arc::new(InboundMessageHandler::new(InMemoryPatientStore::new()));
//! ReferralListener::bind(&config).await?.run(handler).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **`protocol`** - Message model and wire codec (no I/O)
//!   - `header` - Delimiters, message type, header segment, control ids
//!   - `message` - Segments, fields, components; `encode`/`decode`
//!   - `types` - Referral and acknowledgment messages
//! - **`mapping`** - Patient record to/from the demographic segment
//! - **`io`** - TCP client, listener and stream framing
//! - **`inbound`** - Filter, decode, deduplicate and create received patients
//! - **`store`** - Patient store interface and an in-memory implementation
//! - **`config`** - Facility identity, ports and timeouts
//! - **`error`** - [`ReferralError`] and the store's [`StoreError`]
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result<T, ReferralError>`](Result). An
//! outbound referral has three distinct outcomes, reported by
//! [`AcknowledgmentResult`]: accepted, rejected by the remote clinic, or not
//! delivered at all.

pub mod config;
pub mod error;
pub mod inbound;
pub mod io;
pub mod mapping;
pub mod patient;
pub mod protocol;
pub mod store;

// Re-export main types for convenience
pub use config::{ClinicEndpoint, ReferralConfig};
pub use error::{ReferralError, Result, StoreError, StoreErrorKind};
pub use inbound::{InboundMessage, InboundMessageHandler, InboundOutcome};
pub use patient::{Address, Gender, InboundPatientRecord, Patient};
pub use protocol::types::{AcknowledgmentResult, ReferralRequest};
pub use store::{InMemoryPatientStore, PatientStore};

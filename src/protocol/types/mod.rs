//! Message types exchanged between clinics
//!
//! - **referral** - `ADT^A01` carrying one patient's demographics
//! - **ack** - `ACK` with accept/reject code and optional error reason

pub mod ack;
pub mod referral;

pub use ack::{
    acknowledged_control_id, build_ack, interpret_ack, AckCode, AckOutcome, AcknowledgmentResult,
};
pub use referral::{build_referral, ReferralRequest};

//! Network I/O for clinic-to-clinic referrals
//!
//! - [`ReferralClient`] sends a referral and waits for the acknowledgment
//! - [`ReferralListener`] accepts referrals from other clinics
//! - [`framing`] wraps messages for the TCP stream

pub mod client;
pub mod framing;
pub mod listener;

pub use client::{FacilityConfigured, ReferralClient, ReferralClientBuilder, Unspecified};
pub use listener::{ReferralConnection, ReferralListener};

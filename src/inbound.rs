//! Inbound referral handling
//!
//! Invoked by the listener once per received message. Each message is handled
//! in a single step: filter, decode, deduplicate, create. Nothing is kept
//! between messages.
//!
//! The duplicate check and the create are not atomic. Two messages for the same
//! identity may both pass the check; the store's uniqueness constraint decides
//! which one wins and the loser surfaces as a [`ReferralError::Store`] error.

use crate::error::{ReferralError, Result};
use crate::mapping;
use crate::patient::Patient;
use crate::protocol::header::MessageCategory;
use crate::protocol::message::{ClinicalMessage, SegmentKind};
use crate::store::PatientStore;
use bytes::Bytes;
use tracing::{debug, info, trace, warn};

/// A message as delivered by the listener
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Facility that sent the message
    pub sender_facility: String,
    /// Category declared by the message header
    pub category: MessageCategory,
    /// Raw message bytes, without framing
    pub payload: Option<Bytes>,
}

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Not a referral, or no payload; nothing was done
    Ignored,
    /// A new patient record was created
    Created(Patient),
}

/// Turns received referrals into local patient records
pub struct InboundMessageHandler<S> {
    store: S,
}

impl<S: PatientStore> InboundMessageHandler<S> {
    /// Handler writing to `store`
    pub fn new(store: S) -> Self {
        InboundMessageHandler { store }
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle one inbound message
    ///
    /// # Returns
    /// - `Ignored` when the category is not admit/transfer/discharge or the
    ///   payload is absent; the store is not touched
    /// - `Created(patient)` when a new record was stored
    ///
    /// # Errors
    /// - [`ReferralError::Decoding`] for malformed bytes or a missing demographic segment
    /// - [`ReferralError::Validation`] for a missing email or name
    /// - [`ReferralError::DuplicateRecord`] when the identity already exists;
    ///   `create` is not called
    /// - [`ReferralError::Store`] for store failures, unchanged
    pub async fn handle(&self, message: InboundMessage) -> Result<InboundOutcome> {
        debug!(
            sender = %message.sender_facility,
            category = %message.category,
            "Inbound message received"
        );

        if message.category != MessageCategory::Adt {
            debug!(category = %message.category, "Ignoring non-ADT message");
            return Ok(InboundOutcome::Ignored);
        }
        let payload = match message.payload {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                debug!(sender = %message.sender_facility, "Ignoring message without payload");
                return Ok(InboundOutcome::Ignored);
            }
        };

        let decoded = ClinicalMessage::decode(&payload)?;
        let demographic = decoded
            .segment(&SegmentKind::Demographic)
            .ok_or_else(|| ReferralError::Decoding("missing demographic segment".to_string()))?;
        let record = mapping::to_domain(demographic)?;
        trace!(record = ?record, "Demographic segment decoded");

        if let Some(existing) = self.store.find_by_identity(&record.email).await? {
            warn!(
                sender = %message.sender_facility,
                existing_id = %existing.id,
                "Rejecting duplicate patient"
            );
            return Err(ReferralError::DuplicateRecord {
                identity: record.email,
            });
        }

        let patient = self.store.create(record).await?;
        info!(
            sender = %message.sender_facility,
            control_id = %decoded.control_id(),
            patient_id = %patient.id,
            "Patient created from referral"
        );
        Ok(InboundOutcome::Created(patient))
    }
}

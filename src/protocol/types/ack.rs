//! Acknowledgment messages
//!
//! An acknowledgment mirrors the request's shape: a header (`ACK`), an `MSA`
//! segment carrying the accept/reject code and the echoed control id, and on
//! rejection an `ERR` segment carrying the free-text reason.

use crate::error::{ReferralError, Result};
use crate::protocol::header::{MessageHeader, MessageType};
use crate::protocol::message::{ClinicalMessage, Field, Segment, SegmentKind};
use std::fmt;
use tracing::warn;

const MSA_CODE: usize = 0;
const MSA_CONTROL_ID: usize = 1;
const MSA_TEXT: usize = 2;
const ERR_TEXT: usize = 0;

/// Acknowledgment code carried in the `MSA` segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// `AA` - application accept
    ApplicationAccept,
    /// `AE` - application error
    ApplicationError,
    /// `AR` - application reject
    ApplicationReject,
    /// `CA` - commit accept
    CommitAccept,
    /// `CE` - commit error
    CommitError,
    /// `CR` - commit reject
    CommitReject,
}

impl AckCode {
    /// Wire code
    pub fn code(self) -> &'static str {
        match self {
            AckCode::ApplicationAccept => "AA",
            AckCode::ApplicationError => "AE",
            AckCode::ApplicationReject => "AR",
            AckCode::CommitAccept => "CA",
            AckCode::CommitError => "CE",
            AckCode::CommitReject => "CR",
        }
    }

    /// Code for a wire value
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "AA" => Some(AckCode::ApplicationAccept),
            "AE" => Some(AckCode::ApplicationError),
            "AR" => Some(AckCode::ApplicationReject),
            "CA" => Some(AckCode::CommitAccept),
            "CE" => Some(AckCode::CommitError),
            "CR" => Some(AckCode::CommitReject),
            _ => None,
        }
    }

    /// True for `AA` and `CA`
    pub fn is_accept(self) -> bool {
        matches!(self, AckCode::ApplicationAccept | AckCode::CommitAccept)
    }
}

/// Outcome of one referral transmission
///
/// `Rejected` means the referral arrived and was declined; `TransportFailed`
/// means delivery is unknown. Callers deciding whether to retry must tell the
/// two apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcknowledgmentResult {
    /// The remote accepted the referral
    Accepted,
    /// The remote declined; carries its error text verbatim
    Rejected(String),
    /// Connection/IO failure or unreadable reply
    TransportFailed(String),
}

impl AcknowledgmentResult {
    /// True for [`Accepted`](Self::Accepted)
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcknowledgmentResult::Accepted)
    }

    /// Convert into a `Result`, keeping rejection and transport failure distinct
    ///
    /// # Examples
    ///
    /// ```
    /// use clinic_referral::protocol::types::AcknowledgmentResult;
    /// use clinic_referral::ReferralError;
    ///
    /// let result = AcknowledgmentResult::Rejected("Unknown facility".to_string());
    /// assert!(matches!(result.into_result(), Err(ReferralError::Rejected(_))));
    /// ```
    pub fn into_result(self) -> Result<()> {
        match self {
            AcknowledgmentResult::Accepted => Ok(()),
            AcknowledgmentResult::Rejected(reason) => Err(ReferralError::Rejected(reason)),
            AcknowledgmentResult::TransportFailed(reason) => {
                Err(ReferralError::TransportFailed(reason))
            }
        }
    }
}

impl fmt::Display for AcknowledgmentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcknowledgmentResult::Accepted => write!(f, "accepted"),
            AcknowledgmentResult::Rejected(reason) => write!(f, "rejected: {}", reason),
            AcknowledgmentResult::TransportFailed(reason) => {
                write!(f, "transport failed: {}", reason)
            }
        }
    }
}

/// Interpret a decoded reply
///
/// Only an `ERR` segment means rejection, with its first field as the reason.
/// A reply without one is acceptance, even when its `MSA` code is not an
/// accept code; that case is logged.
pub fn interpret_ack(message: &ClinicalMessage) -> AcknowledgmentResult {
    if let Some(err) = message.segment(&SegmentKind::Error) {
        let text = err
            .field(ERR_TEXT)
            .map(|f| f.joined(message.delimiters().component))
            .unwrap_or_default();
        return AcknowledgmentResult::Rejected(text);
    }

    if let Some(msa) = message.segment(&SegmentKind::Acknowledgment) {
        let code = msa.text(MSA_CODE, 0);
        if let Some(code) = AckCode::from_code(&code).filter(|c| !c.is_accept()) {
            warn!(
                code = code.code(),
                text = %msa.text(MSA_TEXT, 0),
                control_id = %msa.text(MSA_CONTROL_ID, 0),
                "Non-accept acknowledgment code without error segment, treating as accepted"
            );
        }
    }

    AcknowledgmentResult::Accepted
}

/// Control id echoed by the reply's `MSA` segment, if any
pub fn acknowledged_control_id(message: &ClinicalMessage) -> Option<String> {
    message
        .segment(&SegmentKind::Acknowledgment)
        .map(|msa| msa.text(MSA_CONTROL_ID, 0))
        .filter(|id| !id.is_empty())
}

/// What the acknowledgment should say
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome<'a> {
    /// Message processed
    Accept,
    /// Message understood but processing failed
    Error(&'a str),
    /// Message could not be understood
    Reject(&'a str),
}

/// Build the acknowledgment for a received message
///
/// # Arguments
/// * `request` - Header of the message being acknowledged, when it could be decoded
/// * `outcome` - Accept, or error/reject with a reason
/// * `application` - This clinic's application name
/// * `facility` - This clinic's facility id
/// * `control_id` - Control id of the acknowledgment itself
pub fn build_ack(
    request: Option<&MessageHeader>,
    outcome: AckOutcome<'_>,
    application: &str,
    facility: &str,
    control_id: &str,
) -> Result<ClinicalMessage> {
    let trigger = request
        .map(|h| h.message_type.trigger.as_str())
        .unwrap_or_default();
    let mut header = MessageHeader::new(
        MessageType::ack(trigger),
        application,
        facility,
        request.map(|h| h.sending_facility.as_str()).unwrap_or_default(),
        control_id,
    );
    header.receiving_application = request
        .map(|h| h.sending_application.clone())
        .unwrap_or_default();
    let acknowledged = request.map(|h| h.control_id.as_str()).unwrap_or_default();

    let mut message = ClinicalMessage::new(header);
    match outcome {
        AckOutcome::Accept => {
            message.push(Segment::with_fields(
                SegmentKind::Acknowledgment,
                vec![
                    Field::new(AckCode::ApplicationAccept.code()),
                    Field::new(acknowledged),
                ],
            ))?;
        }
        AckOutcome::Error(reason) | AckOutcome::Reject(reason) => {
            let code = if matches!(outcome, AckOutcome::Error(_)) {
                AckCode::ApplicationError
            } else {
                AckCode::ApplicationReject
            };
            let reason = single_line(reason);
            message.push(Segment::with_fields(
                SegmentKind::Acknowledgment,
                vec![
                    Field::new(code.code()),
                    Field::new(acknowledged),
                    Field::new(reason.as_str()),
                ],
            ))?;
            message.push(Segment::with_fields(
                SegmentKind::Error,
                vec![Field::new(reason)],
            ))?;
        }
    }
    Ok(message)
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

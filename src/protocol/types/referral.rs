//! Referral message construction

use crate::error::{ReferralError, Result};
use crate::mapping;
use crate::patient::Patient;
use crate::protocol::header::{ControlIdGenerator, MessageHeader, MessageType};
use crate::protocol::message::ClinicalMessage;
use serde::{Deserialize, Serialize};

/// Metadata of one referral transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRequest {
    /// Local id of the referred patient
    pub patient_id: String,
    /// Referring clinic (sending facility)
    pub source_clinic_id: String,
    /// Receiving clinic (receiving facility)
    pub destination_clinic_id: String,
    /// Unique per transmission; correlates the acknowledgment
    pub control_id: String,
}

impl ReferralRequest {
    /// Request for `patient` with a fresh control id from `control_ids`
    pub fn new(
        patient: &Patient,
        source_clinic_id: &str,
        destination_clinic_id: &str,
        control_ids: &ControlIdGenerator,
    ) -> Self {
        ReferralRequest {
            patient_id: patient.id.clone(),
            source_clinic_id: source_clinic_id.to_string(),
            destination_clinic_id: destination_clinic_id.to_string(),
            control_id: control_ids.next_id(),
        }
    }
}

/// Build the referral message for `patient`
///
/// The message is a header (`ADT^A01`, the request's control id, current
/// timestamp, sending and receiving facilities) followed by the patient's
/// demographic segment.
///
/// # Errors
/// [`ReferralError::Encoding`] if a required patient field is empty, the
/// control id is empty, or any value contains a segment terminator.
///
/// # Examples
///
/// ```
/// use clinic_referral::patient::Patient;
/// use clinic_referral::protocol::header::ControlIdGenerator;
/// use clinic_referral::protocol::types::{build_referral, ReferralRequest};
///
/// let patient = Patient::new("p-1", "john", "doe", "j@d.com");
/// let request = ReferralRequest::new(&patient, "CLINIC_A", "CLINIC_B", &ControlIdGenerator::new());
/// let msg = build_referral(&patient, &request, "CLINIC_REFERRAL")?;
/// assert_eq!(msg.control_id(), request.control_id);
/// # Ok::<(), clinic_referral::ReferralError>(())
/// ```
pub fn build_referral(
    patient: &Patient,
    request: &ReferralRequest,
    sending_application: &str,
) -> Result<ClinicalMessage> {
    if request.control_id.is_empty() {
        return Err(ReferralError::Encoding("control id is empty".to_string()));
    }

    let header = MessageHeader::new(
        MessageType::referral(),
        sending_application,
        &request.source_clinic_id,
        &request.destination_clinic_id,
        &request.control_id,
    );
    let message = ClinicalMessage::new(header).with_segment(mapping::from_domain(patient)?)?;
    message.validate()?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::MessageCategory;
    use crate::protocol::message::SegmentKind;

    #[test]
    fn test_build_referral_shape() {
        let patient = Patient::new("p-1", "john", "doe", "j@d.com");
        let request = ReferralRequest::new(
            &patient,
            "CLINIC_A",
            "CLINIC_B",
            &ControlIdGenerator::with_prefix("T"),
        );
        assert_eq!(request.control_id, "T000001");

        let msg = build_referral(&patient, &request, "APP").unwrap();
        assert_eq!(msg.category(), &MessageCategory::Adt);
        assert_eq!(msg.header().message_type.trigger, "A01");
        assert_eq!(msg.header().sending_facility, "CLINIC_A");
        assert_eq!(msg.header().receiving_facility, "CLINIC_B");
        assert_eq!(msg.segments().len(), 1);
        assert_eq!(msg.segments()[0].kind, SegmentKind::Demographic);
    }

    #[test]
    fn test_build_referral_rejects_terminator() {
        let mut patient = Patient::new("p-1", "john", "doe", "j@d.com");
        patient.phone = Some("555\r0100".to_string());
        let request = ReferralRequest::new(&patient, "A", "B", &ControlIdGenerator::new());
        assert!(matches!(
            build_referral(&patient, &request, "APP"),
            Err(ReferralError::Encoding(_))
        ));
    }

    #[test]
    fn test_build_referral_escapes_delimiters() {
        let patient = Patient::new("p-1", "jo|hn", "d^oe", "j&d@d.com");
        let request = ReferralRequest::new(&patient, "A", "B", &ControlIdGenerator::new());
        let msg = build_referral(&patient, &request, "APP").unwrap();
        let decoded = ClinicalMessage::decode(&msg.encode().unwrap()).unwrap();
        let record = mapping::to_domain(&decoded.segments()[0]).unwrap();
        assert_eq!(record.first_name, "Jo|hn");
        assert_eq!(record.last_name, "D^oe");
        assert_eq!(record.email, "j&d@d.com");
    }

    #[test]
    fn test_build_referral_requires_control_id() {
        let patient = Patient::new("p-1", "john", "doe", "j@d.com");
        let mut request = ReferralRequest::new(&patient, "A", "B", &ControlIdGenerator::new());
        request.control_id.clear();
        assert!(build_referral(&patient, &request, "APP").is_err());
    }
}

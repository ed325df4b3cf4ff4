//! Wire format compatibility tests
//!
//! These tests pin the exact text produced for a referral so that other
//! clinics' parsers keep reading it, and check that decoding gives back what
//! the mapper produced.

use chrono::NaiveDate;
use clinic_referral::mapping::{self, DemographicField};
use clinic_referral::patient::{Address, Gender, Patient};
use clinic_referral::protocol::header::{ControlIdGenerator, MessageCategory};
use clinic_referral::protocol::message::{ClinicalMessage, SegmentKind};
use clinic_referral::protocol::types::{build_referral, ReferralRequest};
use clinic_referral::ReferralError;

fn john() -> Patient {
    let mut patient = Patient::new("remote-7", "john", "doe", "j@d.com");
    patient.birthdate = NaiveDate::from_ymd_opt(1990, 1, 1);
    patient
}

fn referral(patient: &Patient) -> ClinicalMessage {
    let ids = ControlIdGenerator::with_prefix("T");
    let request = ReferralRequest::new(patient, "CLINIC_A", "CLINIC_B", &ids);
    build_referral(patient, &request, "CLINIC_REFERRAL").unwrap()
}

/// Segments of the encoded message, split on the terminator
fn encoded_segments(message: &ClinicalMessage) -> Vec<String> {
    let text = String::from_utf8(message.encode().unwrap()).unwrap();
    assert!(text.ends_with('\r'));
    text.trim_end_matches('\r')
        .split('\r')
        .map(str::to_string)
        .collect()
}

/// Test the demographic segment text for a minimal patient
#[test]
fn test_demographic_segment_text() {
    let segments = encoded_segments(&referral(&john()));
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[1], "PID|remote-7|DOE^JOHN|19900101|||j@d.com|");
}

/// Test the header segment layout
#[test]
fn test_header_segment_layout() {
    let segments = encoded_segments(&referral(&john()));
    let fields: Vec<&str> = segments[0].split('|').collect();

    assert_eq!(fields[0], "MSH");
    assert_eq!(fields[1], "^~\\&");
    assert_eq!(fields[2], "CLINIC_REFERRAL");
    assert_eq!(fields[3], "CLINIC_A");
    assert_eq!(fields[5], "CLINIC_B");
    assert_eq!(fields[6].len(), 14);
    assert!(fields[6].chars().all(|c| c.is_ascii_digit()));
    assert_eq!(fields[8], "ADT^A01");
    assert_eq!(fields[9], "T000001");
    assert_eq!(fields[10], "P");
    assert_eq!(fields[11], "2.5");
}

/// Test the end-to-end example: build, serialize, parse, normalize
#[test]
fn test_end_to_end_example() {
    let bytes = referral(&john()).encode().unwrap();
    let decoded = ClinicalMessage::decode(&bytes).unwrap();
    assert_eq!(decoded.category(), &MessageCategory::Adt);

    let pid = decoded.segment(&SegmentKind::Demographic).unwrap();
    assert_eq!(pid.text(DemographicField::Name.position(), 0), "DOE");
    assert_eq!(pid.text(DemographicField::Name.position(), 1), "JOHN");
    assert_eq!(pid.text(DemographicField::Birthdate.position(), 0), "19900101");
    assert_eq!(pid.text(DemographicField::Email.position(), 0), "j@d.com");

    let record = mapping::to_domain(pid).unwrap();
    assert_eq!(record.first_name, "John");
    assert_eq!(record.last_name, "Doe");
    assert_eq!(record.birthdate, NaiveDate::from_ymd_opt(1990, 1, 1));
    assert_eq!(record.email, "j@d.com");
}

/// Test that parsing the serialized message gives the mapper's own segment back
#[test]
fn test_round_trip_matches_mapper() {
    let mut patient = Patient::new("id|7", "Mary Ann", "O'Brien-Smith", "mary&ann@example.org");
    patient.birthdate = NaiveDate::from_ymd_opt(1975, 12, 31);
    patient.phone = Some("555~0100".to_string());
    patient.gender = Some(Gender::Female);
    patient.address = Some(Address {
        street: "12 Elm St^Apt 3".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        zip: "62701".to_string(),
    });

    let expected = mapping::from_domain(&patient).unwrap();
    let decoded = ClinicalMessage::decode(&referral(&patient).encode().unwrap()).unwrap();
    let pid = decoded.segment(&SegmentKind::Demographic).unwrap();
    assert_eq!(pid, &expected);

    assert_eq!(
        mapping::to_domain(pid).unwrap(),
        mapping::to_domain(&expected).unwrap()
    );
}

/// Test that a message without header segment fails cleanly
#[test]
fn test_missing_header_is_decoding_error() {
    let err = ClinicalMessage::decode(b"PID|remote-7|DOE^JOHN|19900101|||j@d.com\r").unwrap_err();
    assert!(matches!(err, ReferralError::Decoding(_)));

    let err = ClinicalMessage::decode(b"").unwrap_err();
    assert!(matches!(err, ReferralError::Decoding(_)));
}

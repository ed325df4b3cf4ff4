//! Mapping between demographic segments and patient records
//!
//! Field positions are declared once in [`DEMOGRAPHIC_LAYOUT`] and checked at
//! compile time. Remote clinics depend on these positions: new fields are only
//! ever appended.
//!
//! | Position | Field      | Components                 |
//! |----------|------------|----------------------------|
//! | 0        | identifier |                            |
//! | 1        | name       | last ^ first               |
//! | 2        | birthdate  | `YYYYMMDD`                 |
//! | 3        | address    | street ^ city ^ state ^ zip|
//! | 4        | phone      |                            |
//! | 5        | email      |                            |
//! | 6        | gender     | `M` / `F` / `O` / `U`      |

use crate::error::{ReferralError, Result};
use crate::patient::{Address, Gender, InboundPatientRecord, Patient};
use crate::protocol::header::parse_timestamp;
use crate::protocol::message::{Field, Segment, SegmentKind};
use chrono::NaiveDate;

/// Named positions of the demographic segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemographicField {
    Identifier,
    Name,
    Birthdate,
    Address,
    Phone,
    Email,
    Gender,
}

impl DemographicField {
    /// Zero-based field position within the segment
    pub const fn position(self) -> usize {
        match self {
            DemographicField::Identifier => 0,
            DemographicField::Name => 1,
            DemographicField::Birthdate => 2,
            DemographicField::Address => 3,
            DemographicField::Phone => 4,
            DemographicField::Email => 5,
            DemographicField::Gender => 6,
        }
    }

    /// Field name used in validation errors
    pub const fn name(self) -> &'static str {
        match self {
            DemographicField::Identifier => "identifier",
            DemographicField::Name => "name",
            DemographicField::Birthdate => "birthdate",
            DemographicField::Address => "address",
            DemographicField::Phone => "phone",
            DemographicField::Email => "email",
            DemographicField::Gender => "gender",
        }
    }
}

/// Demographic fields in wire order
pub const DEMOGRAPHIC_LAYOUT: [DemographicField; 7] = [
    DemographicField::Identifier,
    DemographicField::Name,
    DemographicField::Birthdate,
    DemographicField::Address,
    DemographicField::Phone,
    DemographicField::Email,
    DemographicField::Gender,
];

const _: () = {
    let mut i = 0;
    while i < DEMOGRAPHIC_LAYOUT.len() {
        assert!(
            DEMOGRAPHIC_LAYOUT[i].position() == i,
            "demographic layout entry does not match its declared position"
        );
        i += 1;
    }
};

const NAME_LAST: usize = 0;
const NAME_FIRST: usize = 1;

const BIRTHDATE_FORMAT: &str = "%Y%m%d";

/// Build the demographic segment for an outbound referral
///
/// Names are upper-cased; the birthdate is rendered as `YYYYMMDD`.
///
/// # Errors
/// [`ReferralError::Encoding`] if the identifier or email is empty, or both
/// name parts are empty.
pub fn from_domain(patient: &Patient) -> Result<Segment> {
    let require = |value: &str, field: DemographicField| {
        if value.trim().is_empty() {
            Err(ReferralError::Encoding(format!(
                "required patient field `{}` is empty",
                field.name()
            )))
        } else {
            Ok(())
        }
    };
    require(&patient.id, DemographicField::Identifier)?;
    require(&patient.email, DemographicField::Email)?;
    if patient.first_name.trim().is_empty() && patient.last_name.trim().is_empty() {
        return Err(ReferralError::Encoding(
            "required patient field `name` is empty".to_string(),
        ));
    }

    let mut fields = vec![Field::empty(); DEMOGRAPHIC_LAYOUT.len()];
    for field in DEMOGRAPHIC_LAYOUT {
        fields[field.position()] = match field {
            DemographicField::Identifier => Field::new(patient.id.trim()),
            DemographicField::Name => Field::from_components([
                patient.last_name.trim().to_uppercase(),
                patient.first_name.trim().to_uppercase(),
            ]),
            DemographicField::Birthdate => match patient.birthdate {
                Some(date) => Field::new(date.format(BIRTHDATE_FORMAT).to_string()),
                None => Field::empty(),
            },
            DemographicField::Address => match &patient.address {
                Some(a) if !a.is_empty() => Field::from_components([
                    a.street.as_str(),
                    a.city.as_str(),
                    a.state.as_str(),
                    a.zip.as_str(),
                ]),
                _ => Field::empty(),
            },
            DemographicField::Phone => Field::new(patient.phone.as_deref().unwrap_or_default()),
            DemographicField::Email => Field::new(patient.email.trim()),
            DemographicField::Gender => match patient.gender {
                Some(g) => Field::new(g.code()),
                None => Field::empty(),
            },
        };
    }

    Ok(Segment::with_fields(SegmentKind::Demographic, fields))
}

/// Normalize a received demographic segment into a patient record
///
/// Names are title-cased, the compact birthdate becomes a calendar date,
/// subcomponents of address and phone components are concatenated.
///
/// # Errors
/// - [`ReferralError::Decoding`] if `segment` is not a demographic segment
/// - [`ReferralError::Validation`] if the email is empty, both name parts are
///   empty, or the birthdate/gender cannot be read
pub fn to_domain(segment: &Segment) -> Result<InboundPatientRecord> {
    if segment.kind != SegmentKind::Demographic {
        return Err(ReferralError::Decoding(format!(
            "expected demographic segment, found {}",
            segment.kind
        )));
    }

    let text = |field: DemographicField, component: usize| {
        segment.text(field.position(), component).trim().to_string()
    };

    let email = text(DemographicField::Email, 0);
    if email.is_empty() {
        return Err(invalid(DemographicField::Email, "required field is empty"));
    }

    let last_name = title_case(&text(DemographicField::Name, NAME_LAST));
    let first_name = title_case(&text(DemographicField::Name, NAME_FIRST));
    if last_name.is_empty() && first_name.is_empty() {
        return Err(invalid(
            DemographicField::Name,
            "at least one name component is required",
        ));
    }

    let birthdate = parse_birthdate(&text(DemographicField::Birthdate, 0))?;

    let address = Address {
        street: text(DemographicField::Address, 0),
        city: text(DemographicField::Address, 1),
        state: text(DemographicField::Address, 2),
        zip: text(DemographicField::Address, 3),
    };

    let phone: String = segment
        .field(DemographicField::Phone.position())
        .map(|f| {
            f.components()
                .iter()
                .map(|c| c.text())
                .collect::<Vec<_>>()
                .concat()
        })
        .unwrap_or_default()
        .trim()
        .to_string();

    let gender_code = text(DemographicField::Gender, 0);
    let gender = if gender_code.is_empty() {
        None
    } else {
        Some(Gender::from_code(&gender_code).ok_or_else(|| {
            invalid(
                DemographicField::Gender,
                &format!("unknown gender code {:?}", gender_code),
            )
        })?)
    };

    let remote_id = text(DemographicField::Identifier, 0);

    Ok(InboundPatientRecord {
        remote_id: (!remote_id.is_empty()).then_some(remote_id),
        first_name,
        last_name,
        email,
        birthdate,
        phone: (!phone.is_empty()).then_some(phone),
        address: (!address.is_empty()).then_some(address),
        gender,
    })
}

fn invalid(field: DemographicField, reason: &str) -> ReferralError {
    ReferralError::Validation {
        field: field.name(),
        reason: reason.to_string(),
    }
}

fn parse_birthdate(value: &str) -> Result<Option<NaiveDate>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_timestamp(value)
        .map(|dt| Some(dt.date()))
        .map_err(|_| {
            invalid(
                DemographicField::Birthdate,
                &format!("expected YYYYMMDD, got {:?}", value),
            )
        })
}

/// Upper-case the first letter of each whitespace-separated word, lower-case the rest
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_word = false;
    for c in value.chars() {
        if c.is_whitespace() {
            in_word = false;
            out.push(c);
        } else if !in_word && (c.is_alphanumeric() || c == '_') {
            in_word = true;
            out.extend(c.to_uppercase());
        } else if in_word {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

//! Patient domain records
//!
//! These mirror the documents held by the clinic's patient store. Field names
//! serialize in camelCase to match the store's schema.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Postal address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    /// True when no part of the address is filled in
    pub fn is_empty(&self) -> bool {
        self.street.is_empty() && self.city.is_empty() && self.state.is_empty() && self.zip.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locality = [self.state.as_str(), self.zip.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let parts: Vec<&str> = [self.street.as_str(), self.city.as_str(), locality.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Administrative gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    /// Single-letter wire code
    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
            Gender::Unknown => "U",
        }
    }

    /// Gender for a wire code, case-insensitive
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            "O" => Some(Gender::Other),
            "U" => Some(Gender::Unknown),
            _ => None,
        }
    }
}

/// Patient record as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Store-assigned identifier
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// Natural key; unique across the store
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

impl Patient {
    /// Patient with the identity fields set and everything else empty
    pub fn new(id: &str, first_name: &str, last_name: &str, email: &str) -> Self {
        Patient {
            id: id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            birthdate: None,
            phone: None,
            address: None,
            gender: None,
        }
    }

    /// Materialize a stored patient from a normalized inbound record
    pub fn from_record(id: &str, record: InboundPatientRecord) -> Self {
        Patient {
            id: id.to_string(),
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            birthdate: record.birthdate,
            phone: record.phone,
            address: record.address,
            gender: record.gender,
        }
    }
}

/// Normalized projection of a received demographic segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundPatientRecord {
    /// Identifier assigned by the sending clinic, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let address = Address {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip: "62701".to_string(),
        };
        assert_eq!(address.to_string(), "1 Main St, Springfield, IL 62701");

        let partial = Address {
            city: "Springfield".to_string(),
            ..Default::default()
        };
        assert_eq!(partial.to_string(), "Springfield");
    }

    #[test]
    fn test_gender_codes() {
        assert_eq!(Gender::from_code("f"), Some(Gender::Female));
        assert_eq!(Gender::from_code("X"), None);
        assert_eq!(Gender::Other.code(), "O");
    }

    #[test]
    fn test_patient_json_is_camel_case() {
        let mut patient = Patient::new("p1", "John", "Doe", "j@d.com");
        patient.birthdate = NaiveDate::from_ymd_opt(1990, 1, 1);
        let json = serde_json::to_value(&patient).unwrap();
        assert_eq!(json["firstName"], "John");
        assert_eq!(json["birthdate"], "1990-01-01");
        assert!(json.get("phone").is_none());

        let back: Patient = serde_json::from_value(json).unwrap();
        assert_eq!(back, patient);
    }
}

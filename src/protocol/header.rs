//! Header segment and delimiter declaration
//!
//! Every clinical message starts with exactly one header segment (`MSH`). It
//! declares the delimiter set, the message category, a control identifier used
//! to correlate request and acknowledgment, and a timestamp.

use crate::error::{ReferralError, Result};
use crate::protocol::message::{Field, Segment, SegmentKind};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Delimiter set declared by the header segment
///
/// The segment terminator is fixed (`\r`) and never declared; the others are
/// declared as `MSH|^~\&` (field separator, then component, repetition,
/// escape and subcomponent characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    /// Separates fields within a segment
    pub field: char,
    /// Separates components within a field
    pub component: char,
    /// Separates repetitions of a field (declared, never emitted)
    pub repetition: char,
    /// Introduces an escape sequence
    pub escape: char,
    /// Separates subcomponents within a component
    pub subcomponent: char,
}

impl Delimiters {
    /// Segment terminator
    pub const SEGMENT_TERMINATOR: char = '\r';

    /// Build a delimiter set from a header declaration
    ///
    /// # Arguments
    /// * `field` - Character immediately following the `MSH` tag
    /// * `encoding` - The encoding characters field (`^~\&`)
    ///
    /// # Errors
    /// [`ReferralError::Decoding`] when the declaration is short, uses
    /// alphanumeric or control characters, or repeats a character.
    pub fn declare(field: char, encoding: &str) -> Result<Self> {
        let mut chars = encoding.chars();
        let (Some(component), Some(repetition), Some(escape), Some(subcomponent)) =
            (chars.next(), chars.next(), chars.next(), chars.next())
        else {
            return Err(ReferralError::Decoding(format!(
                "malformed delimiter declaration: expected 4 encoding characters, got {:?}",
                encoding
            )));
        };

        let delimiters = Delimiters {
            field,
            component,
            repetition,
            escape,
            subcomponent,
        };
        delimiters.validate()?;
        Ok(delimiters)
    }

    fn validate(&self) -> Result<()> {
        let all = self.as_array();
        for (i, c) in all.iter().enumerate() {
            if !c.is_ascii_punctuation() {
                return Err(ReferralError::Decoding(format!(
                    "malformed delimiter declaration: {:?} is not a punctuation character",
                    c
                )));
            }
            if all[i + 1..].contains(c) {
                return Err(ReferralError::Decoding(format!(
                    "malformed delimiter declaration: {:?} declared twice",
                    c
                )));
            }
        }
        Ok(())
    }

    fn as_array(&self) -> [char; 5] {
        [
            self.field,
            self.component,
            self.repetition,
            self.escape,
            self.subcomponent,
        ]
    }

    /// The encoding characters field as rendered after the field separator
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }

    /// Escape a content value so it cannot collide with any delimiter
    ///
    /// # Errors
    /// [`ReferralError::Encoding`] if the value contains CR or LF, which have
    /// no escape sequence.
    pub fn escape(&self, value: &str) -> Result<String> {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            let code = match c {
                '\r' | '\n' => {
                    return Err(ReferralError::Encoding(format!(
                        "value {:?} contains a segment terminator",
                        value
                    )))
                }
                c if c == self.field => 'F',
                c if c == self.component => 'S',
                c if c == self.repetition => 'R',
                c if c == self.subcomponent => 'T',
                c if c == self.escape => 'E',
                c => {
                    out.push(c);
                    continue;
                }
            };
            out.push(self.escape);
            out.push(code);
            out.push(self.escape);
        }
        Ok(out)
    }

    /// Reverse [`escape`](Self::escape)
    ///
    /// Unknown or unterminated escape sequences are kept verbatim.
    pub fn unescape(&self, raw: &str) -> String {
        if !raw.contains(self.escape) {
            return raw.to_string();
        }

        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find(self.escape) {
            out.push_str(&rest[..start]);
            let after = &rest[start + self.escape.len_utf8()..];
            let Some(end) = after.find(self.escape) else {
                out.push_str(&rest[start..]);
                return out;
            };
            let replacement = match &after[..end] {
                "F" => Some(self.field),
                "S" => Some(self.component),
                "R" => Some(self.repetition),
                "T" => Some(self.subcomponent),
                "E" => Some(self.escape),
                _ => None,
            };
            match replacement {
                Some(c) => out.push(c),
                None => out.push_str(&rest[start..start + self.escape.len_utf8() * 2 + end]),
            }
            rest = &after[end + self.escape.len_utf8()..];
        }
        out.push_str(rest);
        out
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

/// Message category carried in the header's message type field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCategory {
    /// Admit/transfer/discharge: the only category referrals use
    Adt,
    /// General acknowledgment
    Ack,
    /// Anything else; ignored by the inbound handler
    Other(String),
}

impl MessageCategory {
    /// Wire code for this category
    pub fn code(&self) -> &str {
        match self {
            MessageCategory::Adt => "ADT",
            MessageCategory::Ack => "ACK",
            MessageCategory::Other(code) => code,
        }
    }

    /// Category for a wire code
    pub fn from_code(code: &str) -> Self {
        match code {
            "ADT" => MessageCategory::Adt,
            "ACK" => MessageCategory::Ack,
            other => MessageCategory::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Message type: category plus trigger event (e.g. `ADT^A01`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageType {
    /// Message category
    pub category: MessageCategory,
    /// Trigger event code, may be empty
    pub trigger: String,
}

impl MessageType {
    /// Trigger event used for referrals (admit/visit notification)
    pub const REFERRAL_TRIGGER: &'static str = "A01";

    /// `ADT^A01`
    pub fn referral() -> Self {
        MessageType {
            category: MessageCategory::Adt,
            trigger: Self::REFERRAL_TRIGGER.to_string(),
        }
    }

    /// `ACK^<trigger>`
    pub fn ack(trigger: &str) -> Self {
        MessageType {
            category: MessageCategory::Ack,
            trigger: trigger.to_string(),
        }
    }

    fn to_field(&self) -> Field {
        if self.trigger.is_empty() {
            Field::new(self.category.code())
        } else {
            Field::from_components([self.category.code(), self.trigger.as_str()])
        }
    }
}

/// Field positions of the header segment, counted after the delimiter declaration
mod position {
    pub const SENDING_APPLICATION: usize = 0;
    pub const SENDING_FACILITY: usize = 1;
    pub const RECEIVING_APPLICATION: usize = 2;
    pub const RECEIVING_FACILITY: usize = 3;
    pub const TIMESTAMP: usize = 4;
    pub const SECURITY: usize = 5;
    pub const MESSAGE_TYPE: usize = 6;
    pub const CONTROL_ID: usize = 7;
    pub const PROCESSING_ID: usize = 8;
    pub const VERSION: usize = 9;
    pub const COUNT: usize = 10;
}

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Typed view of the header segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Application that produced the message
    pub sending_application: String,
    /// Clinic that produced the message
    pub sending_facility: String,
    /// Application expected to consume the message
    pub receiving_application: String,
    /// Destination clinic
    pub receiving_facility: String,
    /// Creation time, second resolution
    pub timestamp: NaiveDateTime,
    /// Category and trigger event
    pub message_type: MessageType,
    /// Unique per transmission; echoed back by the acknowledgment
    pub control_id: String,
    /// Processing id (`P` for production)
    pub processing_id: String,
    /// Protocol version string
    pub version: String,
}

impl MessageHeader {
    /// Protocol version emitted on outbound messages
    pub const VERSION: &'static str = "2.5";
    /// Production processing id
    pub const PROCESSING_ID: &'static str = "P";

    /// Create a header stamped with the current local time
    pub fn new(
        message_type: MessageType,
        sending_application: &str,
        sending_facility: &str,
        receiving_facility: &str,
        control_id: &str,
    ) -> Self {
        let now = Local::now().naive_local();
        MessageHeader {
            sending_application: sending_application.to_string(),
            sending_facility: sending_facility.to_string(),
            receiving_application: String::new(),
            receiving_facility: receiving_facility.to_string(),
            timestamp: now.with_nanosecond(0).unwrap_or(now),
            message_type,
            control_id: control_id.to_string(),
            processing_id: Self::PROCESSING_ID.to_string(),
            version: Self::VERSION.to_string(),
        }
    }

    /// Message category shortcut
    pub fn category(&self) -> &MessageCategory {
        &self.message_type.category
    }

    /// Render as a segment (fields after the delimiter declaration)
    pub fn to_segment(&self) -> Segment {
        let mut fields = vec![Field::empty(); position::COUNT];
        fields[position::SENDING_APPLICATION] = Field::new(&self.sending_application);
        fields[position::SENDING_FACILITY] = Field::new(&self.sending_facility);
        fields[position::RECEIVING_APPLICATION] = Field::new(&self.receiving_application);
        fields[position::RECEIVING_FACILITY] = Field::new(&self.receiving_facility);
        fields[position::TIMESTAMP] =
            Field::new(self.timestamp.format(TIMESTAMP_FORMAT).to_string());
        fields[position::SECURITY] = Field::empty();
        fields[position::MESSAGE_TYPE] = self.message_type.to_field();
        fields[position::CONTROL_ID] = Field::new(&self.control_id);
        fields[position::PROCESSING_ID] = Field::new(&self.processing_id);
        fields[position::VERSION] = Field::new(&self.version);
        Segment::with_fields(SegmentKind::Header, fields)
    }

    /// Interpret a decoded header segment
    ///
    /// # Errors
    /// [`ReferralError::Decoding`] if the segment is not a header, or lacks a
    /// message type, control id or readable timestamp.
    pub fn from_segment(segment: &Segment) -> Result<Self> {
        if segment.kind != SegmentKind::Header {
            return Err(ReferralError::Decoding(format!(
                "expected header segment, found {}",
                segment.kind
            )));
        }

        let category = segment.text(position::MESSAGE_TYPE, 0);
        if category.is_empty() {
            return Err(ReferralError::Decoding(
                "header segment has no message type".to_string(),
            ));
        }
        let control_id = segment.text(position::CONTROL_ID, 0);
        if control_id.is_empty() {
            return Err(ReferralError::Decoding(
                "header segment has no control id".to_string(),
            ));
        }

        Ok(MessageHeader {
            sending_application: segment.text(position::SENDING_APPLICATION, 0),
            sending_facility: segment.text(position::SENDING_FACILITY, 0),
            receiving_application: segment.text(position::RECEIVING_APPLICATION, 0),
            receiving_facility: segment.text(position::RECEIVING_FACILITY, 0),
            timestamp: parse_timestamp(&segment.text(position::TIMESTAMP, 0))?,
            message_type: MessageType {
                category: MessageCategory::from_code(&category),
                trigger: segment.text(position::MESSAGE_TYPE, 1),
            },
            control_id,
            processing_id: segment.text(position::PROCESSING_ID, 0),
            version: segment.text(position::VERSION, 0),
        })
    }
}

/// Parse a `YYYYMMDD[HH[MM[SS]]]` timestamp
///
/// Fractional seconds and a trailing UTC offset are accepted and ignored.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    let malformed = || ReferralError::Decoding(format!("malformed timestamp {:?}", value));

    if digits.len() < 8 || digits.len() > 14 || digits.len() % 2 != 0 {
        return Err(malformed());
    }

    let num = |range: std::ops::Range<usize>| -> u32 {
        digits
            .get(range)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };
    let year = digits[0..4].parse::<i32>().map_err(|_| malformed())?;
    NaiveDate::from_ymd_opt(year, num(4..6), num(6..8))
        .and_then(|d| d.and_hms_opt(num(8..10), num(10..12), num(12..14)))
        .ok_or_else(malformed)
}

/// Generates control identifiers unique for the lifetime of one generator
///
/// Identifiers are `<prefix><sequence>`, where the prefix is derived from the
/// generator's creation time and the sequence is zero-padded to at least six
/// digits. The sequence never wraps. With the default prefix an identifier stays
/// within 20 characters for the first 99,999,999 sends.
#[derive(Debug)]
pub struct ControlIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl ControlIdGenerator {
    /// Generator prefixed with its creation time (`yyMMddHHmmss`)
    pub fn new() -> Self {
        Self::with_prefix(&Local::now().format("%y%m%d%H%M%S").to_string())
    }

    /// Generator with a fixed prefix
    pub fn with_prefix(prefix: &str) -> Self {
        ControlIdGenerator {
            prefix: prefix.to_string(),
            next: AtomicU64::new(1),
        }
    }

    /// Next control identifier
    pub fn next_id(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{:06}", self.prefix, seq)
    }
}

impl Default for ControlIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoding_characters() {
        assert_eq!(Delimiters::default().encoding_characters(), "^~\\&");
    }

    #[test]
    fn test_declare_rejects_duplicates() {
        assert!(matches!(
            Delimiters::declare('|', "^|\\&"),
            Err(ReferralError::Decoding(_))
        ));
    }

    #[test]
    fn test_declare_rejects_short_declaration() {
        assert!(matches!(
            Delimiters::declare('|', "^~"),
            Err(ReferralError::Decoding(_))
        ));
    }

    #[test]
    fn test_declare_rejects_alphanumeric() {
        assert!(Delimiters::declare('A', "^~\\&").is_err());
    }

    #[test]
    fn test_escape_every_delimiter() {
        let d = Delimiters::default();
        let escaped = d.escape("a|b^c~d&e\\f").unwrap();
        assert_eq!(escaped, "a\\F\\b\\S\\c\\R\\d\\T\\e\\E\\f");
        assert_eq!(d.unescape(&escaped), "a|b^c~d&e\\f");
    }

    #[test]
    fn test_escape_rejects_terminator() {
        let d = Delimiters::default();
        assert!(matches!(
            d.escape("line1\rline2"),
            Err(ReferralError::Encoding(_))
        ));
        assert!(d.escape("line1\nline2").is_err());
    }

    #[test]
    fn test_unescape_keeps_unknown_sequences() {
        let d = Delimiters::default();
        assert_eq!(d.unescape("a\\X0D\\b"), "a\\X0D\\b");
        assert_eq!(d.unescape("dangling\\F"), "dangling\\F");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let full = parse_timestamp("20240102030405").unwrap();
        assert_eq!(full.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-02 03:04:05");

        let date_only = parse_timestamp("20240102").unwrap();
        assert_eq!(date_only.format("%H%M%S").to_string(), "000000");

        assert!(parse_timestamp("20240102030405.123+0100").is_ok());
        assert!(parse_timestamp("2024").is_err());
        assert!(parse_timestamp("20241340").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_header_segment_roundtrip() {
        let header = MessageHeader::new(
            MessageType::referral(),
            "CLINIC_REFERRAL",
            "CLINIC_A",
            "CLINIC_B",
            "CTL0001",
        );
        let segment = header.to_segment();
        let decoded = MessageHeader::from_segment(&segment).unwrap();
        assert_eq!(header, decoded);
        assert_eq!(decoded.category(), &MessageCategory::Adt);
    }

    #[test]
    fn test_header_requires_control_id() {
        let header = MessageHeader::new(MessageType::referral(), "APP", "A", "B", "");
        let err = MessageHeader::from_segment(&header.to_segment()).unwrap_err();
        assert!(err.to_string().contains("control id"));
    }

    #[test]
    fn test_control_ids_are_unique() {
        let generator = ControlIdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert_ne!(a, b);
        assert!(a.len() <= 20);
    }

    #[test]
    fn test_control_ids_do_not_wrap() {
        let generator = ControlIdGenerator {
            prefix: "C".to_string(),
            next: AtomicU64::new(999_999),
        };
        assert_eq!(generator.next_id(), "C999999");
        assert_eq!(generator.next_id(), "C1000000");
        assert_eq!(generator.next_id(), "C1000001");
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(MessageCategory::from_code("ADT"), MessageCategory::Adt);
        assert_eq!(MessageCategory::from_code("ACK"), MessageCategory::Ack);
        assert_eq!(
            MessageCategory::from_code("ORU"),
            MessageCategory::Other("ORU".to_string())
        );
    }
}

//! Clinical message structure and its wire rendering
//!
//! A [`ClinicalMessage`] is a header segment followed by an ordered list of
//! segments. Each segment is a type tag plus ordered fields; each field is an
//! ordered list of components. Components may carry subcomponents when a remote
//! clinic sends them; messages built locally never do.

use crate::error::{ReferralError, Result};
use crate::protocol::header::{Delimiters, MessageCategory, MessageHeader};
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Segment type tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// `MSH` - message header, always first
    Header,
    /// `PID` - patient demographics
    Demographic,
    /// `MSA` - acknowledgment code and echoed control id
    Acknowledgment,
    /// `ERR` - free-text error reason
    Error,
    /// Any other three-character tag
    Other(String),
}

impl SegmentKind {
    /// Wire tag
    pub fn tag(&self) -> &str {
        match self {
            SegmentKind::Header => "MSH",
            SegmentKind::Demographic => "PID",
            SegmentKind::Acknowledgment => "MSA",
            SegmentKind::Error => "ERR",
            SegmentKind::Other(tag) => tag,
        }
    }

    /// Kind for a wire tag
    ///
    /// # Errors
    /// [`ReferralError::Decoding`] unless the tag is three ASCII uppercase
    /// letters or digits.
    pub fn from_tag(tag: &str) -> Result<Self> {
        if tag.len() != 3
            || !tag
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(ReferralError::Decoding(format!(
                "invalid segment tag {:?}",
                tag
            )));
        }
        Ok(match tag {
            "MSH" => SegmentKind::Header,
            "PID" => SegmentKind::Demographic,
            "MSA" => SegmentKind::Acknowledgment,
            "ERR" => SegmentKind::Error,
            other => SegmentKind::Other(other.to_string()),
        })
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One component of a field, split into its subcomponents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    subcomponents: Vec<String>,
}

impl Component {
    /// Component holding a single value
    pub fn new(value: impl Into<String>) -> Self {
        Component {
            subcomponents: vec![value.into()],
        }
    }

    /// Subcomponents in wire order (never empty)
    pub fn subcomponents(&self) -> &[String] {
        &self.subcomponents
    }

    /// Non-empty subcomponents joined by a single space
    pub fn text(&self) -> String {
        if let [single] = self.subcomponents.as_slice() {
            return single.clone();
        }
        self.subcomponents
            .iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One field of a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    components: Vec<Component>,
}

impl Field {
    /// Field with a single component
    pub fn new(value: impl Into<String>) -> Self {
        Field {
            components: vec![Component::new(value)],
        }
    }

    /// Empty field
    pub fn empty() -> Self {
        Self::new("")
    }

    /// Field from component values in order
    pub fn from_components<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<Component> = values.into_iter().map(Component::new).collect();
        if components.is_empty() {
            return Self::empty();
        }
        Field { components }
    }

    /// Components in wire order (never empty)
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Text of component `index`, empty when absent
    pub fn component_text(&self, index: usize) -> String {
        self.components
            .get(index)
            .map(Component::text)
            .unwrap_or_default()
    }

    /// All component texts joined by `separator`
    pub fn joined(&self, separator: char) -> String {
        self.components
            .iter()
            .map(Component::text)
            .collect::<Vec<_>>()
            .join(&separator.to_string())
    }

    /// True when every component is empty
    pub fn is_empty(&self) -> bool {
        self.components
            .iter()
            .all(|c| c.subcomponents.iter().all(String::is_empty))
    }
}

/// One segment: a type tag plus ordered fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Type tag
    pub kind: SegmentKind,
    /// Fields in positional order (position 0 is the first field after the tag)
    pub fields: Vec<Field>,
}

impl Segment {
    /// Segment without fields
    pub fn new(kind: SegmentKind) -> Self {
        Segment {
            kind,
            fields: Vec::new(),
        }
    }

    /// Segment with the given fields
    pub fn with_fields(kind: SegmentKind, fields: Vec<Field>) -> Self {
        Segment { kind, fields }
    }

    /// Field at `position`
    pub fn field(&self, position: usize) -> Option<&Field> {
        self.fields.get(position)
    }

    /// Text of component `component` in field `position`, empty when absent
    pub fn text(&self, position: usize, component: usize) -> String {
        self.field(position)
            .map(|f| f.component_text(component))
            .unwrap_or_default()
    }
}

/// Complete clinical message
///
/// Constructed per call, immutable once encoded, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicalMessage {
    delimiters: Delimiters,
    header: MessageHeader,
    segments: Vec<Segment>,
}

impl ClinicalMessage {
    /// Message containing only `header`, using the standard delimiters
    pub fn new(header: MessageHeader) -> Self {
        ClinicalMessage {
            delimiters: Delimiters::default(),
            header,
            segments: Vec::new(),
        }
    }

    /// Append a segment after the existing ones
    ///
    /// # Errors
    /// [`ReferralError::Encoding`] when `segment` is a second header.
    pub fn push(&mut self, segment: Segment) -> Result<()> {
        if segment.kind == SegmentKind::Header {
            return Err(ReferralError::Encoding(
                "a message carries exactly one header segment".to_string(),
            ));
        }
        self.segments.push(segment);
        Ok(())
    }

    /// Builder-style [`push`](Self::push)
    pub fn with_segment(mut self, segment: Segment) -> Result<Self> {
        self.push(segment)?;
        Ok(self)
    }

    /// Header segment
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Message category declared by the header
    pub fn category(&self) -> &MessageCategory {
        self.header.category()
    }

    /// Control identifier declared by the header
    pub fn control_id(&self) -> &str {
        &self.header.control_id
    }

    /// Delimiter set in use
    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Segments following the header
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment of the given kind
    pub fn segment(&self, kind: &SegmentKind) -> Option<&Segment> {
        self.segments.iter().find(|s| &s.kind == kind)
    }

    /// Check that every value can be rendered without colliding with a delimiter
    ///
    /// # Errors
    /// [`ReferralError::Encoding`] naming the offending segment.
    pub fn validate(&self) -> Result<()> {
        let mut scratch = BytesMut::new();
        self.encode_into(&mut scratch).map(|_| ())
    }

    /// Encode to wire bytes
    ///
    /// Each segment, the last included, is followed by the segment terminator;
    /// nothing follows the final terminator.
    ///
    /// # Errors
    /// [`ReferralError::Encoding`] when a value contains CR or LF.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(256);
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let d = &self.delimiters;
        let mut fs = [0u8; 4];
        let fs = d.field.encode_utf8(&mut fs).as_bytes();

        // MSH-1 and MSH-2 are the delimiter declaration itself
        buf.put_slice(SegmentKind::Header.tag().as_bytes());
        buf.put_slice(fs);
        buf.put_slice(d.encoding_characters().as_bytes());
        let header = self.header.to_segment();
        self.encode_fields(&header, buf)?;
        buf.put_u8(Delimiters::SEGMENT_TERMINATOR as u8);

        for segment in &self.segments {
            buf.put_slice(segment.kind.tag().as_bytes());
            self.encode_fields(segment, buf)?;
            buf.put_u8(Delimiters::SEGMENT_TERMINATOR as u8);
        }
        Ok(())
    }

    fn encode_fields(&self, segment: &Segment, buf: &mut BytesMut) -> Result<()> {
        let d = &self.delimiters;
        let mut tmp = [0u8; 4];
        for field in &segment.fields {
            buf.put_slice(d.field.encode_utf8(&mut tmp).as_bytes());
            for (ci, component) in field.components.iter().enumerate() {
                if ci > 0 {
                    buf.put_slice(d.component.encode_utf8(&mut tmp).as_bytes());
                }
                for (si, sub) in component.subcomponents.iter().enumerate() {
                    if si > 0 {
                        buf.put_slice(d.subcomponent.encode_utf8(&mut tmp).as_bytes());
                    }
                    let escaped = d.escape(sub).map_err(|e| match e {
                        ReferralError::Encoding(reason) => {
                            ReferralError::Encoding(format!("{} segment: {}", segment.kind, reason))
                        }
                        other => other,
                    })?;
                    buf.put_slice(escaped.as_bytes());
                }
            }
        }
        Ok(())
    }

    /// Decode wire bytes
    ///
    /// Splits on the segment terminator, then the field separator, then the
    /// component separator. A CRLF terminator is tolerated.
    ///
    /// # Errors
    /// [`ReferralError::Decoding`] when the header segment is missing or not
    /// first, the delimiter declaration is malformed, the input is truncated,
    /// or a second header appears.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ReferralError::Decoding(format!("message is not valid UTF-8: {}", e)))?;
        let text = text.trim_start_matches('\n');

        let Some(after_tag) = text.strip_prefix(SegmentKind::Header.tag()) else {
            return Err(ReferralError::Decoding(
                "missing header segment".to_string(),
            ));
        };

        let mut chars = after_tag.chars();
        let field_sep = chars.next().ok_or_else(|| {
            ReferralError::Decoding("malformed delimiter declaration: no field separator".to_string())
        })?;
        let declaration: String = chars
            .take_while(|&c| c != field_sep && c != Delimiters::SEGMENT_TERMINATOR)
            .collect();
        let delimiters = Delimiters::declare(field_sep, &declaration)?;

        // A CRLF terminator on the final segment leaves one trailing LF
        let text = text.strip_suffix('\n').unwrap_or(text);
        let Some(body) = text.strip_suffix(Delimiters::SEGMENT_TERMINATOR) else {
            return Err(ReferralError::Decoding(
                "truncated message: final segment is not terminated".to_string(),
            ));
        };

        let mut raw_segments = body
            .split(Delimiters::SEGMENT_TERMINATOR)
            .map(|s| s.trim_start_matches('\n'))
            .filter(|s| !s.is_empty());

        // Header: skip tag, field separator and declaration
        let header_raw = raw_segments.next().unwrap_or_default();
        let skip = SegmentKind::Header.tag().len()
            + field_sep.len_utf8()
            + declaration.len();
        let header_fields = match header_raw.get(skip..) {
            Some(rest) if !rest.is_empty() => {
                Self::decode_fields(&rest[field_sep.len_utf8()..], &delimiters)
            }
            _ => Vec::new(),
        };
        let header =
            MessageHeader::from_segment(&Segment::with_fields(SegmentKind::Header, header_fields))?;

        let mut segments = Vec::new();
        for (index, raw) in raw_segments.enumerate() {
            let (tag, rest) = match raw.find(delimiters.field) {
                Some(pos) => (&raw[..pos], Some(&raw[pos + field_sep.len_utf8()..])),
                None => (raw, None),
            };
            let kind = SegmentKind::from_tag(tag)?;
            if kind == SegmentKind::Header {
                return Err(ReferralError::Decoding(format!(
                    "unexpected header segment at position {}",
                    index + 1
                )));
            }
            let fields = rest
                .map(|r| Self::decode_fields(r, &delimiters))
                .unwrap_or_default();
            segments.push(Segment::with_fields(kind, fields));
        }

        Ok(ClinicalMessage {
            delimiters,
            header,
            segments,
        })
    }

    fn decode_fields(raw: &str, d: &Delimiters) -> Vec<Field> {
        raw.split(d.field)
            .map(|field| Field {
                components: field
                    .split(d.component)
                    .map(|component| Component {
                        subcomponents: component
                            .split(d.subcomponent)
                            .map(|sub| d.unescape(sub))
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::MessageType;

    fn sample_header() -> MessageHeader {
        MessageHeader::new(
            MessageType::referral(),
            "CLINIC_REFERRAL",
            "CLINIC_A",
            "CLINIC_B",
            "CTL000001",
        )
    }

    #[test]
    fn test_encode_layout() {
        let msg = ClinicalMessage::new(sample_header())
            .with_segment(Segment::with_fields(
                SegmentKind::Demographic,
                vec![Field::new("42"), Field::from_components(["DOE", "JOHN"])],
            ))
            .unwrap();

        let encoded = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert!(encoded.starts_with("MSH|^~\\&|CLINIC_REFERRAL|CLINIC_A||CLINIC_B|"));
        assert!(encoded.contains("|ADT^A01|CTL000001|P|2.5\r"));
        assert!(encoded.ends_with("\rPID|42|DOE^JOHN\r"));
    }

    #[test]
    fn test_encode_decode_roundtrip_with_escapes() {
        let msg = ClinicalMessage::new(sample_header())
            .with_segment(Segment::with_fields(
                SegmentKind::Demographic,
                vec![
                    Field::new("a|b"),
                    Field::from_components(["x^y", "z&w", "back\\slash"]),
                    Field::empty(),
                ],
            ))
            .unwrap();

        let decoded = ClinicalMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_missing_header() {
        let err = ClinicalMessage::decode(b"PID|1|DOE^JOHN\r").unwrap_err();
        assert!(matches!(err, ReferralError::Decoding(ref m) if m.contains("missing header")));

        assert!(matches!(
            ClinicalMessage::decode(b""),
            Err(ReferralError::Decoding(_))
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let msg = ClinicalMessage::new(sample_header());
        let mut bytes = msg.encode().unwrap();
        bytes.extend_from_slice(b"PID|1|DOE");
        let err = ClinicalMessage::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_decode_malformed_declaration() {
        let err =
            ClinicalMessage::decode(b"MSH|^^\\&|APP|FAC||DST|20240101||ADT^A01|1|P|2.5\r")
                .unwrap_err();
        assert!(err.to_string().contains("delimiter"));
    }

    #[test]
    fn test_decode_tolerates_crlf() {
        let raw = b"MSH|^~\\&|APP|FAC||DST|20240101120000||ADT^A01|7|P|2.5\r\nPID|1|DOE^JOHN\r\n";
        let msg = ClinicalMessage::decode(raw).unwrap();
        assert_eq!(msg.control_id(), "7");
        let pid = msg.segment(&SegmentKind::Demographic).unwrap();
        assert_eq!(pid.text(1, 1), "JOHN");
    }

    #[test]
    fn test_decode_crlf_on_final_segment_only() {
        let raw = b"MSH|^~\\&|APP|FAC||DST|20240101120000||ADT^A01|7|P|2.5\rPID|1|DOE^JOHN\r\n";
        let msg = ClinicalMessage::decode(raw).unwrap();
        assert_eq!(msg.segments().len(), 1);
        assert_eq!(msg.segment(&SegmentKind::Demographic).unwrap().text(1, 0), "DOE");
    }

    #[test]
    fn test_decode_lf_without_cr_is_truncated() {
        let raw = b"MSH|^~\\&|APP|FAC||DST|20240101120000||ADT^A01|7|P|2.5\rPID|1|DOE^JOHN\n";
        let err = ClinicalMessage::decode(raw).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_decode_rejects_second_header() {
        let header = "MSH|^~\\&|APP|FAC||DST|20240101||ADT^A01|7|P|2.5\r";
        let raw = format!("{header}{header}");
        assert!(ClinicalMessage::decode(raw.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_custom_delimiters() {
        let raw = b"MSH#*~\\&#APP#FAC##DST#20240101##ADT*A01#9#P#2.5\rPID#1#DOE*JANE\r";
        let msg = ClinicalMessage::decode(raw).unwrap();
        assert_eq!(msg.delimiters().field, '#');
        assert_eq!(msg.category(), &MessageCategory::Adt);
        let pid = msg.segment(&SegmentKind::Demographic).unwrap();
        assert_eq!(pid.text(1, 0), "DOE");
        assert_eq!(pid.text(1, 1), "JANE");
    }

    #[test]
    fn test_subcomponents_are_concatenated() {
        let raw = b"MSH|^~\\&|APP|FAC||DST|20240101||ADT^A01|7|P|2.5\rPID|1||19900101|12&Main St^Springfield\r";
        let msg = ClinicalMessage::decode(raw).unwrap();
        let pid = msg.segment(&SegmentKind::Demographic).unwrap();
        let address = pid.field(3).unwrap();
        assert_eq!(address.components()[0].subcomponents(), ["12", "Main St"]);
        assert_eq!(address.component_text(0), "12 Main St");
    }

    #[test]
    fn test_encode_rejects_terminator_in_value() {
        let msg = ClinicalMessage::new(sample_header())
            .with_segment(Segment::with_fields(
                SegmentKind::Demographic,
                vec![Field::new("line1\rline2")],
            ))
            .unwrap();
        assert!(matches!(msg.validate(), Err(ReferralError::Encoding(ref m)) if m.starts_with("PID")));
    }

    #[test]
    fn test_push_rejects_second_header() {
        let mut msg = ClinicalMessage::new(sample_header());
        assert!(msg.push(sample_header().to_segment()).is_err());
    }
}

//! Message records.
//!
//! [`RawMessage`] is what an archive parser hands over: every field may be
//! missing or messy. [`RawMessage::normalize`] turns it into a [`Message`],
//! the record the stores persist.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Stored message
// ============================================================================

/// A uniquely identified mail item, as persisted by the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique identifier (the natural key).
    pub message_id: String,

    /// Subject line, unfolded.
    pub subject: String,

    /// Sender address.
    pub sender: String,

    /// Recipient addresses, in header order.
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Sent date; absent when missing or unparseable.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Normalized plain-text body.
    pub body: String,

    /// Opaque reference back to the originating archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_locator: Option<String>,
}

impl Message {
    /// Create a message with an id, subject and body; other fields empty.
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            subject: subject.into(),
            sender: String::new(),
            recipients: Vec::new(),
            date: None,
            body: body.into(),
            source_locator: None,
        }
    }

    /// Set the sender.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Add a recipient.
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Set the date.
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the source locator.
    pub fn with_source_locator(mut self, locator: impl Into<String>) -> Self {
        self.source_locator = Some(locator.into());
        self
    }

    /// The text fed to embedding backends: subject, blank line, body.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.subject, self.body)
            .trim()
            .to_string()
    }
}

// ============================================================================
// Incoming record
// ============================================================================

/// A message record as produced by an archive parser.
///
/// Any field may be absent; [`normalize`](Self::normalize) decides which
/// omissions are fatal for the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message-ID header value.
    #[serde(default)]
    pub message_id: Option<String>,

    /// Subject header value, possibly folded.
    #[serde(default)]
    pub subject: Option<String>,

    /// From header value.
    #[serde(default)]
    pub sender: Option<String>,

    /// To/Cc addresses.
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Date header value, unparsed.
    #[serde(default)]
    pub date: Option<String>,

    /// Decoded plain-text body.
    #[serde(default)]
    pub body: Option<String>,

    /// Archive path/offset reference.
    #[serde(default)]
    pub source_locator: Option<String>,
}

impl RawMessage {
    /// Create a raw record with the three fields most callers have.
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Some(message_id.into()),
            subject: Some(subject.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Set the date header text.
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Set the sender.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Normalize into a [`Message`].
    ///
    /// A missing or blank `message_id` is a [`Error::MalformedRecord`]; an
    /// unparseable date is recorded as absent.
    pub fn normalize(self) -> Result<Message> {
        let message_id = self
            .message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::malformed("record has no message_id"))?
            .to_string();

        if message_id.chars().any(char::is_control) {
            return Err(Error::malformed(format!(
                "message_id {message_id:?} contains control characters"
            )));
        }

        let date = self.date.as_deref().and_then(|raw| {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                log::debug!("Unparseable date {raw:?} on {message_id}; storing as absent");
            }
            parsed
        });

        Ok(Message {
            subject: self.subject.as_deref().map(unfold).unwrap_or_default(),
            sender: self.sender.as_deref().map(str::trim).unwrap_or_default().to_string(),
            recipients: self
                .recipients
                .iter()
                .map(|r| r.trim())
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect(),
            date,
            body: self.body.as_deref().map(normalize_body).unwrap_or_default(),
            source_locator: self
                .source_locator
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            message_id,
        })
    }
}

// ============================================================================
// Normalization helpers
// ============================================================================

/// Collapse every whitespace run to a single space and trim.
pub fn unfold(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a body to plain LF text without trailing whitespace.
pub fn normalize_body(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n").replace('\0', "");
    let lines: Vec<&str> = unified.lines().map(str::trim_end).collect();

    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Parse a date header: RFC 2822, then RFC 3339, then a plain timestamp.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_minimal() {
        let msg = RawMessage::new("m1", "Invoice March", "please find attached the invoice")
            .normalize()
            .unwrap();
        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.subject, "Invoice March");
        assert_eq!(msg.body, "please find attached the invoice");
        assert!(msg.date.is_none());
        assert!(msg.sender.is_empty());
    }

    #[test]
    fn test_normalize_missing_id() {
        let raw = RawMessage {
            subject: Some("no id".into()),
            ..Default::default()
        };
        let err = raw.normalize().unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_normalize_blank_id() {
        let err = RawMessage::new("   ", "s", "b").normalize().unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_normalize_trims_id() {
        let msg = RawMessage::new("  <abc@host>  ", "s", "b").normalize().unwrap();
        assert_eq!(msg.message_id, "<abc@host>");
    }

    #[test]
    fn test_normalize_unfolds_subject() {
        let msg = RawMessage::new("m", "Weekly\r\n   search\tsync ", "b")
            .normalize()
            .unwrap();
        assert_eq!(msg.subject, "Weekly search sync");
    }

    #[test]
    fn test_normalize_body_line_endings() {
        let body = "\r\n\r\nHello there   \r\nsecond line\r\n\r\n";
        assert_eq!(normalize_body(body), "Hello there\nsecond line");
    }

    #[test]
    fn test_normalize_body_strips_nul() {
        assert_eq!(normalize_body("a\0b"), "ab");
    }

    #[test]
    fn test_normalize_body_blank() {
        assert_eq!(normalize_body(" \n \n"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = RawMessage::new("m", " A  b ", "x \r\n y ").normalize().unwrap();
        let twice = RawMessage::new(once.message_id.clone(), once.subject.clone(), once.body.clone())
            .normalize()
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Tue, 11 Feb 2025 09:30:00 +0000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 2, 11, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_date_rfc3339_converts_to_utc() {
        let dt = parse_date("2025-02-11T10:30:00+01:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 2, 11, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_date_plain() {
        assert!(parse_date("2024-12-01 08:00:00").is_some());
    }

    #[test]
    fn test_unparseable_date_is_absent() {
        let msg = RawMessage::new("m", "s", "b")
            .with_date("sometime last week")
            .normalize()
            .unwrap();
        assert!(msg.date.is_none());
    }

    #[test]
    fn test_recipients_dropped_when_blank() {
        let raw = RawMessage {
            recipients: vec![" bob@example.com ".into(), "  ".into()],
            ..RawMessage::new("m", "s", "b")
        };
        let msg = raw.normalize().unwrap();
        assert_eq!(msg.recipients, vec!["bob@example.com".to_string()]);
    }

    #[test]
    fn test_raw_message_from_json_with_missing_fields() {
        let raw: RawMessage = serde_json::from_str(r#"{"subject": "hi"}"#).unwrap();
        assert!(raw.message_id.is_none());
        assert!(raw.recipients.is_empty());
    }

    #[test]
    fn test_embedding_text() {
        let msg = Message::new("m", "Subject", "Body");
        assert_eq!(msg.embedding_text(), "Subject\n\nBody");
        assert_eq!(Message::new("m", "", "Body").embedding_text(), "Body");
    }

    #[test]
    fn test_message_serialization_skips_empty_locator() {
        let msg = Message::new("m", "s", "b");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("source_locator"));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}

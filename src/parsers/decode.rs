//! # Decode-mode parser (JSON lines).
//!
//! `rtl_433 -F json` prints one JSON object per received transmission. Each line
//! is parsed independently; anything that is not an object with a `model` field
//! (status chatter, truncated output, over-long lines, invalid UTF-8) is counted
//! as malformed and skipped.

use std::sync::Arc;

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::debug;

use super::ParseCounters;
use crate::events::{DomainEvent, Reading, now_ms};

const SAMPLE_LEN: usize = 80;

/// Incremental JSON-lines parser.
#[derive(Debug)]
pub struct DecodeParser {
    codec: LinesCodec,
    buf: BytesMut,
    counters: Arc<ParseCounters>,
}

impl DecodeParser {
    /// Lines longer than `max_line_len` are discarded.
    pub fn new(max_line_len: usize, counters: Arc<ParseCounters>) -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(max_line_len),
            buf: BytesMut::new(),
            counters,
        }
    }

    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<DomainEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            match self.codec.decode(&mut self.buf) {
                Ok(Some(line)) => self.line(&line, &mut out),
                Ok(None) => break,
                Err(e) => self.reject(&e),
            }
        }
        out
    }

    /// Parses a trailing line without newline.
    pub fn finish(&mut self) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        loop {
            match self.codec.decode_eof(&mut self.buf) {
                Ok(Some(line)) => self.line(&line, &mut out),
                Ok(None) => break,
                Err(e) => self.reject(&e),
            }
        }
        out
    }

    fn line(&self, line: &str, out: &mut Vec<DomainEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match parse_reading(line, now_ms()) {
            Some(reading) => {
                self.counters.event();
                out.push(DomainEvent::Reading(reading));
            }
            None => {
                self.counters.malformed();
                debug!(sample = %truncate(line, SAMPLE_LEN), "skipping undecodable line");
            }
        }
    }

    fn reject(&self, err: &LinesCodecError) {
        self.counters.malformed();
        debug!(error = %err, "skipping unreadable line");
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn stringify(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truthy(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "ok" => Some(true),
            "0" | "false" | "low" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parses one decoder line into a [`Reading`]; `None` if it is not a sensor record.
pub fn parse_reading(line: &str, received_at_ms: u64) -> Option<Reading> {
    let Value::Object(mut obj) = serde_json::from_str::<Value>(line).ok()? else {
        return None;
    };
    let model = stringify(obj.remove("model")?).filter(|m| !m.is_empty())?;
    let id = obj.remove("id").and_then(stringify);
    let channel = obj.remove("channel").and_then(stringify);
    let battery_ok = obj.remove("battery_ok").as_ref().and_then(truthy);
    let time = obj.remove("time").and_then(stringify);

    Some(Reading {
        model,
        id,
        channel,
        battery_ok,
        time,
        received_at_ms,
        fields: obj,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"{"time":"2024-01-15 10:30:00","model":"Acurite-Tower","id":1234,"channel":"A","battery_ok":1,"temperature_C":21.5,"humidity":45}"#;

    #[test]
    fn test_parse_reading_extracts_known_fields() {
        let r = parse_reading(LINE, 7).unwrap();
        assert_eq!(r.model, "Acurite-Tower");
        assert_eq!(r.id.as_deref(), Some("1234"));
        assert_eq!(r.channel.as_deref(), Some("A"));
        assert_eq!(r.battery_ok, Some(true));
        assert_eq!(r.time.as_deref(), Some("2024-01-15 10:30:00"));
        assert_eq!(r.received_at_ms, 7);
        assert_eq!(r.fields["temperature_C"], 21.5);
        assert!(!r.fields.contains_key("model"));
    }

    #[test]
    fn test_object_without_model_is_rejected() {
        assert!(parse_reading(r#"{"time":"now","enabled":true}"#, 0).is_none());
        assert!(parse_reading("[1,2,3]", 0).is_none());
        assert!(parse_reading("rtl_433 version 23.11", 0).is_none());
    }

    #[test]
    fn test_split_lines_and_garbage() {
        let counters = Arc::new(ParseCounters::default());
        let mut p = DecodeParser::new(4096, Arc::clone(&counters));

        let (a, b) = LINE.split_at(40);
        assert!(p.parse_chunk(a.as_bytes()).is_empty());
        let mut events = p.parse_chunk(format!("{b}\nFound Rafael Micro R820T tuner\n").as_bytes());
        events.extend(p.parse_chunk(b"\r\n\n"));
        events.extend(p.parse_chunk(LINE.as_bytes()));
        events.extend(p.finish());

        assert_eq!(events.len(), 2);
        let stats = counters.snapshot();
        assert_eq!(stats.events, 2);
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn test_overlong_line_is_discarded_not_fatal() {
        let counters = Arc::new(ParseCounters::default());
        let mut p = DecodeParser::new(300, Arc::clone(&counters));

        let long = format!("{{\"model\":\"{}\"}}\n", "x".repeat(1000));
        assert!(p.parse_chunk(long.as_bytes()).is_empty());
        let events = p.parse_chunk(format!("{LINE}\n").as_bytes());

        assert_eq!(events.len(), 1);
        assert_eq!(counters.snapshot().malformed, 1);
    }
}

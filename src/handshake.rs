//! Opening-frame parser — `spec.md` §4.2.
//!
//! The first TEXT frame on a WebSocket is a JSON object configuring the
//! stream for its entire lifetime. Parsing never partially succeeds: any
//! malformed field fails the whole handshake with a [`GatewayError::Handshake`].

use serde_json::Value;

use crate::codec::Codec;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerMode {
    Immediate,
    OnAck,
    #[default]
    OnDrain,
}

impl SchedulerMode {
    fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "IMMEDIATE" => Ok(SchedulerMode::Immediate),
            "ON_ACK" => Ok(SchedulerMode::OnAck),
            "ON_DRAIN" => Ok(SchedulerMode::OnDrain),
            other => Err(GatewayError::handshake(format!(
                "unknown value for field: scheduler  value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderInit {
    Oldest,
    MostRecent,
    #[default]
    AwaitNew,
}

impl ReaderInit {
    fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "OLDEST" => Ok(ReaderInit::Oldest),
            "MOST_RECENT" => Ok(ReaderInit::MostRecent),
            "AWAIT_NEW" => Ok(ReaderInit::AwaitNew),
            other => Err(GatewayError::handshake(format!(
                "unknown value for field: init  value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderIter {
    #[default]
    Next,
    Newest,
}

impl ReaderIter {
    fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "NEXT" => Ok(ReaderIter::Next),
            "NEWEST" => Ok(ReaderIter::Newest),
            other => Err(GatewayError::handshake(format!(
                "unknown value for field: iter  value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    File,
    Cfg,
    Log,
    Prpc,
    Pubsub,
    Rpc,
}

impl Protocol {
    /// Also used directly by the REST `ls` handler, which takes a
    /// protocol name as a path segment rather than a handshake field.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "file" => Ok(Protocol::File),
            "cfg" => Ok(Protocol::Cfg),
            "log" => Ok(Protocol::Log),
            "prpc" => Ok(Protocol::Prpc),
            "pubsub" => Ok(Protocol::Pubsub),
            "rpc" => Ok(Protocol::Rpc),
            other => Err(GatewayError::handshake(format!(
                "unknown value for field: protocol  value: {other}"
            ))),
        }
    }

    /// Path template used by the discover route to slice a topic back out
    /// of an absolute path — `spec.md` §4.3 "Discover".
    pub fn template(&self) -> &'static str {
        match self {
            Protocol::File => "{topic}",
            Protocol::Cfg => "cfg/{topic}.cfg",
            Protocol::Log => "log/{topic}.log",
            Protocol::Prpc => "prpc/{topic}.prpc",
            Protocol::Pubsub => "pubsub/{topic}.pubsub",
            Protocol::Rpc => "rpc/{topic}.rpc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Dbg,
    Info,
    Warn,
    Err,
    Crit,
}

impl LogLevel {
    fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "DBG" => Ok(LogLevel::Dbg),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERR" => Ok(LogLevel::Err),
            "CRIT" => Ok(LogLevel::Crit),
            other => Err(GatewayError::handshake(format!(
                "unknown value for field: level  value: {other}"
            ))),
        }
    }
}

/// The parsed opening handshake, holding every field any route might need.
/// Route adapters call [`Handshake::require_topic`]/[`Handshake::require_path`]
/// to enforce their own required fields after common parsing succeeds.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub topic: Option<String>,
    pub path: Option<String>,
    pub protocol: Option<Protocol>,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
    pub response_encoding: Codec,
    pub reader_init: ReaderInit,
    pub reader_iter: ReaderIter,
    pub reader_seq_min: u64,
    pub level: Option<LogLevel>,
    pub scheduler: SchedulerMode,
}

impl Handshake {
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|_| GatewayError::handshake("Request must be json."))?;
        let obj = raw
            .as_object()
            .ok_or_else(|| GatewayError::handshake("Request must be a json object."))?;

        let topic = get_str(obj, "topic")?;
        let path = get_str(obj, "path")?;

        let protocol = match get_str(obj, "protocol")? {
            Some(p) => Some(Protocol::parse(&p)?),
            None => None,
        };

        let headers = obj
            .get("packet")
            .and_then(|p| p.get("headers"))
            .map(|h| parse_headers(h))
            .transpose()?
            .unwrap_or_default();

        let raw_payload = obj
            .get("packet")
            .and_then(|p| p.get("payload"))
            .and_then(Value::as_str)
            .unwrap_or("");

        let request_encoding = match get_str(obj, "request_encoding")? {
            Some(v) => Codec::parse(&v)?,
            None => Codec::None,
        };
        let payload = request_encoding.decode(raw_payload);

        let response_encoding = match get_str(obj, "response_encoding")? {
            Some(v) => Codec::parse(&v)?,
            None => Codec::None,
        };

        let reader_iter = match get_str(obj, "iter")? {
            Some(v) => ReaderIter::parse(&v)?,
            None => ReaderIter::default(),
        };

        // `init` may be a numeric seq_min or one of the named enum values.
        // Resolution depends on `iter` — spec.md §4.2.
        let (reader_init, reader_seq_min) = match obj.get("init") {
            None => (ReaderInit::default(), 0),
            Some(Value::Number(n)) => {
                let seq_min = n.as_u64().ok_or_else(|| {
                    GatewayError::handshake("field init must be a non-negative integer")
                })?;
                let init = match reader_iter {
                    ReaderIter::Next => ReaderInit::Oldest,
                    ReaderIter::Newest => ReaderInit::MostRecent,
                };
                (init, seq_min)
            }
            Some(Value::String(s)) => (ReaderInit::parse(s)?, 0),
            Some(_) => {
                return Err(GatewayError::handshake(
                    "field init must be a string or integer",
                ))
            }
        };

        let level = match get_str(obj, "level")? {
            Some(v) => Some(LogLevel::parse(&v)?),
            None => None,
        };

        let scheduler = match get_str(obj, "scheduler")? {
            Some(v) => SchedulerMode::parse(&v)?,
            None => SchedulerMode::default(),
        };

        Ok(Handshake {
            topic,
            path,
            protocol,
            headers,
            payload,
            response_encoding,
            reader_init,
            reader_iter,
            reader_seq_min,
            level,
            scheduler,
        })
    }

    pub fn require_topic(&self) -> Result<&str, GatewayError> {
        self.topic
            .as_deref()
            .ok_or_else(|| GatewayError::handshake("Request missing required field: topic"))
    }

    pub fn require_path(&self) -> Result<&str, GatewayError> {
        self.path
            .as_deref()
            .ok_or_else(|| GatewayError::handshake("Request missing required field: path"))
    }

    pub fn require_protocol(&self) -> Result<Protocol, GatewayError> {
        self.protocol
            .ok_or_else(|| GatewayError::handshake("Request missing required field: protocol"))
    }
}

fn get_str(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Option<String>, GatewayError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(GatewayError::handshake(format!(
            "Request field has incorrect format. field: {field}"
        ))),
    }
}

fn parse_headers(v: &Value) -> Result<Vec<(String, String)>, GatewayError> {
    let arr = v
        .as_array()
        .ok_or_else(|| GatewayError::handshake("packet.headers must be an array"))?;
    arr.iter()
        .map(|pair| {
            let pair = pair.as_array().ok_or_else(|| {
                GatewayError::handshake("packet.headers entries must be [key, value] pairs")
            })?;
            let k = pair
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::handshake("packet.headers key must be a string"))?;
            let v = pair
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::handshake("packet.headers value must be a string"))?;
            Ok((k.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_json() {
        assert!(Handshake::parse("not json").is_err());
    }

    #[test]
    fn rejects_non_object_top_level() {
        assert!(Handshake::parse("[1,2,3]").is_err());
    }

    #[test]
    fn numeric_init_with_next_resolves_oldest_and_seq_min() {
        let h = Handshake::parse(r#"{"topic":"t","init":5,"iter":"NEXT"}"#).unwrap();
        assert_eq!(h.reader_init, ReaderInit::Oldest);
        assert_eq!(h.reader_seq_min, 5);
    }

    #[test]
    fn numeric_init_with_newest_resolves_most_recent() {
        let h = Handshake::parse(r#"{"topic":"t","init":5,"iter":"NEWEST"}"#).unwrap();
        assert_eq!(h.reader_init, ReaderInit::MostRecent);
        assert_eq!(h.reader_seq_min, 5);
    }

    #[test]
    fn string_init_looked_up_in_enum_table() {
        let h = Handshake::parse(r#"{"topic":"t","init":"MOST_RECENT"}"#).unwrap();
        assert_eq!(h.reader_init, ReaderInit::MostRecent);
    }

    #[test]
    fn unknown_enum_value_is_handshake_error() {
        assert!(Handshake::parse(r#"{"topic":"t","init":"SOMETHING"}"#).is_err());
    }

    #[test]
    fn defaults_match_spec() {
        let h = Handshake::parse(r#"{"topic":"t"}"#).unwrap();
        assert_eq!(h.scheduler, SchedulerMode::OnDrain);
        assert_eq!(h.reader_init, ReaderInit::AwaitNew);
        assert_eq!(h.reader_iter, ReaderIter::Next);
        assert_eq!(h.reader_seq_min, 0);
    }

    #[test]
    fn missing_topic_is_rejected_by_route_check() {
        let h = Handshake::parse(r#"{"path":"/x"}"#).unwrap();
        assert!(h.require_topic().is_err());
    }
}

//! Values returned from and passed to the worker

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use super::proxy::ProxyHandle;
use super::session::{RemoteRef, Session};
use crate::common::{Error, Result};
use crate::protocol::{self, Tag};

/// Keyword arguments, ordered by name
pub type Kwargs = BTreeMap<String, RemoteValue>;

/// A decoded response payload
///
/// Plain data arrives by value; every remote-object tag, however deeply
/// nested, becomes a [`ProxyHandle`] bound to the session that received it.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<RemoteValue>),
    Map(BTreeMap<String, RemoteValue>),
    Proxy(ProxyHandle),
}

impl RemoteValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RemoteValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, RemoteValue>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ProxyHandle> {
        match self {
            Self::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<ProxyHandle> {
        match self {
            Self::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// JSON rendering for display; proxies are shown as their wire tag
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => Json::Number(n.clone()),
            Self::String(s) => Json::String(s.clone()),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Proxy(p) => protocol::remote_object_tag(p.id()),
        }
    }
}

impl From<Json> for RemoteValue {
    /// Plain JSON only; tags are not interpreted here
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n),
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<&str> for RemoteValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RemoteValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for RemoteValue {
    fn from(i: i64) -> Self {
        Self::Number(i.into())
    }
}

impl From<u64> for RemoteValue {
    fn from(u: u64) -> Self {
        Self::Number(u.into())
    }
}

impl From<f64> for RemoteValue {
    /// Non-finite floats have no JSON spelling and become `Null`
    fn from(f: f64) -> Self {
        Number::from_f64(f).map(Self::Number).unwrap_or(Self::Null)
    }
}

impl From<bool> for RemoteValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<RemoteValue>> for RemoteValue {
    fn from(items: Vec<RemoteValue>) -> Self {
        Self::List(items)
    }
}

impl From<ProxyHandle> for RemoteValue {
    fn from(p: ProxyHandle) -> Self {
        Self::Proxy(p)
    }
}

impl From<&ProxyHandle> for RemoteValue {
    fn from(p: &ProxyHandle) -> Self {
        Self::Proxy(p.clone())
    }
}

/// Replace every remote-object tag in `json` with a proxy handle
pub(crate) fn decode(json: Json, session: &Session, generation: u64) -> Result<RemoteValue> {
    Ok(match json {
        Json::Array(items) => RemoteValue::List(
            items
                .into_iter()
                .map(|v| decode(v, session, generation))
                .collect::<Result<_>>()?,
        ),
        Json::Object(map) => match protocol::classify(&map) {
            Tag::RemoteObject(id) => {
                RemoteValue::Proxy(ProxyHandle::new(session.clone(), RemoteRef { generation, id }))
            }
            Tag::Malformed => {
                return Err(Error::Protocol(format!(
                    "malformed remote object tag: {}",
                    Json::Object(map)
                )));
            }
            Tag::NotTag => RemoteValue::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, decode(v, session, generation)?)))
                    .collect::<Result<_>>()?,
            ),
        },
        plain => RemoteValue::from(plain),
    })
}

/// Encode an argument for the wire
///
/// Proxies become remote-object tags; a proxy from an earlier worker
/// incarnation fails with the reconstructed `UnknownReferenceError`.
pub(crate) fn encode(value: &RemoteValue, session: &Session, generation: u64) -> Result<Json> {
    Ok(match value {
        RemoteValue::Null => Json::Null,
        RemoteValue::Bool(b) => Json::Bool(*b),
        RemoteValue::Number(n) => Json::Number(n.clone()),
        RemoteValue::String(s) => Json::String(s.clone()),
        RemoteValue::List(items) => Json::Array(
            items
                .iter()
                .map(|v| encode(v, session, generation))
                .collect::<Result<_>>()?,
        ),
        RemoteValue::Map(entries) => Json::Object(encode_map(entries, session, generation)?),
        RemoteValue::Proxy(p) => {
            session.check_current(p.target(), generation)?;
            protocol::remote_object_tag(p.id())
        }
    })
}

pub(crate) fn encode_map(entries: &Kwargs, session: &Session, generation: u64) -> Result<Map<String, Json>> {
    entries
        .iter()
        .map(|(k, v)| Ok((k.clone(), encode(v, session, generation)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_plain_json() {
        let value = RemoteValue::from(json!({"a": [1, "x", null], "b": true}));
        let map = value.as_map().unwrap();
        assert_eq!(map["a"].as_list().unwrap()[0].as_i64(), Some(1));
        assert_eq!(map["a"].as_list().unwrap()[1].as_str(), Some("x"));
        assert!(map["a"].as_list().unwrap()[2].is_null());
        assert_eq!(map["b"].as_bool(), Some(true));
    }

    #[test]
    fn test_to_json_round_trips_plain_data() {
        let json = json!({"n": 1.5, "list": ["a", {"b": false}]});
        assert_eq!(RemoteValue::from(json.clone()).to_json(), json);
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert!(RemoteValue::from(f64::NAN).is_null());
        assert_eq!(RemoteValue::from(2.0).as_f64(), Some(2.0));
    }
}

//! Value encoding between worker-side values and wire JSON
//!
//! Outgoing: plain data is written as JSON; anything else is registered and
//! replaced by a remote-object tag, recursively through lists and maps.
//! Incoming: remote-object tags in request arguments are resolved back to the
//! registered objects.

use serde_json::{Map, Number, Value as Json};

use super::exception::{Exception, Raised};
use super::object::{Kwargs, Object, Value};
use super::registry::Registry;
use crate::protocol::{self, Tag};

/// A float JSON has no spelling for (NaN, infinities)
struct NonFinite(f64);

impl Object for NonFinite {
    fn type_name(&self) -> &str {
        "float"
    }

    fn represent(&self) -> String {
        self.0.to_string()
    }
}

/// Encode `value` for the wire, registering every non-representable part
pub fn encode(value: Value, registry: &mut Registry) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Int(i) => Json::Number(i.into()),
        Value::Float(f) => match Number::from_f64(f) {
            Some(n) => Json::Number(n),
            None => protocol::remote_object_tag(registry.register(std::sync::Arc::new(NonFinite(f)))),
        },
        Value::Str(s) => Json::String(s),
        Value::List(items) => Json::Array(items.into_iter().map(|v| encode(v, registry)).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, encode(v, registry)))
                .collect(),
        ),
        Value::Object(target) => protocol::remote_object_tag(registry.register(target)),
    }
}

/// Decode a request argument, resolving embedded remote-object tags
pub fn decode(json: Json, registry: &Registry) -> Raised<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(
            items
                .into_iter()
                .map(|v| decode(v, registry))
                .collect::<Raised<_>>()?,
        ),
        Json::Object(map) => match protocol::classify(&map) {
            Tag::RemoteObject(id) => Value::Object(registry.resolve(id)?),
            Tag::Malformed => {
                return Err(Exception::type_error("malformed remote object reference"));
            }
            Tag::NotTag => Value::Map(decode_map(map, registry)?),
        },
    })
}

/// Decode a keyword-argument mapping
pub fn decode_map(map: Map<String, Json>, registry: &Registry) -> Raised<Kwargs> {
    map.into_iter()
        .map(|(k, v)| Ok((k, decode(v, registry)?)))
        .collect()
}

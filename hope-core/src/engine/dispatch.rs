//! SHP request handling.
//!
//! Replies are a reference frame when the answer is a chain position, an
//! `ok` call frame carrying result fields otherwise, and an error frame on
//! failure. Nothing is executed until the request decodes cleanly.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::HopeMemory;
use crate::chain::{ChainTarget, Snapshot};
use crate::consolidation::Consolidation;
use crate::error::{Error, Result};
use crate::layers::{Emotion, RelationalEntity};
use crate::shp::{self, Call, ErrorCode, Frame, Params, Value};

/// Name of the call frame used for successful non-reference replies
pub const REPLY_OK: &str = "ok";

/// Payload text budget in snapshot summaries, below the u16 string limit
const CONTEXT_BUDGET: usize = 60_000;

/// Most entries listed in one reply
const LIST_LIMIT: usize = 16;

/// Byte budget for any single string in a reply, so a full list stays
/// within the u16 body
const FIELD_BUDGET: usize = CONTEXT_BUDGET / LIST_LIMIT;

/// Parameters of `hope_think` that are not emotion names
const THINK_PARAMS: [&str; 2] = ["content", "importance"];

/// Whether a reply is a frame or a failure to report
enum Reply {
    Frame(Frame),
    Unknown(String),
}

impl HopeMemory {
    /// Decode one SHP frame, execute it and encode the reply
    pub fn handle(&self, bytes: &[u8], now: DateTime<Utc>) -> Vec<u8> {
        let request = match shp::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => return error_reply(&e),
        };

        let outcome = match request {
            Frame::Call(call) => self.execute(call, now),
            Frame::Reference(r) => self.resolve(r).map(|s| Reply::Frame(summary(&s))),
            Frame::Error { code, .. } => Err(Error::protocol(format!(
                "error frame ({}) is not a request",
                code
            ))),
        };

        match outcome {
            Ok(Reply::Frame(frame)) => shp::encode_frame(&frame).unwrap_or_else(|e| error_reply(&e)),
            Ok(Reply::Unknown(name)) => {
                shp::encode_error(ErrorCode::UnknownCall, &format!("unknown call {:?}", name))
            }
            Err(e) => error_reply(&e),
        }
    }

    fn execute(&self, call: Call, now: DateTime<Utc>) -> Result<Reply> {
        debug!(name = %call.name, params = call.params.len(), "Handling SHP call");
        let p = &call.params;

        let frame = match call.name.as_str() {
            "hope_think" => {
                // Any other parameter names an emotion felt while thinking
                let mut feelings = Vec::new();
                for (name, value) in p.iter().filter(|(k, _)| !THINK_PARAMS.contains(k)) {
                    feelings.push((name.parse::<Emotion>()?, number(name, value)?));
                }
                let thought = self.think_feeling(
                    required_str(p, "content")?,
                    float_or(p, "importance", 0.5)?,
                    &feelings,
                    now,
                )?;
                let mut out = Params::new().with("item", thought.item.as_str());
                if let Some(head) = thought.head {
                    out.insert("head", head);
                }
                ok(out)
            }
            "hope_note" => {
                let id = self.note(required_str(p, "content")?, float_or(p, "importance", 0.5)?, now)?;
                ok(Params::new().with("item", id.as_str()))
            }
            "hope_feel" => {
                let mut updates = Vec::with_capacity(p.len());
                for (name, value) in p.iter() {
                    updates.push((name, number(name, value)?));
                }
                let vector = self.feel_named(&updates, now)?;
                let mut out = Params::new();
                if let Some((emotion, intensity)) = vector.dominant() {
                    out.insert("dominant", emotion.as_str());
                    out.insert("intensity", intensity);
                }
                ok(out)
            }
            "hope_meet" => {
                let person = self.meet(required_str(p, "name")?, optional_str(p, "role")?.unwrap_or(""), now)?;
                person_reply(&person)
            }
            "hope_who_is" => {
                let name = required_str(p, "name")?;
                let person = self
                    .person(name)?
                    .ok_or_else(|| Error::not_found(format!("person {:?}", clip(name, FIELD_BUDGET))))?;
                person_reply(&person)
            }
            "hope_associate" => {
                let edge = self.associate(
                    required_str(p, "a")?,
                    required_str(p, "b")?,
                    float_or(p, "strength", 0.5)?,
                    now,
                )?;
                ok(Params::new().with("strength", edge.strength))
            }
            "hope_consolidate" => match self.consolidate(now)? {
                Consolidation::Appended(s) | Consolidation::Unchanged(s) => Frame::Reference(s.id),
                Consolidation::Empty => ok(Params::new().with("empty", true)),
            },
            "hope_resolve" => {
                let target = match p.get("ref") {
                    Some(Value::Ref(r)) => ChainTarget::Id(*r),
                    Some(Value::Str(s)) => s.parse()?,
                    None => ChainTarget::Latest,
                    Some(_) => return Err(Error::invalid_input("ref must be a reference or string")),
                };
                let snapshot = self.resolve(target)?;
                summary(&snapshot)
            }
            "hope_remember" => {
                let found = self.remember(required_str(p, "query")?, now)?;
                list(found.len(), found.iter().map(|r| r.text.as_str()))
            }
            "hope_recall" => {
                let limit = int_or(p, "limit", 10)?.clamp(0, LIST_LIMIT as i64) as usize;
                let items = self.recent(limit)?;
                list(items.len(), items.iter().map(|i| i.payload.as_str()))
            }
            "hope_working_memory" => {
                let items = self.working_items()?;
                let mut out = Params::new()
                    .with("count", items.len() as i64)
                    .with("capacity", self.config().memory.working_capacity as i64);
                for (i, item) in items.iter().enumerate() {
                    out.insert(i.to_string(), clip(&item.payload, FIELD_BUDGET));
                }
                ok(out)
            }
            "hope_associations" => {
                let min = float_or(p, "min_strength", 0.0)?;
                let linked = self.associated(required_str(p, "concept")?, min, now)?;
                let mut out = Params::new().with("count", linked.len() as i64);
                for (i, (concept, strength)) in linked.iter().take(LIST_LIMIT).enumerate() {
                    out.insert(i.to_string(), clip(concept, FIELD_BUDGET));
                    out.insert(format!("{}.strength", i), *strength);
                }
                ok(out)
            }
            "hope_sweep" => {
                let report = self.sweep(now)?;
                ok(Params::new()
                    .with("removed", report.removed.len() as i64)
                    .with("pruned", report.pruned.len() as i64))
            }
            "hope_status" => {
                let status = self.status(now)?;
                let mut out = Params::new()
                    .with("working", status.working as i64)
                    .with("short_term", status.short_term as i64)
                    .with("long_term", status.long_term as i64)
                    .with("people", status.people as i64)
                    .with("associations", status.associations as i64);
                if let Some(head) = status.head {
                    out.insert("head", head);
                }
                if let Some((emotion, _)) = status.dominant_emotion {
                    out.insert("mood", emotion.as_str());
                }
                ok(out)
            }
            _ => return Ok(Reply::Unknown(call.name)),
        };
        Ok(Reply::Frame(frame))
    }
}

fn ok(params: Params) -> Frame {
    Frame::Call(Call::new(REPLY_OK, params))
}

/// `count` plus up to [`LIST_LIMIT`] texts under keys `"0"`, `"1"`, ...
fn list<'a>(count: usize, texts: impl Iterator<Item = &'a str>) -> Frame {
    let mut out = Params::new().with("count", count as i64);
    for (i, text) in texts.take(LIST_LIMIT).enumerate() {
        out.insert(i.to_string(), clip(text, FIELD_BUDGET));
    }
    ok(out)
}

fn person_reply(person: &RelationalEntity) -> Frame {
    ok(Params::new()
        .with("name", clip(&person.name, FIELD_BUDGET))
        .with("role", clip(&person.role, FIELD_BUDGET))
        .with("interactions", i64::from(person.interaction_count))
        .with("last_seen", person.last_interaction.to_rfc3339()))
}

/// Longest prefix of `text` within `budget` bytes, cut on a char boundary
fn clip(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let mut end = budget;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn error_reply(err: &Error) -> Vec<u8> {
    shp::encode_error(ErrorCode::from(err), &err.to_string())
}

fn summary(snapshot: &Snapshot) -> Frame {
    let mut context = String::new();
    for c in &snapshot.items {
        if context.len() + c.item.payload.len() + 1 > CONTEXT_BUDGET {
            break;
        }
        if !context.is_empty() {
            context.push('\n');
        }
        context.push_str(&c.item.payload);
    }

    ok(Params::new()
        .with("id", snapshot.id)
        .with("generation", snapshot.generation.min(i64::MAX as u64) as i64)
        .with("items", snapshot.items.len() as i64)
        .with("context", context))
}

fn required_str<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
    optional_str(params, key)?.ok_or_else(|| Error::invalid_input(format!("missing parameter {:?}", key)))
}

fn optional_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| Error::invalid_input(format!("{} must be a string", key))),
    }
}

fn float_or(params: &Params, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => number(key, v),
    }
}

fn int_or(params: &Params, key: &str, default: i64) -> Result<i64> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_int()
            .ok_or_else(|| Error::invalid_input(format!("{} must be an integer", key))),
    }
}

fn number(key: &str, value: &Value) -> Result<f64> {
    value
        .as_float()
        .ok_or_else(|| Error::invalid_input(format!("{} must be a number", key)))
}

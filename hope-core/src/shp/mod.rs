//! Silent Hope Protocol (SHP) binary codec.
//!
//! Every frame starts with a 4-byte header:
//!
//! ```text
//! byte 0     protocol version (1)
//! byte 1     kind: 0 call, 1 reference, 2 error
//! bytes 2-3  body length, u16 big-endian
//! ```
//!
//! Call body: `name_len u8 | name | param_count u8 | { key_len u8 | key | tag u8 | value }*`
//! with tags 0 bool, 1 i64, 2 f64, 3 string (u16 length), 4 reference (16 bytes).
//! Reference body: 16 raw bytes. Error body: `code u8 | msg_len u16 | msg`.
//!
//! Decoding checks every length against the bytes that remain and never
//! panics on untrusted input.

mod codec;

pub use codec::{
    decode, decode_call, decode_frame, decode_reference, encode_call, encode_error,
    encode_frame, encode_reference,
};

use std::fmt;

use crate::chain::ChainRef;
use crate::error::Error;

/// Current protocol version
pub const VERSION: u8 = 1;

/// Fixed header width
pub const HEADER_LEN: usize = 4;

/// Message kind carried in header byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Call = 0,
    Reference = 1,
    Error = 2,
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self, Error> {
        match b {
            0 => Ok(Kind::Call),
            1 => Ok(Kind::Reference),
            2 => Ok(Kind::Error),
            other => Err(Error::protocol(format!("unknown message kind {}", other))),
        }
    }
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ref(ChainRef),
}

impl Value {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Ref(_) => 4,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_chain_ref(&self) -> Option<ChainRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<ChainRef> for Value {
    fn from(v: ChainRef) -> Self {
        Value::Ref(v)
    }
}

/// Call parameters in insertion order.
///
/// Encoding walks this order, so calls built the same way encode to the
/// same bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`; an existing key keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder form of [`Params::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub params: Params,
}

impl Call {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Error codes carried by error frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    InvalidInput = 1,
    NotFound = 2,
    ChainConflict = 3,
    Protocol = 4,
    PoolExhausted = 5,
    Internal = 6,
    UnknownCall = 7,
}

impl ErrorCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self, Error> {
        Ok(match b {
            1 => ErrorCode::InvalidInput,
            2 => ErrorCode::NotFound,
            3 => ErrorCode::ChainConflict,
            4 => ErrorCode::Protocol,
            5 => ErrorCode::PoolExhausted,
            6 => ErrorCode::Internal,
            7 => ErrorCode::UnknownCall,
            other => return Err(Error::protocol(format!("unknown error code {}", other))),
        })
    }
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidInput(_) | Error::Config(_) => ErrorCode::InvalidInput,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::ChainConflict { .. } => ErrorCode::ChainConflict,
            Error::Protocol(_) => ErrorCode::Protocol,
            Error::PoolExhausted { .. } => ErrorCode::PoolExhausted,
            _ => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ChainConflict => "chain_conflict",
            ErrorCode::Protocol => "protocol",
            ErrorCode::PoolExhausted => "pool_exhausted",
            ErrorCode::Internal => "internal",
            ErrorCode::UnknownCall => "unknown_call",
        };
        f.write_str(name)
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call(Call),
    Reference(ChainRef),
    Error { code: ErrorCode, message: String },
}

impl Frame {
    pub fn kind(&self) -> Kind {
        match self {
            Frame::Call(_) => Kind::Call,
            Frame::Reference(_) => Kind::Reference,
            Frame::Error { .. } => Kind::Error,
        }
    }
}

use super::{Call, ErrorCode, Frame, HEADER_LEN, Kind, Params, VERSION, Value};
use crate::chain::ChainRef;
use crate::error::{Error, Result};

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_REF: u8 = 4;

/// Encode a call frame.
///
/// Fails with `Protocol` when a name, key, string, parameter count or the
/// whole body does not fit its length prefix.
pub fn encode_call(name: &str, params: &Params) -> Result<Vec<u8>> {
    if name.is_empty() {
        return Err(Error::protocol("call name must not be empty"));
    }

    let mut body = Vec::with_capacity(64);
    put_short_str(&mut body, "call name", name)?;
    body.push(fit_u8("parameter count", params.len())?);

    for (key, value) in params.iter() {
        put_short_str(&mut body, "parameter key", key)?;
        body.push(value.tag());
        match value {
            Value::Bool(b) => body.push(u8::from(*b)),
            Value::Int(i) => body.extend_from_slice(&i.to_be_bytes()),
            Value::Float(f) => body.extend_from_slice(&f.to_bits().to_be_bytes()),
            Value::Str(s) => put_long_str(&mut body, key, s)?,
            Value::Ref(r) => body.extend_from_slice(r.as_bytes()),
        }
    }

    frame(Kind::Call, body)
}

/// Encode a reference frame
pub fn encode_reference(reference: ChainRef) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + ChainRef::LEN);
    out.push(VERSION);
    out.push(Kind::Reference as u8);
    out.extend_from_slice(&(ChainRef::LEN as u16).to_be_bytes());
    out.extend_from_slice(reference.as_bytes());
    out
}

/// Encode an error frame; over-long messages are truncated on a char boundary
pub fn encode_error(code: ErrorCode, message: &str) -> Vec<u8> {
    // code + length prefix
    let budget = u16::MAX as usize - 3;
    let mut end = message.len().min(budget);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let message = &message[..end];

    let mut body = Vec::with_capacity(3 + message.len());
    body.push(code.as_u8());
    body.extend_from_slice(&(message.len() as u16).to_be_bytes());
    body.extend_from_slice(message.as_bytes());

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(VERSION);
    out.push(Kind::Error as u8);
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Encode any frame
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    match frame {
        Frame::Call(call) => encode_call(&call.name, &call.params),
        Frame::Reference(r) => Ok(encode_reference(*r)),
        Frame::Error { code, message } => Ok(encode_error(*code, message)),
    }
}

/// Decode exactly one frame; trailing bytes are a protocol error
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let (frame, used) = decode_frame(bytes)?;
    if used != bytes.len() {
        return Err(Error::protocol(format!(
            "{} trailing bytes after frame",
            bytes.len() - used
        )));
    }
    Ok(frame)
}

/// Decode one frame from the front of `bytes`, returning it with the number
/// of bytes consumed
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize)> {
    let mut header = Reader::new(bytes);
    let version = header.u8()?;
    if version != VERSION {
        return Err(Error::protocol(format!(
            "unsupported protocol version {} (expected {})",
            version, VERSION
        )));
    }
    let kind = Kind::try_from(header.u8()?)?;
    let body_len = header.u16()? as usize;
    let body = header.take(body_len)?;

    let mut r = Reader::new(body);
    let frame = match kind {
        Kind::Call => Frame::Call(read_call(&mut r)?),
        Kind::Reference => Frame::Reference(r.chain_ref()?),
        Kind::Error => {
            let code = ErrorCode::try_from(r.u8()?)?;
            let message = r.long_str("error message")?;
            Frame::Error { code, message }
        }
    };
    r.finish()?;

    Ok((frame, HEADER_LEN + body_len))
}

/// Decode a frame that must be a call
pub fn decode_call(bytes: &[u8]) -> Result<Call> {
    match decode(bytes)? {
        Frame::Call(call) => Ok(call),
        other => Err(Error::protocol(format!(
            "expected call frame, got {:?}",
            other.kind()
        ))),
    }
}

/// Decode a frame that must be a reference
pub fn decode_reference(bytes: &[u8]) -> Result<ChainRef> {
    match decode(bytes)? {
        Frame::Reference(r) => Ok(r),
        other => Err(Error::protocol(format!(
            "expected reference frame, got {:?}",
            other.kind()
        ))),
    }
}

fn read_call(r: &mut Reader<'_>) -> Result<Call> {
    let name = r.short_str("call name")?;
    if name.is_empty() {
        return Err(Error::protocol("call name must not be empty"));
    }

    let count = r.u8()?;
    let mut params = Params::new();
    for _ in 0..count {
        let key = r.short_str("parameter key")?;
        if params.contains_key(&key) {
            return Err(Error::protocol(format!("duplicate parameter {:?}", key)));
        }
        let value = match r.u8()? {
            TAG_BOOL => match r.u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(Error::protocol(format!("invalid bool byte {}", other))),
            },
            TAG_INT => Value::Int(i64::from_be_bytes(r.array()?)),
            TAG_FLOAT => Value::Float(f64::from_bits(u64::from_be_bytes(r.array()?))),
            TAG_STR => Value::Str(r.long_str(&key)?),
            TAG_REF => Value::Ref(r.chain_ref()?),
            other => return Err(Error::protocol(format!("unknown type tag {}", other))),
        };
        params.insert(key, value);
    }

    Ok(Call { name, params })
}

fn frame(kind: Kind, body: Vec<u8>) -> Result<Vec<u8>> {
    let len = u16::try_from(body.len())
        .map_err(|_| Error::protocol(format!("frame body of {} bytes exceeds 65535", body.len())))?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(VERSION);
    out.push(kind as u8);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn fit_u8(what: &str, n: usize) -> Result<u8> {
    u8::try_from(n).map_err(|_| Error::protocol(format!("{} {} exceeds 255", what, n)))
}

fn put_short_str(buf: &mut Vec<u8>, what: &str, s: &str) -> Result<()> {
    buf.push(fit_u8(what, s.len())?);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_long_str(buf: &mut Vec<u8>, what: &str, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::protocol(format!("string {:?} of {} bytes exceeds 65535", what, s.len())))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Bounds-checked cursor over untrusted bytes
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::protocol(format!(
                "need {} bytes at offset {}, only {} remain",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn chain_ref(&mut self) -> Result<ChainRef> {
        Ok(ChainRef::from_bytes(self.array()?))
    }

    fn short_str(&mut self, what: &str) -> Result<String> {
        let len = self.u8()? as usize;
        self.utf8(what, len)
    }

    fn long_str(&mut self, what: &str) -> Result<String> {
        let len = self.u16()? as usize;
        self.utf8(what, len)
    }

    fn utf8(&mut self, what: &str, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| Error::protocol(format!("{} is not valid UTF-8: {}", what, e)))
    }

    fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::protocol(format!("{} unread bytes in frame body", n))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> (String, Params) {
        let params = Params::new()
            .with("content", "The password is Sponge")
            .with("importance", 0.9)
            .with("pinned", true)
            .with("count", -42i64)
            .with("ref", ChainRef::from_bytes([0xaa; 16]));
        ("hope_think".to_string(), params)
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_call("x", &Params::new()).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 3, 1, b'x', 0]);
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let (name, params) = sample();
        let bytes = encode_call(&name, &params).unwrap();
        let call = decode_call(&bytes).unwrap();
        assert_eq!(call.name, name);
        assert_eq!(call.params, params);
        let keys: Vec<_> = call.params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["content", "importance", "pinned", "count", "ref"]);

        // Deterministic
        assert_eq!(bytes, encode_call(&name, &params).unwrap());
    }

    #[test]
    fn test_reference_frame() {
        let r = ChainRef::from_bytes([5; 16]);
        let bytes = encode_reference(r);
        assert_eq!(bytes.len(), HEADER_LEN + 16);
        assert_eq!(decode_reference(&bytes).unwrap(), r);
        assert!(decode_call(&bytes).is_err());
    }

    #[test]
    fn test_error_frame() {
        let bytes = encode_error(ErrorCode::NotFound, "snapshot 00ff");
        match decode(&bytes).unwrap() {
            Frame::Error { code, message } => {
                assert_eq!(code, ErrorCode::NotFound);
                assert_eq!(message, "snapshot 00ff");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_version_and_kind() {
        let mut bytes = encode_call("x", &Params::new()).unwrap();
        bytes[0] = 2;
        assert!(matches!(decode(&bytes), Err(Error::Protocol(_))));

        let mut bytes = encode_call("x", &Params::new()).unwrap();
        bytes[1] = 9;
        assert!(matches!(decode(&bytes), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_rejects_bad_tag_and_bool() {
        let params = Params::new().with("b", true);
        let bytes = encode_call("x", &params).unwrap();

        let mut bad_tag = bytes.clone();
        let tag_pos = bytes.len() - 2;
        bad_tag[tag_pos] = 7;
        assert!(matches!(decode(&bad_tag), Err(Error::Protocol(_))));

        let mut bad_bool = bytes;
        let last = bad_bool.len() - 1;
        bad_bool[last] = 2;
        assert!(matches!(decode(&bad_bool), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        // name_len 1, name 0xff
        let bytes = vec![1, 0, 0, 3, 1, 0xff, 0];
        assert!(matches!(decode(&bytes), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_rejects_oversized_fields() {
        let long_key = "k".repeat(256);
        let params = Params::new().with(long_key, 1i64);
        assert!(matches!(encode_call("x", &params), Err(Error::Protocol(_))));

        let huge = "s".repeat(70_000);
        let params = Params::new().with("s", huge);
        assert!(matches!(encode_call("x", &params), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_decode_frame_from_stream() {
        let first = encode_reference(ChainRef::from_bytes([1; 16]));
        let second = encode_call("hope_consolidate", &Params::new()).unwrap();
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let (frame, used) = decode_frame(&stream).unwrap();
        assert_eq!(used, first.len());
        assert!(matches!(frame, Frame::Reference(_)));

        let (frame, used) = decode_frame(&stream[used..]).unwrap();
        assert_eq!(used, second.len());
        assert!(matches!(frame, Frame::Call(_)));

        assert!(decode(&stream).is_err());
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1e12f64..1e12).prop_map(Value::Float),
            "[a-zA-Z0-9 ]{0,40}".prop_map(Value::Str),
            any::<[u8; 16]>().prop_map(|b| Value::Ref(ChainRef::from_bytes(b))),
        ]
    }

    fn params_strategy() -> impl Strategy<Value = Params> {
        proptest::collection::vec(("[a-z_]{1,12}", value_strategy()), 0..8).prop_map(|pairs| {
            let mut params = Params::new();
            for (k, v) in pairs {
                params.insert(k, v);
            }
            params
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(name in "[a-z_]{1,24}", params in params_strategy()) {
            let bytes = encode_call(&name, &params).unwrap();
            let call = decode_call(&bytes).unwrap();
            prop_assert_eq!(call.name, name);
            prop_assert_eq!(call.params, params);
        }

        #[test]
        fn prop_every_truncation_is_protocol_error(name in "[a-z_]{1,24}", params in params_strategy()) {
            let bytes = encode_call(&name, &params).unwrap();
            for cut in 0..bytes.len() {
                let result = decode(&bytes[..cut]);
                prop_assert!(matches!(result, Err(Error::Protocol(_))));
            }
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode(&bytes);
        }
    }
}

//! Function-list serialization (panic-free).
//!
//! Record layout:
//!
//! ```text
//! name\0 library\0 types\0 value*
//! ```
//!
//! `types` holds one character per argument: `s` NUL-terminated string, `i`
//! 4-byte i32, `d` 8-byte f64, `L` 8-byte u64, `F` a complete nested record
//! starting right here. Numbers are little-endian.
//!
//! Parsing rules:
//! - Every read is checked against the bytes actually remaining.
//! - Never index (`buf[0]`), never `unwrap()` / `expect()` / `panic!()`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::catalog::{Catalog, FunctionArgument, FunctionInstance};
use crate::error::DecodeError;
use crate::limits::{MAX_ARGUMENTS, MAX_FUNCTION_LIST_SIZE, MAX_NESTING_DEPTH};

/// Decode `declared` top-level records from `buf` into a catalog.
///
/// Bytes after the last declared record are ignored (the request field is
/// zero padded).
pub fn decode_function_list(buf: &[u8], declared: u32) -> Result<Catalog, DecodeError> {
    let mut cur = buf;
    let mut catalog = Catalog::new();
    for position in 0..declared {
        decode_record(&mut cur, position, 0, &mut catalog)?;
    }
    tracing::trace!(
        declared,
        functions = catalog.functions().len(),
        consumed = buf.len() - cur.remaining(),
        "function list decoded"
    );
    Ok(catalog)
}

/// Decodes one record and its nested records; returns the record's function name.
fn decode_record(
    cur: &mut &[u8],
    position: u32,
    depth: usize,
    catalog: &mut Catalog,
) -> Result<String, DecodeError> {
    let name = read_str(cur, "function name")?;
    let library = read_str(cur, "library name")?;
    let types = read_cbytes(cur, "argument types")?;

    if types.len() > MAX_ARGUMENTS {
        return Err(DecodeError::ArgumentCountExceeded { count: types.len() });
    }

    let mut args = Vec::with_capacity(types.len());
    for &t in types {
        let arg = match t {
            b's' => FunctionArgument::Str(read_str(cur, "string argument")?),
            b'i' => {
                need(cur, 4, "int argument")?;
                FunctionArgument::Int32(cur.get_i32_le())
            }
            b'd' => {
                need(cur, 8, "double argument")?;
                FunctionArgument::Double(cur.get_f64_le())
            }
            b'L' => {
                need(cur, 8, "u64 argument")?;
                FunctionArgument::UInt64(cur.get_u64_le())
            }
            b'F' => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(DecodeError::NestingTooDeep);
                }
                FunctionArgument::Function(decode_record(cur, position, depth + 1, catalog)?)
            }
            other => return Err(DecodeError::UnknownArgumentType(char::from(other))),
        };
        args.push(arg);
    }

    catalog.insert(&name, &library, FunctionInstance { position, args })?;
    Ok(name)
}

fn need(cur: &&[u8], n: usize, field: &'static str) -> Result<(), DecodeError> {
    if cur.remaining() < n {
        return Err(DecodeError::TruncatedField { field });
    }
    Ok(())
}

/// Bytes up to (not including) the next NUL; the cursor moves past the NUL.
fn read_cbytes<'a>(cur: &mut &'a [u8], field: &'static str) -> Result<&'a [u8], DecodeError> {
    let src: &'a [u8] = *cur;
    let nul = src
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::TruncatedField { field })?;
    let (text, rest) = src.split_at(nul);
    *cur = rest.get(1..).unwrap_or_default();
    Ok(text)
}

fn read_str(cur: &mut &[u8], field: &'static str) -> Result<String, DecodeError> {
    let raw = read_cbytes(cur, field)?;
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 { field })
}

/// Typed argument for building a function list.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int32(i32),
    Double(f64),
    UInt64(u64),
    Str(String),
    Function(Box<FunctionCall>),
}

impl ArgValue {
    pub fn type_char(&self) -> u8 {
        match self {
            ArgValue::Int32(_) => b'i',
            ArgValue::Double(_) => b'd',
            ArgValue::UInt64(_) => b'L',
            ArgValue::Str(_) => b's',
            ArgValue::Function(_) => b'F',
        }
    }
}

/// One function record to be serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub library: String,
    pub args: Vec<ArgValue>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: ArgValue) -> Self {
        self.args.push(value);
        self
    }
}

/// Client-side function list writer.
///
/// Each `add*` call appends one top-level record, or nothing if the record is
/// rejected.
#[derive(Debug, Default)]
pub struct FunctionListBuilder {
    buf: BytesMut,
    count: u32,
}

impl FunctionListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level records.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Serialized size so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a record with typed arguments.
    pub fn add(&mut self, call: &FunctionCall) -> Result<(), DecodeError> {
        let mut rec = BytesMut::new();
        encode_call(&mut rec, call, 0)?;
        self.append(rec)
    }

    /// Append a record whose arguments are already serialized to match `types`.
    pub fn add_raw(
        &mut self,
        name: &str,
        library: &str,
        types: &str,
        encoded_args: &[u8],
    ) -> Result<(), DecodeError> {
        if types.len() > MAX_ARGUMENTS {
            return Err(DecodeError::ArgumentCountExceeded { count: types.len() });
        }
        let mut rec = BytesMut::new();
        put_cstr(&mut rec, name, "function name")?;
        put_cstr(&mut rec, library, "library name")?;
        put_cstr(&mut rec, types, "argument types")?;
        rec.put_slice(encoded_args);
        self.append(rec)
    }

    /// Serialized list and the number of top-level records.
    pub fn finish(self) -> (Bytes, u32) {
        (self.buf.freeze(), self.count)
    }

    fn append(&mut self, rec: BytesMut) -> Result<(), DecodeError> {
        if self.buf.len() + rec.len() > MAX_FUNCTION_LIST_SIZE {
            return Err(DecodeError::TooLarge {
                limit: MAX_FUNCTION_LIST_SIZE,
            });
        }
        self.buf.extend_from_slice(&rec);
        self.count += 1;
        Ok(())
    }
}

fn encode_call(buf: &mut BytesMut, call: &FunctionCall, depth: usize) -> Result<(), DecodeError> {
    if call.args.len() > MAX_ARGUMENTS {
        return Err(DecodeError::ArgumentCountExceeded {
            count: call.args.len(),
        });
    }
    put_cstr(buf, &call.name, "function name")?;
    put_cstr(buf, &call.library, "library name")?;
    buf.extend(call.args.iter().map(ArgValue::type_char));
    buf.put_u8(0);

    for arg in &call.args {
        match arg {
            ArgValue::Int32(v) => buf.put_i32_le(*v),
            ArgValue::Double(v) => buf.put_f64_le(*v),
            ArgValue::UInt64(v) => buf.put_u64_le(*v),
            ArgValue::Str(s) => put_cstr(buf, s, "string argument")?,
            ArgValue::Function(nested) => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(DecodeError::NestingTooDeep);
                }
                encode_call(buf, nested, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn put_cstr(buf: &mut BytesMut, s: &str, field: &'static str) -> Result<(), DecodeError> {
    if s.as_bytes().contains(&0) {
        return Err(DecodeError::EmbeddedNul { field });
    }
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

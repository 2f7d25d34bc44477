//! Fixed-layout admission request record.
//!
//! ```text
//! offset  size   field
//!      0  4096   public key text, NUL padded
//!   4096  8192   credential text, NUL padded
//!  12288     4   nonce
//!  12292   256   encrypted nonce
//!  12548     4   (padding)
//!  12552     8   encrypted nonce length
//!  12560     4   pair count
//!  12564  9216   16 x (name[64], value[512]), NUL padded
//!  21780     4   function instance count
//!  21784 65536   function list
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AdmCtrlError, DecodeError, Result};
use crate::limits::{
    MAX_CREDENTIALS_SIZE, MAX_ENC_NONCE_SIZE, MAX_FUNCTION_LIST_SIZE, MAX_PAIRS, MAX_PAIR_NAME,
    MAX_PAIR_VALUE, MAX_PUBKEY_SIZE,
};
use crate::protocol::funclist::FunctionListBuilder;

/// Size of an encoded request.
pub const REQUEST_SIZE: usize = MAX_PUBKEY_SIZE
    + MAX_CREDENTIALS_SIZE
    + 4
    + MAX_ENC_NONCE_SIZE
    + 4
    + 8
    + 4
    + MAX_PAIRS * (MAX_PAIR_NAME + MAX_PAIR_VALUE)
    + 4
    + MAX_FUNCTION_LIST_SIZE;

/// Caller-supplied attribute handed to the policy evaluator verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub name: String,
    pub value: String,
}

/// Decoded admission request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Claimed identity, in any key text form the crypto layer understands.
    pub pubkey: String,
    /// Zero or more credential assertions separated by blank lines.
    pub credentials: String,
    pub nonce: u32,
    pub encrypted_nonce: Vec<u8>,
    pub pairs: Vec<Pair>,
    /// Declared number of top-level function records.
    pub functions_num: u32,
    pub function_list: Bytes,
}

impl Request {
    pub fn new(
        pubkey: impl Into<String>,
        credentials: impl Into<String>,
        nonce: u32,
        encrypted_nonce: Vec<u8>,
    ) -> Self {
        Self {
            pubkey: pubkey.into(),
            credentials: credentials.into(),
            nonce,
            encrypted_nonce,
            ..Self::default()
        }
    }

    /// Append a name/value pair, enforcing the record's field sizes.
    pub fn add_pair(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        if self.pairs.len() >= MAX_PAIRS {
            return Err(AdmCtrlError::Pair(format!("more than {MAX_PAIRS} pairs")));
        }
        let pair = Pair {
            name: name.into(),
            value: value.into(),
        };
        if pair.name.len() >= MAX_PAIR_NAME || pair.value.len() >= MAX_PAIR_VALUE {
            return Err(AdmCtrlError::Pair(format!("pair {} too long", pair.name)));
        }
        self.pairs.push(pair);
        Ok(())
    }

    /// Take the serialized list and record count from a builder.
    pub fn set_functions(&mut self, builder: FunctionListBuilder) {
        let (list, count) = builder.finish();
        self.function_list = list;
        self.functions_num = count;
    }

    /// Serialize into the fixed layout.
    pub fn encode(&self) -> Result<Bytes> {
        if self.encrypted_nonce.len() > MAX_ENC_NONCE_SIZE {
            return Err(AdmCtrlError::Authentication("encrypted nonce too long".into()));
        }
        if self.pairs.len() > MAX_PAIRS {
            return Err(AdmCtrlError::Pair(format!("more than {MAX_PAIRS} pairs")));
        }

        let mut buf = BytesMut::with_capacity(REQUEST_SIZE);
        if !put_text(&mut buf, &self.pubkey, MAX_PUBKEY_SIZE) {
            return Err(AdmCtrlError::Pubkey("public key does not fit".into()));
        }
        if !put_text(&mut buf, &self.credentials, MAX_CREDENTIALS_SIZE) {
            return Err(AdmCtrlError::Creds("credentials do not fit".into()));
        }
        buf.put_u32_le(self.nonce);
        put_padded(&mut buf, &self.encrypted_nonce, MAX_ENC_NONCE_SIZE);
        buf.put_u32_le(0);
        buf.put_u64_le(self.encrypted_nonce.len() as u64);
        buf.put_u32_le(self.pairs.len() as u32);
        for i in 0..MAX_PAIRS {
            match self.pairs.get(i) {
                Some(p) => {
                    if !(put_text(&mut buf, &p.name, MAX_PAIR_NAME)
                        && put_text(&mut buf, &p.value, MAX_PAIR_VALUE))
                    {
                        return Err(AdmCtrlError::Pair(format!("pair {} does not fit", p.name)));
                    }
                }
                None => buf.put_bytes(0, MAX_PAIR_NAME + MAX_PAIR_VALUE),
            }
        }
        buf.put_u32_le(self.functions_num);
        if self.function_list.len() > MAX_FUNCTION_LIST_SIZE {
            return Err(AdmCtrlError::FuncFormat(DecodeError::TooLarge {
                limit: MAX_FUNCTION_LIST_SIZE,
            }));
        }
        put_padded(&mut buf, &self.function_list, MAX_FUNCTION_LIST_SIZE);

        Ok(buf.freeze())
    }
}

/// Writes `s` NUL padded to `size`; false if text plus terminator does not fit.
fn put_text(buf: &mut BytesMut, s: &str, size: usize) -> bool {
    if s.len() >= size || s.as_bytes().contains(&0) {
        return false;
    }
    put_padded(buf, s.as_bytes(), size);
    true
}

fn put_padded(buf: &mut BytesMut, data: &[u8], size: usize) {
    buf.put_slice(data);
    buf.put_bytes(0, size.saturating_sub(data.len()));
}

/// Decode a request record. The buffer must be exactly [`REQUEST_SIZE`] bytes.
pub fn decode_request(mut buf: Bytes) -> Result<Request> {
    if buf.remaining() != REQUEST_SIZE {
        return Err(AdmCtrlError::BadRequest(format!(
            "request must be {REQUEST_SIZE} bytes, got {}",
            buf.remaining()
        )));
    }

    let pubkey = take_text(&mut buf, MAX_PUBKEY_SIZE)
        .ok_or_else(|| AdmCtrlError::Pubkey("public key is not valid utf-8".into()))?;
    let credentials = take_text(&mut buf, MAX_CREDENTIALS_SIZE)
        .ok_or_else(|| AdmCtrlError::Creds("credentials are not valid utf-8".into()))?;

    let nonce = buf.get_u32_le();
    let enc = buf.split_to(MAX_ENC_NONCE_SIZE);
    buf.advance(4);
    let enc_len = buf.get_u64_le();
    let enc_len = usize::try_from(enc_len)
        .ok()
        .filter(|&n| n <= MAX_ENC_NONCE_SIZE)
        .ok_or_else(|| {
            AdmCtrlError::Authentication(format!("encrypted nonce length {enc_len} out of range"))
        })?;
    let encrypted_nonce = enc.slice(..enc_len).to_vec();

    let pairs_num = buf.get_u32_le() as usize;
    if pairs_num > MAX_PAIRS {
        return Err(AdmCtrlError::Pair(format!("{pairs_num} pairs declared")));
    }
    let mut pairs = Vec::with_capacity(pairs_num);
    for i in 0..MAX_PAIRS {
        let mut name_field = buf.split_to(MAX_PAIR_NAME);
        let mut value_field = buf.split_to(MAX_PAIR_VALUE);
        if i >= pairs_num {
            continue;
        }
        let name = take_terminated(&mut name_field)
            .ok_or_else(|| AdmCtrlError::Pair(format!("pair {i} name is not NUL-terminated utf-8")))?;
        let value = take_terminated(&mut value_field)
            .ok_or_else(|| AdmCtrlError::Pair(format!("pair {i} value is not NUL-terminated utf-8")))?;
        pairs.push(Pair { name, value });
    }

    let functions_num = buf.get_u32_le();
    let function_list = buf.split_to(MAX_FUNCTION_LIST_SIZE);

    Ok(Request {
        pubkey,
        credentials,
        nonce,
        encrypted_nonce,
        pairs,
        functions_num,
        function_list,
    })
}

/// Text field up to the first NUL (or the whole field if none).
fn take_text(buf: &mut Bytes, size: usize) -> Option<String> {
    let field = buf.split_to(size);
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field.slice(..end).to_vec()).ok()
}

/// Text field that must contain its NUL terminator.
fn take_terminated(field: &mut Bytes) -> Option<String> {
    let end = field.iter().position(|&b| b == 0)?;
    String::from_utf8(field.split_to(end).to_vec()).ok()
}

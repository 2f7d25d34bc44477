//! Fixed-layout answer record.
//!
//! ```text
//! i32  verdict (-1 error, 0 non-compliant, 1 compliant)
//! u32  error code (0 = none)
//! u64  requirement count
//! 32 x (u32 resource key, u32 required)
//! u32  shortfall index (u32::MAX = none), u32 key, u32 required, u32 available
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AdmCtrlError, ErrorCode, Result};
use crate::limits::MAX_RESOURCES;

/// Size of an encoded result.
pub const RESULT_SIZE: usize = 4 + 4 + 8 + MAX_RESOURCES * 8 + 16;

const NO_SHORTFALL: u32 = u32::MAX;

/// Outcome of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The daemon could not reach a decision.
    Error,
    NonCompliant,
    Compliant,
}

impl Verdict {
    pub fn as_i32(self) -> i32 {
        match self {
            Verdict::Error => -1,
            Verdict::NonCompliant => 0,
            Verdict::Compliant => 1,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            -1 => Some(Verdict::Error),
            0 => Some(Verdict::NonCompliant),
            1 => Some(Verdict::Compliant),
            _ => None,
        }
    }
}

/// Amount of one resource a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRequirement {
    pub key: u32,
    pub required: u32,
}

/// First resource found short during the availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    /// Index into the requirement list.
    pub index: u32,
    pub key: u32,
    pub required: u32,
    pub available: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub verdict: Verdict,
    pub error: Option<ErrorCode>,
    /// Filled whenever costs were computed, also on denial.
    pub required: Vec<ResourceRequirement>,
    pub shortfall: Option<Shortfall>,
}

impl Default for AuthResult {
    fn default() -> Self {
        Self {
            verdict: Verdict::NonCompliant,
            error: None,
            required: Vec::new(),
            shortfall: None,
        }
    }
}

impl AuthResult {
    /// Result for a request that failed with `err` before (or while) deciding.
    pub fn from_error(err: &AdmCtrlError) -> Self {
        let mut r = Self::default();
        r.fail(err);
        r
    }

    /// Record `err`, keeping any requirements already computed.
    pub fn fail(&mut self, err: &AdmCtrlError) {
        let code = err.code();
        self.verdict = if code.is_fault() {
            Verdict::Error
        } else {
            Verdict::NonCompliant
        };
        self.error = Some(code);
        if let AdmCtrlError::ResourceCtrlFail {
            index,
            key,
            required,
            available,
        } = *err
        {
            self.shortfall = Some(Shortfall {
                index: u32::try_from(index).unwrap_or(NO_SHORTFALL),
                key,
                required,
                available,
            });
        }
    }

    pub fn is_compliant(&self) -> bool {
        self.verdict == Verdict::Compliant
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RESULT_SIZE);
        buf.put_i32_le(self.verdict.as_i32());
        buf.put_u32_le(self.error.map_or(0, ErrorCode::as_u32));

        let n = self.required.len().min(MAX_RESOURCES);
        buf.put_u64_le(n as u64);
        for r in self.required.iter().take(n) {
            buf.put_u32_le(r.key);
            buf.put_u32_le(r.required);
        }
        buf.put_bytes(0, (MAX_RESOURCES - n) * 8);

        match self.shortfall {
            Some(s) => {
                buf.put_u32_le(s.index);
                buf.put_u32_le(s.key);
                buf.put_u32_le(s.required);
                buf.put_u32_le(s.available);
            }
            None => {
                buf.put_u32_le(NO_SHORTFALL);
                buf.put_bytes(0, 12);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.remaining() != RESULT_SIZE {
            return Err(AdmCtrlError::BadRequest(format!(
                "result must be {RESULT_SIZE} bytes, got {}",
                buf.remaining()
            )));
        }
        let raw_verdict = buf.get_i32_le();
        let verdict = Verdict::from_i32(raw_verdict)
            .ok_or_else(|| AdmCtrlError::BadRequest(format!("unknown verdict {raw_verdict}")))?;
        let error = match buf.get_u32_le() {
            0 => None,
            c => Some(
                ErrorCode::from_u32(c)
                    .ok_or_else(|| AdmCtrlError::BadRequest(format!("unknown error code {c}")))?,
            ),
        };
        let n = buf.get_u64_le();
        let n = usize::try_from(n)
            .ok()
            .filter(|&n| n <= MAX_RESOURCES)
            .ok_or_else(|| AdmCtrlError::BadRequest(format!("{n} requirements")))?;

        let mut required = Vec::with_capacity(n);
        for i in 0..MAX_RESOURCES {
            let key = buf.get_u32_le();
            let amount = buf.get_u32_le();
            if i < n {
                required.push(ResourceRequirement {
                    key,
                    required: amount,
                });
            }
        }

        let index = buf.get_u32_le();
        let shortfall = Shortfall {
            index,
            key: buf.get_u32_le(),
            required: buf.get_u32_le(),
            available: buf.get_u32_le(),
        };

        Ok(Self {
            verdict,
            error,
            required,
            shortfall: (index != NO_SHORTFALL).then_some(shortfall),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn shortfall_is_carried_on_the_wire() {
        let mut r = AuthResult {
            required: vec![ResourceRequirement { key: 0x0002_0001, required: 11 }],
            ..AuthResult::default()
        };
        r.fail(&AdmCtrlError::ResourceCtrlFail {
            index: 0,
            key: 0x0002_0001,
            required: 11,
            available: 10,
        });

        let bytes = r.encode();
        assert_eq!(bytes.len(), RESULT_SIZE);
        let back = AuthResult::decode(bytes).unwrap();
        assert_eq!(back.verdict, Verdict::NonCompliant);
        assert_eq!(back.error, Some(ErrorCode::ResourceCtrlFail));
        assert_eq!(back.required, r.required);
        assert_eq!(
            back.shortfall,
            Some(Shortfall { index: 0, key: 0x0002_0001, required: 11, available: 10 })
        );
    }

    #[test]
    fn faults_map_to_error_verdict() {
        let r = AuthResult::from_error(&AdmCtrlError::Memory("session".into()));
        assert_eq!(r.verdict, Verdict::Error);
        let r = AuthResult::from_error(&AdmCtrlError::Pair("x".into()));
        assert_eq!(r.verdict, Verdict::NonCompliant);
        assert_eq!(r.encode()[4..8], 7u32.to_le_bytes());
    }

    #[test]
    fn rejects_unknown_codes() {
        let mut raw = AuthResult::default().encode().to_vec();
        raw[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(AuthResult::decode(Bytes::from(raw)).is_err());
    }
}

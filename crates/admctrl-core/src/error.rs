//! Shared error type across admctrl crates.

use thiserror::Error;

use crate::cost::ExprError;

/// Result codes reported back to the requester (stable wire API).
///
/// The numeric form travels in the result record, the string form is used in
/// logs and test vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Evaluator or allocator ran out of memory.
    Memory,
    /// Invariant violation inside the daemon.
    Internal,
    /// Nonce challenge failed.
    Authentication,
    /// The requester key was rejected as an authorizer.
    Pubkey,
    /// A policy assertion was rejected.
    Policy,
    /// A credential assertion was rejected.
    Creds,
    /// A name/value pair was malformed.
    Pair,
    /// The function list is malformed in a way not covered by a finer code.
    FuncFormat,
    /// A string or fixed-width value runs past the end of the buffer.
    TruncatedField,
    /// Unknown character in an argument type string.
    UnknownArgumentType,
    /// More than [`crate::limits::MAX_ARGUMENTS`] arguments.
    ArgumentCountExceeded,
    /// Two instances of one function disagree on arity.
    ArgumentCountMismatch,
    /// Evaluator reported a syntax problem while deciding.
    Syntax,
    /// Evaluator reported a signature problem while deciding.
    Signature,
    /// Not enough of some resource is available.
    ResourceCtrlFail,
    /// Resource accounting failed (ledger or cost formula).
    ResourceCtrlError,
}

impl ErrorCode {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Memory => "MEMORY_ERROR",
            ErrorCode::Internal => "INTERNAL_ERROR",
            ErrorCode::Authentication => "AUTHENTICATION_ERROR",
            ErrorCode::Pubkey => "PUBKEY_ERROR",
            ErrorCode::Policy => "POLICY_ERROR",
            ErrorCode::Creds => "CREDS_ERROR",
            ErrorCode::Pair => "PAIR_ERROR",
            ErrorCode::FuncFormat => "FUNCFORMAT_ERROR",
            ErrorCode::TruncatedField => "TRUNCATED_FIELD",
            ErrorCode::UnknownArgumentType => "UNKNOWN_ARGUMENT_TYPE",
            ErrorCode::ArgumentCountExceeded => "ARGUMENT_COUNT_EXCEEDED",
            ErrorCode::ArgumentCountMismatch => "ARGUMENT_COUNT_MISMATCH",
            ErrorCode::Syntax => "SYNTAX_ERROR",
            ErrorCode::Signature => "SIGNATURE_ERROR",
            ErrorCode::ResourceCtrlFail => "RESOURCE_CTRL_FAIL",
            ErrorCode::ResourceCtrlError => "RESOURCE_CTRL_ERROR",
        }
    }

    /// Numeric representation carried in the result record. `0` means "no error".
    pub fn as_u32(self) -> u32 {
        match self {
            ErrorCode::Memory => 1,
            ErrorCode::Internal => 2,
            ErrorCode::Authentication => 3,
            ErrorCode::Pubkey => 4,
            ErrorCode::Policy => 5,
            ErrorCode::Creds => 6,
            ErrorCode::Pair => 7,
            ErrorCode::FuncFormat => 8,
            ErrorCode::TruncatedField => 9,
            ErrorCode::UnknownArgumentType => 10,
            ErrorCode::ArgumentCountExceeded => 11,
            ErrorCode::ArgumentCountMismatch => 12,
            ErrorCode::Syntax => 13,
            ErrorCode::Signature => 14,
            ErrorCode::ResourceCtrlFail => 15,
            ErrorCode::ResourceCtrlError => 16,
        }
    }

    /// Inverse of [`ErrorCode::as_u32`].
    pub fn from_u32(v: u32) -> Option<Self> {
        let code = match v {
            1 => ErrorCode::Memory,
            2 => ErrorCode::Internal,
            3 => ErrorCode::Authentication,
            4 => ErrorCode::Pubkey,
            5 => ErrorCode::Policy,
            6 => ErrorCode::Creds,
            7 => ErrorCode::Pair,
            8 => ErrorCode::FuncFormat,
            9 => ErrorCode::TruncatedField,
            10 => ErrorCode::UnknownArgumentType,
            11 => ErrorCode::ArgumentCountExceeded,
            12 => ErrorCode::ArgumentCountMismatch,
            13 => ErrorCode::Syntax,
            14 => ErrorCode::Signature,
            15 => ErrorCode::ResourceCtrlFail,
            16 => ErrorCode::ResourceCtrlError,
            _ => return None,
        };
        Some(code)
    }

    /// Faults of the daemon itself, as opposed to a rejected request.
    pub fn is_fault(self) -> bool {
        matches!(self, ErrorCode::Memory | ErrorCode::Internal)
    }
}

/// Function-list decoding failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("truncated {field}")]
    TruncatedField { field: &'static str },
    #[error("unknown argument type {0:?}")]
    UnknownArgumentType(char),
    #[error("{count} arguments exceed the limit")]
    ArgumentCountExceeded { count: usize },
    #[error("function {function} declared with {found} arguments, previously {expected}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("function {function} parameter {index} changes kind")]
    ArgumentTypeMismatch { function: String, index: usize },
    #[error("{field} is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
    #[error("nested function records too deep")]
    NestingTooDeep,
    #[error("function list exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("{field} contains a NUL byte")]
    EmbeddedNul { field: &'static str },
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::TruncatedField { .. } => ErrorCode::TruncatedField,
            DecodeError::UnknownArgumentType(_) => ErrorCode::UnknownArgumentType,
            DecodeError::ArgumentCountExceeded { .. } => ErrorCode::ArgumentCountExceeded,
            DecodeError::ArgumentCountMismatch { .. } => ErrorCode::ArgumentCountMismatch,
            DecodeError::ArgumentTypeMismatch { .. }
            | DecodeError::InvalidUtf8 { .. }
            | DecodeError::NestingTooDeep
            | DecodeError::TooLarge { .. }
            | DecodeError::EmbeddedNul { .. } => ErrorCode::FuncFormat,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, AdmCtrlError>;

/// Unified error type used by core and daemon.
#[derive(Debug, Error)]
pub enum AdmCtrlError {
    #[error("out of memory: {0}")]
    Memory(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("authorizer key rejected: {0}")]
    Pubkey(String),
    #[error("policy assertion rejected: {0}")]
    Policy(String),
    #[error("credential assertion rejected: {0}")]
    Creds(String),
    #[error("bad name/value pair: {0}")]
    Pair(String),
    #[error("malformed function list: {0}")]
    FuncFormat(#[from] DecodeError),
    #[error("policy evaluation: {0}")]
    Syntax(String),
    #[error("resource {key:#010x}: required {required}, available {available}")]
    ResourceCtrlFail {
        index: usize,
        key: u32,
        required: u32,
        available: u32,
    },
    #[error("cost formula: {0}")]
    Cost(#[from] ExprError),
    #[error("resource control: {0}")]
    ResourceCtrl(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AdmCtrlError {
    /// Map internal error to the stable result code.
    pub fn code(&self) -> ErrorCode {
        match self {
            AdmCtrlError::Memory(_) => ErrorCode::Memory,
            AdmCtrlError::Authentication(_) => ErrorCode::Authentication,
            AdmCtrlError::Pubkey(_) => ErrorCode::Pubkey,
            AdmCtrlError::Policy(_) => ErrorCode::Policy,
            AdmCtrlError::Creds(_) => ErrorCode::Creds,
            AdmCtrlError::Pair(_) => ErrorCode::Pair,
            AdmCtrlError::FuncFormat(e) => e.code(),
            AdmCtrlError::Syntax(_) => ErrorCode::Syntax,
            AdmCtrlError::ResourceCtrlFail { .. } => ErrorCode::ResourceCtrlFail,
            AdmCtrlError::Cost(_) | AdmCtrlError::ResourceCtrl(_) => ErrorCode::ResourceCtrlError,
            AdmCtrlError::BadRequest(_) | AdmCtrlError::Internal(_) => ErrorCode::Internal,
        }
    }
}

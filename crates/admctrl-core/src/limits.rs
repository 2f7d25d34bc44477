//! Fixed sizes of the request record and catalog limits.

/// Public key text field.
pub const MAX_PUBKEY_SIZE: usize = 4096;
/// Credential text field.
pub const MAX_CREDENTIALS_SIZE: usize = 8192;
/// Encrypted nonce field.
pub const MAX_ENC_NONCE_SIZE: usize = 256;
/// Serialized function list buffer.
pub const MAX_FUNCTION_LIST_SIZE: usize = 65536;

/// Name/value pairs per request.
pub const MAX_PAIRS: usize = 16;
/// Pair name field, NUL included.
pub const MAX_PAIR_NAME: usize = 64;
/// Pair value field, NUL included.
pub const MAX_PAIR_VALUE: usize = 512;

/// Arguments per function instance.
pub const MAX_ARGUMENTS: usize = 12;
/// Nested `F` records below a top-level record.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Distinct resources one request may require.
pub const MAX_RESOURCES: usize = 32;
/// Resource description text.
pub const MAX_RESOURCE_DESCRIPTION: usize = 64;
/// Variable cost formula text.
pub const MAX_FORMULA_LEN: usize = 64;
/// Length of a single numeric token in a cost expression.
pub const MAX_NUMBER_LEN: usize = 64;
/// Largest `.P` precision honoured in a cost formula directive.
pub const MAX_FORMAT_PRECISION: usize = 32;

//! Wire formats exchanged with the requesting client.
//!
//! - `request`: the fixed-size admission request record.
//! - `funclist`: the serialized function list carried inside a request.
//! - `result`: the fixed-size answer record.
//!
//! All parsers are panic-free: malformed input is reported as an error
//! instead of panicking or indexing raw buffers. Multi-byte integers are
//! little-endian.

pub mod funclist;
pub mod request;
pub mod result;

pub use funclist::{decode_function_list, ArgValue, FunctionCall, FunctionListBuilder};
pub use request::{decode_request, Pair, Request, REQUEST_SIZE};
pub use result::{AuthResult, ResourceRequirement, Shortfall, Verdict, RESULT_SIZE};

//! JSON test vector loader shared by the function-list tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub list: BufferData,
    pub count: u32,
    #[serde(default)]
    pub expect: Option<ExpectCatalog>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpectCatalog {
    pub functions: Vec<ExpectFunction>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectFunction {
    pub name: String,
    pub num: usize,
    pub first: u32,
    pub last: u32,
    pub libraries: Vec<ExpectLibrary>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectLibrary {
    pub name: String,
    pub num: usize,
    pub first: u32,
    pub last: u32,
}

#[derive(Debug, Deserialize)]
pub struct BufferData {
    pub encoding: String,
    pub data: String,
}

impl BufferData {
    pub fn decode(&self) -> Vec<u8> {
        match self.encoding.as_str() {
            "base64" => base64::engine::general_purpose::STANDARD
                .decode(&self.data)
                .expect("invalid base64 in test vector"),
            "hex" => hex::decode(&self.data).expect("invalid hex in test vector"),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}

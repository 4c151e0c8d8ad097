//! Wire types for the Terminal Connect session RPCs.
//!
//! The schema lives in `proto/tcs_session_v1.proto`. The message definitions
//! are kept by hand with `prost` derives so the crate builds without
//! `protoc`, and tests check them against the schema. Field tags are stable
//! and MUST NOT change once released.

#![forbid(unsafe_code)]

pub mod v1;

#[cfg(test)]
mod proptests;

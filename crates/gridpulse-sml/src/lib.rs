//! Subset SML (Smart Message Language) codec.
//!
//! SML is the TLV-style binary protocol spoken by many electricity meters.
//! This crate implements the slice of the protocol a polling client needs:
//!
//! - the TLV primitives (octet strings, booleans, integers, lists) with
//!   multi-byte type-length fields and the `0x01` "optional omitted" marker,
//! - the message envelope (`File` / [`Message`] / [`MessageBody`]) with
//!   per-message FCS-16 checksums,
//! - the open/close and get-proc-parameter request/response bodies plus the
//!   proc-parameter tree ([`Tree`], [`PeriodEntry`]) that carries readings,
//! - transport v1 framing ([`transport::frame`] / [`transport::unframe`]).
//!
//! Message bodies this crate does not model (profile packs, list responses,
//! …) are structurally skipped and surfaced as [`MessageBody::Unknown`], so
//! a `File` containing them still parses.
//!
//! Parsing arbitrary bytes never panics; malformed input yields [`Error`].

pub mod crc;
pub mod cursor;
pub mod error;
pub mod message;
pub mod transport;
pub mod value;

pub use error::Error;
pub use message::{
    AttentionResponse, CloseRequest, CloseResponse, File, GetProcParameterRequest,
    GetProcParameterResponse, Message, MessageBody, OpenRequest, OpenResponse, PeriodEntry,
    ProcParValue, Time, Tree, TreePath,
};
pub use value::{OctetStr, Value};

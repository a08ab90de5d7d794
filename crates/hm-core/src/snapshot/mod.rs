//! Process snapshots and their wire format.
//!
//! A snapshot is the ordered process list of one host, captured once per
//! invocation. It travels from the remote agent to the controller as a
//! single binary frame (see [`codec`]).

pub mod codec;
mod types;

pub use codec::{decode, encode, CodecError, FORMAT_VERSION, MAGIC};
pub use types::{ProcessRecord, ProcessSnapshot};

//! # Wire Protocol Module
//!
//! Device-to-client telemetry lines and client-to-device commands.
//!
//! This module handles:
//! - Reassembling newline-terminated lines from an arbitrary byte stream
//! - Decoding one line into a fixed-arity [`RawRecord`](record::RawRecord)
//! - The plain ASCII command literals understood by the device

pub mod command;
pub mod framer;
pub mod record;

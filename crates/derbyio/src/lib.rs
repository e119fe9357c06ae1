//! `derbyio`: buffered async IO for the race wire's primitive values.
//!
//! The wire speaks exactly two primitives: UTF-8 strings with a `u16`
//! big-endian length prefix, and big-endian `i32` values. This crate reads
//! and writes both over any `AsyncRead`/`AsyncWrite`, buffering reads in a
//! `BytesMut`, and keeps the clean-EOF (`Ok(None)`) vs mid-value EOF
//! (`UnexpectedEof`) distinction so callers can tell a normal close from a
//! truncated message.

pub mod data;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for operator-daemon communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. This is
//! the ambient operator surface (status, run control, publish, schedule
//! control) — distinct from the externally out-of-scope HTTP/SSE API.

mod query;
mod request;
mod response;
mod wire;

pub use query::Query;
pub use request::Request;
pub use response::Response;
pub use wire::{decode, encode, read_message, read_request, write_message, write_response, ProtocolError};

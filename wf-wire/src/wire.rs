// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol framing: 4-byte length prefix (big-endian) + JSON payload.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message of {0} bytes exceeds the {1}-byte frame limit")]
    TooLarge(usize, usize),
}

/// Frames larger than this are rejected outright rather than trusted from
/// a length prefix that could otherwise exhaust memory on a bad peer.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Serializes `value` to raw JSON bytes, with no length prefix.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserializes raw JSON bytes (no length prefix) into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Writes `payload` prefixed with its big-endian `u32` length.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::TooLarge(payload.len(), MAX_FRAME_BYTES));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a length-prefixed frame, returning its payload bytes.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::TooLarge(len, MAX_FRAME_BYTES));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Reads and decodes one `Request` frame.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request, ProtocolError> {
    let bytes = read_message(reader).await?;
    decode(&bytes)
}

/// Encodes and writes one `Response` frame.
pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<(), ProtocolError> {
    let bytes = encode(response)?;
    write_message(writer, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;

    #[test]
    fn encode_returns_json_without_length_prefix() {
        let response = Response::Ok;
        let encoded = encode(&response).unwrap();
        let json_str = std::str::from_utf8(&encoded).unwrap();
        assert!(json_str.starts_with('{'), "should be a JSON object: {json_str}");
    }

    #[tokio::test]
    async fn read_write_message_roundtrip() {
        let original = b"hello world";
        let mut buffer = Vec::new();
        write_message(&mut buffer, original).await.unwrap();
        assert_eq!(buffer.len(), 4 + original.len());

        let mut cursor = std::io::Cursor::new(buffer);
        let read_back = read_message(&mut cursor).await.unwrap();
        assert_eq!(read_back, original);
    }

    #[tokio::test]
    async fn write_message_adds_big_endian_length_prefix() {
        let data = b"test data";
        let mut buffer = Vec::new();
        write_message(&mut buffer, data).await.unwrap();
        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, data.len());
        assert_eq!(&buffer[4..], data);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocating() {
        let mut cursor = std::io::Cursor::new((MAX_FRAME_BYTES as u32 + 1).to_be_bytes().to_vec());
        assert!(matches!(read_message(&mut cursor).await, Err(ProtocolError::TooLarge(_, _))));
    }
}

//! Model-server wire format
//!
//! Each message is a big-endian `u32` length followed by a `bincode` payload.
//! Tensors travel as a `(C, X, Y, Z)` shape plus row-major `f32` values.

use std::io;

use bytes::{BufMut, BytesMut};
use ndarray::Array4;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on one frame, guards against corrupt length prefixes
pub const MAX_FRAME_BYTES: usize = 1 << 30;

/// Client → server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireRequest {
    /// Ask for the backend's declared contract
    Describe,
    /// Score one unit
    Classify {
        index: u64,
        origin: [u64; 3],
        shape: [u64; 4],
        data: Vec<f32>,
    },
}

/// Server → client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireResponse {
    Description {
        name: String,
        num_classes: u32,
        input_channels: u32,
    },
    Scores {
        shape: [u64; 4],
        data: Vec<f32>,
    },
    Error {
        message: String,
    },
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Flatten a tensor for the wire
pub fn to_wire(tensor: &Array4<f32>) -> ([u64; 4], Vec<f32>) {
    let (c, x, y, z) = tensor.dim();
    (
        [c as u64, x as u64, y as u64, z as u64],
        tensor.iter().copied().collect(),
    )
}

/// Rebuild a tensor received from the wire
pub fn from_wire(shape: [u64; 4], data: Vec<f32>) -> io::Result<Array4<f32>> {
    let [c, x, y, z] = shape.map(|d| d as usize);
    Array4::from_shape_vec((c, x, y, z), data).map_err(|e| invalid_data(e.to_string()))
}

/// Write one length-prefixed message
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message).map_err(|e| invalid_data(e.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(invalid_data(format!("frame of {} bytes too large", payload.len())));
    }
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Read one length-prefixed message
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(invalid_data(format!("frame length {len} exceeds limit")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| invalid_data(e.to_string()))
}

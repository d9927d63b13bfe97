//! Length-prefixed JSON framing used by both the control connection and the
//! work/result connection between parent and worker.
//!
//! A real cross-process IPC transport (as opposed to an in-memory channel)
//! needs an explicit frame boundary; this is the simplest one that is still
//! trivial to reason about and debug (`u32` big-endian length, then a JSON
//! document).

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

/// Maximum single-frame size, guarding against a corrupt length prefix
/// turning into an unbounded allocation.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    let len = u32::try_from(body.len()).map_err(std::io::Error::other)?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Reads one frame. Returns `Ok(None)` on a clean EOF before any bytes of
/// the next frame arrive (the pipe was closed by the peer).
pub async fn read_frame<R, T>(reader: &mut R) -> std::io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::other(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let value = serde_json::from_slice(&body).map_err(std::io::Error::other)?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, &vec![1, 2, 3]).await.unwrap();
        let got: Vec<i32> = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn clean_eof_before_a_frame_yields_none() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let got: Option<Vec<i32>> = read_frame(&mut server).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(16);
        client
            .write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes())
            .await
            .unwrap();
        let result: std::io::Result<Option<Vec<i32>>> = read_frame(&mut server).await;
        assert!(result.is_err());
    }
}

//! Framing of the control-listener TCP stream.
//!
//! Each frame is `[u16 channel len][channel][u32 payload len][payload]`, all
//! lengths big-endian. The channel names the tagged channel a plugin message
//! travels on; the payload is handed to the dispatcher untouched.

use fleet_control::FleetError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on one payload; larger frames end the connection.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// One channel-tagged message read off a backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Serializes a frame for the wire.
pub fn encode_frame(channel: &str, payload: &[u8]) -> Result<Vec<u8>, FleetError> {
    let channel_len = u16::try_from(channel.len())
        .map_err(|_| FleetError::Transport(format!("channel name of {} bytes is too long", channel.len())))?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FleetError::Transport(format!(
            "payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    let mut buf = Vec::with_capacity(6 + channel.len() + payload.len());
    buf.extend_from_slice(&channel_len.to_be_bytes());
    buf.extend_from_slice(channel.as_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Reads the next frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<ControlFrame>, FleetError>
where
    R: AsyncRead + Unpin,
{
    let channel_len = match reader.read_u16().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut channel = vec![0u8; channel_len];
    reader.read_exact(&mut channel).await?;
    let channel = String::from_utf8(channel)
        .map_err(|e| FleetError::Transport(format!("channel name is not UTF-8: {e}")))?;

    let payload_len = reader.read_u32().await? as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FleetError::Transport(format!(
            "peer announced a {payload_len} byte payload"
        )));
    }

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(ControlFrame { channel, payload }))
}

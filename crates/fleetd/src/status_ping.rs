//! Game-server status ping.
//!
//! Asks an instance for its player counts using the server list ping:
//! a handshake packet with next state `status`, an empty status request,
//! then one length-prefixed JSON status response. Packets are framed as
//! `VarInt length, VarInt packet id, body`.

use fleet_control::{FleetError, ProbeReport};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Protocol version sent while only pinging.
const PING_PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const STATUS_PACKET_ID: i32 = 0x00;
const MAX_RESPONSE_LEN: usize = 1 << 16;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    players: StatusPlayers,
}

#[derive(Debug, Deserialize)]
struct StatusPlayers {
    online: u32,
    max: u32,
}

/// Pings `host:port` and returns its occupancy.
///
/// Everything from connect to the parsed response must finish within
/// `timeout`. `instance` only labels errors.
pub async fn ping(instance: &str, host: &str, port: u16, timeout: Duration) -> Result<ProbeReport, FleetError> {
    match tokio::time::timeout(timeout, ping_inner(instance, host, port)).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::probe(instance, format!("no answer within {timeout:?}"))),
    }
}

async fn ping_inner(instance: &str, host: &str, port: u16) -> Result<ProbeReport, FleetError> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| FleetError::probe(instance, format!("connect failed: {e}")))?;

    stream
        .write_all(&handshake_packet(host, port))
        .await
        .map_err(|e| FleetError::probe(instance, e.to_string()))?;
    stream
        .write_all(&status_request_packet())
        .await
        .map_err(|e| FleetError::probe(instance, e.to_string()))?;

    let json = read_status_response(&mut stream)
        .await
        .map_err(|e| FleetError::probe(instance, e.to_string()))?;

    parse_status(&json).map_err(|e| FleetError::probe(instance, e.to_string()))
}

fn handshake_packet(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 16);
    write_varint(&mut body, STATUS_PACKET_ID);
    write_varint(&mut body, PING_PROTOCOL_VERSION);
    write_varint(&mut body, host.len() as i32);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);
    with_length(body)
}

fn status_request_packet() -> Vec<u8> {
    let mut body = Vec::with_capacity(1);
    write_varint(&mut body, STATUS_PACKET_ID);
    with_length(body)
}

fn with_length(body: Vec<u8>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(body.len() + 5);
    write_varint(&mut packet, body.len() as i32);
    packet.extend(body);
    packet
}

async fn read_status_response<R>(reader: &mut R) -> Result<String, FleetError>
where
    R: AsyncRead + Unpin,
{
    let packet_len = read_varint(reader).await?;
    if packet_len <= 0 || packet_len as usize > MAX_RESPONSE_LEN {
        return Err(FleetError::Protocol(format!("bad status packet length {packet_len}")));
    }

    let packet_id = read_varint(reader).await?;
    if packet_id != STATUS_PACKET_ID {
        return Err(FleetError::Protocol(format!("unexpected packet id {packet_id:#x}")));
    }

    let json_len = read_varint(reader).await?;
    if json_len < 0 || json_len as usize >= packet_len as usize {
        return Err(FleetError::Protocol(format!("bad status string length {json_len}")));
    }

    let mut json = vec![0u8; json_len as usize];
    reader.read_exact(&mut json).await?;
    String::from_utf8(json).map_err(|e| FleetError::Protocol(format!("status is not UTF-8: {e}")))
}

fn parse_status(json: &str) -> Result<ProbeReport, FleetError> {
    let status: StatusResponse = serde_json::from_str(json)
        .map_err(|e| FleetError::Protocol(format!("malformed status response: {e}")))?;
    Ok(ProbeReport {
        online_count: status.players.online,
        max_count: status.players.max,
    })
}

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

async fn read_varint<R>(reader: &mut R) -> Result<i32, FleetError>
where
    R: AsyncRead + Unpin,
{
    let mut value: u32 = 0;
    for position in 0..5 {
        let byte = reader.read_u8().await?;
        value |= ((byte & 0x7F) as u32) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(FleetError::Protocol("VarInt is longer than 5 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_varint_encoding() {
        let cases: [(i32, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (300, &[0xAC, 0x02]),
            (-1, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf, expected, "encoding {value}");
        }
    }

    #[tokio::test]
    async fn test_varint_decoding() {
        let mut reader: &[u8] = &[0xAC, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        assert_eq!(read_varint(&mut reader).await.unwrap(), 300);
        assert_eq!(read_varint(&mut reader).await.unwrap(), -1);

        let mut too_long: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(read_varint(&mut too_long).await.is_err());
    }

    #[test]
    fn test_parse_status_ignores_extra_fields() {
        let json = r#"{"version":{"name":"Paper 1.20.4","protocol":765},"players":{"max":20,"online":3,"sample":[]},"description":{"text":"KOTH"}}"#;
        assert_eq!(
            parse_status(json).unwrap(),
            ProbeReport {
                online_count: 3,
                max_count: 20
            }
        );
        assert!(parse_status(r#"{"version":{}}"#).is_err());
    }

    /// Answers one status ping with `json`.
    async fn fake_instance(json: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Handshake, then status request
            for _ in 0..2 {
                let len = read_varint(&mut socket).await.unwrap();
                let mut body = vec![0u8; len as usize];
                socket.read_exact(&mut body).await.unwrap();
            }

            let mut body = Vec::new();
            write_varint(&mut body, STATUS_PACKET_ID);
            write_varint(&mut body, json.len() as i32);
            body.extend_from_slice(json.as_bytes());
            socket.write_all(&with_length(body)).await.unwrap();
        });

        port
    }

    #[tokio::test]
    async fn test_ping_against_fake_instance() {
        let port = fake_instance(r#"{"players":{"online":5,"max":8}}"#).await;
        let report = ping("KOTH_0", "127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.online_count, 5);
        assert_eq!(report.max_count, 8);
    }

    #[tokio::test]
    async fn test_ping_refused_is_probe_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = ping("KOTH_1", "127.0.0.1", port, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, FleetError::Probe { .. }));
    }

    #[tokio::test]
    async fn test_silent_instance_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let err = ping("KOTH_2", "127.0.0.1", port, Duration::from_millis(200)).await.unwrap_err();
        assert!(err.to_string().contains("no answer"));
    }
}

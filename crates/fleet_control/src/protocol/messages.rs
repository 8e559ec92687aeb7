//! Typed control-channel messages.

use super::codec::ProtocolMessage;
use crate::error::FleetError;
use crate::types::{FleetStatus, InstanceType};

/// Sub-channel tag of a transfer request.
pub const TRANSFER_REQUEST: &str = "LobbyTransferRequest";

/// Sub-channel tag of a transfer response.
pub const TRANSFER_RESPONSE: &str = "LobbyTransferResponse";

/// A backend asks where `player_name` should go for `instance_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyTransferRequest {
    pub player_name: String,
    pub instance_type: InstanceType,
}

/// The orchestrator's answer to a [`LobbyTransferRequest`].
///
/// `instance_name` is empty unless `status` is
/// [`FleetStatus::Transferable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyTransferResponse {
    pub status: FleetStatus,
    pub player_name: String,
    pub instance_name: String,
}

impl LobbyTransferResponse {
    pub fn transferable(player_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            status: FleetStatus::Transferable,
            player_name: player_name.into(),
            instance_name: instance_name.into(),
        }
    }

    /// A response that carries no target instance.
    pub fn without_target(status: FleetStatus, player_name: impl Into<String>) -> Self {
        Self {
            status,
            player_name: player_name.into(),
            instance_name: String::new(),
        }
    }
}

/// Every message the control channel understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    TransferRequest(LobbyTransferRequest),
    TransferResponse(LobbyTransferResponse),
}

impl ControlMessage {
    /// Decodes a payload.
    ///
    /// Returns `Ok(None)` for a well-formed payload on a sub-channel this
    /// crate does not handle. Fields past the ones a message needs are
    /// ignored.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, FleetError> {
        let frame = ProtocolMessage::decode(payload)?;
        let mut fields = frame.fields.into_iter();

        let message = match frame.sub_channel.as_str() {
            TRANSFER_REQUEST => Self::TransferRequest(LobbyTransferRequest {
                player_name: next_field(&mut fields, TRANSFER_REQUEST)?,
                instance_type: InstanceType::from(next_field(&mut fields, TRANSFER_REQUEST)?),
            }),
            TRANSFER_RESPONSE => Self::TransferResponse(LobbyTransferResponse {
                status: next_field(&mut fields, TRANSFER_RESPONSE)?.parse()?,
                player_name: next_field(&mut fields, TRANSFER_RESPONSE)?,
                instance_name: next_field(&mut fields, TRANSFER_RESPONSE)?,
            }),
            _ => return Ok(None),
        };

        Ok(Some(message))
    }

    pub fn encode(&self) -> Result<Vec<u8>, FleetError> {
        let frame = match self {
            Self::TransferRequest(req) => ProtocolMessage::new(
                TRANSFER_REQUEST,
                vec![req.player_name.clone(), req.instance_type.to_string()],
            ),
            Self::TransferResponse(resp) => ProtocolMessage::new(
                TRANSFER_RESPONSE,
                vec![
                    resp.status.as_str().to_string(),
                    resp.player_name.clone(),
                    resp.instance_name.clone(),
                ],
            ),
        };
        frame.encode()
    }
}

fn next_field(fields: &mut impl Iterator<Item = String>, sub_channel: &str) -> Result<String, FleetError> {
    fields
        .next()
        .ok_or_else(|| FleetError::Protocol(format!("{sub_channel} is missing a field")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let msg = ControlMessage::TransferRequest(LobbyTransferRequest {
            player_name: "Alice".to_string(),
            instance_type: InstanceType::from("KOTH"),
        });
        let bytes = msg.encode().unwrap();
        assert_eq!(&bytes[..22], b"\x00\x14LobbyTransferRequest");
        assert_eq!(ControlMessage::decode(&bytes).unwrap(), Some(msg));
    }

    #[test]
    fn test_response_round_trip() {
        let msg = ControlMessage::TransferResponse(LobbyTransferResponse::transferable("Alice", "KOTH_0"));
        assert_eq!(ControlMessage::decode(&msg.encode().unwrap()).unwrap(), Some(msg));
    }

    #[test]
    fn test_unknown_sub_channel_is_none() {
        let bytes = ProtocolMessage::new("Connect", vec!["lobby".to_string()])
            .encode()
            .unwrap();
        assert_eq!(ControlMessage::decode(&bytes).unwrap(), None);
    }

    #[test]
    fn test_missing_fields_are_errors() {
        let bytes = ProtocolMessage::new(TRANSFER_REQUEST, vec!["Alice".to_string()])
            .encode()
            .unwrap();
        assert!(ControlMessage::decode(&bytes).is_err());

        let bytes = ProtocolMessage::new(
            TRANSFER_RESPONSE,
            vec!["teleported".to_string(), "Alice".to_string(), String::new()],
        )
        .encode()
        .unwrap();
        assert!(ControlMessage::decode(&bytes).is_err());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let bytes = ProtocolMessage::new(
            TRANSFER_REQUEST,
            vec!["Alice".to_string(), "KOTH".to_string(), "extra".to_string()],
        )
        .encode()
        .unwrap();
        assert!(matches!(
            ControlMessage::decode(&bytes).unwrap(),
            Some(ControlMessage::TransferRequest(_))
        ));
    }
}

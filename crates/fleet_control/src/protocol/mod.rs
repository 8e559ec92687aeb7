//! The fleet-control wire protocol.
//!
//! Backends talk to the orchestrator over one tagged channel. Each payload
//! starts with a sub-channel tag and carries string fields, see [`codec`].
//! [`FleetDispatcher`] turns transfer requests into transfer responses.

pub mod codec;
pub mod dispatcher;
pub mod messages;

pub use codec::ProtocolMessage;
pub use dispatcher::FleetDispatcher;
pub use messages::{
    ControlMessage, LobbyTransferRequest, LobbyTransferResponse, TRANSFER_REQUEST, TRANSFER_RESPONSE,
};

use serde::{Deserialize, Serialize};

use crate::types::{ClientId, IceCandidate, IceTarget};

/// Messages sent from client to server over the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Offer for the publisher connection (client sends media to the server)
    Publish { sdp: String },

    /// Request a subscriber connection (server sends media to the client)
    Subscribe,

    /// Answer to a previous `subscribe_offer`
    Answer { sdp: String },

    /// ICE candidate for one of the client's two connections
    Ice {
        target: IceTarget,
        candidate: IceCandidate,
    },

    /// Any message type this server does not know about
    #[serde(other, skip_serializing)]
    Unknown,
}

/// Messages sent from server to client over the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every channel, carries the assigned client id
    Welcome { id: ClientId },

    /// Answer for the publisher connection, candidates included
    PublishAnswer { sdp: String },

    /// Offer for the subscriber connection, candidates included
    SubscribeOffer { sdp: String },

    /// A request could not be processed
    Error { message: String },
}

//! Client side MQTT 3.1.1 and 5.0 protocol engine.
//!
//! Packets are encoded and decoded by [`packets`] and [`frame`]. Acknowledged exchanges
//! (CONNECT, SUBSCRIBE, UNSUBSCRIBE, PUBLISH, PINGREQ) are tracked by a [`Session`], which
//! owns the state of one connection and talks to the outside world through an
//! [`EventLoop`]. [`Client`] drives a session over any tokio stream.

pub mod broker;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod frame;
pub mod packet_id;
pub mod packets;
pub mod properties;
pub mod protocol;
pub mod request;
pub mod session;

pub use broker::BrokerCapabilities;
pub use config::ClientConfig;
pub use connection::{Client, Connection, TokioEventLoop};
pub use error::{
    AllocatorExhausted, ConnectionError, DecodingError, EncodingError, PacketError,
    ProtocolError, RequestError, ValidationError,
};
pub use frame::{decode_frame, encode_frame, Frame, FrameDecoder};
pub use packet_id::{PacketIdAllocator, PacketIds};
pub use packets::Packet;
pub use properties::{Properties, UserProperty};
pub use protocol::{PacketType, ProtocolVersion, QoS, ReasonCode};
pub use request::{
    EventLoop, Operation, Request, RequestContext, RequestKey, RequestState, TimerHandle,
};
pub use session::Session;

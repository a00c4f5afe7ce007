use std::{collections::BTreeMap, time::Duration};

use log::{debug, error, info, trace, warn};
use tokio::sync::oneshot;

use crate::{
    broker::BrokerCapabilities,
    constants::DEFAULT_REQUEST_TIMEOUT,
    error::RequestError,
    frame::encode_frame,
    packet_id::{PacketIdAllocator, PacketIds},
    packets::{Packet, PublishAckPacket},
    protocol::{ProtocolVersion, QoS},
    request::{
        Claim, EventLoop, Operation, Outstanding, Request, RequestContext, RequestKey,
        TimerHandle, Tracked,
    },
};

/// Outcome of a submitted request, resolved exactly once.
pub type Response<T> = oneshot::Receiver<Result<T, RequestError>>;

/// The protocol state of one connection: outstanding requests, packet identifiers and
/// what the broker announced.
///
/// A session is driven from a single execution context. Every method runs to completion
/// and reaches the outside world only through its `EventLoop`.
pub struct Session<L: EventLoop, A: PacketIdAllocator = PacketIds> {
    event_loop: L,
    packet_ids: A,
    version: ProtocolVersion,
    capabilities: BrokerCapabilities,
    connected: bool,
    request_timeout: Duration,
    requests: BTreeMap<RequestKey, Box<dyn Outstanding>>,
    next_key: RequestKey,
}

impl<L: EventLoop> Session<L> {
    pub fn new(event_loop: L, version: ProtocolVersion) -> Self {
        Self::with_allocator(event_loop, PacketIds::default(), version)
    }
}

impl<L: EventLoop, A: PacketIdAllocator> Session<L, A> {
    pub fn with_allocator(event_loop: L, packet_ids: A, version: ProtocolVersion) -> Self {
        Self {
            event_loop,
            packet_ids,
            version,
            capabilities: BrokerCapabilities::default(),
            connected: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            requests: BTreeMap::new(),
            next_key: 1,
        }
    }

    /// Timeout for requests submitted without one.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn capabilities(&self) -> &BrokerCapabilities {
        &self.capabilities
    }

    /// Whether a successful CONNACK arrived since the last disconnection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Number of requests not settled yet.
    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }

    pub fn event_loop(&self) -> &L {
        &self.event_loop
    }

    pub fn event_loop_mut(&mut self) -> &mut L {
        &mut self.event_loop
    }

    pub fn packet_ids(&self) -> &A {
        &self.packet_ids
    }

    /// Submits a request with the session's default timeout.
    pub fn submit<O>(&mut self, operation: O) -> Response<O::Response>
    where
        O: Operation + Send + 'static,
        O::Response: Send + 'static,
    {
        self.submit_with_timeout(operation, self.request_timeout)
    }

    /// Submits a request. It is started at once, or once connected if it needs the CONNACK.
    ///
    /// A request failing validation resolves right away and sends nothing.
    pub fn submit_with_timeout<O>(&mut self, operation: O, timeout: Duration) -> Response<O::Response>
    where
        O: Operation + Send + 'static,
        O::Response: Send + 'static,
    {
        let key = self.next_key;
        self.next_key += 1;

        let (mut tracked, response) = Tracked::new(Request::new(key, operation, timeout));

        if self.connected || !tracked.requires_connection() {
            let mut ctx = RequestContext {
                event_loop: &mut self.event_loop,
                packet_ids: &mut self.packet_ids,
                version: self.version,
                capabilities: &self.capabilities,
            };

            if tracked.start(&mut ctx) == Claim::Finished {
                return response;
            }
        } else {
            debug!("request {key} waits for the connection");
        }

        self.requests.insert(key, Box::new(tracked));
        response
    }

    /// Feeds an inbound packet.
    ///
    /// The packet is offered to the outstanding requests in submission order until one
    /// claims it. Inbound publications are acknowledged. Returns the packet when no request
    /// claimed it and the application may want it.
    pub fn handle_packet(&mut self, packet: Packet) -> Option<Packet> {
        trace!("handling {}", packet.kind());

        let mut connected_now = false;
        if let Packet::ConnAck(conn_ack) = &packet {
            if self.connected {
                warn!("duplicate CONNACK, keeping the broker capabilities of the first one");
            } else if !conn_ack.reason_code.is_failure() {
                self.capabilities = match self.version {
                    ProtocolVersion::V5 => BrokerCapabilities::from_conn_ack(conn_ack),
                    ProtocolVersion::V311 => BrokerCapabilities::default(),
                };
                connected_now = true;
                self.connected = true;
                info!("connected, session present: {}", conn_ack.session_present);
            }
        }

        let claimed = self.offer(&packet);

        if connected_now {
            self.start_waiting();
        }

        if claimed {
            return None;
        }

        self.acknowledge(packet)
    }

    fn offer(&mut self, packet: &Packet) -> bool {
        let mut ctx = RequestContext {
            event_loop: &mut self.event_loop,
            packet_ids: &mut self.packet_ids,
            version: self.version,
            capabilities: &self.capabilities,
        };

        let mut finished = None;
        for (key, request) in &mut self.requests {
            match request.on_packet_received(packet, &mut ctx) {
                Claim::Ignored => continue,
                Claim::Pending => return true,
                Claim::Finished => {
                    finished = Some(*key);
                    break;
                }
            }
        }

        match finished {
            Some(key) => {
                self.requests.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Starts the requests that were waiting for the CONNACK, in submission order.
    fn start_waiting(&mut self) {
        let mut ctx = RequestContext {
            event_loop: &mut self.event_loop,
            packet_ids: &mut self.packet_ids,
            version: self.version,
            capabilities: &self.capabilities,
        };

        self.requests.retain(|_, request| {
            !request.is_created() || request.start(&mut ctx) != Claim::Finished
        });
    }

    /// Answers inbound publications nobody claimed and hands back what the application
    /// should see.
    fn acknowledge(&mut self, packet: Packet) -> Option<Packet> {
        match &packet {
            Packet::Publish(publish) => match publish.qos {
                QoS::AtMostOnce => {}
                QoS::AtLeastOnce => {
                    self.send(&Packet::PubAck(PublishAckPacket::new(publish.packet_id)));
                }
                QoS::ExactlyOnce => {
                    self.send(&Packet::PubRec(PublishAckPacket::new(publish.packet_id)));
                }
            },
            Packet::PubRel(pub_rel) => {
                self.send(&Packet::PubComp(PublishAckPacket::new(pub_rel.packet_id)));
                return None;
            }
            Packet::Disconnect(_) | Packet::Auth(_) => {}
            other => debug!("unsolicited {}", other.kind()),
        }

        Some(packet)
    }

    fn send(&mut self, packet: &Packet) {
        match encode_frame(packet, self.version) {
            Ok(frame) => self.event_loop.send(frame),
            Err(e) => error!("failed to encode {}: {e}", packet.kind()),
        }
    }

    /// A timer scheduled for `key` fired.
    pub fn handle_timeout(&mut self, key: RequestKey, timer: TimerHandle) {
        let Some(request) = self.requests.get_mut(&key) else {
            trace!("timer {timer:?} fired for settled request {key}");
            return;
        };

        let mut ctx = RequestContext {
            event_loop: &mut self.event_loop,
            packet_ids: &mut self.packet_ids,
            version: self.version,
            capabilities: &self.capabilities,
        };

        if request.on_timeout(timer, &mut ctx) == Claim::Finished {
            self.requests.remove(&key);
        }
    }

    /// The connection went away. Every outstanding request fails with `ConnectionClosed`,
    /// and what the broker announced is forgotten.
    pub fn disconnected(&mut self) {
        let requests = std::mem::take(&mut self.requests);
        if !requests.is_empty() {
            info!("disconnected with {} outstanding requests", requests.len());
        }

        let mut ctx = RequestContext {
            event_loop: &mut self.event_loop,
            packet_ids: &mut self.packet_ids,
            version: self.version,
            capabilities: &self.capabilities,
        };

        for (_, mut request) in requests {
            request.on_disconnected(&mut ctx);
        }

        self.connected = false;
        self.capabilities = BrokerCapabilities::default();
        self.packet_ids.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        packets::{ConnAckPacket, ConnectPacket, PublishPacket},
        request::{tests::RecordingLoop, Connect, Ping},
    };

    fn connected() -> Session<RecordingLoop> {
        let mut session = Session::new(RecordingLoop::default(), ProtocolVersion::V311);
        session.submit(Connect::new(ConnectPacket::new("c")));
        session.handle_packet(Packet::ConnAck(ConnAckPacket::default()));
        session.event_loop_mut().sent.clear();
        session
    }

    #[test]
    fn requests_wait_for_the_connack() {
        let mut session = Session::new(RecordingLoop::default(), ProtocolVersion::V311);

        let mut ping = session.submit(Ping);
        session.submit(Connect::new(ConnectPacket::new("c")));
        assert_eq!(session.event_loop().sent.len(), 1);
        assert_eq!(session.outstanding(), 2);

        assert_eq!(session.handle_packet(Packet::ConnAck(ConnAckPacket::default())), None);
        assert!(session.is_connected());
        assert_eq!(session.event_loop().sent.len(), 2);
        assert_eq!(&session.event_loop().sent[1][..], &[0xC0, 0x00]);

        session.handle_packet(Packet::PingResp);
        assert_eq!(ping.try_recv(), Ok(Ok(())));
        assert_eq!(session.outstanding(), 0);
    }

    #[test]
    fn refused_connection_does_not_connect() {
        let mut session = Session::new(RecordingLoop::default(), ProtocolVersion::V5);
        let mut connect = session.submit(Connect::new(ConnectPacket::new("c")));

        let conn_ack = ConnAckPacket {
            reason_code: crate::protocol::ReasonCode::Banned,
            ..ConnAckPacket::default()
        };
        session.handle_packet(Packet::ConnAck(conn_ack));

        assert_eq!(
            connect.try_recv(),
            Ok(Err(RequestError::ConnectionRefused(crate::protocol::ReasonCode::Banned)))
        );
        assert!(!session.is_connected());
    }

    #[test]
    fn inbound_publications_are_acknowledged() {
        let mut session = connected();

        let publish = PublishPacket {
            packet_id: 7,
            ..PublishPacket::new("t", bytes::Bytes::new(), QoS::AtLeastOnce)
        };
        let delivered = session.handle_packet(Packet::Publish(publish.clone()));

        assert_eq!(delivered, Some(Packet::Publish(publish)));
        assert_eq!(&session.event_loop().sent[0][..], &[0x40, 0x02, 0x00, 0x07]);
    }

    #[test]
    fn inbound_pubrel_is_completed() {
        let mut session = connected();

        assert_eq!(session.handle_packet(Packet::PubRel(PublishAckPacket::new(9))), None);
        assert_eq!(&session.event_loop().sent[0][..], &[0x70, 0x02, 0x00, 0x09]);
    }

    #[test]
    fn duplicate_connack_keeps_the_first_capabilities() {
        let mut session = Session::new(RecordingLoop::default(), ProtocolVersion::V5);
        session.submit(Connect::new(ConnectPacket::new("c")));
        session.handle_packet(Packet::ConnAck(ConnAckPacket::default()));
        assert!(session.capabilities().wildcard_subscription_available);

        let duplicate = Packet::ConnAck(ConnAckPacket {
            properties: crate::properties::Properties {
                wildcard_subscription_available: Some(0),
                maximum_packet_size: Some(64),
                ..Default::default()
            },
            ..ConnAckPacket::default()
        });
        assert_eq!(session.handle_packet(duplicate.clone()), Some(duplicate));

        assert_eq!(session.capabilities(), &BrokerCapabilities::default());
        assert!(session.is_connected());
    }
}

//! Lifecycle of a request that sends a packet and waits for its acknowledgement.
//!
//! ```text
//! Created ──start──▶ Sent ──ack──▶ Succeeded
//!    │                 │ ├─timeout/error──▶ Failed
//!    │                 │ └─ack needing a reply (PUBREC → PUBREL)──▶ Sent
//!    └────────── disconnect ──────────▶ Disconnected
//! ```
//!
//! A terminal state is never left again. Reaching one releases the packet
//! identifier and cancels the timer.

use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::sync::oneshot;

use crate::{
    broker::BrokerCapabilities,
    error::{RequestError, ValidationError},
    frame::encode_frame,
    packet_id::PacketIdAllocator,
    packets::Packet,
    protocol::{PacketType, ProtocolVersion},
};

pub mod connect;
pub mod disconnect;
pub mod ping;
pub mod publish;
pub mod subscribe;
pub mod unsubscribe;

pub use connect::Connect;
pub use disconnect::Disconnect;
pub use ping::Ping;
pub use publish::Publish;
pub use subscribe::Subscribe;
pub use unsubscribe::Unsubscribe;

/// Identifies a request inside its session. Keys grow with submission order.
pub type RequestKey = u64;

/// Cancellable handle of a scheduled timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// The execution context of one connection: timers, outbound bytes and the clock.
///
/// Everything a request does to the outside world goes through here.
pub trait EventLoop {
    /// Arranges for `Session::handle_timeout(key, handle)` to run after `after`.
    fn schedule_timeout(&mut self, key: RequestKey, after: Duration) -> TimerHandle;

    /// Cancels a timer. Cancelling a fired or already cancelled timer does nothing.
    fn cancel_timer(&mut self, timer: TimerHandle);

    /// Queues an encoded frame for transmission.
    fn send(&mut self, frame: Bytes);

    fn now(&self) -> Instant;
}

/// Borrowed connection state a request needs to make a transition.
pub struct RequestContext<'a> {
    pub event_loop: &'a mut dyn EventLoop,
    pub packet_ids: &'a mut dyn PacketIdAllocator,
    pub version: ProtocolVersion,
    pub capabilities: &'a BrokerCapabilities,
}

/// What an operation makes of an inbound packet.
#[derive(Debug)]
pub enum AckStep<T> {
    /// Not the acknowledgement this operation waits for.
    NotMine,

    /// Matched, send this packet and keep waiting.
    Reply(Packet),

    /// Matched and settled.
    Done(Result<T, RequestError>),
}

/// One kind of acknowledged exchange.
///
/// The request drives the lifecycle; the operation builds the packet, checks it
/// against local rules and broker capabilities, and interprets acknowledgements.
pub trait Operation {
    type Response;

    /// Checks the request in order: syntax, then broker capabilities.
    ///
    /// The packet size is checked by the request afterwards.
    fn validate(
        &self,
        _version: ProtocolVersion,
        _capabilities: &BrokerCapabilities,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Builds the packet to send. Packets carrying an identifier are stamped afterwards.
    fn build(&self) -> Packet;

    /// The packet type awaited next, `None` when the operation settles as soon as it is sent.
    fn awaiting(&self) -> Option<PacketType>;

    /// Response of an operation that is not acknowledged. Called right after the send.
    fn sent(&mut self) -> Option<Self::Response> {
        None
    }

    /// Interprets an inbound packet. `packet_id` is the identifier the request was sent with.
    fn on_packet(
        &mut self,
        packet_id: Option<u16>,
        packet: &Packet,
        version: ProtocolVersion,
    ) -> AckStep<Self::Response>;

    /// Whether the request has to wait for the CONNACK before it may be sent.
    fn requires_connection(&self) -> bool {
        true
    }
}

/// Whether `packet` is a `kind` carrying `packet_id`.
pub(crate) fn is_ack(packet: &Packet, kind: PacketType, packet_id: Option<u16>) -> bool {
    packet.kind() == kind && packet.packet_id() == packet_id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Sent,
    Succeeded,
    Failed,
    Disconnected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Disconnected)
    }
}

/// Result of feeding an event to a request.
#[derive(Debug)]
pub enum Transition<T> {
    /// The event did not concern the request. Nothing changed.
    Ignored,

    /// The event was consumed, the request is still waiting.
    Pending,

    /// The request reached a terminal state with this outcome.
    Completed(Result<T, RequestError>),
}

/// An in-flight operation.
#[derive(Debug)]
pub struct Request<O: Operation> {
    key: RequestKey,
    operation: O,
    state: RequestState,
    timeout: Duration,
    packet_id: Option<u16>,
    timer: Option<TimerHandle>,
    sent_at: Option<Instant>,
}

impl<O: Operation> Request<O> {
    pub fn new(key: RequestKey, operation: O, timeout: Duration) -> Self {
        Self {
            key,
            operation,
            state: RequestState::Created,
            timeout,
            packet_id: None,
            timer: None,
            sent_at: None,
        }
    }

    pub fn key(&self) -> RequestKey {
        self.key
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn packet_id(&self) -> Option<u16> {
        self.packet_id
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// Validates, stamps and sends the packet, then waits for the acknowledgement.
    ///
    /// Nothing is allocated, scheduled or sent for a request failing validation.
    pub fn start(&mut self, ctx: &mut RequestContext<'_>) -> Transition<O::Response> {
        if self.state != RequestState::Created {
            return Transition::Ignored;
        }

        let mut packet = self.operation.build();
        let kind = packet.kind();

        if let Err(e) = self.validate(&packet, ctx) {
            debug!("{kind} request {} failed validation: {e}", self.key);
            return self.finish(RequestState::Failed, Err(e.into()), ctx);
        }

        if packet.packet_id().is_some() {
            match ctx.packet_ids.allocate() {
                Ok(packet_id) => {
                    packet.set_packet_id(packet_id);
                    self.packet_id = Some(packet_id);
                }
                Err(e) => return self.finish(RequestState::Failed, Err(e.into()), ctx),
            }
        }

        let frame = match encode_frame(&packet, ctx.version) {
            Ok(frame) => frame,
            Err(e) => return self.finish(RequestState::Failed, Err(e.into()), ctx),
        };

        if self.operation.awaiting().is_some() {
            self.timer = Some(ctx.event_loop.schedule_timeout(self.key, self.timeout));
        }

        ctx.event_loop.send(frame);
        self.state = RequestState::Sent;
        self.sent_at = Some(ctx.event_loop.now());
        trace!("{kind} request {} sent with packet id {:?}", self.key, self.packet_id);

        match self.operation.sent() {
            Some(response) => self.finish(RequestState::Succeeded, Ok(response), ctx),
            None => Transition::Pending,
        }
    }

    fn validate(&self, packet: &Packet, ctx: &RequestContext<'_>) -> Result<(), ValidationError> {
        self.operation.validate(ctx.version, ctx.capabilities)?;

        if let Some(maximum) = ctx.capabilities.maximum_packet_size {
            let size = packet.frame_size(ctx.version);
            if size > maximum as usize {
                return Err(ValidationError::PacketTooLarge { size, maximum });
            }
        }

        Ok(())
    }

    /// Offers an inbound packet. Returns `Ignored` unless it is the awaited acknowledgement.
    pub fn on_packet_received(
        &mut self,
        packet: &Packet,
        ctx: &mut RequestContext<'_>,
    ) -> Transition<O::Response> {
        if self.state != RequestState::Sent {
            return Transition::Ignored;
        }

        match self.operation.on_packet(self.packet_id, packet, ctx.version) {
            AckStep::NotMine => Transition::Ignored,
            AckStep::Reply(reply) => self.reply(&reply, ctx),
            AckStep::Done(result) => {
                if let Some(sent_at) = self.sent_at {
                    let elapsed = ctx.event_loop.now().saturating_duration_since(sent_at);
                    debug!("{} settled request {} after {elapsed:?}", packet.kind(), self.key);
                }

                let state =
                    if result.is_ok() { RequestState::Succeeded } else { RequestState::Failed };
                self.finish(state, result, ctx)
            }
        }
    }

    fn reply(&mut self, reply: &Packet, ctx: &mut RequestContext<'_>) -> Transition<O::Response> {
        let frame = match encode_frame(reply, ctx.version) {
            Ok(frame) => frame,
            Err(e) => return self.finish(RequestState::Failed, Err(e.into()), ctx),
        };

        // Re-arm for the next acknowledgement
        if let Some(timer) = self.timer.take() {
            ctx.event_loop.cancel_timer(timer);
        }
        self.timer = Some(ctx.event_loop.schedule_timeout(self.key, self.timeout));

        ctx.event_loop.send(frame);

        Transition::Pending
    }

    /// A timer fired. Only the currently armed timer of a sent request counts.
    pub fn on_timeout(
        &mut self,
        timer: TimerHandle,
        ctx: &mut RequestContext<'_>,
    ) -> Transition<O::Response> {
        if self.state != RequestState::Sent || self.timer != Some(timer) {
            return Transition::Ignored;
        }

        // Fired, nothing left to cancel
        self.timer = None;

        let kind = self.operation.awaiting().unwrap_or(PacketType::Disconnect);
        warn!("request {} timed out waiting for {kind}", self.key);

        self.finish(RequestState::Failed, Err(RequestError::Timeout(kind)), ctx)
    }

    /// The connection went away. Any request not yet settled fails with `ConnectionClosed`.
    pub fn on_disconnected(&mut self, ctx: &mut RequestContext<'_>) -> Transition<O::Response> {
        if self.state.is_terminal() {
            return Transition::Ignored;
        }

        self.finish(RequestState::Disconnected, Err(RequestError::ConnectionClosed), ctx)
    }

    fn finish(
        &mut self,
        state: RequestState,
        result: Result<O::Response, RequestError>,
        ctx: &mut RequestContext<'_>,
    ) -> Transition<O::Response> {
        if let Some(timer) = self.timer.take() {
            ctx.event_loop.cancel_timer(timer);
        }

        if let Some(packet_id) = self.packet_id.take() {
            ctx.packet_ids.release(packet_id);
        }

        self.state = state;

        Transition::Completed(result)
    }
}

/// What happened to a request after an event, seen from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    Ignored,
    Pending,
    Finished,
}

/// A request together with the channel its outcome is reported on.
///
/// Type-erased so a session can hold requests of every operation side by side.
pub(crate) trait Outstanding: Send {
    fn is_created(&self) -> bool;
    fn requires_connection(&self) -> bool;
    fn start(&mut self, ctx: &mut RequestContext<'_>) -> Claim;
    fn on_packet_received(&mut self, packet: &Packet, ctx: &mut RequestContext<'_>) -> Claim;
    fn on_timeout(&mut self, timer: TimerHandle, ctx: &mut RequestContext<'_>) -> Claim;
    fn on_disconnected(&mut self, ctx: &mut RequestContext<'_>);
}

pub(crate) struct Tracked<O: Operation> {
    request: Request<O>,
    reply: Option<oneshot::Sender<Result<O::Response, RequestError>>>,
}

impl<O: Operation> Tracked<O> {
    pub fn new(
        request: Request<O>,
    ) -> (Self, oneshot::Receiver<Result<O::Response, RequestError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { request, reply: Some(tx) }, rx)
    }

    fn settle(&mut self, transition: Transition<O::Response>) -> Claim {
        match transition {
            Transition::Ignored => Claim::Ignored,
            Transition::Pending => Claim::Pending,
            Transition::Completed(result) => {
                if let Some(reply) = self.reply.take() {
                    if reply.send(result).is_err() {
                        trace!("request {} settled after its caller went away", self.request.key);
                    }
                }
                Claim::Finished
            }
        }
    }
}

impl<O> Outstanding for Tracked<O>
where
    O: Operation + Send,
    O::Response: Send,
{
    fn is_created(&self) -> bool {
        self.request.state == RequestState::Created
    }

    fn requires_connection(&self) -> bool {
        self.request.operation.requires_connection()
    }

    fn start(&mut self, ctx: &mut RequestContext<'_>) -> Claim {
        let transition = self.request.start(ctx);
        self.settle(transition)
    }

    fn on_packet_received(&mut self, packet: &Packet, ctx: &mut RequestContext<'_>) -> Claim {
        let transition = self.request.on_packet_received(packet, ctx);
        self.settle(transition)
    }

    fn on_timeout(&mut self, timer: TimerHandle, ctx: &mut RequestContext<'_>) -> Claim {
        let transition = self.request.on_timeout(timer, ctx);
        self.settle(transition)
    }

    fn on_disconnected(&mut self, ctx: &mut RequestContext<'_>) {
        let transition = self.request.on_disconnected(ctx);
        self.settle(transition);
    }
}

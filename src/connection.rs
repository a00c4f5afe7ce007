use std::{collections::HashMap, time::Duration};

use bytes::{Bytes, BytesMut};
use log::{debug, error, info, trace, warn};
use tokio::{
    io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::{AbortHandle, JoinHandle},
};

use crate::{
    config::ClientConfig,
    error::{ConnectionError, RequestError},
    frame::{encode_frame, FrameDecoder},
    packets::{
        ConnAckPacket, ConnectPacket, Packet, PublishAckPacket, PublishPacket, SubAckPacket,
        Subscription, UnsubAckPacket,
    },
    protocol::ProtocolVersion,
    request::{
        Connect, Disconnect, EventLoop, Operation, Ping, Publish, RequestKey, Subscribe,
        TimerHandle, Unsubscribe,
    },
    session::{Response, Session},
};

/// A byte stream framed into MQTT packets.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    decoder: FrameDecoder,
    version: ProtocolVersion,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S, config: &ClientConfig) -> Connection<S> {
        Connection {
            stream,
            buffer: BytesMut::with_capacity(config.read_buffer_capacity),
            decoder: FrameDecoder::new(config.maximum_packet_size),
            version: config.protocol_version,
        }
    }

    /// Read a packet from the connection.
    ///
    /// Returns `None` if EOF is reached between two packets.
    /// Cancel safe: a partially read packet stays buffered.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, ConnectionError> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buffer)? {
                return Ok(Some(frame.into_packet(self.version)?));
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }

                return Err(ConnectionError::ConnectionReset);
            }
        }
    }

    /// Write an encoded frame. Not flushed.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await
    }

    /// Write a packet to the connection and flush it.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<(), ConnectionError> {
        let frame = encode_frame(packet, self.version)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        Ok(())
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// `EventLoop` of a connection driven by a tokio task.
///
/// Frames are queued and written by the driver after each event. A timer is a sleeping
/// task that reports its expiry on a channel the driver listens to.
#[derive(Debug)]
pub struct TokioEventLoop {
    outbound: Vec<Bytes>,
    timers: HashMap<TimerHandle, AbortHandle>,
    expired: mpsc::UnboundedSender<(RequestKey, TimerHandle)>,
    next_timer: u64,
}

impl TokioEventLoop {
    pub fn new(expired: mpsc::UnboundedSender<(RequestKey, TimerHandle)>) -> Self {
        Self { outbound: Vec::new(), timers: HashMap::new(), expired, next_timer: 0 }
    }

    /// Frames queued since the last call.
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.outbound)
    }

    /// Number of timers scheduled and neither fired nor cancelled.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn fired(&mut self, timer: TimerHandle) {
        self.timers.remove(&timer);
    }
}

impl EventLoop for TokioEventLoop {
    fn schedule_timeout(&mut self, key: RequestKey, after: Duration) -> TimerHandle {
        self.next_timer += 1;
        let timer = TimerHandle(self.next_timer);

        let expired = self.expired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The driver is gone, nobody waits for the timeout anymore
            let _ = expired.send((key, timer));
        });

        self.timers.insert(timer, task.abort_handle());
        timer
    }

    fn cancel_timer(&mut self, timer: TimerHandle) {
        if let Some(task) = self.timers.remove(&timer) {
            task.abort();
        }
    }

    fn send(&mut self, frame: Bytes) {
        self.outbound.push(frame);
    }

    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}

impl Drop for TokioEventLoop {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}

type Job = Box<dyn FnOnce(&mut Session<TokioEventLoop>) + Send>;

enum Command {
    Submit(Job),
    Shutdown,
}

/// Handle to a connection driven by a background task.
///
/// Cheap to clone. Every request resolves exactly once, with `ConnectionClosed` if the
/// connection goes away first.
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Submit(_) => write!(f, "Submit"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl Client {
    /// Spawns the driver task of `stream`.
    ///
    /// Returns the client handle, the packets no request claimed (inbound publications,
    /// DISCONNECT, AUTH) and the driver task.
    pub fn spawn<S>(
        stream: S,
        config: ClientConfig,
    ) -> (Client, mpsc::Receiver<Packet>, JoinHandle<Result<(), ConnectionError>>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(config.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);

        let driver = tokio::spawn(run(stream, config, commands_rx, inbound_tx));

        (Client { commands: commands_tx }, inbound_rx, driver)
    }

    /// Submits any operation and waits for its outcome.
    pub async fn request<O>(&self, operation: O) -> Result<O::Response, RequestError>
    where
        O: Operation + Send + 'static,
        O::Response: Send + 'static,
    {
        self.submit(move |session| session.submit(operation)).await
    }

    /// Runs `submit` on the driver and waits for the response it hands back.
    async fn submit<T, F>(&self, submit: F) -> Result<T, RequestError>
    where
        F: FnOnce(&mut Session<TokioEventLoop>) -> Response<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |session| {
            let _ = tx.send(submit(session));
        });

        self.commands
            .send(Command::Submit(job))
            .await
            .map_err(|_| RequestError::ConnectionClosed)?;

        let response = rx.await.map_err(|_| RequestError::ConnectionClosed)?;
        response.await.map_err(|_| RequestError::ConnectionClosed)?
    }

    pub async fn connect(&self, packet: ConnectPacket) -> Result<ConnAckPacket, RequestError> {
        self.request(Connect::new(packet)).await
    }

    pub async fn subscribe(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> Result<SubAckPacket, RequestError> {
        self.request(Subscribe::new(subscriptions)).await
    }

    pub async fn unsubscribe(
        &self,
        topic_filters: Vec<String>,
    ) -> Result<UnsubAckPacket, RequestError> {
        self.request(Unsubscribe::new(topic_filters)).await
    }

    /// Resolves once sent for `QoS` 0, on the final acknowledgement otherwise.
    pub async fn publish(
        &self,
        packet: PublishPacket,
    ) -> Result<Option<PublishAckPacket>, RequestError> {
        self.request(Publish::new(packet)).await
    }

    pub async fn ping(&self) -> Result<(), RequestError> {
        self.request(Ping).await
    }

    /// Sends DISCONNECT and stops the driver.
    ///
    /// Before the CONNACK there is nothing to disconnect from: nothing is sent, the driver
    /// just stops and pending requests fail with `ConnectionClosed`.
    pub async fn disconnect(&self) -> Result<(), RequestError> {
        let result = self
            .submit(|session| {
                if session.is_connected() {
                    return session.submit(Disconnect::default());
                }

                debug!("not connected, closing without DISCONNECT");
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(Ok(()));
                rx
            })
            .await;

        if self.commands.send(Command::Shutdown).await.is_err() {
            trace!("driver already stopped");
        }

        result
    }
}

async fn run<S>(
    stream: S,
    config: ClientConfig,
    mut commands: mpsc::Receiver<Command>,
    inbound: mpsc::Sender<Packet>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();

    let mut connection = Connection::new(stream, &config);
    let mut session = Session::new(TokioEventLoop::new(timer_tx), config.protocol_version)
        .with_request_timeout(config.request_timeout);

    info!("connection driver started, protocol {}", config.protocol_version);

    let result = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Submit(job)) => job(&mut session),
                Some(Command::Shutdown) | None => {
                    debug!("shutting down");
                    break Ok(());
                }
            },
            Some((key, timer)) = timer_rx.recv() => {
                session.event_loop_mut().fired(timer);
                session.handle_timeout(key, timer);
            }
            packet = connection.read_packet() => match packet {
                Ok(Some(packet)) => {
                    if let Some(packet) = session.handle_packet(packet) {
                        deliver(&inbound, packet);
                    }
                }
                Ok(None) => {
                    info!("connection closed by peer");
                    break Ok(());
                }
                Err(e) => {
                    error!("failed to read packet: {e}");
                    break Err(e);
                }
            },
        }

        if let Err(e) = flush(&mut connection, session.event_loop_mut()).await {
            error!("failed to write: {e}");
            break Err(e.into());
        }
    };

    session.disconnected();

    if let Err(e) = connection.shutdown().await {
        warn!("failed to shut down the stream: {e}");
    }

    result
}

/// Hands an unclaimed packet to the application without ever waiting for it.
fn deliver(inbound: &mpsc::Sender<Packet>, packet: Packet) {
    match inbound.try_send(packet) {
        Ok(()) => {}
        Err(TrySendError::Full(packet)) => {
            warn!("inbound channel full, dropping {}", packet.kind());
        }
        Err(TrySendError::Closed(packet)) => {
            warn!("inbound receiver gone, dropping {}", packet.kind());
        }
    }
}

async fn flush<S>(connection: &mut Connection<S>, event_loop: &mut TokioEventLoop) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frames = event_loop.take_outbound();
    if frames.is_empty() {
        return Ok(());
    }

    for frame in &frames {
        connection.write_frame(frame).await?;
    }

    connection.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut event_loop = TokioEventLoop::new(tx);

        let cancelled = event_loop.schedule_timeout(1, Duration::from_millis(10));
        let armed = event_loop.schedule_timeout(2, Duration::from_millis(20));
        event_loop.cancel_timer(cancelled);
        event_loop.cancel_timer(cancelled);

        assert_eq!(rx.recv().await, Some((2, armed)));
        assert_eq!(event_loop.pending_timers(), 1);
    }

    #[tokio::test]
    async fn partial_frames_are_buffered() {
        let (mut peer, stream) = tokio::io::duplex(64);
        let mut connection = Connection::new(stream, &ClientConfig::default());

        peer.write_all(&[0x90, 0x03, 0x00]).await.unwrap();
        let read = tokio::spawn(async move {
            let packet = connection.read_packet().await;
            (connection, packet)
        });
        peer.write_all(&[0x01, 0x01]).await.unwrap();

        let (_, packet) = read.await.unwrap();
        let Some(Packet::SubAck(sub_ack)) = packet.unwrap() else {
            panic!("expected a SUBACK");
        };
        assert_eq!(sub_ack.packet_id, 1);
    }

    #[tokio::test]
    async fn eof_inside_a_frame_is_a_reset() {
        let (mut peer, stream) = tokio::io::duplex(64);
        let mut connection = Connection::new(stream, &ClientConfig::default());

        peer.write_all(&[0x90, 0x03]).await.unwrap();
        drop(peer);

        assert!(matches!(connection.read_packet().await, Err(ConnectionError::ConnectionReset)));
    }
}

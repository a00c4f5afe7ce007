use std::time::Duration;

use mqtt_request_engine::{
    packets::{ConnAckPacket, ConnectPacket, PublishAckPacket, PublishPacket, SubAckPacket, Subscription},
    Client, ClientConfig, Connection, Packet, PacketType, QoS, ReasonCode, RequestError,
};
use tokio::io::DuplexStream;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A client driver and the broker end of its stream.
fn pair(config: ClientConfig) -> (Client, tokio::sync::mpsc::Receiver<Packet>, Connection<DuplexStream>) {
    init_logger();

    let (client_io, broker_io) = tokio::io::duplex(4096);
    let broker = Connection::new(broker_io, &config);
    let (client, inbound, _driver) = Client::spawn(client_io, config);

    (client, inbound, broker)
}

async fn accept(broker: &mut Connection<DuplexStream>) {
    let packet = broker.read_packet().await.unwrap();
    assert!(matches!(packet, Some(Packet::Connect(ref connect)) if connect.client_id == "client"));

    broker.write_packet(&Packet::ConnAck(ConnAckPacket::default())).await.unwrap();
}

#[tokio::test]
async fn connect_and_subscribe() {
    let (client, _inbound, mut broker) = pair(ClientConfig::default().mqtt5());

    let (conn_ack, ()) =
        tokio::join!(client.connect(ConnectPacket::new("client")), accept(&mut broker));
    assert_eq!(conn_ack.unwrap().reason_code, ReasonCode::Success);

    let broker_side = async {
        let Some(Packet::Subscribe(subscribe)) = broker.read_packet().await.unwrap() else {
            panic!("expected a SUBSCRIBE");
        };
        assert_eq!(subscribe.packet_id, 1);
        assert_eq!(subscribe.subscriptions[0].topic_filter, "a/b");

        let sub_ack = SubAckPacket {
            packet_id: subscribe.packet_id,
            reason_codes: vec![ReasonCode::GrantedQoS1],
            ..SubAckPacket::default()
        };
        broker.write_packet(&Packet::SubAck(sub_ack)).await.unwrap();
    };

    let (sub_ack, ()) = tokio::join!(
        client.subscribe(vec![Subscription::new("a/b", QoS::AtLeastOnce)]),
        broker_side
    );
    assert_eq!(sub_ack.unwrap().reason_codes, vec![ReasonCode::GrantedQoS1]);
}

#[tokio::test]
async fn unanswered_ping_times_out() {
    let config = ClientConfig::default().request_timeout(Duration::from_millis(50));
    let (client, _inbound, mut broker) = pair(config);

    let (conn_ack, ()) =
        tokio::join!(client.connect(ConnectPacket::new("client")), accept(&mut broker));
    assert!(conn_ack.is_ok());

    assert_eq!(client.ping().await, Err(RequestError::Timeout(PacketType::PingResp)));
    assert_eq!(broker.read_packet().await.unwrap(), Some(Packet::PingReq));
}

#[tokio::test]
async fn inbound_publish_is_delivered_and_acknowledged() {
    let (client, mut inbound, mut broker) = pair(ClientConfig::default());

    let (conn_ack, ()) =
        tokio::join!(client.connect(ConnectPacket::new("client")), accept(&mut broker));
    assert!(conn_ack.is_ok());

    let publish = PublishPacket {
        packet_id: 5,
        ..PublishPacket::new("a/b", "hello", QoS::AtLeastOnce)
    };
    broker.write_packet(&Packet::Publish(publish.clone())).await.unwrap();

    assert_eq!(inbound.recv().await, Some(Packet::Publish(publish)));
    assert_eq!(
        broker.read_packet().await.unwrap(),
        Some(Packet::PubAck(PublishAckPacket::new(5)))
    );
}

#[tokio::test]
async fn closed_connection_fails_outstanding_requests() {
    let (client, _inbound, mut broker) = pair(ClientConfig::default());

    let (conn_ack, ()) =
        tokio::join!(client.connect(ConnectPacket::new("client")), accept(&mut broker));
    assert!(conn_ack.is_ok());

    let broker_side = async move {
        assert_eq!(broker.read_packet().await.unwrap(), Some(Packet::PingReq));
        drop(broker);
    };

    let (ping, ()) = tokio::join!(client.ping(), broker_side);
    assert_eq!(ping, Err(RequestError::ConnectionClosed));

    // The driver is gone for good
    assert_eq!(client.ping().await, Err(RequestError::ConnectionClosed));
}

#[tokio::test]
async fn disconnect_stops_the_driver() {
    let (client, _inbound, mut broker) = pair(ClientConfig::default());

    let (conn_ack, ()) =
        tokio::join!(client.connect(ConnectPacket::new("client")), accept(&mut broker));
    assert!(conn_ack.is_ok());

    assert_eq!(client.disconnect().await, Ok(()));
    assert!(matches!(broker.read_packet().await.unwrap(), Some(Packet::Disconnect(_))));
    assert_eq!(broker.read_packet().await.unwrap(), None);
}

#[tokio::test]
async fn disconnect_before_connack_returns() {
    let (client, _inbound, mut broker) = pair(ClientConfig::default());

    let disconnect = tokio::time::timeout(Duration::from_secs(2), client.disconnect()).await;
    assert_eq!(disconnect, Ok(Ok(())));

    // Nothing was sent, the stream is simply closed
    assert_eq!(broker.read_packet().await.unwrap(), None);
}

#[tokio::test]
async fn undrained_inbound_channel_does_not_stall_timeouts() {
    let config = ClientConfig::default()
        .channel_capacity(1)
        .request_timeout(Duration::from_millis(100));
    let (client, mut inbound, mut broker) = pair(config);

    let (conn_ack, ()) =
        tokio::join!(client.connect(ConnectPacket::new("client")), accept(&mut broker));
    assert!(conn_ack.is_ok());

    for _ in 0..3 {
        let publish = PublishPacket::new("a/b", "x", QoS::AtMostOnce);
        broker.write_packet(&Packet::Publish(publish)).await.unwrap();
    }

    let ping = tokio::time::timeout(Duration::from_secs(2), client.ping()).await;
    assert_eq!(ping, Ok(Err(RequestError::Timeout(PacketType::PingResp))));

    // The first publication was kept, the overflow dropped
    assert!(matches!(inbound.recv().await, Some(Packet::Publish(_))));
    assert!(inbound.try_recv().is_err());
}

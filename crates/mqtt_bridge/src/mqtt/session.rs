use crate::domain::{Access, ConnectionAuthenticator, MessageForwarder};
use crate::mqtt::{CodecError, MqttCodec, Outgoing};
use futures::{SinkExt, StreamExt};
use rumqttc::mqttbytes::v4::{
    ConnAck, Connect, ConnectReturnCode, Packet, PubAck, Publish, SubAck, Subscribe,
    SubscribeReasonCode, UnsubAck,
};
use rumqttc::mqttbytes::QoS;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Span};

/// Per-connection limits
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_packet_size: usize,
    /// Time allowed between accepting the socket and receiving CONNECT
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 256 * 1024,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// The two hooks every connection runs through
#[derive(Clone)]
pub struct SessionHooks {
    pub authenticator: Arc<dyn ConnectionAuthenticator>,
    pub forwarder: Arc<dyn MessageForwarder>,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    ClientDisconnected,
    ConnectionClosed,
    Refused,
    ConnectTimeout,
    IdleTimeout,
    /// A QoS 1 publish could not be forwarded; the client will resend it
    ForwardFailed,
    ProtocolViolation(&'static str),
    Shutdown,
}

enum Incoming {
    Packet(Packet),
    Closed,
    IdleTimeout,
}

/// Drive one client connection from CONNECT to close
///
/// Expects to run inside a span with empty `client_id` and `identity` fields, which are
/// filled in as the handshake progresses.
pub async fn run_session<S>(
    stream: S,
    hooks: SessionHooks,
    config: &SessionConfig,
    shutdown: CancellationToken,
) -> Result<SessionEnd, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, MqttCodec::new(config.max_packet_size));

    let connect = tokio::select! {
        _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        first = tokio::time::timeout(config.connect_timeout, framed.next()) => match first {
            Err(_) => return Ok(SessionEnd::ConnectTimeout),
            Ok(None) => return Ok(SessionEnd::ConnectionClosed),
            Ok(Some(packet)) => match packet? {
                Packet::Connect(connect) => connect,
                _ => return Ok(SessionEnd::ProtocolViolation("first packet was not CONNECT")),
            },
        },
    };

    Span::current().record("client_id", connect.client_id.as_str());

    let Some(identity) = admit(&mut framed, hooks.authenticator.as_ref(), &connect).await? else {
        return Ok(SessionEnd::Refused);
    };
    Span::current().record("identity", identity.as_str());

    let idle_timeout = keep_alive_timeout(connect.keep_alive);

    loop {
        let incoming = tokio::select! {
            _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            incoming = next_packet(&mut framed, idle_timeout) => incoming?,
        };

        let packet = match incoming {
            Incoming::Packet(packet) => packet,
            Incoming::Closed => return Ok(SessionEnd::ConnectionClosed),
            Incoming::IdleTimeout => return Ok(SessionEnd::IdleTimeout),
        };

        match packet {
            Packet::Publish(publish) => {
                if let Some(end) = handle_publish(&mut framed, &hooks, &identity, publish).await? {
                    return Ok(end);
                }
            }
            Packet::Subscribe(subscribe) => {
                let ack = subscribe_ack(hooks.authenticator.as_ref(), &identity, subscribe).await;
                framed.send(Outgoing::SubAck(ack)).await?;
            }
            Packet::Unsubscribe(unsubscribe) => {
                framed
                    .send(Outgoing::UnsubAck(UnsubAck::new(unsubscribe.pkid)))
                    .await?;
            }
            Packet::PingReq => framed.send(Outgoing::PingResp).await?,
            Packet::Disconnect => return Ok(SessionEnd::ClientDisconnected),
            Packet::Connect(_) => return Ok(SessionEnd::ProtocolViolation("duplicate CONNECT")),
            Packet::PubAck(_) | Packet::PubRec(_) | Packet::PubRel(_) | Packet::PubComp(_) => {
                debug!("ignoring client acknowledgement");
            }
            _ => return Ok(SessionEnd::ProtocolViolation("server-only packet from client")),
        }
    }
}

/// Run the admission hook and answer with CONNACK. Returns the identity when admitted.
async fn admit<S>(
    framed: &mut Framed<S, MqttCodec>,
    authenticator: &dyn ConnectionAuthenticator,
    connect: &Connect,
) -> Result<Option<String>, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let identity = match &connect.login {
        Some(login) if authenticator.authenticate(&login.username, &login.password).await => {
            Some(login.username.clone())
        }
        Some(_) => None,
        None => {
            warn!("connection presented no credentials");
            None
        }
    };

    let code = if identity.is_some() {
        ConnectReturnCode::Success
    } else {
        ConnectReturnCode::BadUserNamePassword
    };
    framed
        .send(Outgoing::ConnAck(ConnAck::new(code, false)))
        .await?;

    Ok(identity)
}

async fn handle_publish<S>(
    framed: &mut Framed<S, MqttCodec>,
    hooks: &SessionHooks,
    identity: &str,
    publish: Publish,
) -> Result<Option<SessionEnd>, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if publish.qos == QoS::ExactlyOnce {
        warn!(topic = %publish.topic, "QoS 2 publish rejected");
        return Ok(Some(SessionEnd::ProtocolViolation("QoS 2 is not supported")));
    }

    if !hooks
        .authenticator
        .authorize(identity, &publish.topic, Access::Write)
        .await
    {
        warn!(topic = %publish.topic, "publish not authorized");
        return Ok(Some(SessionEnd::ProtocolViolation("publish not authorized")));
    }

    let pkid = publish.pkid;
    match (publish.qos, hooks.forwarder.forward(identity, publish.payload).await) {
        (QoS::AtLeastOnce, Ok(_)) => {
            framed.send(Outgoing::PubAck(PubAck::new(pkid))).await?;
            Ok(None)
        }
        (QoS::AtLeastOnce, Err(e)) => {
            warn!(pkid, error = %e, "forward failed, closing without PUBACK");
            Ok(Some(SessionEnd::ForwardFailed))
        }
        (_, Ok(_)) => Ok(None),
        (_, Err(e)) => {
            warn!(error = %e, "forward failed, QoS 0 message dropped");
            Ok(None)
        }
    }
}

/// Grant QoS 0 on every authorized filter. Nothing is ever delivered back to the client.
async fn subscribe_ack(
    authenticator: &dyn ConnectionAuthenticator,
    identity: &str,
    subscribe: Subscribe,
) -> SubAck {
    let mut return_codes = Vec::with_capacity(subscribe.filters.len());
    for filter in &subscribe.filters {
        let code = if authenticator
            .authorize(identity, &filter.path, Access::Read)
            .await
        {
            SubscribeReasonCode::Success(QoS::AtMostOnce)
        } else {
            SubscribeReasonCode::Failure
        };
        return_codes.push(code);
    }
    SubAck::new(subscribe.pkid, return_codes)
}

async fn next_packet<S>(
    framed: &mut Framed<S, MqttCodec>,
    idle_timeout: Option<Duration>,
) -> Result<Incoming, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, framed.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(Incoming::IdleTimeout),
        },
        None => framed.next().await,
    };

    match next {
        Some(packet) => Ok(Incoming::Packet(packet?)),
        None => Ok(Incoming::Closed),
    }
}

/// One and a half keep-alive periods, or no limit when keep-alive is disabled
fn keep_alive_timeout(keep_alive_secs: u16) -> Option<Duration> {
    (keep_alive_secs > 0).then(|| Duration::from_millis(u64::from(keep_alive_secs) * 1500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockConnectionAuthenticator, MockMessageForwarder};
    use bytes::BytesMut;
    use common::domain::DomainError;
    use rumqttc::mqttbytes::v4::{self, Disconnect, PingReq, Unsubscribe};
    use rumqttc::mqttbytes::Error as MqttError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    const USER: &str = "DEVICEAAAAAAAAAA";
    const SECRET: &str = "s3cr3tS3cr3tS3cr";

    struct TestClient {
        stream: DuplexStream,
        buf: BytesMut,
    }

    impl TestClient {
        async fn send(&mut self, frame: BytesMut) {
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn recv(&mut self) -> Option<Packet> {
            loop {
                match v4::read(&mut self.buf, 1024) {
                    Ok(packet) => return Some(packet),
                    Err(MqttError::InsufficientBytes(_)) => {}
                    Err(e) => panic!("server sent malformed packet: {:?}", e),
                }
                if self.stream.read_buf(&mut self.buf).await.unwrap() == 0 {
                    return None;
                }
            }
        }

        async fn connect(&mut self, login: Option<(&str, &str)>, keep_alive: u16) {
            let mut connect = Connect::new("sensor-1");
            connect.keep_alive = keep_alive;
            if let Some((user, secret)) = login {
                connect.set_login(user, secret);
            }
            let mut frame = BytesMut::new();
            connect.write(&mut frame).unwrap();
            self.send(frame).await;
        }

        async fn publish(&mut self, qos: QoS, pkid: u16, payload: &[u8]) {
            let mut publish = Publish::new("sensors/temperature", qos, payload.to_vec());
            publish.pkid = pkid;
            let mut frame = BytesMut::new();
            publish.write(&mut frame).unwrap();
            self.send(frame).await;
        }

        async fn ping(&mut self) {
            let mut frame = BytesMut::new();
            PingReq.write(&mut frame).unwrap();
            self.send(frame).await;
        }

        async fn disconnect(&mut self) {
            let mut frame = BytesMut::new();
            Disconnect.write(&mut frame).unwrap();
            self.send(frame).await;
        }
    }

    fn start(
        authenticator: MockConnectionAuthenticator,
        forwarder: MockMessageForwarder,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> (TestClient, JoinHandle<Result<SessionEnd, CodecError>>) {
        let (client, server) = tokio::io::duplex(4096);
        let hooks = SessionHooks {
            authenticator: Arc::new(authenticator),
            forwarder: Arc::new(forwarder),
        };
        let session =
            tokio::spawn(async move { run_session(server, hooks, &config, shutdown).await });
        (
            TestClient {
                stream: client,
                buf: BytesMut::new(),
            },
            session,
        )
    }

    fn admitting_authenticator() -> MockConnectionAuthenticator {
        let mut authenticator = MockConnectionAuthenticator::new();
        authenticator
            .expect_authenticate()
            .withf(|user, secret| user == USER && secret == SECRET)
            .times(1)
            .returning(|_, _| true);
        authenticator.expect_authorize().returning(|_, _, _| true);
        authenticator
    }

    async fn expect_connack(client: &mut TestClient, expected: ConnectReturnCode) {
        match client.recv().await {
            Some(Packet::ConnAck(ack)) => {
                assert_eq!(ack.code, expected);
                assert!(!ack.session_present);
            }
            other => panic!("expected CONNACK, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_admitted_qos1_publish_is_forwarded_and_acknowledged() {
        let mut forwarder = MockMessageForwarder::new();
        forwarder
            .expect_forward()
            .withf(|identity, payload| identity == USER && payload.as_ref() == b"42")
            .times(1)
            .returning(|_, payload| Ok(payload));

        let (mut client, session) = start(
            admitting_authenticator(),
            forwarder,
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, SECRET)), 30).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;

        client.publish(QoS::AtLeastOnce, 5, b"42").await;
        match client.recv().await {
            Some(Packet::PubAck(ack)) => assert_eq!(ack.pkid, 5),
            other => panic!("expected PUBACK, got {:?}", other),
        }

        client.disconnect().await;
        assert_eq!(
            session.await.unwrap().unwrap(),
            SessionEnd::ClientDisconnected
        );
    }

    #[tokio::test]
    async fn test_rejected_credentials_get_bad_username_password() {
        let mut authenticator = MockConnectionAuthenticator::new();
        authenticator
            .expect_authenticate()
            .times(1)
            .returning(|_, _| false);
        let mut forwarder = MockMessageForwarder::new();
        forwarder.expect_forward().times(0);

        let (mut client, session) = start(
            authenticator,
            forwarder,
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, "wrong")), 30).await;
        expect_connack(&mut client, ConnectReturnCode::BadUserNamePassword).await;

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Refused);
        assert!(client.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_credentials_are_refused_without_lookup() {
        let mut authenticator = MockConnectionAuthenticator::new();
        authenticator.expect_authenticate().times(0);

        let (mut client, session) = start(
            authenticator,
            MockMessageForwarder::new(),
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(None, 30).await;
        expect_connack(&mut client, ConnectReturnCode::BadUserNamePassword).await;
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Refused);
    }

    #[tokio::test]
    async fn test_first_packet_must_be_connect() {
        let (mut client, session) = start(
            MockConnectionAuthenticator::new(),
            MockMessageForwarder::new(),
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.ping().await;

        assert_eq!(
            session.await.unwrap().unwrap(),
            SessionEnd::ProtocolViolation("first packet was not CONNECT")
        );
        assert!(client.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_qos0_forward_failure_keeps_connection_open() {
        let mut forwarder = MockMessageForwarder::new();
        forwarder
            .expect_forward()
            .times(1)
            .returning(|_, _| Err(DomainError::PublishTimeout(Duration::from_secs(5))));

        let (mut client, session) = start(
            admitting_authenticator(),
            forwarder,
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, SECRET)), 30).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;

        client.publish(QoS::AtMostOnce, 0, b"42").await;
        client.ping().await;
        assert!(matches!(client.recv().await, Some(Packet::PingResp)));

        client.disconnect().await;
        assert_eq!(
            session.await.unwrap().unwrap(),
            SessionEnd::ClientDisconnected
        );
    }

    #[tokio::test]
    async fn test_qos1_forward_failure_closes_without_puback() {
        let mut forwarder = MockMessageForwarder::new();
        forwarder
            .expect_forward()
            .times(1)
            .returning(|_, _| Err(DomainError::PublisherClosed));

        let (mut client, session) = start(
            admitting_authenticator(),
            forwarder,
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, SECRET)), 30).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;

        client.publish(QoS::AtLeastOnce, 9, b"42").await;

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ForwardFailed);
        assert!(client.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_qos2_publish_closes_connection() {
        let mut forwarder = MockMessageForwarder::new();
        forwarder.expect_forward().times(0);

        let (mut client, session) = start(
            admitting_authenticator(),
            forwarder,
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, SECRET)), 30).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;
        client.publish(QoS::ExactlyOnce, 3, b"42").await;

        assert_eq!(
            session.await.unwrap().unwrap(),
            SessionEnd::ProtocolViolation("QoS 2 is not supported")
        );
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe_are_acknowledged() {
        let (mut client, session) = start(
            admitting_authenticator(),
            MockMessageForwarder::new(),
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, SECRET)), 30).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;

        let mut frame = BytesMut::new();
        let mut subscribe = Subscribe::new("commands/#", QoS::AtLeastOnce);
        subscribe.pkid = 11;
        subscribe.write(&mut frame).unwrap();
        client.send(frame).await;

        match client.recv().await {
            Some(Packet::SubAck(ack)) => {
                assert_eq!(ack.pkid, 11);
                assert_eq!(
                    ack.return_codes,
                    vec![SubscribeReasonCode::Success(QoS::AtMostOnce)]
                );
            }
            other => panic!("expected SUBACK, got {:?}", other),
        }

        let mut frame = BytesMut::new();
        let mut unsubscribe = Unsubscribe::new("commands/#");
        unsubscribe.pkid = 12;
        unsubscribe.write(&mut frame).unwrap();
        client.send(frame).await;

        match client.recv().await {
            Some(Packet::UnsubAck(ack)) => assert_eq!(ack.pkid, 12),
            other => panic!("expected UNSUBACK, got {:?}", other),
        }

        client.disconnect().await;
        assert_eq!(
            session.await.unwrap().unwrap(),
            SessionEnd::ClientDisconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_hits_connect_timeout() {
        let (_client, session) = start(
            MockConnectionAuthenticator::new(),
            MockMessageForwarder::new(),
            SessionConfig::default(),
            CancellationToken::new(),
        );

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ConnectTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_client_hits_keep_alive_timeout() {
        let (mut client, session) = start(
            admitting_authenticator(),
            MockMessageForwarder::new(),
            SessionConfig::default(),
            CancellationToken::new(),
        );

        client.connect(Some((USER, SECRET)), 2).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::IdleTimeout);
    }

    #[tokio::test]
    async fn test_shutdown_ends_established_session() {
        let shutdown = CancellationToken::new();
        let (mut client, session) = start(
            admitting_authenticator(),
            MockMessageForwarder::new(),
            SessionConfig::default(),
            shutdown.clone(),
        );

        client.connect(Some((USER, SECRET)), 0).await;
        expect_connack(&mut client, ConnectReturnCode::Success).await;

        shutdown.cancel();

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Shutdown);
    }

    #[test]
    fn test_keep_alive_timeout() {
        assert_eq!(keep_alive_timeout(0), None);
        assert_eq!(keep_alive_timeout(10), Some(Duration::from_secs(15)));
    }
}

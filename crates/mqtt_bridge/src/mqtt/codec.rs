use bytes::BytesMut;
use rumqttc::mqttbytes::v4::{self, ConnAck, Packet, PingResp, PubAck, SubAck, UnsubAck};
use rumqttc::mqttbytes::Error as MqttError;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed MQTT packet: {0}")]
    Mqtt(#[from] MqttError),
}

/// Packets the bridge sends to clients
#[derive(Debug, Clone)]
pub enum Outgoing {
    ConnAck(ConnAck),
    PubAck(PubAck),
    SubAck(SubAck),
    UnsubAck(UnsubAck),
    PingResp,
}

/// MQTT 3.1.1 framing for the server side of a connection
#[derive(Debug, Clone)]
pub struct MqttCodec {
    max_packet_size: usize,
}

impl MqttCodec {
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }
}

impl Decoder for MqttCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        match v4::read(src, self.max_packet_size) {
            Ok(packet) => Ok(Some(packet)),
            Err(MqttError::InsufficientBytes(required)) => {
                src.reserve(required);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Encoder<Outgoing> for MqttCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Outgoing, dst: &mut BytesMut) -> Result<(), CodecError> {
        match item {
            Outgoing::ConnAck(ack) => ack.write(dst)?,
            Outgoing::PubAck(ack) => ack.write(dst)?,
            Outgoing::SubAck(ack) => ack.write(dst)?,
            Outgoing::UnsubAck(ack) => ack.write(dst)?,
            Outgoing::PingResp => PingResp.write(dst)?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::mqttbytes::v4::{ConnectReturnCode, Publish};
    use rumqttc::mqttbytes::QoS;

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let mut frame = BytesMut::new();
        let mut publish = Publish::new("sensors/1", QoS::AtLeastOnce, b"42".to_vec());
        publish.pkid = 7;
        publish.write(&mut frame).unwrap();

        let mut codec = MqttCodec::new(1024);
        let mut partial = frame.split_to(frame.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(frame);
        match codec.decode(&mut partial).unwrap() {
            Some(Packet::Publish(publish)) => {
                assert_eq!(publish.pkid, 7);
                assert_eq!(publish.payload.as_ref(), b"42");
            }
            other => panic!("expected publish, got {:?}", other),
        }
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_rejects_oversized_packet() {
        let mut frame = BytesMut::new();
        Publish::new("sensors/1", QoS::AtMostOnce, vec![0u8; 512])
            .write(&mut frame)
            .unwrap();

        let result = MqttCodec::new(64).decode(&mut frame);

        assert!(matches!(result, Err(CodecError::Mqtt(_))));
    }

    #[test]
    fn test_encode_connack_round_trips() {
        let mut buf = BytesMut::new();
        MqttCodec::new(1024)
            .encode(
                Outgoing::ConnAck(ConnAck::new(ConnectReturnCode::BadUserNamePassword, false)),
                &mut buf,
            )
            .unwrap();

        match v4::read(&mut buf, 1024).unwrap() {
            Packet::ConnAck(ack) => assert_eq!(ack.code, ConnectReturnCode::BadUserNamePassword),
            other => panic!("expected connack, got {:?}", other),
        }
    }
}

use bytes::{BufMut, BytesMut};
use domain::{SourceType, StatusCode, Topic, TopicValue, Value, Variant};
use gw_codec::{
    CodecError, LENGTH_PREFIX, MAX_ARRAY_DEPTH, WireCodec, decode, decode_frame, decode_stream,
    encode, encode_into,
};

fn sample_value(variant: Variant) -> Value {
    Value {
        variant,
        status: StatusCode::UNCERTAIN,
        source_time_ms: 1_700_000_000_123,
        server_time_ms: -5,
        source_picoseconds: 12,
        server_picoseconds: u16::MAX,
    }
}

fn all_variants() -> Vec<Variant> {
    vec![
        Variant::Null,
        Variant::Boolean(true),
        Variant::Boolean(false),
        Variant::SByte(i8::MIN),
        Variant::Byte(u8::MAX),
        Variant::Int16(-300),
        Variant::UInt16(60_000),
        Variant::Int32(i32::MIN),
        Variant::UInt32(u32::MAX),
        Variant::Int64(i64::MIN),
        Variant::UInt64(u64::MAX),
        Variant::Float(3.25),
        Variant::Float(f32::NAN),
        Variant::Double(-0.0),
        Variant::Double(f64::INFINITY),
        Variant::String("Grüße, 温度".to_string()),
        Variant::String(String::new()),
        Variant::DateTime(1_700_000_000_000),
        Variant::ByteString(vec![0, 1, 2, 255]),
        Variant::Array(vec![]),
        Variant::Array(vec![
            Variant::Int32(1),
            Variant::String("x".to_string()),
            Variant::Array(vec![Variant::Boolean(false)]),
        ]),
    ]
}

#[test]
fn every_value_variant_round_trips() {
    for variant in all_variants() {
        let value = sample_value(variant);
        let frame = encode(&value).unwrap();
        let decoded: Value = decode(&frame).unwrap();
        assert_eq!(decoded, value);
    }
}

#[test]
fn topics_round_trip() {
    for name in [
        "Opc/dev1/Node/ns=2;s=Demo/Counter",
        "Opc/dev1/Path:Value/$objects/Demo/#",
        "Plc/s7/Node/DB1.DBW0",
        "$SYS/broker/uptime",
        "not/a/known/topic",
    ] {
        let topic = Topic::parse(name);
        let decoded: Topic = decode(&encode(&topic).unwrap()).unwrap();
        assert_eq!(decoded, topic);
        assert_eq!(decoded.topic_type(), topic.topic_type());
        assert_eq!(decoded.address(), topic.address());
    }
}

#[test]
fn compound_pairs_round_trip() {
    let topic_value = TopicValue::new(
        Topic::parse("Opc/dev1/Node/ns=2;s=Demo/Temperature"),
        sample_value(Variant::Double(21.5)),
    );
    let decoded: TopicValue = decode(&encode(&topic_value).unwrap()).unwrap();
    assert_eq!(decoded, topic_value);

    let pair = (
        Topic::new(SourceType::Mqtt, "broker/Path/a/b"),
        Variant::Array(vec![Variant::UInt16(7)]),
    );
    let decoded: (Topic, Variant) = decode(&encode(&pair).unwrap()).unwrap();
    assert_eq!(decoded, pair);
}

#[test]
fn length_prefix_matches_payload() {
    let frame = encode(&sample_value(Variant::String("abc".into()))).unwrap();
    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(declared, frame.len() - LENGTH_PREFIX);
}

#[test]
fn truncated_envelope_is_a_typed_error() {
    let frame = encode(&Topic::parse("Opc/dev1/Node/x")).unwrap();

    for cut in 0..frame.len() {
        let err = decode::<Topic>(&frame[..cut]).unwrap_err();
        assert!(
            matches!(err, CodecError::Truncated { .. }),
            "cut at {cut}: {err:?}"
        );
    }
}

#[test]
fn trailing_bytes_are_ignored() {
    let mut buf = BytesMut::new();
    let value = sample_value(Variant::Int32(42));
    encode_into(&value, &mut buf).unwrap();
    let frame_len = buf.len();
    buf.put_slice(b"garbage");

    let (decoded, used): (Value, usize) = decode_frame(&buf).unwrap();
    assert_eq!(decoded, value);
    assert_eq!(used, frame_len);
}

#[test]
fn concatenated_frames_decode_in_order() {
    let mut buf = BytesMut::new();
    let topics: Vec<Topic> = ["Opc/a/Node/1", "Opc/b/Node/2", "Opc/c/Node/3"]
        .iter()
        .map(|name| Topic::parse(name))
        .collect();
    for topic in &topics {
        encode_into(topic, &mut buf).unwrap();
    }

    let decoded: Vec<Topic> = decode_stream(&buf).unwrap();
    assert_eq!(decoded, topics);
}

#[test]
fn corrupt_payloads_are_rejected() {
    // 未知 variant 标签
    let frame = [0, 0, 0, 1, 99];
    assert_eq!(
        decode::<Variant>(&frame).unwrap_err(),
        CodecError::UnknownTag {
            kind: "variant",
            tag: 99
        }
    );

    // 未知来源类型
    let frame = [0, 0, 0, 5, 9, 0, 0, 0, 0];
    assert!(matches!(
        decode::<Topic>(&frame).unwrap_err(),
        CodecError::UnknownTag { kind: "source type", .. }
    ));

    // 非法 UTF-8
    let frame = [0, 0, 0, 7, 2, 0, 0, 0, 2, 0xff, 0xfe];
    assert_eq!(decode::<Topic>(&frame).unwrap_err(), CodecError::InvalidUtf8);

    // 载荷未用完声明长度
    let frame = [0, 0, 0, 3, 1, 1, 0];
    assert!(matches!(
        decode::<Variant>(&frame).unwrap_err(),
        CodecError::InvalidLength { declared: 3, used: 2, .. }
    ));
}

#[test]
fn absurd_array_counts_do_not_allocate() {
    let mut body = BytesMut::new();
    body.put_u8(15);
    body.put_u32(u32::MAX);
    let mut frame = BytesMut::new();
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);

    assert!(matches!(
        decode::<Variant>(&frame).unwrap_err(),
        CodecError::Truncated { .. }
    ));
}

fn nested(depth: usize) -> Variant {
    let mut variant = Variant::Null;
    for _ in 0..depth {
        variant = Variant::Array(vec![variant]);
    }
    variant
}

#[test]
fn nesting_is_bounded() {
    let deepest = nested(MAX_ARRAY_DEPTH);
    let frame = encode(&deepest).unwrap();
    assert_eq!(decode::<Variant>(&frame).unwrap(), deepest);

    assert_eq!(
        encode(&nested(MAX_ARRAY_DEPTH + 1)).unwrap_err(),
        CodecError::TooDeep(MAX_ARRAY_DEPTH)
    );

    // 手工构造的过深帧同样被拒绝
    let mut body = BytesMut::new();
    for _ in 0..=MAX_ARRAY_DEPTH {
        body.put_u8(15);
        body.put_u32(1);
    }
    body.put_u8(0);
    let mut frame = BytesMut::new();
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    assert_eq!(
        decode::<Variant>(&frame).unwrap_err(),
        CodecError::TooDeep(MAX_ARRAY_DEPTH)
    );
}

#[test]
fn bodies_compose_without_prefixes() {
    let topic = Topic::parse("Opc/dev1/Node/x");
    let mut body = BytesMut::new();
    topic.encode_body(&mut body).unwrap();
    let mut cursor = &body[..];
    assert_eq!(Topic::decode_body(&mut cursor).unwrap(), topic);
    assert!(cursor.is_empty());
}

use serde_json::json;
use xspress_z::{
    Error,
    message::{Message, MessageKind, MsgType, Params, Verb, decode, encode},
};

fn params(value: serde_json::Value) -> Params {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_outbound_messages_survive_the_wire() {
    let mut messages = vec![
        Message::config(params(json!({
            "xsp": {"num_cards": 4, "base_ip": "192.168.0.1"},
            "daq": {"enabled": true, "endpoints": ["tcp://127.0.0.1:15150"]},
        }))),
        Message::request(),
    ];
    messages.extend(Verb::COMMANDS.map(Message::command));

    for (id, msg) in messages.into_iter().enumerate() {
        let msg = msg.with_id(u32::MAX - id as u32);
        let back = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.kind(), msg.verb.kind());
    }
}

#[test]
fn test_command_messages_are_bare() {
    for verb in Verb::COMMANDS {
        let msg = Message::command(verb);
        assert_eq!(msg.kind(), MessageKind::Cmd);
        assert_eq!(msg.msg_type, MsgType::Cmd);
        assert!(msg.params.is_empty());
    }
}

#[test]
fn test_decode_device_reply() {
    let frame = br#"{
        "msg_type": "ack",
        "msg_val": "request_configuration",
        "id": 12,
        "params": {"debug_level": 1, "xsp": {"base_ip": "10.0.0.5", "trigger_mode": 2}},
        "timestamp": "2024-03-01T10:15:00.123456"
    }"#;
    let msg = decode(frame).unwrap();
    assert_eq!(msg.msg_type, MsgType::Ack);
    assert_eq!(msg.verb, Verb::RequestConfiguration);
    assert_eq!(msg.id, 12);
    assert_eq!(msg.params["xsp"]["base_ip"], "10.0.0.5");
}

#[test]
fn test_decode_unknown_verb() {
    let err = decode(br#"{"msg_type": "ack", "msg_val": "explode", "id": 1}"#).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(err.is_client_error());
}

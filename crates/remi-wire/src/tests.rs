//! Tests for the wire message shapes and the JSON codec.

use serde_json::Value;
use serde_json::json;

use crate::Codec;
use crate::Error;
use crate::InvokeMessage;
use crate::JsonCodec;
use crate::Message;
use crate::ReturnFault;
use crate::ReturnMessage;
use crate::Target;
use crate::WireArg;

fn roundtrip(message: Message) -> Message {
    let codec = JsonCodec;
    let text = codec.encode(&message).expect("encode failed");
    codec.decode(&text).expect("decode failed")
}

#[test]
fn test_invoke_roundtrip_bare_method() {
    let message = Message::Invoke(InvokeMessage {
        rmi_id: "local".into(),
        correlation_id: 7,
        target: Target::Method("add".into()),
        args: vec![
            WireArg::Plain { value: json!(2) },
            WireArg::Plain { value: json!(3) },
        ],
        transfer_list: vec![],
    });

    assert_eq!(roundtrip(message.clone()), message);
}

#[test]
fn test_invoke_roundtrip_all_target_forms() {
    let targets = vec![
        Target::Method("m".into()),
        Target::Instance {
            class_id: "Animal".into(),
            instance_id: "i-1".into(),
            method_name: "getType".into(),
        },
        Target::Construct { class_id: "Animal".into() },
        Target::Release { instance_id: "i-1".into() },
    ];

    for target in targets {
        let message = Message::Invoke(InvokeMessage {
            rmi_id: "c".into(),
            correlation_id: 1,
            target: target.clone(),
            args: vec![],
            transfer_list: vec![],
        });
        let Message::Invoke(decoded) = roundtrip(message) else {
            panic!("Expected Invoke");
        };
        assert_eq!(decoded.target, target);
    }
}

#[test]
fn test_invoke_wire_shape_is_camel_case() {
    let message = Message::Invoke(InvokeMessage {
        rmi_id: "local".into(),
        correlation_id: 1,
        target: Target::Instance {
            class_id: "A".into(),
            instance_id: "i".into(),
            method_name: "m".into(),
        },
        args: vec![WireArg::Buffer { value: json!([1, 2]), transfer_id: 9 }],
        transfer_list: vec![9],
    });

    let text = JsonCodec.encode(&message).unwrap();
    let raw: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(raw["type"], "invoke");
    assert_eq!(raw["rmiId"], "local");
    assert_eq!(raw["correlationId"], 1);
    assert_eq!(raw["target"]["classId"], "A");
    assert_eq!(raw["target"]["instanceId"], "i");
    assert_eq!(raw["target"]["methodName"], "m");
    assert_eq!(raw["args"][0]["kind"], "buffer");
    assert_eq!(raw["args"][0]["transferId"], 9);
    assert_eq!(raw["transferList"], json!([9]));
}

#[test]
fn test_bare_method_target_is_a_plain_string() {
    let message = Message::Invoke(InvokeMessage {
        rmi_id: "local".into(),
        correlation_id: 1,
        target: Target::Method("add".into()),
        args: vec![],
        transfer_list: vec![],
    });

    let text = JsonCodec.encode(&message).unwrap();
    let raw: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(raw["target"], "add");
}

#[test]
fn test_return_success_roundtrip() {
    let message = Message::Return(ReturnMessage::success("local", 7, json!("hello")));
    let Message::Return(decoded) = roundtrip(message) else {
        panic!("Expected Return");
    };
    assert!(decoded.ok);
    assert_eq!(decoded.value, Some(json!("hello")));
    assert_eq!(decoded.error, None);
}

#[test]
fn test_return_failure_preserves_message_and_stack() {
    let fault = ReturnFault {
        message: "boom".into(),
        stack: "at line 3\nat line 9".into(),
    };
    let message = Message::Return(ReturnMessage::failure("local", 7, fault.clone()));

    let Message::Return(decoded) = roundtrip(message) else {
        panic!("Expected Return");
    };
    assert!(!decoded.ok);
    assert_eq!(decoded.error, Some(fault));
}

#[test]
fn test_callback_and_instance_args_roundtrip() {
    let args = vec![
        WireArg::Callback { name: "#cb-3".into() },
        WireArg::Instance { class_id: "A".into(), instance_id: "i-9".into() },
    ];
    let message = Message::Invoke(InvokeMessage {
        rmi_id: "c".into(),
        correlation_id: 2,
        target: Target::Method("m".into()),
        args: args.clone(),
        transfer_list: vec![],
    });

    let Message::Invoke(decoded) = roundtrip(message) else {
        panic!("Expected Invoke");
    };
    assert_eq!(decoded.args, args);
}

#[test]
fn test_decode_rejects_malformed_text() {
    let err = JsonCodec.decode("{not json").unwrap_err();
    match err {
        Error::Decode(_) => {}
        other => panic!("Expected Decode error, got {:?}", other),
    }
}

#[test]
fn test_decode_skips_unknown_fields() {
    let text = r#"{
        "type": "return",
        "rmiId": "local",
        "correlationId": 4,
        "ok": true,
        "value": 5,
        "futureField": {"ignored": true}
    }"#;

    let Message::Return(decoded) = JsonCodec.decode(text).unwrap() else {
        panic!("Expected Return");
    };
    assert_eq!(decoded.correlation_id, 4);
    assert_eq!(decoded.value, Some(json!(5)));
}

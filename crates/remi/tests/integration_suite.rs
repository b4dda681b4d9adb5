//! Integration tests for remi channels over an in-process transport pair.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

use remi::Arg;
use remi::Channel;
use remi::ClassShape;
use remi::Error;
use remi::Fault;
use remi::Inbound;
use remi::LocalTransport;
use remi::MethodMetadata;
use remi::ObjectHandle;
use remi::ParamRole;
use remi::ServiceObject;
use remi::Transport;

fn channel_pair(id: &str) -> (Channel, Channel) {
    let (a, b) = LocalTransport::pair();
    (Channel::new(id, Box::new(a)), Channel::new(id, Box::new(b)))
}

/// Polls until `check` passes or the deadline expires.
async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Condition not reached within deadline");
}

// --- Test 1: Method Call Round Trip ---

#[tokio::test]
async fn method_call_round_trip() {
    let (left, right) = channel_pair("math");

    right
        .lmethod("add", |args: Vec<Inbound>| async move {
            let mut it = args.into_iter();
            let a = it
                .next()
                .and_then(|arg| arg.into_value().as_i64())
                .ok_or_else(|| Fault::new("add expects two numbers"))?;
            let b = it
                .next()
                .and_then(|arg| arg.into_value().as_i64())
                .ok_or_else(|| Fault::new("add expects two numbers"))?;
            Ok(json!(a + b))
        })
        .expect("Failed to register add");

    let add = left.rmethod("add").expect("Failed to build stub");
    let sum = add
        .call_values(vec![json!(2), json!(3)])
        .await
        .expect("Call failed");
    assert_eq!(sum, json!(5));
}

// --- Test 2: Remote Error Preserves Message and Stack ---

#[tokio::test]
async fn remote_error_preserves_message_and_stack() {
    let (left, right) = channel_pair("errors");

    let message = "File not found: /data/missing.txt";
    let stack = "Error: File not found: /data/missing.txt\n    at read (storage:10:5)";

    right
        .lmethod("read", move |_args| async move {
            Err(Fault::with_stack(message, stack))
        })
        .expect("Failed to register read");

    let read = left.rmethod("read").expect("Failed to build stub");
    let err = read.call_values(vec![]).await.expect_err("Call should fail");

    match err {
        Error::Remote { message: got_message, stack: got_stack } => {
            assert_eq!(got_message, message);
            assert_eq!(got_stack, stack);
        }
        other => panic!("Expected Remote error, got: {}", other),
    }
}

// --- Test 3: Unknown Targets Answer Instead of Hanging ---

#[tokio::test]
async fn unknown_method_is_rejected() {
    let (left, _right) = channel_pair("missing");

    let stub = left.rmethod("nonexistent").expect("Failed to build stub");
    let err = stub.call_values(vec![]).await.expect_err("Call should fail");

    match err {
        Error::Remote { message, .. } => {
            assert!(message.contains("No local method 'nonexistent'"), "{}", message);
        }
        other => panic!("Expected Remote error, got: {}", other),
    }
}

#[tokio::test]
async fn unknown_class_is_rejected() {
    let (left, _right) = channel_pair("missing-class");

    let class = left
        .rclass(ClassShape::new("Phantom"))
        .expect("Failed to build class proxy");
    let err = class.construct(vec![]).await.expect_err("Construct should fail");

    match err {
        Error::Remote { message, .. } => {
            assert!(message.contains("No local class 'Phantom'"), "{}", message);
        }
        other => panic!("Expected Remote error, got: {}", other),
    }
}

// --- Test 4: Remote Class Lifecycle ---

struct Counter {
    value: Mutex<i64>,
}

#[async_trait::async_trait]
impl ServiceObject for Counter {
    async fn call(&self, method: &str, _args: Vec<Inbound>) -> Result<Value, Fault> {
        let mut value = self
            .value
            .lock()
            .map_err(|_| Fault::new("Counter lock poisoned"))?;
        match method {
            "increment" => {
                *value += 1;
                Ok(json!(*value))
            }
            "value" => Ok(json!(*value)),
            other => Err(Fault::new(format!("Counter has no method '{}'", other))),
        }
    }
}

#[tokio::test]
async fn class_construct_invoke_release() {
    let (left, right) = channel_pair("counters");

    right
        .lclass("Counter", |args: Vec<Inbound>| {
            let start = args
                .into_iter()
                .next()
                .and_then(|arg| arg.into_value().as_i64())
                .unwrap_or(0);
            Ok(Arc::new(Counter { value: Mutex::new(start) }) as Arc<dyn ServiceObject>)
        })
        .expect("Failed to register class");

    let class = left
        .rclass(
            ClassShape::new("Counter")
                .ctor_roles([ParamRole::Serializable])
                .method("increment")
                .method("value"),
        )
        .expect("Failed to build class proxy");

    let counter = class
        .construct(vec![Arg::Value(json!(10))])
        .await
        .expect("Construct failed");
    assert_eq!(counter.class_id(), "Counter");

    assert_eq!(counter.invoke_values("increment", vec![]).await.unwrap(), json!(11));
    assert_eq!(counter.invoke_values("increment", vec![]).await.unwrap(), json!(12));
    assert_eq!(counter.invoke_values("value", vec![]).await.unwrap(), json!(12));

    // Undeclared methods are rejected by the instance itself.
    let err = counter
        .invoke_values("reset", vec![])
        .await
        .expect_err("Unknown method should fail");
    assert!(matches!(err, Error::Remote { .. }));

    let released = left.release(&counter).await.expect("Release failed");
    assert!(released);

    // The instance is gone on the peer; its proxy is dead here.
    let err = counter
        .invoke_values("value", vec![])
        .await
        .expect_err("Invoke after release should fail");
    assert!(matches!(err, Error::Remote { .. }));

    let err = left
        .release(&counter)
        .await
        .expect_err("Second release should fail");
    assert!(matches!(err, Error::InvalidReleaseTarget(_)));
}

#[tokio::test]
async fn release_rejects_foreign_instance() {
    let (left_a, right_a) = channel_pair("arena-a");
    let (left_b, _right_b) = channel_pair("arena-b");

    right_a
        .lclass("Counter", |_args| {
            Ok(Arc::new(Counter { value: Mutex::new(0) }) as Arc<dyn ServiceObject>)
        })
        .expect("Failed to register class");

    let class = left_a
        .rclass(ClassShape::new("Counter"))
        .expect("Failed to build class proxy");
    let counter = class.construct(vec![]).await.expect("Construct failed");

    // A proxy from channel A is not releasable through channel B.
    let err = left_b
        .release(&counter)
        .await
        .expect_err("Cross-channel release should fail");
    assert!(matches!(err, Error::InvalidReleaseTarget(_)));
}

// --- Test 5: Callback Fan-Out Preserves Order ---

#[tokio::test]
async fn callbacks_forward_in_order() {
    let (left, right) = channel_pair("progress");

    right
        .lmethod("process", |args: Vec<Inbound>| async move {
            let mut it = args.into_iter();
            let steps = it
                .next()
                .and_then(|arg| arg.into_value().as_i64())
                .ok_or_else(|| Fault::new("process expects a step count"))?;
            let on_progress = it
                .next()
                .and_then(Inbound::into_callback)
                .ok_or_else(|| Fault::new("process expects a progress callback"))?;

            for step in 0..steps {
                on_progress.call(vec![Arg::Value(json!(step))]).await;
            }
            Ok(json!("done"))
        })
        .expect("Failed to register process");

    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let process = left
        .rmethod_with(MethodMetadata::with_roles(
            "process",
            [ParamRole::Serializable, ParamRole::Callback],
        ))
        .expect("Failed to build stub");

    let outcome = process
        .call(vec![
            Arg::Value(json!(5)),
            Arg::Callback(Arc::new(move |values: Vec<Value>| {
                if let Some(step) = values.first().and_then(Value::as_i64) {
                    sink.lock().unwrap().push(step);
                }
            })),
        ])
        .await
        .expect("Call failed");
    assert_eq!(outcome, json!("done"));

    // Forwarded invocations are fire-and-forget; wait for the last one.
    let watch = Arc::clone(&seen);
    wait_until(move || watch.lock().unwrap().len() == 5).await;
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn callbacks_forward_in_order_across_worker_threads() {
    let (left, right) = channel_pair("progress-mt");

    right
        .lmethod("process", |args: Vec<Inbound>| async move {
            let mut it = args.into_iter();
            let steps = it
                .next()
                .and_then(|arg| arg.into_value().as_i64())
                .ok_or_else(|| Fault::new("process expects a step count"))?;
            let on_progress = it
                .next()
                .and_then(Inbound::into_callback)
                .ok_or_else(|| Fault::new("process expects a progress callback"))?;

            for step in 0..steps {
                on_progress.call(vec![Arg::Value(json!(step))]).await;
            }
            Ok(json!("done"))
        })
        .expect("Failed to register process");

    let steps: i64 = 500;
    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let process = left
        .rmethod_with(MethodMetadata::with_roles(
            "process",
            [ParamRole::Serializable, ParamRole::Callback],
        ))
        .expect("Failed to build stub");

    process
        .call(vec![
            Arg::Value(json!(steps)),
            Arg::Callback(Arc::new(move |values: Vec<Value>| {
                if let Some(step) = values.first().and_then(Value::as_i64) {
                    sink.lock().unwrap().push(step);
                }
            })),
        ])
        .await
        .expect("Call failed");

    let watch = Arc::clone(&seen);
    wait_until(move || watch.lock().unwrap().len() == steps as usize).await;
    let delivered = seen.lock().unwrap().clone();
    let expected: Vec<i64> = (0..steps).collect();
    assert_eq!(delivered, expected, "Callbacks delivered out of order");
}

// --- Test 6: Object Identity Survives the Round Trip ---

type SessionSlot = Arc<Mutex<Option<Arc<dyn ServiceObject>>>>;

struct Session;

#[async_trait::async_trait]
impl ServiceObject for Session {
    async fn call(&self, _method: &str, _args: Vec<Inbound>) -> Result<Value, Fault> {
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn instance_returning_home_short_circuits_to_original() {
    let (left, right) = channel_pair("sessions");

    let constructed: SessionSlot = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&constructed);

    right
        .lclass("Session", move |_args| {
            let object: Arc<dyn ServiceObject> = Arc::new(Session);
            *slot.lock().unwrap() = Some(Arc::clone(&object));
            Ok(object)
        })
        .expect("Failed to register class");

    let check_slot = Arc::clone(&constructed);
    right
        .lmethod("is-original", move |args: Vec<Inbound>| {
            let check_slot = Arc::clone(&check_slot);
            async move {
                let handle = args
                    .into_iter()
                    .next()
                    .and_then(Inbound::into_object)
                    .ok_or_else(|| Fault::new("is-original expects an instance"))?;
                // An instance owned by this side must arrive as the original
                // object, never as a proxy.
                let ObjectHandle::Local(object) = handle else {
                    return Ok(json!(false));
                };
                let guard = check_slot.lock().unwrap();
                let original = guard.as_ref().ok_or_else(|| Fault::new("Nothing constructed"))?;
                Ok(json!(Arc::ptr_eq(&object, original)))
            }
        })
        .expect("Failed to register is-original");

    let class = left
        .rclass(ClassShape::new("Session"))
        .expect("Failed to build class proxy");
    let session = class.construct(vec![]).await.expect("Construct failed");

    let is_original = left
        .rmethod_with(MethodMetadata::with_roles("is-original", [ParamRole::RemoteObject]))
        .expect("Failed to build stub");
    let verdict = is_original
        .call(vec![Arg::Object(ObjectHandle::Remote(session.clone()))])
        .await
        .expect("Call failed");
    assert_eq!(verdict, json!(true));
}

#[tokio::test]
async fn exported_instance_resolves_to_existing_proxy() {
    let (left, right) = channel_pair("mirrors");

    let constructed: SessionSlot = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&constructed);

    right
        .lclass("Session", move |_args| {
            let object: Arc<dyn ServiceObject> = Arc::new(Session);
            *slot.lock().unwrap() = Some(Arc::clone(&object));
            Ok(object)
        })
        .expect("Failed to register class");

    // The left side reports the instance id of whatever proxy it receives.
    left.lmethod("reflect", |args: Vec<Inbound>| async move {
        let handle = args
            .into_iter()
            .next()
            .and_then(Inbound::into_object)
            .ok_or_else(|| Fault::new("reflect expects an instance"))?;
        match handle {
            ObjectHandle::Remote(instance) => Ok(json!(instance.instance_id())),
            ObjectHandle::Local(_) => Err(Fault::new("Expected a proxy, got a local object")),
        }
    })
    .expect("Failed to register reflect");

    let class = left
        .rclass(ClassShape::new("Session"))
        .expect("Failed to build class proxy");
    let session = class.construct(vec![]).await.expect("Construct failed");

    // The right side sends its exported original back across; the left
    // side must see the proxy it already holds, by instance id.
    let reflect = right
        .rmethod_with(MethodMetadata::with_roles("reflect", [ParamRole::RemoteObject]))
        .expect("Failed to build stub");
    let original = constructed.lock().unwrap().clone().expect("Nothing constructed");
    let reflected = reflect
        .call(vec![Arg::Object(ObjectHandle::Local(original))])
        .await
        .expect("Call failed");
    assert_eq!(reflected, json!(session.instance_id()));
}

// --- Test 7: Transferable Arguments Arrive as Values ---

#[tokio::test]
async fn transferable_argument_round_trip() {
    let (left, right) = channel_pair("buffers");

    right
        .lmethod("consume", |args: Vec<Inbound>| async move {
            let value = args
                .into_iter()
                .next()
                .map(Inbound::into_value)
                .ok_or_else(|| Fault::new("consume expects a buffer"))?;
            Ok(value)
        })
        .expect("Failed to register consume");

    let consume = left
        .rmethod_with(MethodMetadata::with_roles("consume", [ParamRole::Transferable]))
        .expect("Failed to build stub");
    let echoed = consume
        .call(vec![Arg::Buffer { value: json!([1, 2, 3]), transfer: 7 }])
        .await
        .expect("Call failed");
    assert_eq!(echoed, json!([1, 2, 3]));
}

// --- Test 8: Correlation, Not Order, Pairs Returns ---

#[tokio::test]
async fn concurrent_calls_resolve_independently() {
    let (left, right) = channel_pair("mixed");

    right
        .lmethod("slow", |_args| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!("slow"))
        })
        .expect("Failed to register slow");
    right
        .lmethod("fast", |_args| async { Ok(json!("fast")) })
        .expect("Failed to register fast");

    let slow = left.rmethod("slow").expect("Failed to build stub");
    let fast = left.rmethod("fast").expect("Failed to build stub");

    let (slow_result, fast_result) =
        tokio::join!(slow.call_values(vec![]), fast.call_values(vec![]));
    assert_eq!(slow_result.expect("slow failed"), json!("slow"));
    assert_eq!(fast_result.expect("fast failed"), json!("fast"));
}

// --- Test 9: Foreign Channel Traffic Is Ignored ---

#[tokio::test]
async fn messages_for_other_channels_are_ignored() {
    let (transport, far_end) = LocalTransport::pair();
    let left = Channel::new("alpha", Box::new(transport));

    // A hand-rolled peer: answers first with a reply addressed to another
    // channel, then with the real one. Only the real one may resolve.
    let responder = tokio::spawn(async move {
        let text = far_end
            .recv()
            .await
            .expect("recv failed")
            .expect("Stream ended early");
        let invoke: Value = serde_json::from_str(&text).expect("Invalid invoke");
        let correlation_id = invoke["correlationId"].as_u64().expect("Missing correlation");

        let foreign = json!({
            "type": "return",
            "rmiId": "beta",
            "correlationId": correlation_id,
            "ok": true,
            "value": 999,
        });
        far_end.send(&foreign.to_string(), &[]).await.expect("send failed");

        let genuine = json!({
            "type": "return",
            "rmiId": "alpha",
            "correlationId": correlation_id,
            "ok": true,
            "value": 42,
        });
        far_end.send(&genuine.to_string(), &[]).await.expect("send failed");
    });

    let ask = left.rmethod("ask").expect("Failed to build stub");
    let answer = ask.call_values(vec![]).await.expect("Call failed");
    assert_eq!(answer, json!(42));

    responder.await.expect("Responder panicked");
}

// --- Test 10: Destruction Rejects Everything In Flight ---

#[tokio::test]
async fn destroy_rejects_pending_calls() {
    let (transport, _far_end) = LocalTransport::pair();
    let left = Channel::new("omega", Box::new(transport));

    // No peer will ever answer this.
    let stub = left.rmethod("forever").expect("Failed to build stub");
    let pending = tokio::spawn(async move { stub.call_values(vec![]).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    left.destroy();

    let outcome = pending.await.expect("Task panicked");
    assert!(matches!(outcome, Err(Error::ChannelClosed)));

    let err = left.rmethod("after").expect_err("Stub after destroy should fail");
    assert!(matches!(err, Error::ChannelClosed));
}

// --- Test 11: Peer Destruction Ends the Conversation ---

#[tokio::test]
async fn peer_destruction_fails_outstanding_calls() {
    let (left, right) = channel_pair("farewell");

    right
        .lmethod("ping", |_args| async { Ok(json!("pong")) })
        .expect("Failed to register ping");

    let ping = left.rmethod("ping").expect("Failed to build stub");
    assert_eq!(ping.call_values(vec![]).await.expect("Call failed"), json!("pong"));

    drop(right);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The peer and its transport are gone; new calls cannot complete.
    let err = ping.call_values(vec![]).await.expect_err("Call should fail");
    assert!(matches!(err, Error::ChannelClosed | Error::Transport(_)));
}

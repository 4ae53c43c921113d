// tests/integration/session_test.rs

//! Integration tests for the session lifecycle and the engine event loop
//! Tests: malformed requests, DISCONNECT, STAT, idle timeout, client ceiling, engine events

use super::test_helpers::*;
use bytes::Bytes;
use harrier::core::BrokerError;
use harrier::core::broker::{Broker, BrokerSettings};
use harrier::core::acl::{AuthenticatedUser, Permissions};
use harrier::core::engine::{Engine, EngineEvent, EngineOptions};
use harrier::core::protocol::{BodyReader, BodyWriter, CommandId, Request, Status};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[tokio::test]
async fn test_malformed_body_closes_session_without_reply() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();

    // A name length byte of 10 with only 3 bytes behind it.
    let reply = ctx.request(s, CommandId::QueueDeclare, Bytes::from_static(b"\x0aabc"));
    assert!(reply.is_none());
    assert!(ctx.is_closed(s));
    assert!(ctx.broker.session(s).is_none());
}

#[tokio::test]
async fn test_trailing_bytes_close_session() {
    let mut ctx = TestContext::new();
    let s = ctx.connect();
    let reply = ctx.request(s, CommandId::Ping, Bytes::from_static(b"extra"));
    assert!(reply.is_none());
    assert!(ctx.is_closed(s));
}

#[tokio::test]
async fn test_disconnect_replies_then_closes() {
    let mut ctx = TestContext::new();
    let s = ctx.connect();
    let reply = ctx.exec(s, CommandId::Disconnect, |_| {});
    assert_ok(&reply);
    assert!(ctx.is_closed(s));
    assert_eq!(ctx.broker.session_count(), 0);
}

#[tokio::test]
async fn test_stat_reports_broker_figures() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.queue_create(s, "a", 0, 0, 0));
    assert_ok(&ctx.route_create(s, "r", 0));
    ctx.advance(Duration::from_secs(3));

    let reply = ctx.exec(s, CommandId::Stat, |_| {});
    assert_ok(&reply);
    let mut r = BodyReader::new(reply.body);
    assert_eq!(r.read_string().unwrap(), env!("CARGO_PKG_VERSION"));
    assert!(r.read_u64().unwrap() >= 3); // uptime
    assert!(r.read_u64().unwrap() > 0); // used memory
    assert_eq!(r.read_u32().unwrap(), 1); // clients
    assert_eq!(r.read_u32().unwrap(), 1); // users
    assert_eq!(r.read_u32().unwrap(), 1); // queues
    assert_eq!(r.read_u32().unwrap(), 1); // routes
    assert_eq!(r.read_u32().unwrap(), 0); // channels
    assert_eq!(r.read_u64().unwrap(), 0); // last save
    assert_eq!(r.read_u64().unwrap(), 4); // auth, create, create, stat
    r.finish().unwrap();
}

#[tokio::test]
async fn test_idle_sessions_are_closed() {
    let mut settings = test_settings();
    settings.client_timeout = Duration::from_secs(10);
    let mut ctx = TestContext::with_settings(settings);
    let idle = ctx.connect();
    let busy = ctx.connect();

    ctx.advance(Duration::from_secs(8));
    assert_ok(&ctx.exec(busy, CommandId::Ping, |_| {}));
    ctx.advance(Duration::from_secs(3));

    let closed = ctx.broker.close_idle_sessions(ctx.now);
    assert_eq!(closed, vec![idle]);
    assert!(ctx.is_closed(idle));
    assert!(!ctx.is_closed(busy));
}

#[tokio::test]
async fn test_zero_client_timeout_disables_idle_check() {
    let mut ctx = TestContext::new();
    let s = ctx.connect();
    ctx.advance(Duration::from_secs(3600));
    assert!(ctx.broker.close_idle_sessions(ctx.now).is_empty());
    assert!(!ctx.is_closed(s));
}

#[tokio::test]
async fn test_client_ceiling_refuses_new_sessions() {
    let settings = BrokerSettings {
        max_clients: 1,
        ..test_settings()
    };
    let mut broker = Broker::new(settings);
    let now = Instant::now();

    let (tx1, _rx1) = mpsc::unbounded_channel();
    broker.register_session(1, "a".into(), tx1, now).unwrap();

    let (tx2, mut rx2) = mpsc::unbounded_channel();
    let err = broker.register_session(2, "b".into(), tx2, now).unwrap_err();
    assert!(matches!(err, BrokerError::TooManyClients));
    // The refused sender was dropped, so the connection sees a closed channel.
    assert!(rx2.recv().await.is_none());

    broker.remove_session(1);
    let (tx3, _rx3) = mpsc::unbounded_channel();
    assert!(broker.register_session(3, "c".into(), tx3, now).is_ok());
}

#[tokio::test]
async fn test_engine_applies_events_in_order() {
    let mut broker = Broker::new(test_settings());
    broker.ensure_admin().unwrap();
    let (mut engine, handle) = Engine::new(broker, EngineOptions::default());
    let now = Instant::now();

    let id = handle.next_session_id();
    assert_eq!(id, 1);
    assert_eq!(handle.next_session_id(), 2);

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.handle_event(
        EngineEvent::Connect {
            id,
            addr: "127.0.0.1:5000".into(),
            outbound: tx,
        },
        now,
    );
    assert_eq!(engine.broker().session_count(), 1);

    engine.handle_event(
        EngineEvent::Request {
            id,
            request: Request::new(CommandId::Ping, Bytes::new()),
        },
        now,
    );
    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.command, CommandId::Ping);
    assert_eq!(reply.status, Status::Ok);

    engine.handle_event(EngineEvent::Disconnect { id }, now);
    assert_eq!(engine.broker().session_count(), 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_engine_tick_sweeps_queues() {
    let mut broker = Broker::new(test_settings());
    let now = Instant::now();
    broker.queue_create("jobs", 0, 0, 0).unwrap();
    broker
        .queue_push("jobs", 10, Bytes::from_static(b"x"), now)
        .unwrap();
    let (mut engine, _handle) = Engine::new(broker, EngineOptions::default());

    engine.tick(now + Duration::from_millis(20));
    assert_eq!(engine.broker().queue_size("jobs").unwrap(), 0);
}

#[tokio::test]
async fn test_engine_run_stops_on_shutdown_signal() {
    let broker = Broker::new(test_settings());
    let (engine, handle) = Engine::new(broker, EngineOptions::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let task = tokio::spawn(engine.run(shutdown_rx));
    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), task).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
    // Events sent after the engine stopped are reported as undeliverable.
    assert!(!handle.send(EngineEvent::Disconnect { id: 1 }));
}

#[tokio::test]
async fn test_engine_timers_run_while_events_are_queued() {
    let mut broker = Broker::new(test_settings());
    let now = Instant::now();
    broker.queue_create("jobs", 0, 0, 0).unwrap();
    broker
        .queue_push("jobs", 5, Bytes::from_static(b"short-lived"), now)
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.register_session(1, "backlog".into(), tx, now).unwrap();
    broker.session_mut(1).unwrap().auth = Some(AuthenticatedUser {
        name: "backlog".into(),
        permissions: Permissions::all(),
    });

    let (engine, handle) = Engine::new(broker, EngineOptions::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(engine.run(shutdown_rx));
    // Let the engine start its timers and park on an empty event channel.
    tokio::task::yield_now().await;

    for _ in 0..1000 {
        handle.send(EngineEvent::Request {
            id: 1,
            request: Request::new(CommandId::Ping, Bytes::new()),
        });
    }
    let mut body = BodyWriter::new();
    body.put_name("jobs");
    handle.send(EngineEvent::Request {
        id: 1,
        request: Request::new(CommandId::QueueSize, body.freeze()),
    });

    // Block the runtime past the maintenance interval so the sweep and the backlog are
    // both ready when the engine next runs.
    std::thread::sleep(Duration::from_millis(1100));

    let mut size_reply = None;
    while size_reply.is_none() {
        let reply = rx.recv().await.unwrap();
        if reply.command == CommandId::QueueSize {
            size_reply = Some(reply);
        }
    }
    let reply = size_reply.unwrap();
    assert_eq!(reply.status, Status::Ok);
    let mut r = BodyReader::new(reply.body);
    assert_eq!(r.read_u32().unwrap(), 0, "expiry sweep must run ahead of the backlog");

    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
}

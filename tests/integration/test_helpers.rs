// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use harrier::core::broker::{Broker, BrokerSettings};
use harrier::core::handler::dispatch;
use harrier::core::protocol::{BodyReader, BodyWriter, CommandId, ErrorTag, Request, Response, Status};
use harrier::core::session::SessionId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "secret";

/// A connected test client: the receiving end of its session's outbound channel and
/// the server-initiated events collected so far.
struct Client {
    rx: mpsc::UnboundedReceiver<Response>,
    events: VecDeque<Response>,
    closed: bool,
}

/// TestContext provides a broker driven directly through the command dispatcher,
/// with a manually advanced clock.
pub struct TestContext {
    pub broker: Broker,
    pub now: Instant,
    clients: HashMap<SessionId, Client>,
    next_session: SessionId,
}

impl TestContext {
    /// Creates a broker with the administrator account in place.
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    /// Creates a broker with custom settings and the administrator account in place.
    pub fn with_settings(settings: BrokerSettings) -> Self {
        let mut ctx = Self::bare(settings);
        ctx.broker.ensure_admin().expect("failed to create the administrator");
        ctx
    }

    /// Creates a broker without any users. Cheap enough for property tests.
    pub fn bare(settings: BrokerSettings) -> Self {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();

        Self {
            broker: Broker::new(settings),
            now: Instant::now(),
            clients: HashMap::new(),
            next_session: 1,
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Registers a new session and returns its id.
    pub fn connect(&mut self) -> SessionId {
        let id = self.next_session;
        self.next_session += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.broker
            .register_session(id, format!("127.0.0.1:{}", 40000 + id), tx, self.now)
            .expect("session refused");
        self.clients.insert(
            id,
            Client {
                rx,
                events: VecDeque::new(),
                closed: false,
            },
        );
        id
    }

    /// Registers a session and authenticates it as the administrator.
    pub fn connect_admin(&mut self) -> SessionId {
        let id = self.connect();
        let reply = self.auth(id, ADMIN_NAME, ADMIN_PASSWORD, 0);
        assert_ok(&reply);
        id
    }

    pub fn disconnect(&mut self, session: SessionId) {
        self.broker.remove_session(session);
    }

    /// Sends a raw request through the dispatcher and returns the reply, if any.
    /// Events queued for the session along the way are kept for [`TestContext::events`].
    pub fn request(&mut self, session: SessionId, command: CommandId, body: Bytes) -> Option<Response> {
        dispatch(&mut self.broker, session, Request::new(command, body), self.now);
        self.drain(session);
        let client = self.clients.get_mut(&session)?;
        let pos = client.events.iter().rposition(|r| r.status != Status::Event)?;
        client.events.remove(pos)
    }

    /// Builds the request body with `build` and sends it, expecting a reply.
    pub fn exec(
        &mut self,
        session: SessionId,
        command: CommandId,
        build: impl FnOnce(&mut BodyWriter),
    ) -> Response {
        let mut w = BodyWriter::new();
        build(&mut w);
        self.request(session, command, w.freeze())
            .unwrap_or_else(|| panic!("no reply to {command}"))
    }

    /// Takes every event delivered to `session` so far.
    pub fn events(&mut self, session: SessionId) -> Vec<Response> {
        self.drain(session);
        self.clients
            .get_mut(&session)
            .map(|c| c.events.drain(..).collect())
            .unwrap_or_default()
    }

    /// True once the engine has dropped the session's outbound channel.
    pub fn is_closed(&mut self, session: SessionId) -> bool {
        self.drain(session);
        self.clients.get(&session).is_none_or(|c| c.closed)
    }

    fn drain(&mut self, session: SessionId) {
        let Some(client) = self.clients.get_mut(&session) else {
            return;
        };
        loop {
            match client.rx.try_recv() {
                Ok(frame) => client.events.push_back(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    client.closed = true;
                    break;
                }
            }
        }
    }

    // --- Command helpers ---

    pub fn auth(&mut self, s: SessionId, name: &str, password: &str, flags: u8) -> Response {
        self.exec(s, CommandId::Auth, |w| {
            w.put_name(name).put_string(password).put_u8(flags);
        })
    }

    pub fn user_create(&mut self, s: SessionId, name: &str, password: &str, perms: u64) -> Response {
        self.exec(s, CommandId::UserCreate, |w| {
            w.put_name(name).put_string(password).put_u64(perms);
        })
    }

    pub fn queue_create(&mut self, s: SessionId, name: &str, max_msg: u32, max_size: u32, flags: u32) -> Response {
        self.exec(s, CommandId::QueueCreate, |w| {
            w.put_name(name).put_u32(max_msg).put_u32(max_size).put_u32(flags);
        })
    }

    pub fn queue_declare(&mut self, s: SessionId, name: &str) -> Response {
        self.exec(s, CommandId::QueueDeclare, |w| {
            w.put_name(name);
        })
    }

    pub fn queue_push(&mut self, s: SessionId, name: &str, expire_ms: u32, payload: &[u8]) -> Response {
        self.exec(s, CommandId::QueuePush, |w| {
            w.put_name(name).put_u32(expire_ms).put_blob(payload);
        })
    }

    pub fn queue_get(&mut self, s: SessionId, name: &str) -> Response {
        self.exec(s, CommandId::QueueGet, |w| {
            w.put_name(name);
        })
    }

    pub fn queue_pop(&mut self, s: SessionId, name: &str) -> Response {
        self.exec(s, CommandId::QueuePop, |w| {
            w.put_name(name);
        })
    }

    pub fn queue_confirm(&mut self, s: SessionId, name: &str, tag: u64) -> Response {
        self.exec(s, CommandId::QueueConfirm, |w| {
            w.put_name(name).put_u64(tag);
        })
    }

    pub fn queue_size(&mut self, s: SessionId, name: &str) -> u32 {
        let reply = self.exec(s, CommandId::QueueSize, |w| {
            w.put_name(name);
        });
        assert_ok(&reply);
        BodyReader::new(reply.body).read_u32().expect("size")
    }

    pub fn queue_subscribe(&mut self, s: SessionId, name: &str, mode: u8) -> Response {
        self.exec(s, CommandId::QueueSubscribe, |w| {
            w.put_name(name).put_u8(mode);
        })
    }

    pub fn route_create(&mut self, s: SessionId, name: &str, flags: u32) -> Response {
        self.exec(s, CommandId::RouteCreate, |w| {
            w.put_name(name).put_u32(flags);
        })
    }

    pub fn route_bind(&mut self, s: SessionId, route: &str, queue: &str, key: &str) -> Response {
        self.exec(s, CommandId::RouteBind, |w| {
            w.put_name(route).put_name(queue).put_string(key);
        })
    }

    pub fn route_unbind(&mut self, s: SessionId, route: &str, queue: &str, key: &str) -> Response {
        self.exec(s, CommandId::RouteUnbind, |w| {
            w.put_name(route).put_name(queue).put_string(key);
        })
    }

    pub fn route_push(&mut self, s: SessionId, route: &str, key: &str, payload: &[u8]) -> Response {
        self.exec(s, CommandId::RoutePush, |w| {
            w.put_name(route).put_string(key).put_u32(0).put_blob(payload);
        })
    }

    pub fn channel_create(&mut self, s: SessionId, name: &str, flags: u32) -> Response {
        self.exec(s, CommandId::ChannelCreate, |w| {
            w.put_name(name).put_u32(flags);
        })
    }

    pub fn channel_subscribe(&mut self, s: SessionId, name: &str, topic: &str) -> Response {
        self.exec(s, CommandId::ChannelSubscribe, |w| {
            w.put_name(name).put_string(topic);
        })
    }

    pub fn channel_psubscribe(&mut self, s: SessionId, name: &str, pattern: &str) -> Response {
        self.exec(s, CommandId::ChannelPSubscribe, |w| {
            w.put_name(name).put_string(pattern);
        })
    }

    pub fn channel_publish(&mut self, s: SessionId, name: &str, topic: &str, payload: &[u8]) -> Response {
        self.exec(s, CommandId::ChannelPublish, |w| {
            w.put_name(name).put_string(topic).put_blob(payload);
        })
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn test_settings() -> BrokerSettings {
    BrokerSettings {
        admin_name: ADMIN_NAME.to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        confirm_timeout: Duration::from_secs(5),
        ..BrokerSettings::default()
    }
}

#[track_caller]
pub fn assert_ok(reply: &Response) {
    assert_eq!(
        reply.status,
        Status::Ok,
        "expected OK for {}, got {:?}",
        reply.command,
        error_text(reply)
    );
}

#[track_caller]
pub fn assert_err(reply: &Response, tag: ErrorTag) {
    assert_eq!(reply.status, Status::Err, "expected ERR for {}", reply.command);
    assert_eq!(error_tag(reply), Some(tag), "unexpected error: {:?}", error_text(reply));
}

pub fn error_tag(reply: &Response) -> Option<ErrorTag> {
    reply.body.first().and_then(|b| ErrorTag::from_repr(*b))
}

pub fn error_text(reply: &Response) -> Option<String> {
    if reply.status != Status::Err {
        return None;
    }
    let mut r = BodyReader::new(reply.body.clone());
    r.read_u8().ok()?;
    r.read_string().ok()
}

/// Decodes a `queue_get` reply into its tag and payload.
pub fn get_reply(reply: &Response) -> (u64, Bytes) {
    assert_ok(reply);
    let mut r = BodyReader::new(reply.body.clone());
    let tag = r.read_u64().expect("tag");
    let payload = r.read_blob().expect("payload");
    (tag, payload)
}

/// Decodes a `queue_pop` reply into its payload.
pub fn pop_reply(reply: &Response) -> Bytes {
    assert_ok(reply);
    BodyReader::new(reply.body.clone()).read_blob().expect("payload")
}

/// Decodes a queue message event into the queue name, tag and payload.
pub fn queue_message_event(event: &Response) -> (String, u64, Bytes) {
    assert_eq!(event.status, Status::Event);
    let mut r = BodyReader::new(event.body.clone());
    assert_eq!(r.read_u8().expect("kind"), 1, "not a message event");
    (
        r.read_name().expect("queue"),
        r.read_u64().expect("tag"),
        r.read_blob().expect("payload"),
    )
}

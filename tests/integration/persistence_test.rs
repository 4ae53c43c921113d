// tests/integration/persistence_test.rs

//! Integration tests for snapshot persistence
//! Tests: SAVE (inline and background), load and restore, corruption handling, final save

use super::test_helpers::*;
use bytes::Bytes;
use harrier::core::BrokerError;
use harrier::core::broker::{Broker, BrokerSettings};
use harrier::core::engine::{Engine, EngineOptions};
use harrier::core::persistence::snapshot::{MessageRecord, QueueRecord, RouteRecord};
use harrier::core::persistence::{Snapshot, load_snapshot, save_blocking};
use harrier::core::protocol::{CommandId, ErrorTag};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::time::Instant;

fn settings_in(dir: &TempDir) -> BrokerSettings {
    BrokerSettings {
        storage_path: dir
            .path()
            .join("harrier.dat")
            .to_string_lossy()
            .into_owned(),
        ..test_settings()
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

fn message(payload: &'static [u8], expires_at_ms: u64) -> MessageRecord {
    MessageRecord {
        payload: Bytes::from_static(payload),
        retried: false,
        expires_at_ms,
    }
}

fn payloads(broker: &Broker, queue: &str) -> Vec<Bytes> {
    broker
        .queues
        .by_name(queue)
        .unwrap()
        .pending()
        .map(|m| m.payload.clone())
        .collect()
}

async fn wait_for_background_save(broker: &Broker) {
    for _ in 0..500 {
        if !broker.persistence.is_saving() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background save did not finish");
}

#[tokio::test]
async fn test_save_and_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut ctx = TestContext::with_settings(settings_in(&dir));
    let s = ctx.connect_admin();
    assert_ok(&ctx.user_create(s, "worker", "pw", 3));
    assert_ok(&ctx.queue_create(s, "jobs", 10, 64, 0));
    assert_ok(&ctx.queue_create(s, "audit", 0, 0, 0));
    assert_ok(&ctx.queue_declare(s, "jobs"));
    assert_ok(&ctx.queue_push(s, "jobs", 0, b"first"));
    assert_ok(&ctx.queue_push(s, "jobs", 0, b"second"));
    assert_ok(&ctx.queue_push(s, "jobs", 0, b"third"));
    // `first` is held unconfirmed at save time.
    let (_, held) = get_reply(&ctx.queue_get(s, "jobs"));
    assert_eq!(held, "first");
    assert_ok(&ctx.route_create(s, "events", 0));
    assert_ok(&ctx.route_bind(s, "events", "audit", "k"));
    assert_ok(&ctx.channel_create(s, "news", 0));

    let reply = ctx.exec(s, CommandId::Save, |w| {
        w.put_u8(0);
    });
    assert_ok(&reply);
    assert_eq!(ctx.broker.persistence.dirty(), 0);
    assert!(ctx.broker.persistence.last_save() > 0);

    let mut restored = TestContext::bare(settings_in(&dir));
    let snapshot = load_snapshot(&restored.broker.settings.storage_path)
        .unwrap()
        .expect("snapshot should exist");
    let now = restored.now;
    snapshot.restore_into(&mut restored.broker, now).unwrap();

    assert_eq!(
        payloads(&restored.broker, "jobs"),
        vec!["first", "second", "third"]
    );
    let jobs = restored.broker.queues.by_name("jobs").unwrap();
    assert_eq!((jobs.max_msg, jobs.max_msg_size), (10, 64));
    assert_eq!(jobs.unconfirmed_len(), 0);
    assert_eq!(
        restored.broker.route_keys("events").unwrap(),
        vec![("k".to_string(), vec!["audit".to_string()])]
    );
    assert!(restored.broker.channel_exist("news"));

    let c = restored.connect();
    assert_ok(&restored.auth(c, "worker", "pw", 0));
    let admin = restored.connect();
    assert_ok(&restored.auth(admin, ADMIN_NAME, ADMIN_PASSWORD, 0));
}

#[tokio::test]
async fn test_expired_messages_are_skipped_on_restore() {
    let now_ms = unix_ms();
    let snapshot = Snapshot {
        created_at: now_ms / 1000,
        queues: vec![QueueRecord {
            name: "jobs".into(),
            max_msg: 0,
            max_msg_size: 0,
            flags: 0,
            pending: vec![
                message(b"stale", now_ms - 1000),
                message(b"fresh", now_ms + 60_000),
                message(b"forever", 0),
            ],
            unconfirmed: vec![message(b"held", 0)],
        }],
        ..Snapshot::default()
    };

    let mut ctx = TestContext::bare(test_settings());
    let now = ctx.now;
    snapshot.restore_into(&mut ctx.broker, now).unwrap();
    assert_eq!(payloads(&ctx.broker, "jobs"), vec!["held", "fresh", "forever"]);

    // The surviving deadline is carried over.
    ctx.advance(Duration::from_secs(61));
    let outcome = ctx.broker.sweep_expired(ctx.now);
    assert_eq!(outcome.expired, 1);
    assert_eq!(payloads(&ctx.broker, "jobs"), vec!["held", "forever"]);
}

#[tokio::test]
async fn test_binding_to_unknown_queue_is_dropped() {
    let snapshot = Snapshot {
        queues: vec![QueueRecord {
            name: "real".into(),
            max_msg: 0,
            max_msg_size: 0,
            flags: 0,
            pending: vec![],
            unconfirmed: vec![],
        }],
        routes: vec![RouteRecord {
            name: "events".into(),
            flags: 0,
            bindings: vec![("k".into(), vec!["ghost".into(), "real".into()])],
        }],
        ..Snapshot::default()
    };
    let mut ctx = TestContext::bare(test_settings());
    let now = ctx.now;
    snapshot.restore_into(&mut ctx.broker, now).unwrap();
    assert_eq!(
        ctx.broker.route_keys("events").unwrap(),
        vec![("k".to_string(), vec!["real".to_string()])]
    );
}

#[tokio::test]
async fn test_corrupt_files_are_rejected() {
    let mut ctx = TestContext::bare(test_settings());
    ctx.broker.queue_create("jobs", 0, 0, 0).unwrap();
    let encoded = Snapshot::capture(&ctx.broker, ctx.now).encode();
    assert!(Snapshot::decode(&encoded).is_ok());

    let mut flipped = encoded.to_vec();
    let middle = flipped.len() / 2;
    flipped[middle] ^= 0xFF;
    assert!(matches!(
        Snapshot::decode(&flipped),
        Err(BrokerError::Persistence(_))
    ));

    let mut bad_magic = encoded.to_vec();
    bad_magic[0] = b'X';
    assert!(Snapshot::decode(&bad_magic).is_err());

    assert!(Snapshot::decode(&encoded[..encoded.len() - 3]).is_err());
    assert!(Snapshot::decode(b"HARRIER").is_err());
}

#[tokio::test]
async fn test_missing_or_empty_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("none.dat");
    assert!(load_snapshot(path.to_str().unwrap()).unwrap().is_none());

    std::fs::write(&path, b"").unwrap();
    assert!(load_snapshot(path.to_str().unwrap()).unwrap().is_none());

    std::fs::write(&path, b"garbage").unwrap();
    assert!(load_snapshot(path.to_str().unwrap()).is_err());
}

#[tokio::test]
async fn test_background_save_writes_file() {
    let dir = TempDir::new().unwrap();
    let mut ctx = TestContext::with_settings(settings_in(&dir));
    let s = ctx.connect_admin();
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    assert!(ctx.broker.persistence.dirty() > 0);

    let reply = ctx.exec(s, CommandId::Save, |w| {
        w.put_u8(1);
    });
    assert_ok(&reply);
    wait_for_background_save(&ctx.broker).await;

    assert_eq!(ctx.broker.persistence.dirty(), 0);
    let snapshot = load_snapshot(&ctx.broker.settings.storage_path)
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.queues.len(), 1);
    assert_eq!(snapshot.queues[0].name, "jobs");
}

#[tokio::test]
async fn test_save_refused_while_background_save_runs() {
    let dir = TempDir::new().unwrap();
    let mut ctx = TestContext::with_settings(settings_in(&dir));
    let s = ctx.connect_admin();
    ctx.broker.persistence.is_saving.store(true, Ordering::SeqCst);

    for mode in [0u8, 1] {
        let reply = ctx.exec(s, CommandId::Save, |w| {
            w.put_u8(mode);
        });
        assert_err(&reply, ErrorTag::Persistence);
    }
    assert!(save_blocking(&ctx.broker).is_err());

    ctx.broker.persistence.is_saving.store(false, Ordering::SeqCst);
    assert!(save_blocking(&ctx.broker).is_ok());
}

#[tokio::test]
async fn test_save_to_unwritable_path_reports_error() {
    let dir = TempDir::new().unwrap();
    let settings = BrokerSettings {
        storage_path: dir
            .path()
            .join("missing")
            .join("harrier.dat")
            .to_string_lossy()
            .into_owned(),
        ..test_settings()
    };
    let mut ctx = TestContext::with_settings(settings);
    let s = ctx.connect_admin();
    let reply = ctx.exec(s, CommandId::Save, |w| {
        w.put_u8(0);
    });
    assert_err(&reply, ErrorTag::Persistence);
    assert_eq!(ctx.broker.persistence.last_save(), 0);
    assert!(ctx.broker.persistence.last_save_failed());
    assert!(ctx.broker.persistence.dirty() > 0);

    // Once the directory exists the next save succeeds and clears the failure.
    std::fs::create_dir(dir.path().join("missing")).unwrap();
    let reply = ctx.exec(s, CommandId::Save, |w| {
        w.put_u8(0);
    });
    assert_ok(&reply);
    assert!(!ctx.broker.persistence.last_save_failed());
    assert!(ctx.broker.persistence.last_save() > 0);
}

#[tokio::test]
async fn test_engine_saves_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let path = settings.storage_path.clone();
    let mut broker = Broker::new(settings);
    broker.queue_create("jobs", 0, 0, 0).unwrap();
    broker
        .queue_push("jobs", 0, Bytes::from_static(b"keep"), Instant::now())
        .unwrap();

    let options = EngineOptions {
        storage_timeout: Duration::ZERO,
        save_on_shutdown: true,
    };
    let (engine, _handle) = Engine::new(broker, options);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(engine.run(shutdown_rx));
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let snapshot = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(snapshot.queues[0].pending.len(), 1);
    assert_eq!(snapshot.queues[0].pending[0].payload, "keep");
}

#[tokio::test]
async fn test_clean_broker_skips_final_save() {
    let dir = TempDir::new().unwrap();
    let settings = settings_in(&dir);
    let path = settings.storage_path.clone();
    let options = EngineOptions {
        storage_timeout: Duration::ZERO,
        save_on_shutdown: true,
    };
    let (engine, _handle) = Engine::new(Broker::new(settings), options);
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let task = tokio::spawn(engine.run(shutdown_rx));
    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert!(!std::path::Path::new(&path).exists());
}

// tests/integration/admission_test.rs

//! Integration tests for the memory ceiling
//! Tests: OOM refusal of growing commands, draining commands still allowed, recovery

use super::test_helpers::*;
use harrier::core::broker::BrokerSettings;
use harrier::core::protocol::{CommandId, ErrorTag};

fn small_memory_settings() -> BrokerSettings {
    BrokerSettings {
        max_memory: 4096,
        ..test_settings()
    }
}

#[tokio::test]
async fn test_over_ceiling_refuses_growing_commands() {
    let mut ctx = TestContext::with_settings(small_memory_settings());
    let s = ctx.connect_admin();
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    assert_ok(&ctx.queue_declare(s, "jobs"));
    assert_ok(&ctx.queue_push(s, "jobs", 0, &[0u8; 4096]));

    // The ceiling is only re-evaluated on the memory-check timer.
    assert!(!ctx.broker.admission.is_over_limit());
    ctx.broker.check_memory();
    assert!(ctx.broker.admission.is_over_limit());

    assert_err(&ctx.queue_push(s, "jobs", 0, b"more"), ErrorTag::OutOfMemory);
    assert_err(&ctx.queue_create(s, "other", 0, 0, 0), ErrorTag::OutOfMemory);
    assert_err(&ctx.route_create(s, "events", 0), ErrorTag::OutOfMemory);
    assert_err(&ctx.user_create(s, "u", "pw", 0), ErrorTag::OutOfMemory);

    // Reads and draining commands are still served.
    assert_eq!(ctx.queue_size(s, "jobs"), 1);
    assert_ok(&ctx.exec(s, CommandId::Stat, |_| {}));
    assert_ok(&ctx.queue_pop(s, "jobs"));
}

#[tokio::test]
async fn test_draining_lifts_the_refusal() {
    let mut ctx = TestContext::with_settings(small_memory_settings());
    let s = ctx.connect_admin();
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    assert_ok(&ctx.queue_push(s, "jobs", 0, &[0u8; 4096]));
    ctx.broker.check_memory();
    assert_err(&ctx.queue_push(s, "jobs", 0, b"x"), ErrorTag::OutOfMemory);

    let reply = ctx.exec(s, CommandId::QueuePurge, |w| {
        w.put_name("jobs");
    });
    assert_ok(&reply);
    ctx.broker.check_memory();
    assert!(!ctx.broker.admission.is_over_limit());
    assert_ok(&ctx.queue_push(s, "jobs", 0, b"x"));
}

#[tokio::test]
async fn test_zero_ceiling_is_unlimited() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    for _ in 0..16 {
        assert_ok(&ctx.queue_push(s, "jobs", 0, &[0u8; 65536]));
    }
    ctx.broker.check_memory();
    assert!(!ctx.broker.admission.is_over_limit());
    assert!(ctx.broker.used_memory() > 16 * 65536);
}

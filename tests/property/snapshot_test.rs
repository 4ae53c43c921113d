// tests/property/snapshot_test.rs

//! Property-based tests for snapshot integrity
//! Tests that any damage to a saved snapshot is detected

use crate::test_helpers::{TestContext, test_settings};
use bytes::Bytes;
use harrier::core::persistence::Snapshot;
use proptest::prelude::*;

fn populated_snapshot(payloads: &[Vec<u8>]) -> Bytes {
    let mut ctx = TestContext::bare(test_settings());
    ctx.broker.queue_create("jobs", 0, 0, 0).unwrap();
    ctx.broker.route_create("events", 0).unwrap();
    ctx.broker.route_bind("events", "jobs", "k").unwrap();
    ctx.broker.channel_create("news", 0).unwrap();
    for payload in payloads {
        ctx.broker
            .queue_push("jobs", 0, Bytes::from(payload.clone()), ctx.now)
            .unwrap();
    }
    Snapshot::capture(&ctx.broker, ctx.now).encode()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_any_byte_flip_is_detected(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
        position in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let encoded = populated_snapshot(&payloads);
        let mut damaged = encoded.to_vec();
        let i = position.index(damaged.len());
        damaged[i] ^= mask;
        prop_assert!(Snapshot::decode(&damaged).is_err());
    }

    #[test]
    fn test_truncation_is_detected(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
        cut in any::<prop::sample::Index>(),
    ) {
        let encoded = populated_snapshot(&payloads);
        let len = cut.index(encoded.len());
        prop_assert!(Snapshot::decode(&encoded[..len]).is_err());
    }

    #[test]
    fn test_decoded_snapshot_restores_same_contents(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
    ) {
        let encoded = populated_snapshot(&payloads);
        let decoded = Snapshot::decode(&encoded).unwrap();
        let mut ctx = TestContext::bare(test_settings());
        let now = ctx.now;
        decoded.restore_into(&mut ctx.broker, now).unwrap();
        let restored: Vec<Vec<u8>> = ctx
            .broker
            .queues
            .by_name("jobs")
            .unwrap()
            .pending()
            .map(|m| m.payload.to_vec())
            .collect();
        prop_assert_eq!(restored, payloads);
        prop_assert_eq!(ctx.broker.route_keys("events").unwrap().len(), 1);
    }
}

// tests/integration/channel_test.rs

//! Integration tests for channel commands
//! Tests: CHANNEL_CREATE, CHANNEL_SUBSCRIBE, CHANNEL_PSUBSCRIBE, CHANNEL_PUBLISH,
//! CHANNEL_UNSUBSCRIBE, CHANNEL_PUNSUBSCRIBE, CHANNEL_DELETE

use super::test_helpers::*;
use harrier::core::protocol::{BodyReader, CommandId, ErrorTag, Response, Status};

const AUTO_DELETE: u32 = 1;
const ROUND_ROBIN: u32 = 4;

fn receivers(reply: &Response) -> u32 {
    assert_ok(reply);
    BodyReader::new(reply.body.clone()).read_u32().unwrap()
}

#[tokio::test]
async fn test_publish_reaches_exact_subscribers() {
    let mut ctx = TestContext::new();
    let publisher = ctx.connect_admin();
    let a = ctx.connect_admin();
    let b = ctx.connect_admin();
    assert_ok(&ctx.channel_create(publisher, "news", 0));
    assert_ok(&ctx.channel_subscribe(a, "news", "sports"));
    assert_ok(&ctx.channel_subscribe(b, "news", "weather"));

    assert_eq!(receivers(&ctx.channel_publish(publisher, "news", "sports", b"goal")), 1);

    let events = ctx.events(a);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, Status::Event);
    assert_eq!(events[0].command, CommandId::ChannelSubscribe);
    let mut r = BodyReader::new(events[0].body.clone());
    assert_eq!(r.read_name().unwrap(), "news");
    assert_eq!(r.read_string().unwrap(), "sports");
    assert_eq!(r.read_blob().unwrap(), "goal");
    assert!(ctx.events(b).is_empty());
}

#[tokio::test]
async fn test_publish_without_subscribers_returns_zero() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.channel_create(s, "news", 0));
    assert_eq!(receivers(&ctx.channel_publish(s, "news", "anything", b"x")), 0);
    assert_err(&ctx.channel_publish(s, "missing", "t", b"x"), ErrorTag::NotFound);
}

#[tokio::test]
async fn test_pattern_subscription_matches_topics() {
    let mut ctx = TestContext::new();
    let publisher = ctx.connect_admin();
    let sub = ctx.connect_admin();
    assert_ok(&ctx.channel_create(publisher, "news", 0));
    assert_ok(&ctx.channel_psubscribe(sub, "news", "sports.*"));

    assert_eq!(receivers(&ctx.channel_publish(publisher, "news", "sports.football", b"1")), 1);
    assert_eq!(receivers(&ctx.channel_publish(publisher, "news", "weather.rain", b"2")), 0);

    let events = ctx.events(sub);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].command, CommandId::ChannelPSubscribe);
    let mut r = BodyReader::new(events[0].body.clone());
    assert_eq!(r.read_name().unwrap(), "news");
    assert_eq!(r.read_string().unwrap(), "sports.*");
    assert_eq!(r.read_string().unwrap(), "sports.football");
    assert_eq!(r.read_blob().unwrap(), "1");
}

#[tokio::test]
async fn test_session_with_exact_and_pattern_match_receives_both() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.channel_create(s, "news", 0));
    assert_ok(&ctx.channel_subscribe(s, "news", "a.b"));
    assert_ok(&ctx.channel_psubscribe(s, "news", "a.*"));

    assert_eq!(receivers(&ctx.channel_publish(s, "news", "a.b", b"x")), 2);
    assert_eq!(ctx.events(s).len(), 2);
}

#[tokio::test]
async fn test_round_robin_channel_delivers_to_one_subscriber() {
    let mut ctx = TestContext::new();
    let publisher = ctx.connect_admin();
    let a = ctx.connect_admin();
    let b = ctx.connect_admin();
    assert_ok(&ctx.channel_create(publisher, "work", ROUND_ROBIN));
    assert_ok(&ctx.channel_subscribe(a, "work", "jobs"));
    assert_ok(&ctx.channel_psubscribe(b, "work", "j*"));

    for _ in 0..4 {
        assert_eq!(receivers(&ctx.channel_publish(publisher, "work", "jobs", b"x")), 1);
    }
    assert_eq!(ctx.events(a).len(), 2);
    assert_eq!(ctx.events(b).len(), 2);
}

#[tokio::test]
async fn test_unsubscribe_errors_and_effects() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.channel_create(s, "news", 0));

    let unsubscribe = |ctx: &mut TestContext, topic: &str| {
        ctx.exec(s, CommandId::ChannelUnsubscribe, |w| {
            w.put_name("news").put_string(topic);
        })
    };
    assert_err(&unsubscribe(&mut ctx, "sports"), ErrorTag::NotFound);

    assert_ok(&ctx.channel_subscribe(s, "news", "sports"));
    assert_ok(&unsubscribe(&mut ctx, "sports"));
    assert_eq!(receivers(&ctx.channel_publish(s, "news", "sports", b"x")), 0);

    assert_ok(&ctx.channel_psubscribe(s, "news", "*"));
    let reply = ctx.exec(s, CommandId::ChannelPUnsubscribe, |w| {
        w.put_name("news").put_string("*");
    });
    assert_ok(&reply);
    let channel_id = ctx.broker.channels.id_of("news").unwrap();
    assert!(!ctx.broker.session(s).unwrap().channels.contains(&channel_id));
}

#[tokio::test]
async fn test_empty_topic_is_rejected() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.channel_create(s, "news", 0));
    assert_err(&ctx.channel_subscribe(s, "news", ""), ErrorTag::InvalidArgument);
}

#[tokio::test]
async fn test_auto_delete_channel_removed_with_last_subscription() {
    let mut ctx = TestContext::new();
    let admin = ctx.connect_admin();
    let sub = ctx.connect_admin();
    assert_ok(&ctx.channel_create(admin, "temp", AUTO_DELETE));
    assert_ok(&ctx.channel_subscribe(sub, "temp", "a"));
    assert_ok(&ctx.channel_psubscribe(sub, "temp", "b.*"));

    ctx.disconnect(sub);
    assert!(!ctx.broker.channel_exist("temp"));
}

#[tokio::test]
async fn test_channel_list_rename_and_delete() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.channel_create(s, "news", ROUND_ROBIN));
    assert_ok(&ctx.channel_subscribe(s, "news", "a"));
    assert_ok(&ctx.channel_subscribe(s, "news", "b"));
    assert_ok(&ctx.channel_psubscribe(s, "news", "c.*"));

    let reply = ctx.exec(s, CommandId::ChannelRename, |w| {
        w.put_name("news").put_name("feed");
    });
    assert_ok(&reply);

    let reply = ctx.exec(s, CommandId::ChannelList, |_| {});
    let mut r = BodyReader::new(reply.body);
    assert_eq!(r.read_u32().unwrap(), 1);
    assert_eq!(r.read_name().unwrap(), "feed");
    assert_eq!(r.read_u32().unwrap(), ROUND_ROBIN);
    assert_eq!(r.read_u32().unwrap(), 2);
    assert_eq!(r.read_u32().unwrap(), 1);

    let reply = ctx.exec(s, CommandId::ChannelDelete, |w| {
        w.put_name("feed");
    });
    assert_ok(&reply);
    assert!(ctx.broker.session(s).unwrap().channels.is_empty());
    let reply = ctx.exec(s, CommandId::ChannelExist, |w| {
        w.put_name("feed");
    });
    assert_eq!(&reply.body[..], &[0]);
}

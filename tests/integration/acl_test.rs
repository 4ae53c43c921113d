// tests/integration/acl_test.rs

//! Integration tests for authentication, permissions and user management
//! Tests: AUTH, USER_CREATE, USER_LIST, USER_RENAME, USER_SET_PERM, USER_DELETE

use super::test_helpers::*;
use harrier::core::acl::Permissions;
use harrier::core::protocol::{BodyReader, CommandId, ErrorTag};

#[tokio::test]
async fn test_public_commands_need_no_authentication() {
    let mut ctx = TestContext::new();
    let s = ctx.connect();
    assert_ok(&ctx.exec(s, CommandId::Ping, |_| {}));
}

#[tokio::test]
async fn test_unauthenticated_session_fails_closed() {
    let mut ctx = TestContext::new();
    let s = ctx.connect();
    assert_err(&ctx.queue_create(s, "jobs", 0, 0, 0), ErrorTag::NotAuthenticated);
    assert_err(&ctx.exec(s, CommandId::Stat, |_| {}), ErrorTag::NotAuthenticated);
    // The connection stays open after a permission failure.
    assert!(!ctx.is_closed(s));
}

#[tokio::test]
async fn test_failed_auth_clears_previous_identity() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));

    assert_err(&ctx.auth(s, ADMIN_NAME, "wrong", 0), ErrorTag::NotAuthenticated);
    assert!(ctx.broker.session(s).unwrap().auth.is_none());
    assert_err(&ctx.queue_create(s, "other", 0, 0, 0), ErrorTag::NotAuthenticated);

    assert_err(&ctx.auth(s, "nobody", ADMIN_PASSWORD, 0), ErrorTag::NotAuthenticated);
}

#[tokio::test]
async fn test_permission_bits_gate_commands() {
    let mut ctx = TestContext::new();
    let admin = ctx.connect_admin();
    assert_ok(&ctx.user_create(admin, "worker", "pw", Permissions::QUEUE.bits()));

    let s = ctx.connect();
    assert_ok(&ctx.auth(s, "worker", "pw", 0));
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    assert_err(&ctx.route_create(s, "events", 0), ErrorTag::NotAuthorized);
    assert_err(&ctx.channel_create(s, "news", 0), ErrorTag::NotAuthorized);
    assert_err(&ctx.exec(s, CommandId::UserList, |_| {}), ErrorTag::NotAuthorized);
}

#[tokio::test]
async fn test_single_bit_grants_single_command() {
    let mut ctx = TestContext::new();
    let admin = ctx.connect_admin();
    assert_ok(&ctx.queue_create(admin, "jobs", 0, 0, 0));
    assert_ok(&ctx.user_create(admin, "pusher", "pw", Permissions::QUEUE_PUSH.bits()));

    let s = ctx.connect();
    assert_ok(&ctx.auth(s, "pusher", "pw", 0));
    assert_ok(&ctx.queue_push(s, "jobs", 0, b"x"));
    assert_err(&ctx.queue_declare(s, "jobs"), ErrorTag::NotAuthorized);
}

#[tokio::test]
async fn test_user_create_validation() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.user_create(s, "alice", "pw", 0));
    assert_err(&ctx.user_create(s, "alice", "pw", 0), ErrorTag::AlreadyExists);
    assert_err(&ctx.user_create(s, "bob", "pw", 1 << 63), ErrorTag::InvalidArgument);
}

#[tokio::test]
async fn test_user_list_reports_permissions() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.user_create(s, "reader", "pw", Permissions::STAT.bits()));

    let reply = ctx.exec(s, CommandId::UserList, |_| {});
    assert_ok(&reply);
    let mut r = BodyReader::new(reply.body);
    assert_eq!(r.read_u32().unwrap(), 2);
    assert_eq!(r.read_name().unwrap(), ADMIN_NAME);
    assert_eq!(r.read_u64().unwrap(), Permissions::all().bits());
    assert_eq!(r.read_name().unwrap(), "reader");
    assert_eq!(r.read_u64().unwrap(), Permissions::STAT.bits());
}

#[tokio::test]
async fn test_administrator_cannot_be_renamed_or_deleted() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    let reply = ctx.exec(s, CommandId::UserRename, |w| {
        w.put_name(ADMIN_NAME).put_name("root");
    });
    assert_err(&reply, ErrorTag::InvalidArgument);
    let reply = ctx.exec(s, CommandId::UserDelete, |w| {
        w.put_name(ADMIN_NAME);
    });
    assert_err(&reply, ErrorTag::InvalidArgument);
}

#[tokio::test]
async fn test_set_perm_applies_at_next_auth() {
    let mut ctx = TestContext::new();
    let admin = ctx.connect_admin();
    assert_ok(&ctx.user_create(admin, "worker", "pw", Permissions::QUEUE.bits()));
    let s = ctx.connect();
    assert_ok(&ctx.auth(s, "worker", "pw", 0));

    let reply = ctx.exec(admin, CommandId::UserSetPerm, |w| {
        w.put_name("worker").put_u64(Permissions::ROUTE.bits());
    });
    assert_ok(&reply);

    // The cached identity still carries the old set.
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    assert_err(&ctx.route_create(s, "events", 0), ErrorTag::NotAuthorized);

    assert_ok(&ctx.auth(s, "worker", "pw", 0));
    assert_err(&ctx.queue_create(s, "more", 0, 0, 0), ErrorTag::NotAuthorized);
    assert_ok(&ctx.route_create(s, "events", 0));
}

#[tokio::test]
async fn test_deleted_user_keeps_existing_sessions() {
    let mut ctx = TestContext::new();
    let admin = ctx.connect_admin();
    assert_ok(&ctx.user_create(admin, "temp", "pw", Permissions::QUEUE.bits()));
    let s = ctx.connect();
    assert_ok(&ctx.auth(s, "temp", "pw", 0));

    let reply = ctx.exec(admin, CommandId::UserDelete, |w| {
        w.put_name("temp");
    });
    assert_ok(&reply);

    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));
    let fresh = ctx.connect();
    assert_err(&ctx.auth(fresh, "temp", "pw", 0), ErrorTag::NotAuthenticated);
}

#[tokio::test]
async fn test_user_rename_moves_credentials() {
    let mut ctx = TestContext::new();
    let admin = ctx.connect_admin();
    assert_ok(&ctx.user_create(admin, "old", "pw", 0));
    let reply = ctx.exec(admin, CommandId::UserRename, |w| {
        w.put_name("old").put_name("new");
    });
    assert_ok(&reply);

    let s = ctx.connect();
    assert_err(&ctx.auth(s, "old", "pw", 0), ErrorTag::NotAuthenticated);
    assert_ok(&ctx.auth(s, "new", "pw", 0));
}

#[tokio::test]
async fn test_flush_users_keeps_administrator() {
    let mut ctx = TestContext::new();
    let s = ctx.connect_admin();
    assert_ok(&ctx.user_create(s, "a", "pw", 0));
    assert_ok(&ctx.queue_create(s, "jobs", 0, 0, 0));

    let reply = ctx.exec(s, CommandId::Flush, |w| {
        w.put_u32(1);
    });
    assert_ok(&reply);
    assert_eq!(ctx.broker.users.len(), 1);
    assert!(ctx.broker.users.contains(ADMIN_NAME));
    assert!(ctx.broker.queue_exist("jobs"));

    let reply = ctx.exec(s, CommandId::Flush, |w| {
        w.put_u32(0x100);
    });
    assert_err(&reply, ErrorTag::InvalidArgument);
}

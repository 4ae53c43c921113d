// src/core/handler/dispatcher.rs

//! Runs one decoded request through the command pipeline.
//!
//! Every request goes through the same gates in order: body parsing, the permission
//! check, the admission check, then execution. Each gate short-circuits with an error
//! reply, except parsing, which is connection-fatal and closes the session silently.

use crate::core::acl;
use crate::core::broker::Broker;
use crate::core::commands::{Command, ExecutionContext};
use crate::core::metrics;
use crate::core::protocol::{Request, Response};
use crate::core::session::SessionId;
use crate::core::BrokerError;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info_span, warn};

/// Executes `request` on behalf of `session` and queues the reply on its outbound channel.
pub fn dispatch(broker: &mut Broker, session: SessionId, request: Request, now: Instant) {
    let command_id = request.command;
    let Some(state) = broker.session_mut(session) else {
        debug!("Dropping {} from unknown session {}", command_id, session);
        return;
    };
    state.touch(now);
    let addr = state.addr.clone();

    let span = info_span!(
        "command",
        name = %command_id,
        client.addr = %addr,
        client.id = %session,
    );
    let _entered = span.enter();

    let timer = metrics::COMMAND_LATENCY_SECONDS.start_timer();
    metrics::COMMANDS_PROCESSED_TOTAL.inc();
    broker.record_command();

    let command = match Command::parse(request) {
        Ok(command) => command,
        Err(e) => {
            warn!("Malformed {} body, closing session: {}", command_id, e);
            broker.remove_session(session);
            return;
        }
    };

    let mut close_after_reply = false;
    let response = match run_pipeline(broker, session, command, now, &mut close_after_reply) {
        Ok(body) => Response::ok(command_id, body),
        Err(e) if e.is_connection_fatal() => {
            warn!("Closing session after fatal error: {}", e);
            broker.remove_session(session);
            return;
        }
        Err(e) => {
            let tag: &'static str = e.tag().into();
            metrics::COMMAND_ERRORS_TOTAL.with_label_values(&[tag]).inc();
            debug!("{} failed: {}", command_id, e);
            Response::error(command_id, &e)
        }
    };
    broker.send_to(session, response);
    timer.observe_duration();

    if close_after_reply {
        broker.remove_session(session);
    }
}

fn run_pipeline(
    broker: &mut Broker,
    session: SessionId,
    command: Command,
    now: Instant,
    close_after_reply: &mut bool,
) -> Result<Bytes, BrokerError> {
    let id = command.id();
    let auth = broker.session_or_err(session)?.auth.as_ref();
    acl::check_permission(id, auth)?;
    broker.admission.check_command(id.flags())?;

    let mut ctx = ExecutionContext::new(broker, session, now);
    let result = command.execute(&mut ctx);
    *close_after_reply = ctx.close_after_reply;
    result
}

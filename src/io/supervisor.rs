// src/io/supervisor.rs
//
// Reconnect supervisor for one link.
//
// Waits for the breaker to go half-open, takes the single trial and reopens
// the device with the original configuration. Success restores the link;
// failure reopens the breaker with a longer cooldown. While the link is up it
// also checks periodically that the device is still enumerable, so an unplug
// is noticed even when no I/O is in flight.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::breaker::{BreakerState, Permit};
use super::serial::PortHandle;
use super::{LinkContext, LinkStatus, TransportError};

/// Supervisor wake-up interval.
const TICK: Duration = Duration::from_millis(10);

pub(crate) fn spawn_supervisor(ctx: Arc<LinkContext>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("link-supervisor-{}", ctx.config.port_name))
        .spawn(move || run_supervisor(ctx))
}

fn run_supervisor(ctx: Arc<LinkContext>) {
    let health_interval = ctx.shared.settings.health_check_interval();
    let mut last_health_check = Instant::now();

    tracing::debug!(session_id = %ctx.session_id, "supervisor started");

    while !ctx.is_cancelled() {
        let state = ctx.shared.breaker().state();
        match state {
            BreakerState::HalfOpen => {
                let permit = ctx.shared.breaker().try_acquire();
                if let Ok(Permit::Trial) = permit {
                    attempt_reopen(&ctx);
                    last_health_check = Instant::now();
                }
            }
            BreakerState::Closed => {
                if let Some(interval) = health_interval {
                    if last_health_check.elapsed() >= interval {
                        last_health_check = Instant::now();
                        check_device_present(&ctx);
                    }
                }
            }
            BreakerState::Open => {}
        }
        ctx.sleep_unless_cancelled(TICK);
    }

    tracing::debug!(session_id = %ctx.session_id, "supervisor stopped");
}

fn attempt_reopen(ctx: &LinkContext) {
    // A stale handle must not survive into the new session
    if let Some(mut stale) = ctx.port().take() {
        stale.close();
    }

    tracing::info!(
        session_id = %ctx.session_id,
        port = %ctx.config.port_name,
        "attempting reopen"
    );

    match PortHandle::open(ctx.shared.opener.as_ref(), &ctx.config) {
        Ok(handle) => {
            if ctx.is_cancelled() {
                // Dropping the handle closes it
                return;
            }
            tracing::info!(session_id = %ctx.session_id, "reopen succeeded");
            ctx.restore(handle);
        }
        Err(e) => ctx.report_failure(TransportError::Reopen(e)),
    }
}

fn check_device_present(ctx: &LinkContext) {
    if !ctx.shared.status().is_connected() {
        return;
    }
    if !ctx.shared.opener.is_present(&ctx.config.port_name) {
        tracing::warn!(port = %ctx.config.port_name, "device no longer present");
        ctx.report_device_missing();
    }
}

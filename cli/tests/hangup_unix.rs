//! SIGHUP handling, kept in its own test binary because the signal is
//! delivered to the whole process

#![cfg(unix)]
#![allow(unused_crate_dependencies)]

use cli::operator::{wait_for_stop, Interrupts, StopReason};
use nix::sys::signal::{raise, Signal};
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_hangup_ends_operator_wait() {
    let mut interrupts = Interrupts::install().expect("signals");
    let (_input_open, input) = oneshot::channel::<StopReason>();

    raise(Signal::SIGHUP).expect("raise SIGHUP");

    let reason = tokio::time::timeout(Duration::from_secs(5), wait_for_stop(input, &mut interrupts))
        .await
        .expect("SIGHUP should end the wait");
    assert_eq!(reason, StopReason::Hangup);
}

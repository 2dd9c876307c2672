// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::run_every;
use super::test_helpers::*;

#[tokio::test(start_paused = true)]
async fn run_every_ticks_immediately_then_on_period() {
    let count = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let counter = Arc::clone(&count);
    let task = tokio::spawn(run_every("test", Duration::from_secs(1), cancel.clone(), move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    tokio::time::sleep(Duration::from_millis(3500)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn deploy_loop_runs_until_cancelled() {
    let h = Harness::new();
    h.deploy_sequence(5);
    let mut rx = h.connect("con-1");
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.reconciler.clone().run_deploy_loop(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(names(&drain(&mut rx)), vec!["deploy"]);

    h.deploy_sequence(6);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut rx).is_empty());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_starts_at_fixed_instant() {
    let clock = FakeClock::new();
    assert_eq!(clock.now().to_rfc3339(), "2026-01-01T00:00:00+00:00");
}

#[test]
fn fake_clock_can_be_advanced() {
    let clock = FakeClock::new();
    let t1 = clock.now();
    clock.advance(Duration::minutes(5));
    assert_eq!(clock.now() - t1, Duration::minutes(5));
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    clock2.advance(Duration::seconds(30));
    assert_eq!(clock1.now() - t1, Duration::seconds(30));
}

#[test]
fn epoch_ms_tracks_now() {
    let clock = FakeClock::new();
    assert_eq!(clock.epoch_ms(), 1_767_225_600_000);
}

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let t1 = clock.now();
    let t2 = clock.now();
    assert!(t2 >= t1);
}

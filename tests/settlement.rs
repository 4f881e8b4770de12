//! Settlement state-machine tests under paused virtual time

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::FakeBackend;
use quiesce::{Provider, SettleTiming, Settler, Termination};
use tokio::time::Instant;

/// Compressed profile so the assertions stay readable
fn quick_timing() -> SettleTiming {
    SettleTiming {
        quiet_window: Duration::from_millis(1000),
        recheck: Duration::from_millis(200),
        grace: Duration::ZERO,
        nav_idle_timeout: Duration::from_secs(2),
        post_click_idle: Duration::ZERO,
        hard_deadline: Duration::from_secs(10),
        termination: Termination::QuietWindow,
    }
}

#[tokio::test(start_paused = true)]
async fn settles_after_one_quiet_window_with_zero_events() {
    let backend = FakeBackend::new();
    let started = Instant::now();

    let settler = Settler::arm_with(&backend, quick_timing()).await.unwrap();
    settler.settle().await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1000), "settled too early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(1600), "settled too late: {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn navigation_events_extend_the_settlement() {
    let backend = Arc::new(FakeBackend::new());

    let settler = Settler::arm_with(&*backend, quick_timing()).await.unwrap();

    let emitter = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            backend.emit_navigation("f1", "https://example.com/a");
            tokio::time::sleep(Duration::from_millis(500)).await;
            backend.emit_navigation("f1", "https://example.com/b");
        })
    };

    let started = Instant::now();
    settler.settle().await.unwrap();
    let elapsed = started.elapsed();

    // Quiet window restarts at the last event (t=800ms).
    assert!(
        elapsed >= Duration::from_millis(1800),
        "events did not extend settlement: {:?}",
        elapsed
    );
    assert!(elapsed <= Duration::from_millis(2600), "settled too late: {:?}", elapsed);

    emitter.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn overlapping_events_never_stack_idle_waits() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_idle_hold(Duration::from_millis(500));

    let settler = Settler::arm_with(&*backend, quick_timing()).await.unwrap();

    let emitter = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            for i in 0..4u32 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                backend.emit_navigation("f1", &format!("https://example.com/{}", i));
            }
        })
    };

    settler.settle().await.unwrap();
    emitter.await.unwrap();

    // Events landing while an idle wait is in flight refresh the quiet
    // clock instead of starting a second wait.
    assert_eq!(backend.max_idle_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn delivered_events_win_over_coinciding_recheck_ticks() {
    let backend = Arc::new(FakeBackend::new());

    let mut timing = quick_timing();
    timing.quiet_window = Duration::from_millis(300);
    timing.recheck = Duration::from_millis(100);

    let settler = Settler::arm_with(&*backend, timing).await.unwrap();

    // Every emission lands on a recheck boundary; each must be read before
    // the tick is allowed to declare quiescence.
    let emitter = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            for i in 0..20u32 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                backend.emit_navigation("f1", &format!("https://example.com/{}", i));
            }
        })
    };

    let started = Instant::now();
    settler.settle().await.unwrap();
    let elapsed = started.elapsed();

    // Last event at t=2000ms, quiet window 300ms after that.
    assert!(
        elapsed >= Duration::from_millis(2300),
        "settled with events still queued: {:?}",
        elapsed
    );
    assert!(elapsed <= Duration::from_millis(3000), "settled too late: {:?}", elapsed);

    emitter.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn hard_deadline_caps_a_page_that_never_goes_quiet() {
    let backend = Arc::new(FakeBackend::new());

    let mut timing = quick_timing();
    timing.hard_deadline = Duration::from_secs(3);

    let settler = Settler::arm_with(&*backend, timing).await.unwrap();

    let emitter = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(150)).await;
                backend.emit_navigation("f1", "https://example.com/busy");
            }
        })
    };

    let started = Instant::now();
    settler.settle().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(3));
    assert!(
        elapsed <= Duration::from_millis(5500),
        "deadline overshot: {:?}",
        elapsed
    );

    emitter.abort();
}

#[tokio::test(start_paused = true)]
async fn gmail_terminates_on_the_wait_flag_alone() {
    // Same zero-event run under both profiles: the flag-only termination
    // finishes well before a quiet-window profile would.
    let backend = FakeBackend::new();
    let started = Instant::now();
    let settler = Settler::arm(&backend, Provider::Gmail).await.unwrap();
    settler.settle().await.unwrap();
    let gmail_elapsed = started.elapsed();

    let backend = FakeBackend::new();
    let started = Instant::now();
    let settler = Settler::arm(&backend, Provider::Hotmail).await.unwrap();
    settler.settle().await.unwrap();
    let hotmail_elapsed = started.elapsed();

    assert!(
        gmail_elapsed < Provider::Hotmail.timing().quiet_window,
        "flag-only termination waited a quiet window: {:?}",
        gmail_elapsed
    );
    assert!(hotmail_elapsed >= Provider::Hotmail.timing().quiet_window);
}

#[tokio::test(start_paused = true)]
async fn settlement_completes_when_the_page_goes_away() {
    let backend = Arc::new(FakeBackend::new());
    let settler = Settler::arm_with(&*backend, quick_timing()).await.unwrap();

    // Dropping every sender closes the subscription channel.
    let closer = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            backend.close_subscribers();
        })
    };

    let started = Instant::now();
    settler.settle().await.unwrap();
    closer.await.unwrap();

    assert!(started.elapsed() <= Duration::from_millis(1000));
}

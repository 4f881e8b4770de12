//! Click navigation settlement
//!
//! Webmail SPAs fire a variable, provider-dependent number of intermediate
//! navigations after a single click (auth redirects, frame reloads), so one
//! fixed wait is unreliable. Settlement treats "no navigation event for a
//! provider-specific quiet window" as the proxy for page stability.
//!
//! The subscription is taken *before* the click is dispatched, so a
//! navigation that completes instantly cannot slip past the listener.

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use crate::backend::{NavigationEvent, NavigationEvents, PageBackend};
use crate::error::Result;

/// Which webmail provider's settlement profile a click runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    /// No provider-specific handling; short quiet window
    #[default]
    Generic,
    /// Hotmail/Outlook: long redirect chains, explicit quiet-window polling
    Hotmail,
    /// Gmail: settlement keyed on the wait flag only, with a fixed grace
    /// delay folded into the navigation handler
    Gmail,
}

/// How the settling loop decides it is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Not waiting AND no navigation event for `quiet_window`
    QuietWindow,
    /// Not waiting, regardless of elapsed quiet time (Gmail behavior;
    /// preserved as-is rather than unified with QuietWindow)
    WaitFlagOnly,
}

/// Timing parameters for one settlement run
#[derive(Debug, Clone, Copy)]
pub struct SettleTiming {
    /// Quiet period treated as "the page has stabilized"
    pub quiet_window: Duration,
    /// Polling interval of the settling loop
    pub recheck: Duration,
    /// Delay before the per-event idle wait (Gmail only)
    pub grace: Duration,
    /// Bound on the network-idle wait a navigation event triggers
    pub nav_idle_timeout: Duration,
    /// Bound on the direct network-idle wait issued right after the click
    pub post_click_idle: Duration,
    /// Cap on the whole settlement; hitting it completes, never errors
    pub hard_deadline: Duration,
    pub termination: Termination,
}

impl Provider {
    /// Settlement timing profile for this provider
    pub fn timing(&self) -> SettleTiming {
        match self {
            Provider::Generic => SettleTiming {
                quiet_window: Duration::from_millis(1500),
                recheck: Duration::from_millis(500),
                grace: Duration::ZERO,
                nav_idle_timeout: Duration::from_secs(10),
                post_click_idle: Duration::from_secs(5),
                hard_deadline: Duration::from_secs(30),
                termination: Termination::QuietWindow,
            },
            Provider::Hotmail => SettleTiming {
                quiet_window: Duration::from_millis(2500),
                recheck: Duration::from_millis(500),
                grace: Duration::ZERO,
                nav_idle_timeout: Duration::from_secs(15),
                post_click_idle: Duration::from_secs(8),
                hard_deadline: Duration::from_secs(45),
                termination: Termination::QuietWindow,
            },
            Provider::Gmail => SettleTiming {
                quiet_window: Duration::from_millis(800),
                recheck: Duration::from_millis(400),
                grace: Duration::from_millis(750),
                nav_idle_timeout: Duration::from_secs(12),
                post_click_idle: Duration::from_secs(8),
                hard_deadline: Duration::from_secs(45),
                termination: Termination::WaitFlagOnly,
            },
        }
    }
}

/// Settlement lifecycle value; replaces the re-entrant boolean guard so
/// overlapping waits cannot be expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    /// Listener attached, no idle wait in flight
    Armed,
    /// One bounded idle wait in flight; further events only refresh the
    /// navigation timestamp
    Waiting,
    /// Quiescence detected or deadline reached
    Settled,
}

/// One click's navigation session
///
/// Create with [`Settler::arm`] before dispatching the click, then call
/// [`Settler::settle`] after it.
pub struct Settler<'a, B: PageBackend> {
    backend: &'a B,
    timing: SettleTiming,
    events: NavigationEvents,
}

impl<'a, B: PageBackend> Settler<'a, B> {
    /// Attach the navigation listener. Must happen before the click so a
    /// navigation completing immediately is still observed.
    pub async fn arm(backend: &'a B, provider: Provider) -> Result<Self> {
        Self::arm_with(backend, provider.timing()).await
    }

    /// Attach with explicit timing (tests use compressed profiles)
    pub async fn arm_with(backend: &'a B, timing: SettleTiming) -> Result<Self> {
        let events = backend.subscribe_navigation().await?;
        Ok(Self {
            backend,
            timing,
            events,
        })
    }

    /// Block until the frame graph goes quiet or the hard deadline passes.
    ///
    /// Never fails on timeouts; every bounded wait inside swallows its own
    /// timeout and proceeds.
    pub async fn settle(self) -> Result<()> {
        let Self {
            backend,
            timing,
            mut events,
        } = self;

        let started = Instant::now();
        let deadline = started + timing.hard_deadline;
        let mut last_nav = started;
        let mut last_logged_frame: Option<String> = None;
        let mut state = SettleState::Armed;

        // Direct post-click idle wait, bounded and non-fatal. Navigation
        // events arriving during it are drained so they still count.
        drain_during_idle(
            backend,
            &timing,
            &mut events,
            &mut last_nav,
            &mut last_logged_frame,
            timing.post_click_idle,
            Duration::ZERO,
        )
        .await;

        loop {
            if Instant::now() >= deadline {
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "settlement deadline reached, proceeding"
                );
                break;
            }

            tokio::select! {
                // A delivered event must win over the recheck tick, or a
                // tick could declare quiescence with an event unread.
                biased;

                event = events.recv() => {
                    match event {
                        Some(event) => {
                            note_navigation(event, &mut last_nav, &mut last_logged_frame);
                            // Armed -> Waiting: one bounded idle wait, events
                            // coalesced while it runs.
                            state = SettleState::Waiting;
                            tracing::trace!(state = ?state, "awaiting post-navigation network idle");
                            let bound = timing
                                .nav_idle_timeout
                                .min(deadline.saturating_duration_since(Instant::now()));
                            drain_during_idle(
                                backend,
                                &timing,
                                &mut events,
                                &mut last_nav,
                                &mut last_logged_frame,
                                bound,
                                timing.grace,
                            )
                            .await;
                            state = SettleState::Armed;
                        }
                        // Page gone; nothing left to wait for.
                        None => break,
                    }
                }
                _ = sleep(timing.recheck) => {
                    let quiet = match timing.termination {
                        Termination::QuietWindow => {
                            state == SettleState::Armed
                                && last_nav.elapsed() >= timing.quiet_window
                        }
                        Termination::WaitFlagOnly => state == SettleState::Armed,
                    };
                    if quiet {
                        state = SettleState::Settled;
                    }
                }
            }

            if state == SettleState::Settled {
                break;
            }
        }

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "navigation settled"
        );
        Ok(())
    }
}

/// Run one bounded network-idle wait while keeping the event subscription
/// drained, so navigations seen mid-wait refresh `last_nav` instead of
/// stacking up in the channel. The wait's own timeout is swallowed.
async fn drain_during_idle<B: PageBackend>(
    backend: &B,
    _timing: &SettleTiming,
    events: &mut NavigationEvents,
    last_nav: &mut Instant,
    last_logged_frame: &mut Option<String>,
    bound: Duration,
    grace: Duration,
) {
    let idle = async {
        if !grace.is_zero() {
            sleep(grace).await;
        }
        let _ = timeout(bound, backend.wait_network_idle()).await;
    };
    tokio::pin!(idle);

    loop {
        tokio::select! {
            // Queued events are noted before the wait is allowed to finish.
            biased;

            event = events.recv() => match event {
                Some(event) => note_navigation(event, last_nav, last_logged_frame),
                None => break,
            },
            _ = &mut idle => break,
        }
    }
}

/// Record a navigation event; log once per distinct frame id
fn note_navigation(
    event: NavigationEvent,
    last_nav: &mut Instant,
    last_logged_frame: &mut Option<String>,
) {
    *last_nav = Instant::now();
    if last_logged_frame.as_deref() != Some(event.frame_id.as_str()) {
        tracing::debug!(frame_id = %event.frame_id, url = %event.url, "navigation observed");
        *last_logged_frame = Some(event.frame_id);
    }
}

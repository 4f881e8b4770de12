//! Scroll utilities
//!
//! Three independent behaviors over the backend's scroll geometry:
//! scroll-to-bottom, a randomized dwell scroll that mimics human browsing,
//! and scroll-to-element. Nothing here persists state past one call.

use std::time::Duration;

use smallvec::SmallVec;
use tokio::time::sleep;

use crate::backend::PageBackend;
use crate::error::Result;
use crate::gen::{random_bool, random_f64_range, random_range};
use crate::page::Page;
use crate::selector::Selector;

/// Probability that a dwell step scrolls downward
const DOWN_BIAS: f64 = 0.75;

/// Per-step scroll distance bounds, CSS pixels
const STEP_DISTANCE: (f64, f64) = (120.0, 480.0);

/// Per-step pause bounds, ms
const STEP_PAUSE_MS: (u64, u64) = (80, 350);

/// Hard cap on scroll-to-bottom iterations; some pages grow forever
const MAX_BOTTOM_STEPS: u32 = 500;

/// One step of a planned dwell scroll
#[derive(Debug, Clone, Copy)]
pub struct ScrollStep {
    /// Vertical distance, negative is up
    pub dy: f64,
    /// Pause after the step, ms
    pub pause_ms: u64,
}

/// Stack-allocated storage for typical dwell plans
pub type ScrollPlan = SmallVec<[ScrollStep; 16]>;

/// Normalize possibly-swapped bounds into (low, high)
pub(crate) fn normalize_bounds(a: u64, b: u64) -> (u64, u64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Plan a randomized dwell scroll lasting between `min_ms` and `max_ms`
///
/// Bounds may be passed in either order. Steps are biased 75% downward with
/// randomized distance and pause; the pauses sum exactly to a total drawn
/// from [min, max], so the dwell's end time always lands inside the window.
pub fn plan_dwell(min_ms: u64, max_ms: u64) -> ScrollPlan {
    let (min_ms, max_ms) = normalize_bounds(min_ms, max_ms);
    let total_ms = random_range(min_ms, max_ms);

    let mut plan = ScrollPlan::new();
    let mut elapsed = 0u64;

    while elapsed < total_ms {
        let direction = if random_bool(DOWN_BIAS) { 1.0 } else { -1.0 };
        let dy = direction * random_f64_range(STEP_DISTANCE.0, STEP_DISTANCE.1);
        let pause_ms = random_range(STEP_PAUSE_MS.0, STEP_PAUSE_MS.1).min(total_ms - elapsed);

        plan.push(ScrollStep { dy, pause_ms });
        elapsed += pause_ms;
    }

    plan
}

/// Total planned pause time of a dwell plan, ms
pub fn plan_duration_ms(plan: &ScrollPlan) -> u64 {
    plan.iter().map(|step| step.pause_ms).sum()
}

impl<B: PageBackend> Page<B> {
    /// Step down the page until the viewport bottom meets the document bottom
    pub async fn scroll_to_bottom(&self) -> Result<()> {
        for _ in 0..MAX_BOTTOM_STEPS {
            let state = self.backend().scroll_state().await?;
            if state.at_bottom() {
                return Ok(());
            }

            let step = random_f64_range(200.0, 600.0).min(state.remaining().max(1.0));
            self.backend().scroll_by(step).await?;
            sleep(Duration::from_millis(random_range(60, 200))).await;
        }

        tracing::debug!("scroll_to_bottom gave up, document keeps growing");
        Ok(())
    }

    /// Scroll around randomly for a bounded time, mimicking a reading human
    ///
    /// `min_ms`/`max_ms` may be passed in either order; the dwell lasts a
    /// random time inside the normalized window.
    pub async fn random_scroll(&self, min_ms: u64, max_ms: u64) -> Result<()> {
        let plan = plan_dwell(min_ms, max_ms);
        self.run_plan(&plan).await
    }

    /// Bring an element into view the way a human would
    ///
    /// Jumps near the element's document offset, dwells with a short random
    /// scroll, then finishes with a smooth scroll-into-view.
    pub async fn scroll_to_element(
        &self,
        selector: &Selector,
        dwell_min_ms: u64,
        dwell_max_ms: u64,
    ) -> Result<()> {
        let element = self.get_element(selector).await?;

        let top = self.backend().element_top(&element).await?;
        let state = self.backend().scroll_state().await?;

        // Land slightly above the element, not exactly on it.
        let target = (top - state.viewport_height / 3.0).max(0.0);
        self.backend().scroll_by(target - state.scroll_y).await?;

        let plan = plan_dwell(dwell_min_ms, dwell_max_ms);
        self.run_plan(&plan).await?;

        self.backend().scroll_into_view(&element).await
    }

    async fn run_plan(&self, plan: &ScrollPlan) -> Result<()> {
        for step in plan {
            self.backend().scroll_by(step.dy).await?;
            sleep(Duration::from_millis(step.pause_ms)).await;
        }
        Ok(())
    }
}

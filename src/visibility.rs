//! Hover / idle state machine of the HUD.
//!
//! Two axes: `expanded` follows the pointer, `visible` is the fade target and
//! drops to `false` once the pointer has been away for the idle timeout.
//! Pointer callbacks and the idle timer run on different tasks; both mutate
//! the state only under one lock, and a timer generation makes a cancelled
//! timer that fires anyway a no-op.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Axis aligned rectangle, `y` growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// Shrinks by `dx`/`dy` on every side; negative values grow the rect.
    pub fn inset(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(
            self.x + dx,
            self.y + dy,
            (self.width - 2.0 * dx).max(0.0),
            (self.height - 2.0 * dy).max(0.0),
        )
    }

    pub fn mid_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

/// Where the pointer has to be to expand or to keep the panel expanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudGeometry {
    pub panel: Rect,
    pub pill_width: f64,
    pub empty_pill_width: f64,
    pub pill_height: f64,
    pub hover_margin: (f64, f64),
}

impl HudGeometry {
    /// The notch layout: a 400x200 panel whose collapsed pill is 250x34 at
    /// the top centre (60 wide when nothing plays).
    pub fn notch(origin: Point) -> Self {
        Self {
            panel: Rect::new(origin.x, origin.y, 400.0, 200.0),
            pill_width: 250.0,
            empty_pill_width: 60.0,
            pill_height: 34.0,
            hover_margin: (15.0, 10.0),
        }
    }

    /// The notch layout scaled onto `panel`.
    pub fn fit(panel: Rect) -> Self {
        let notch = Self::notch(Point { x: 0.0, y: 0.0 });
        let sx = panel.width / notch.panel.width;
        let sy = panel.height / notch.panel.height;
        Self {
            panel,
            pill_width: notch.pill_width * sx,
            empty_pill_width: notch.empty_pill_width * sx,
            pill_height: notch.pill_height * sy,
            hover_margin: (notch.hover_margin.0 * sx, notch.hover_margin.1 * sy),
        }
    }

    pub fn collapsed_region(&self, has_content: bool) -> Rect {
        let width = if has_content {
            self.pill_width
        } else {
            self.empty_pill_width
        };
        Rect::new(
            self.panel.mid_x() - width / 2.0,
            self.panel.y,
            width,
            self.pill_height,
        )
    }

    pub fn expanded_region(&self) -> Rect {
        let (dx, dy) = self.hover_margin;
        self.panel.inset(-dx, -dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityState {
    pub expanded: bool,
    pub visible: bool,
}

impl Default for VisibilityState {
    fn default() -> Self {
        Self {
            expanded: false,
            visible: true,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: VisibilityState,
    idle_timer: Option<JoinHandle<()>>,
    timer_generation: u64,
}

type Shared = Arc<Mutex<Inner>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct VisibilityController {
    inner: Shared,
    idle_timeout: Duration,
}

impl VisibilityController {
    /// Starts collapsed and visible with the idle timer already armed. Must be
    /// called inside a tokio runtime.
    pub fn start(idle_timeout: Duration) -> Self {
        let controller = Self {
            inner: Arc::default(),
            idle_timeout,
        };
        let mut inner = lock(&controller.inner);
        arm_idle_timer(&controller.inner, &mut inner, idle_timeout);
        drop(inner);
        controller
    }

    pub fn state(&self) -> VisibilityState {
        lock(&self.inner).state
    }

    /// Feeds one pointer sample, hit-testing against the region that matters
    /// for the current state.
    pub fn pointer_moved(
        &self,
        point: Point,
        geometry: &HudGeometry,
        has_content: bool,
    ) -> VisibilityState {
        let mut inner = lock(&self.inner);
        if inner.state.expanded {
            if !geometry.expanded_region().contains(point) {
                self.collapse(&mut inner);
            }
        } else if geometry.collapsed_region(has_content).contains(point) {
            expand(&mut inner);
        }
        inner.state
    }

    pub fn pointer_entered(&self) -> VisibilityState {
        let mut inner = lock(&self.inner);
        if !inner.state.expanded {
            expand(&mut inner);
        }
        inner.state
    }

    pub fn pointer_left(&self) -> VisibilityState {
        let mut inner = lock(&self.inner);
        if inner.state.expanded {
            self.collapse(&mut inner);
        }
        inner.state
    }

    fn collapse(&self, inner: &mut Inner) {
        debug!("hud collapsed");
        inner.state.expanded = false;
        arm_idle_timer(&self.inner, inner, self.idle_timeout);
    }
}

impl Drop for VisibilityController {
    fn drop(&mut self) {
        cancel_idle_timer(&mut lock(&self.inner));
    }
}

fn expand(inner: &mut Inner) {
    debug!("hud expanded");
    inner.state.expanded = true;
    inner.state.visible = true;
    cancel_idle_timer(inner);
}

fn cancel_idle_timer(inner: &mut Inner) {
    inner.timer_generation += 1;
    if let Some(timer) = inner.idle_timer.take() {
        timer.abort();
    }
}

fn arm_idle_timer(shared: &Shared, inner: &mut Inner, timeout: Duration) {
    cancel_idle_timer(inner);
    let generation = inner.timer_generation;
    let shared = shared.clone();
    inner.idle_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        on_idle_timeout(&mut lock(&shared), generation);
    }));
}

fn on_idle_timeout(inner: &mut Inner, generation: u64) {
    if inner.timer_generation != generation {
        return;
    }
    inner.idle_timer = None;
    if !inner.state.expanded {
        debug!("hud idle, fading out");
        inner.state.visible = false;
    }
}

// =============================================================================
// DEBUG OVERLAY - frame statistics shown in the window title
// =============================================================================

use std::collections::VecDeque;
use std::time::Duration;

/// Frame times kept for the rolling statistics
const HISTORY: usize = 240;

/// Rolling frame statistics
#[derive(Debug)]
pub struct FrameStats {
    frame_times: VecDeque<Duration>,
    frames_presented: u64,
    swapchain_recreations: u32,
    since_refresh: Duration,
}

/// Snapshot rendered by the overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySnapshot {
    pub fps: f32,
    pub avg_ms: f32,
    pub min_ms: f32,
    pub max_ms: f32,
    pub frames_presented: u64,
    pub swapchain_recreations: u32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(HISTORY),
            frames_presented: 0,
            swapchain_recreations: 0,
            since_refresh: Duration::ZERO,
        }
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one presented frame that took `frame_time` since the previous one
    pub fn record_frame(&mut self, frame_time: Duration) {
        if self.frame_times.len() == HISTORY {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(frame_time);
        self.frames_presented += 1;
        self.since_refresh += frame_time;
    }

    pub fn record_recreation(&mut self) {
        self.swapchain_recreations += 1;
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// True once per `interval` of accumulated frame time
    pub fn should_refresh(&mut self, interval: Duration) -> bool {
        if self.since_refresh >= interval {
            self.since_refresh = Duration::ZERO;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        let count = self.frame_times.len();
        if count == 0 {
            return OverlaySnapshot {
                fps: 0.0,
                avg_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                frames_presented: self.frames_presented,
                swapchain_recreations: self.swapchain_recreations,
            };
        }

        let total: Duration = self.frame_times.iter().sum();
        let avg = total.as_secs_f32() / count as f32;
        let min = self.frame_times.iter().min().copied().unwrap_or_default();
        let max = self.frame_times.iter().max().copied().unwrap_or_default();

        OverlaySnapshot {
            fps: if avg > 0.0 { 1.0 / avg } else { 0.0 },
            avg_ms: avg * 1000.0,
            min_ms: min.as_secs_f32() * 1000.0,
            max_ms: max.as_secs_f32() * 1000.0,
            frames_presented: self.frames_presented,
            swapchain_recreations: self.swapchain_recreations,
        }
    }
}

/// Renderer-side facts the overlay shows next to the timings
#[derive(Debug, Clone, Copy)]
pub struct OverlayContext<'a> {
    pub title: &'a str,
    pub frames_in_flight: usize,
    pub current_slot: usize,
    pub swapchain_images: usize,
    pub fullscreen: bool,
    pub paused: bool,
}

/// Format the overlay line shown in the title bar
pub fn overlay_text(snapshot: &OverlaySnapshot, ctx: &OverlayContext) -> String {
    let mut text = format!(
        "{} - {:.0} FPS ({:.2}ms avg, {:.2}-{:.2}ms) | slot {}/{} in flight / {} images | frame {} | rebuilds {}",
        ctx.title,
        snapshot.fps,
        snapshot.avg_ms,
        snapshot.min_ms,
        snapshot.max_ms,
        ctx.current_slot,
        ctx.frames_in_flight,
        ctx.swapchain_images,
        snapshot.frames_presented,
        snapshot.swapchain_recreations,
    );
    if ctx.paused {
        text.push_str(" | paused");
    }
    text.push_str(if ctx.fullscreen { " [fullscreen]" } else { " [windowed]" });
    text
}

//! Resampler and latency control loop (spec.md §4.8): a variable-ratio
//! linear-interpolating resampler whose ratio is driven by a
//! proportional-integral controller that samples the session's jitter
//! buffer depth every `tick` output frames and steers it toward
//! `target`, saturating at `[1-eps, 1+eps]` with anti-windup (integrator
//! freezes while saturated).
//!
//! No resampling crate appears anywhere in the retrieval pack's
//! dependency lists (see DESIGN.md), so — matching the same
//! trait-seam-over-hand-rolled-algebra approach as the FEC codecs — the
//! interpolation itself is implemented directly behind the
//! [`FrameReader`] trait a real SIMD resampler could later replace
//! without touching the control loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::frame::Frame;
use crate::packet::ChannelMask;
use crate::receiver::{DepthHandle, FrameReader};

/// Proportional-integral control law steering the resampler's ratio
/// toward a target jitter-buffer depth.
#[derive(Debug, Clone)]
pub struct LatencyControl {
    kp: f64,
    ki: f64,
    target: u32,
    eps: f64,
    integrator: f64,
}

impl LatencyControl {
    pub fn new(target: u32, eps: f64, kp: f64, ki: f64) -> Self {
        Self { kp, ki, target, eps, integrator: 0.0 }
    }

    /// Computes the next ratio from the current measured depth. A depth
    /// above target means the buffer is filling faster than it drains —
    /// speed consumption up (ratio > 1) to pull it back down.
    pub fn step(&mut self, depth: u32) -> f64 {
        let error = depth as f64 - self.target as f64;
        let unsaturated = 1.0 + self.kp * error + self.ki * self.integrator;
        let clamped = unsaturated.clamp(1.0 - self.eps, 1.0 + self.eps);

        // Anti-windup: only accumulate the integral term while the
        // output isn't pinned at a saturation bound.
        if clamped == unsaturated {
            self.integrator += error;
        }
        clamped
    }
}

pub struct Resampler<R> {
    inner: R,
    channels: ChannelMask,
    channel_count: usize,
    enabled: bool,
    ratio: f64,
    frac: f64,
    prev: Vec<f32>,
    next: Vec<f32>,
    initialized: bool,
    control: LatencyControl,
    depth: DepthHandle,
    tick_period: usize,
    since_tick: usize,
}

impl<R: FrameReader> Resampler<R> {
    pub fn new(
        inner: R,
        channels: ChannelMask,
        depth: DepthHandle,
        target_samples: u32,
        tick_period: usize,
        enabled: bool,
    ) -> Self {
        let channel_count = crate::packet::channel_count(channels).max(1);
        Self {
            inner,
            channels,
            channel_count,
            enabled,
            ratio: 1.0,
            frac: 0.0,
            prev: vec![0.0; channel_count],
            next: vec![0.0; channel_count],
            initialized: false,
            control: LatencyControl::new(target_samples, 1e-3, 5e-7, 1e-9),
            depth,
            tick_period: tick_period.max(1),
            since_tick: 0,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Drills down to the wrapped [`FrameReader`] (see
    /// [`crate::receiver::delayed::DelayedReader::upstream_mut`]).
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    fn pull_one(&mut self) -> Vec<f32> {
        self.inner.read(1).samples
    }

    fn ensure_initialized(&mut self) {
        if !self.initialized {
            self.prev = self.pull_one();
            self.next = self.pull_one();
            self.initialized = true;
        }
    }

    fn advance_tick(&mut self, frames: usize) {
        if !self.enabled {
            return;
        }
        self.since_tick += frames;
        if self.since_tick >= self.tick_period {
            self.since_tick = 0;
            let depth = self.depth.load(Ordering::Relaxed);
            self.ratio = self.control.step(depth);
            trace!(depth, ratio = self.ratio, "latency control tick");
        }
    }
}

impl<R: FrameReader + Send> FrameReader for Resampler<R> {
    fn read(&mut self, n_frames: usize) -> Frame {
        self.ensure_initialized();

        let mut out = Vec::with_capacity(n_frames * self.channel_count);
        for _ in 0..n_frames {
            for c in 0..self.channel_count {
                let lerped = self.prev[c] as f64 * (1.0 - self.frac) + self.next[c] as f64 * self.frac;
                out.push(lerped as f32);
            }

            self.frac += self.ratio;
            while self.frac >= 1.0 {
                self.prev = std::mem::take(&mut self.next);
                self.next = self.pull_one();
                self.frac -= 1.0;
            }
        }

        self.advance_tick(n_frames);
        Frame { channels: self.channels, samples: out }
    }
}

// ============================================================
// Layer 5 - Learning-Rate Schedule
// ============================================================
// Linear warmup to the peak rate, then half-cosine decay to 0:
//
//   lr
//   peak ┤      ╭──╮
//        │    ╱     ╲
//        │  ╱        ╲
//      0 ┼╱────────────╲──── step
//        0  warmup     total
//
// One call to next_lr() per optimiser step.

use std::f64::consts::PI;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("training would run zero optimisation steps (empty loader or zero epochs)")]
    NoSteps,
}

/// Share of the total steps spent warming up.
pub const WARMUP_RATIO: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct CosineWarmupSchedule {
    pub peak_lr:      f64,
    pub warmup_steps: usize,
    pub total_steps:  usize,
    step:             usize,
}

impl CosineWarmupSchedule {
    pub fn new(peak_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self { peak_lr, warmup_steps, total_steps, step: 0 }
    }

    /// Rate at an arbitrary step; does not advance.
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.peak_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1);
        let progress    = (step - self.warmup_steps) as f64 / decay_steps as f64;
        self.peak_lr * (0.5 * (1.0 + (PI * progress).cos())).max(0.0)
    }

    /// Rate for the current step.
    pub fn current(&self) -> f64 {
        self.lr_at(self.step)
    }

    /// Rate for the current step, then move to the next one.
    pub fn next_lr(&mut self) -> f64 {
        let lr = self.current();
        self.step += 1;
        lr
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

use burn::{
    module::AutodiffModule,
    optim::{AdamWConfig, Optimizer},
    tensor::backend::AutodiffBackend,
};

use crate::ml::scheduler::{CosineWarmupSchedule, ScheduleError, WARMUP_RATIO};

/// Step counts for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationPlan {
    pub total_steps:  usize,
    pub warmup_steps: usize,
}

impl OptimizationPlan {
    pub fn new(batches_per_epoch: usize, epochs: usize) -> Result<Self, ScheduleError> {
        let total_steps = batches_per_epoch * epochs;
        if total_steps == 0 {
            return Err(ScheduleError::NoSteps);
        }
        let warmup_steps = (total_steps as f64 * WARMUP_RATIO).floor() as usize;
        Ok(Self { total_steps, warmup_steps })
    }

    pub fn schedule(&self, peak_lr: f64) -> CosineWarmupSchedule {
        CosineWarmupSchedule::new(peak_lr, self.warmup_steps, self.total_steps)
    }
}

/// AdamW with decoupled weight decay. Frozen parameters never receive
/// gradients, so only adapters and the head are updated.
pub fn adamw<B, M>(weight_decay: f64) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamWConfig::new()
        .with_weight_decay(weight_decay as f32)
        .with_epsilon(1e-8)
        .init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_and_warmup() {
        let plan = OptimizationPlan::new(2, 20).unwrap();
        assert_eq!(plan.total_steps, 40);
        assert_eq!(plan.warmup_steps, 4);
    }

    #[test]
    fn test_warmup_floors() {
        let plan = OptimizationPlan::new(3, 3).unwrap();
        assert_eq!(plan.total_steps, 9);
        assert_eq!(plan.warmup_steps, 0);
    }

    #[test]
    fn test_zero_steps_rejected() {
        assert_eq!(OptimizationPlan::new(0, 5), Err(ScheduleError::NoSteps));
        assert_eq!(OptimizationPlan::new(4, 0), Err(ScheduleError::NoSteps));
    }

    #[test]
    fn test_schedule_uses_plan() {
        let s = OptimizationPlan::new(10, 10).unwrap().schedule(1e-3);
        assert_eq!(s.warmup_steps, 10);
        assert_eq!(s.total_steps, 100);
        assert_eq!(s.peak_lr, 1e-3);
    }
}

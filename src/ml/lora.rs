// ============================================================
// Layer 5 - Low-Rank Adapters
// ============================================================
// A LoraLinear is an ordinary dense layer that can carry a
// low-rank update:
//
//   y = x W + b  +  dropout(x) A B * (alpha / r)
//
//   W [d_in, d_out]  frozen once adapters are attached
//   A [d_in, r]      Kaiming-uniform
//   B [r, d_out]     zeros, so the update starts at exactly 0
//
// Without adapters it behaves exactly like burn's Linear, which
// lets pretrained records load into it before attach_lora() is
// called.

use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig},
    prelude::*,
};

#[derive(Config, Debug)]
pub struct LoraConfig {
    /// Rank r of the update
    #[config(default = 8)]
    pub rank: usize,
    /// Scaling numerator; the update is multiplied by alpha / r
    #[config(default = 16.0)]
    pub alpha: f64,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl LoraConfig {
    pub fn scaling(&self) -> f64 {
        self.alpha / self.rank.max(1) as f64
    }
}

#[derive(Module, Debug)]
pub struct LoraLinear<B: Backend> {
    pub base:    Linear<B>,
    pub lora_a:  Option<Param<Tensor<B, 2>>>,
    pub lora_b:  Option<Param<Tensor<B, 2>>>,
    pub dropout: Dropout,
    pub scaling: f64,
}

impl<B: Backend> LoraLinear<B> {
    /// A plain dense layer with no adapters.
    pub fn new(d_in: usize, d_out: usize, device: &B::Device) -> Self {
        Self {
            base:    LinearConfig::new(d_in, d_out).init(device),
            lora_a:  None,
            lora_b:  None,
            dropout: DropoutConfig::new(0.0).init(),
            scaling: 0.0,
        }
    }

    /// Freeze the dense weights and add trainable A / B matrices.
    pub fn attach_lora(self, cfg: &LoraConfig, device: &B::Device) -> Self {
        let [d_in, d_out] = self.base.weight.dims();
        let rank = cfg.rank;

        let lora_a = Initializer::KaimingUniform { gain: 1.0 / 3.0f64.sqrt(), fan_out_only: false }
            .init_with([d_in, rank], Some(d_in), Some(rank), device);
        let lora_b = Initializer::Zeros.init([rank, d_out], device);

        Self {
            base:    self.base.no_grad(),
            lora_a:  Some(lora_a),
            lora_b:  Some(lora_b),
            dropout: DropoutConfig::new(cfg.dropout).init(),
            scaling: cfg.scaling(),
        }
    }

    pub fn has_adapter(&self) -> bool {
        self.lora_a.is_some() && self.lora_b.is_some()
    }

    /// x: [batch, seq, d_in] -> [batch, seq, d_out]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let out = self.base.forward(x.clone());
        match (&self.lora_a, &self.lora_b) {
            (Some(a), Some(b)) => {
                let update = self
                    .dropout
                    .forward(x)
                    .matmul(a.val().unsqueeze())
                    .matmul(b.val().unsqueeze());
                out + update.mul_scalar(self.scaling)
            }
            _ => out,
        }
    }
}

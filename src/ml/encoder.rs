use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

use crate::ml::lora::{LoraConfig, LoraLinear};

/// Added to attention scores at padded positions before softmax.
const MASK_FILL: f64 = -10_000.0;

/// Transformer stack hyper-parameters (BERT naming).
#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub hidden_size:       usize,
    pub num_layers:        usize,
    pub num_heads:         usize,
    pub intermediate_size: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
}

impl EncoderConfig {
    pub fn init_layers<B: Backend>(&self, device: &B::Device) -> Vec<EncoderLayer<B>> {
        (0..self.num_layers).map(|_| self.init_layer(device)).collect()
    }

    fn init_layer<B: Backend>(&self, device: &B::Device) -> EncoderLayer<B> {
        let d = self.hidden_size;
        let attention = SelfAttention {
            query:     LoraLinear::new(d, d, device),
            key:       LinearConfig::new(d, d).init(device),
            value:     LoraLinear::new(d, d, device),
            output:    LinearConfig::new(d, d).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
            num_heads: self.num_heads,
            head_dim:  d / self.num_heads,
        };
        EncoderLayer {
            attention,
            attention_norm: LayerNormConfig::new(d).with_epsilon(self.layer_norm_eps).init(device),
            intermediate:   LinearConfig::new(d, self.intermediate_size).init(device),
            output:         LinearConfig::new(self.intermediate_size, d).init(device),
            output_norm:    LayerNormConfig::new(d).with_epsilon(self.layer_norm_eps).init(device),
            dropout:        DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Multi-head self-attention whose query and value projections accept
/// low-rank adapters.
#[derive(Module, Debug)]
pub struct SelfAttention<B: Backend> {
    pub query:     LoraLinear<B>,
    pub key:       Linear<B>,
    pub value:     LoraLinear<B>,
    pub output:    Linear<B>,
    pub dropout:   Dropout,
    pub num_heads: usize,
    pub head_dim:  usize,
}

impl<B: Backend> SelfAttention<B> {
    /// x: [batch, seq, hidden]; mask_bias: [batch, 1, 1, seq] (0 or MASK_FILL)
    pub fn forward(&self, x: Tensor<B, 3>, mask_bias: Option<Tensor<B, 4>>) -> Tensor<B, 3> {
        let [batch, seq, hidden] = x.dims();
        let (h, hd) = (self.num_heads, self.head_dim);

        let split = |t: Tensor<B, 3>| t.reshape([batch, seq, h, hd]).swap_dims(1, 2);
        let q = split(self.query.forward(x.clone()));
        let k = split(self.key.forward(x.clone()));
        let v = split(self.value.forward(x));

        // [batch, heads, seq, seq]
        let mut scores = q.matmul(k.transpose()).mul_scalar(1.0 / (hd as f64).sqrt());
        if let Some(bias) = mask_bias {
            scores = scores + bias.expand([batch, h, seq, seq]);
        }
        let probs = self.dropout.forward(activation::softmax(scores, 3));

        let context = probs.matmul(v).swap_dims(1, 2).reshape([batch, seq, hidden]);
        self.output.forward(context)
    }

    pub fn attach_lora(self, cfg: &LoraConfig, device: &B::Device) -> Self {
        Self {
            query: self.query.attach_lora(cfg, device),
            value: self.value.attach_lora(cfg, device),
            ..self
        }
    }
}

/// Post-LN transformer block: attention, add & norm, GELU FFN, add & norm.
#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    pub attention:      SelfAttention<B>,
    pub attention_norm: LayerNorm<B>,
    pub intermediate:   Linear<B>,
    pub output:         Linear<B>,
    pub output_norm:    LayerNorm<B>,
    pub dropout:        Dropout,
}

impl<B: Backend> EncoderLayer<B> {
    pub fn forward(&self, x: Tensor<B, 3>, mask_bias: Option<Tensor<B, 4>>) -> Tensor<B, 3> {
        let attn = self.attention.forward(x.clone(), mask_bias);
        let x    = self.attention_norm.forward(x + self.dropout.forward(attn));

        let ffn = self.output.forward(activation::gelu(self.intermediate.forward(x.clone())));
        self.output_norm.forward(x + self.dropout.forward(ffn))
    }

    /// Freeze everything in the block, then add adapters to query / value.
    pub fn attach_lora(self, cfg: &LoraConfig, device: &B::Device) -> Self {
        let frozen = self.no_grad();
        Self {
            attention: frozen.attention.attach_lora(cfg, device),
            ..frozen
        }
    }
}

/// attention_mask [batch, seq] of 1/0 -> additive bias [batch, 1, 1, seq]
pub fn mask_bias<B: Backend>(attention_mask: Tensor<B, 2, Int>) -> Tensor<B, 4> {
    let [batch, seq] = attention_mask.dims();
    attention_mask
        .float()
        .sub_scalar(1.0)
        .mul_scalar(-MASK_FILL)
        .reshape([batch, 1, 1, seq])
}

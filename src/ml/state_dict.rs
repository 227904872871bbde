// ============================================================
// Layer 5 - Named Parameter Mapping
// ============================================================
// Burn records are nested structs; checkpoints of adapters need
// a flat "dotted.name" -> tensor mapping instead, so the adapter
// filter can select entries by substring and the file can be read
// by any safetensors consumer.
//
// Naming mirrors the module tree, e.g.
//
//   embeddings.word_embeddings.weight
//   layers.3.attention.query.weight
//   layers.3.attention.query.bias
//   layers.3.attention.query.lora_A.weight
//   layers.3.attention.query.lora_B.weight
//   layers.3.output_norm.gamma

use std::collections::BTreeMap;

use anyhow::Result;
use burn::{
    module::Param,
    nn::{Embedding, LayerNorm, Linear},
    prelude::*,
};

use crate::ml::encoder::{EncoderLayer, SelfAttention};
use crate::ml::lora::LoraLinear;
use crate::ml::model::TextEncoder;

/// A host copy of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamTensor {
    pub fn from_tensor<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Self> {
        let data  = tensor.into_data().convert::<f32>();
        let shape = data.shape.clone();
        let values = data
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read parameter data: {e:?}"))?;
        Ok(Self { shape, values })
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }
}

pub type StateDict = BTreeMap<String, ParamTensor>;

/// Modules that can list their parameters under a name prefix.
pub trait NamedParams {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()>;

    fn state_dict(&self) -> Result<StateDict> {
        let mut out = StateDict::new();
        self.collect_params("", &mut out)?;
        Ok(out)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn put<B: Backend, const D: usize>(
    out:   &mut StateDict,
    name:  String,
    param: &Param<Tensor<B, D>>,
) -> Result<()> {
    out.insert(name, ParamTensor::from_tensor(param.val())?);
    Ok(())
}

impl<B: Backend> NamedParams for Linear<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        put(out, join(prefix, "weight"), &self.weight)?;
        if let Some(bias) = &self.bias {
            put(out, join(prefix, "bias"), bias)?;
        }
        Ok(())
    }
}

impl<B: Backend> NamedParams for LayerNorm<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        put(out, join(prefix, "gamma"), &self.gamma)?;
        put(out, join(prefix, "beta"), &self.beta)
    }
}

impl<B: Backend> NamedParams for Embedding<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        put(out, join(prefix, "weight"), &self.weight)
    }
}

impl<B: Backend> NamedParams for LoraLinear<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        // Base weights keep the plain names so "<prefix>.bias" is the
        // sibling the adapter filter looks for
        self.base.collect_params(prefix, out)?;
        if let Some(a) = &self.lora_a {
            put(out, join(prefix, "lora_A.weight"), a)?;
        }
        if let Some(b) = &self.lora_b {
            put(out, join(prefix, "lora_B.weight"), b)?;
        }
        Ok(())
    }
}

impl<B: Backend> NamedParams for SelfAttention<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        self.query.collect_params(&join(prefix, "query"), out)?;
        self.key.collect_params(&join(prefix, "key"), out)?;
        self.value.collect_params(&join(prefix, "value"), out)?;
        self.output.collect_params(&join(prefix, "output"), out)
    }
}

impl<B: Backend> NamedParams for EncoderLayer<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        self.attention.collect_params(&join(prefix, "attention"), out)?;
        self.attention_norm.collect_params(&join(prefix, "attention_norm"), out)?;
        self.intermediate.collect_params(&join(prefix, "intermediate"), out)?;
        self.output.collect_params(&join(prefix, "output"), out)?;
        self.output_norm.collect_params(&join(prefix, "output_norm"), out)
    }
}

impl<B: Backend> NamedParams for TextEncoder<B> {
    fn collect_params(&self, prefix: &str, out: &mut StateDict) -> Result<()> {
        let emb = join(prefix, "embeddings");
        self.word_embeddings.collect_params(&join(&emb, "word_embeddings"), out)?;
        self.position_embeddings.collect_params(&join(&emb, "position_embeddings"), out)?;
        self.embedding_norm.collect_params(&join(&emb, "norm"), out)?;
        for (i, layer) in self.layers.iter().enumerate() {
            layer.collect_params(&join(prefix, &format!("layers.{i}")), out)?;
        }
        Ok(())
    }
}

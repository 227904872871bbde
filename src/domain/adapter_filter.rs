// ============================================================
// Layer 3 - Adapter Weight Filter
// ============================================================
// A fine-tuned checkpoint only needs the parameters that were
// actually trained. Given the full name -> tensor mapping of the
// language encoder, this module keeps the adapter entries and,
// depending on the mode, the bias terms that belong with them.
//
//   mode      keeps
//   ───────   ─────────────────────────────────────────────────
//   none      keys containing "lora_"
//   all       keys containing "lora_" or "bias"
//   LoRA      "lora_" keys + their sibling "<prefix>bias"
//   AdaLoRA   same as LoRA
//   IA3       keys containing "ia3_l"
//
// The sibling of "layers.0.attention.query.lora_A.weight" is
// everything before the first "lora_" plus "bias", i.e.
// "layers.0.attention.query.bias".
//
// The filter is generic over the value type so it works on
// tensors, shapes, or plain numbers in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Substring that marks a low-rank adapter parameter
pub const LORA_MARKER: &str = "lora_";
/// Substring that marks an (IA)^3 scaling vector
pub const IA3_MARKER:  &str = "ia3_l";
/// Substring that marks a bias parameter
pub const BIAS_MARKER: &str = "bias";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("adapter bias mode '{0}' is not implemented (expected none, all, LoRA, AdaLoRA or IA3)")]
    Unsupported(String),
}

/// Which parameters go into an adapter checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasMode {
    None,
    All,
    LoRA,
    AdaLoRA,
    IA3,
}

impl FromStr for BiasMode {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none"    => Ok(Self::None),
            "all"     => Ok(Self::All),
            "LoRA"    => Ok(Self::LoRA),
            "AdaLoRA" => Ok(Self::AdaLoRA),
            "IA3"     => Ok(Self::IA3),
            other     => Err(AdapterError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for BiasMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None    => "none",
            Self::All     => "all",
            Self::LoRA    => "LoRA",
            Self::AdaLoRA => "AdaLoRA",
            Self::IA3     => "IA3",
        };
        f.write_str(s)
    }
}

/// Return the subset of `state` that belongs in an adapter checkpoint.
/// `state` is left untouched; values are cloned into the result.
pub fn peft_state_dict<V: Clone>(
    state: &BTreeMap<String, V>,
    mode:  BiasMode,
) -> BTreeMap<String, V> {
    match mode {
        BiasMode::None => select(state, |k| k.contains(LORA_MARKER)),
        BiasMode::All  => select(state, |k| k.contains(LORA_MARKER) || k.contains(BIAS_MARKER)),
        BiasMode::IA3  => select(state, |k| k.contains(IA3_MARKER)),
        BiasMode::LoRA | BiasMode::AdaLoRA => {
            let mut out = BTreeMap::new();
            for (key, value) in state.iter().filter(|(k, _)| k.contains(LORA_MARKER)) {
                out.insert(key.clone(), value.clone());
                let bias_key = sibling_bias_key(key);
                if let Some(bias) = state.get(&bias_key) {
                    out.insert(bias_key, bias.clone());
                }
            }
            out
        }
    }
}

fn select<V: Clone>(
    state: &BTreeMap<String, V>,
    keep:  impl Fn(&str) -> bool,
) -> BTreeMap<String, V> {
    state
        .iter()
        .filter(|(k, _)| keep(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// "a.b.lora_A.weight" -> "a.b.bias"
fn sibling_bias_key(adapter_key: &str) -> String {
    let prefix = adapter_key.split(LORA_MARKER).next().unwrap_or_default();
    format!("{prefix}{BIAS_MARKER}")
}

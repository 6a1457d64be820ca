//! Cross-attention storage for one example
//!
//! Holds the decoder-to-encoder attention of every layer as one tensor
//! shaped `[heads, output_steps, input_len]`, built from the nested weight
//! lists of the example corpus.

use candle_core::{DType, Device, IndexOp, Tensor};

use crate::error::{AnalysisError, AnalysisResult};

/// Cross-attention weights per layer
#[derive(Debug)]
pub struct CrossAttention {
    token: String,
    /// One tensor per layer: [heads, output_steps, input_len]
    layers: Vec<Tensor>,
    n_heads: usize,
    output_steps: usize,
    input_len: usize,
}

impl CrossAttention {
    /// Build from `layers[layer][head][step][input]`.
    ///
    /// Every layer must have the same head count and every head the same
    /// `output_steps x input_len` matrix. `token` labels errors.
    pub fn from_nested(token: &str, layers: &[Vec<Vec<Vec<f32>>>]) -> AnalysisResult<Self> {
        let malformed = |reason: String| AnalysisError::MalformedAttention {
            token: token.to_string(),
            reason,
        };

        let first_head = layers
            .first()
            .and_then(|heads| heads.first())
            .ok_or_else(|| malformed("no layers or heads".to_string()))?;
        let n_heads = layers[0].len();
        let output_steps = first_head.len();
        let input_len = first_head.first().map_or(0, Vec::len);

        let mut tensors = Vec::with_capacity(layers.len());
        for (layer_idx, heads) in layers.iter().enumerate() {
            if heads.len() != n_heads {
                return Err(malformed(format!(
                    "layer {layer_idx} has {} heads, expected {n_heads}",
                    heads.len()
                )));
            }
            let mut flat = Vec::with_capacity(n_heads * output_steps * input_len);
            for (head_idx, steps) in heads.iter().enumerate() {
                if steps.len() != output_steps {
                    return Err(malformed(format!(
                        "layer {layer_idx} head {head_idx} has {} output steps, expected {output_steps}",
                        steps.len()
                    )));
                }
                for (step_idx, row) in steps.iter().enumerate() {
                    if row.len() != input_len {
                        return Err(malformed(format!(
                            "layer {layer_idx} head {head_idx} step {step_idx} has {} weights, expected {input_len}",
                            row.len()
                        )));
                    }
                    flat.extend_from_slice(row);
                }
            }
            tensors.push(Tensor::from_vec(
                flat,
                (n_heads, output_steps, input_len),
                &Device::Cpu,
            )?);
        }

        Ok(Self {
            token: token.to_string(),
            layers: tensors,
            n_heads,
            output_steps,
            input_len,
        })
    }

    /// Number of layers captured
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn n_heads(&self) -> usize {
        self.n_heads
    }

    pub fn output_steps(&self) -> usize {
        self.output_steps
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Get the attention tensor of a layer: [heads, output_steps, input_len]
    pub fn get_layer(&self, layer: usize) -> Option<&Tensor> {
        self.layers.get(layer)
    }

    /// Attention over the input while producing output step `step`
    pub fn step_weights(&self, layer: usize, head: usize, step: usize) -> AnalysisResult<Vec<f32>> {
        let pattern = self.layers.get(layer).ok_or_else(|| {
            AnalysisError::MalformedAttention {
                token: self.token.clone(),
                reason: format!("layer {layer} out of range ({} layers)", self.layers.len()),
            }
        })?;
        if head >= self.n_heads || step >= self.output_steps {
            return Err(AnalysisError::MalformedAttention {
                token: self.token.clone(),
                reason: format!(
                    "head {head} / step {step} out of range ({} heads, {} steps)",
                    self.n_heads, self.output_steps
                ),
            });
        }
        let row = pattern.i((head, step))?.to_dtype(DType::F32)?;
        Ok(row.to_vec1()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_layers(n_layers: usize, n_heads: usize, steps: usize, input: usize) -> Vec<Vec<Vec<Vec<f32>>>> {
        (0..n_layers)
            .map(|l| {
                (0..n_heads)
                    .map(|h| {
                        (0..steps)
                            .map(|s| vec![(l * 100 + h * 10 + s) as f32; input])
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_cross_attention_shape() {
        let attn = CrossAttention::from_nested("t", &uniform_layers(4, 2, 5, 6)).unwrap();
        assert_eq!(attn.n_layers(), 4);
        assert_eq!(attn.n_heads(), 2);
        assert_eq!(attn.output_steps(), 5);
        assert_eq!(attn.input_len(), 6);
        assert_eq!(attn.get_layer(3).unwrap().dims(), &[2, 5, 6]);
        assert!(attn.get_layer(4).is_none());
    }

    #[test]
    fn test_step_weights() {
        let attn = CrossAttention::from_nested("t", &uniform_layers(2, 2, 3, 4)).unwrap();
        let row = attn.step_weights(1, 1, 2).unwrap();
        assert_eq!(row, vec![112.0; 4]);
        assert!(attn.step_weights(2, 0, 0).is_err());
        assert!(attn.step_weights(0, 0, 3).is_err());
    }

    #[test]
    fn test_ragged_input_rejected() {
        let mut layers = uniform_layers(2, 2, 3, 4);
        layers[1][0][2].pop();
        let err = CrossAttention::from_nested("ragged", &layers).unwrap_err();
        assert!(err.to_string().contains("ragged"));

        let mut layers = uniform_layers(2, 2, 3, 4);
        layers[1].pop();
        assert!(CrossAttention::from_nested("t", &layers).is_err());

        assert!(CrossAttention::from_nested("t", &[]).is_err());
    }
}

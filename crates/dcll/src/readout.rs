//! Fixed random read-out (feedback-alignment) projection.

use tch::{nn, Tensor};

use crate::error::DcllResult;
use crate::init::{linear_bias_limit, xavier_limit};

/// Gradient-frozen linear map from a layer's trace to its local signal.
///
/// Weight and bias are registered as non-trainable variables: checkpoints
/// include them, `trainable_variables()` does not, and they never require
/// grad. Gradients still flow *through* the map into whatever produced its
/// input.
#[derive(Debug)]
pub struct FixedReadout {
    weight: Tensor,
    bias: Tensor,
}

impl FixedReadout {
    /// Register a `[out_features, in_features]` read-out under `path`.
    ///
    /// The weight is uniform in `±√(6/(in_features + out_features))`, the bias
    /// uniform in `±1/√in_features`.
    pub fn new(path: &nn::Path, in_features: usize, out_features: usize) -> DcllResult<Self> {
        let mut weight = path.zeros_no_train("weight", &[out_features as i64, in_features as i64]);
        let mut bias = path.zeros_no_train("bias", &[out_features as i64]);

        let w_limit = xavier_limit(in_features, out_features);
        let b_limit = linear_bias_limit(in_features);
        tch::no_grad(|| -> DcllResult<()> {
            weight.f_uniform_(-w_limit, w_limit)?;
            bias.f_uniform_(-b_limit, b_limit)?;
            Ok(())
        })?;

        Ok(FixedReadout { weight, bias })
    }

    /// `x Wᵀ + b`, before any output nonlinearity.
    pub fn forward(&self, x: &Tensor) -> DcllResult<Tensor> {
        Ok(x.f_linear(&self.weight, Some(&self.bias))?)
    }

    /// `[out_features, in_features]`.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// `[out_features]`.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// The weight transposed, `[in_features, out_features]`: the random
    /// feedback matrix in its usual orientation.
    pub fn feedback_matrix(&self) -> Tensor {
        self.weight.transpose(0, 1)
    }
}

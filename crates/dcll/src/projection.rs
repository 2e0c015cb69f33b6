//! Projection operators shared by the dense and convolutional cells.
//!
//! A cell applies the same weight twice per step: once to the raw input to
//! drive the synaptic current and once to the detached doubly-filtered trace
//! to produce the pseudo-voltage. The [`Projection`] trait is that weight
//! application; the temporal recursion in [`crate::cell`] is written once
//! against it.

use tch::{nn, Device, Kind, Tensor};

use crate::config::{ConvCellConfig, DenseCellConfig};
use crate::error::DcllResult;

/// A learnable map from cell input to cell output.
pub trait Projection {
    /// Rank of the inputs this projection accepts, batch dimension included.
    const INPUT_RANK: usize;

    /// Apply the weight (and bias, if any) to `input`.
    fn project(&self, input: &Tensor) -> DcllResult<Tensor>;

    /// Output shape for an input of shape `input_shape`.
    fn output_shape(&self, input_shape: &[i64], device: Device) -> DcllResult<Vec<i64>>;

    /// The trainable weight.
    fn weight(&self) -> &Tensor;

    /// The trainable bias, when configured.
    fn bias(&self) -> Option<&Tensor>;
}

/// How a projection's parameters are filled when they are registered.
#[derive(Debug, Clone, Copy)]
pub struct ParamInit {
    /// Initialiser for the weight.
    pub weight: nn::Init,
    /// Initialiser for the bias.
    pub bias: nn::Init,
}

impl ParamInit {
    /// Uniform in ±1/√fan_in for both weight and bias.
    pub fn fan_in(fan_in: usize) -> Self {
        let bound = 1.0 / (fan_in.max(1) as f64).sqrt();
        let uniform = nn::Init::Uniform { lo: -bound, up: bound };
        ParamInit { weight: uniform, bias: uniform }
    }

    /// Uniform weight in ±`limit`, zero bias.
    pub fn uniform_zero_bias(limit: f64) -> Self {
        ParamInit { weight: nn::Init::Uniform { lo: -limit, up: limit }, bias: nn::Init::Const(0.0) }
    }
}

// ---------------------------------------------------------------------------
// Affine
// ---------------------------------------------------------------------------

/// `y = x Wᵀ + b` with `W: [out_features, in_features]`.
#[derive(Debug)]
pub struct Affine {
    weight: Tensor,
    bias: Option<Tensor>,
    out_features: i64,
}

impl Affine {
    /// Register `weight` (and `bias`) under `path` as trainable variables.
    pub fn new(path: &nn::Path, cfg: &DenseCellConfig, init: ParamInit) -> Self {
        let out_features = cfg.out_features as i64;
        let weight = path.var("weight", &[out_features, cfg.in_features as i64], init.weight);
        let bias = cfg.bias.then(|| path.var("bias", &[out_features], init.bias));
        Affine { weight, bias, out_features }
    }
}

impl Projection for Affine {
    const INPUT_RANK: usize = 2;

    fn project(&self, input: &Tensor) -> DcllResult<Tensor> {
        Ok(input.f_linear(&self.weight, self.bias.as_ref())?)
    }

    fn output_shape(&self, input_shape: &[i64], _device: Device) -> DcllResult<Vec<i64>> {
        Ok(vec![input_shape[0], self.out_features])
    }

    fn weight(&self) -> &Tensor {
        &self.weight
    }

    fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Conv2dProjection
// ---------------------------------------------------------------------------

/// 2-D convolution with geometry fixed at construction.
///
/// `W: [out_channels, in_channels / groups, k, k]`.
#[derive(Debug)]
pub struct Conv2dProjection {
    weight: Tensor,
    bias: Option<Tensor>,
    stride: i64,
    padding: i64,
    dilation: i64,
    groups: i64,
}

impl Conv2dProjection {
    /// Register `weight` (and `bias`) under `path` as trainable variables.
    ///
    /// `cfg` is expected to be validated; group divisibility is not rechecked.
    pub fn new(path: &nn::Path, cfg: &ConvCellConfig, init: ParamInit) -> Self {
        let out_channels = cfg.out_channels as i64;
        let k = cfg.kernel_size as i64;
        let weight = path.var(
            "weight",
            &[out_channels, (cfg.in_channels / cfg.groups) as i64, k, k],
            init.weight,
        );
        let bias = cfg.bias.then(|| path.var("bias", &[out_channels], init.bias));
        Conv2dProjection {
            weight,
            bias,
            stride: cfg.stride as i64,
            padding: cfg.padding as i64,
            dilation: cfg.dilation as i64,
            groups: cfg.groups as i64,
        }
    }
}

impl Projection for Conv2dProjection {
    const INPUT_RANK: usize = 4;

    fn project(&self, input: &Tensor) -> DcllResult<Tensor> {
        Ok(input.f_conv2d(
            &self.weight,
            self.bias.as_ref(),
            [self.stride, self.stride],
            [self.padding, self.padding],
            [self.dilation, self.dilation],
            self.groups,
        )?)
    }

    /// Discovered by convolving a zero tensor; no closed-form inference.
    fn output_shape(&self, input_shape: &[i64], device: Device) -> DcllResult<Vec<i64>> {
        let dummy = Tensor::zeros(input_shape, (Kind::Float, device));
        let out = tch::no_grad(|| self.project(&dummy))?;
        Ok(out.size())
    }

    fn weight(&self) -> &Tensor {
        &self.weight
    }

    fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

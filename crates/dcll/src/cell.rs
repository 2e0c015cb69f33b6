//! Local cells: the stateful synapse/membrane recursion.
//!
//! # Recursion
//!
//! Given the stored state `(isyn₀, vmem₀, eps0₀, eps1₀)` and an input `x`:
//!
//! ```text
//! isyn   = P(x) + αs · isyn₀
//! vmem   = α · vmem₀ + isyn
//! eps0   = x + αs · eps0₀
//! eps1   = detach(α · eps1₀ + eps0)
//! pv     = P(eps1)
//! spikes = [vmem > 0]
//! ```
//!
//! where `P` is the cell's [`Projection`]. The new state is stored detached,
//! so the only path for gradients out of a step is `pv` into the current
//! weight. Nothing propagates through time.

use tch::{nn, Device, Kind, Tensor};
use tracing::{debug, trace, warn};

use crate::config::{ConvCellConfig, DenseCellConfig};
use crate::error::{DcllError, DcllResult};
use crate::projection::{Affine, Conv2dProjection, ParamInit, Projection};
use crate::state::SynapticState;

/// Fully-connected local cell.
pub type LocalDenseCell = LocalCell<Affine>;

/// Convolutional local cell.
pub type LocalConvCell = LocalCell<Conv2dProjection>;

/// Result of one cell step.
#[derive(Debug)]
pub struct CellOutput {
    /// Binary spikes `[vmem > 0]` as a float tensor, outside the autograd graph.
    pub spikes: Tensor,
    /// Pseudo-voltage `P(eps1)`, differentiable with respect to the cell weight.
    pub pv: Tensor,
}

/// The recursion of a DCLL cell, generic over its projection.
#[derive(Debug)]
pub struct LocalCell<P> {
    projection: P,
    alpha: f64,
    alphas: f64,
    input_dims: Vec<i64>,
    state: Option<SynapticState>,
}

impl LocalCell<Affine> {
    /// Dense cell with weight and bias uniform in ±1/√in_features.
    pub fn dense(path: &nn::Path, cfg: &DenseCellConfig) -> DcllResult<Self> {
        Self::dense_with_init(path, cfg, ParamInit::fan_in(cfg.in_features))
    }

    /// Dense cell with explicit parameter initialisers.
    pub fn dense_with_init(path: &nn::Path, cfg: &DenseCellConfig, init: ParamInit) -> DcllResult<Self> {
        cfg.validate()?;
        let projection = Affine::new(path, cfg, init);
        Ok(LocalCell::from_parts(projection, cfg.alpha, cfg.alphas, vec![cfg.in_features as i64]))
    }

    /// Zero the state for `batch_size` rows.
    pub fn init_state(&mut self, batch_size: i64, device: Device) -> DcllResult<()> {
        let mut shape = vec![batch_size];
        shape.extend_from_slice(&self.input_dims);
        self.allocate(&shape, device)
    }
}

impl LocalCell<Conv2dProjection> {
    /// Convolutional cell with weight and bias uniform in ±1/√fan_in.
    pub fn conv(path: &nn::Path, cfg: &ConvCellConfig) -> DcllResult<Self> {
        Self::conv_with_init(path, cfg, ParamInit::fan_in(cfg.fan_in()))
    }

    /// Convolutional cell with explicit parameter initialisers.
    ///
    /// # Errors
    ///
    /// [`ConfigError::GroupDivisibility`](crate::error::ConfigError::GroupDivisibility)
    /// when either channel count is not a multiple of `groups`.
    pub fn conv_with_init(path: &nn::Path, cfg: &ConvCellConfig, init: ParamInit) -> DcllResult<Self> {
        cfg.validate()?;
        let projection = Conv2dProjection::new(path, cfg, init);
        Ok(LocalCell::from_parts(projection, cfg.alpha, cfg.alphas, vec![cfg.in_channels as i64]))
    }

    /// Zero the state for `batch_size` frames of `height × width`.
    ///
    /// The output shape comes from a dummy convolution.
    pub fn init_state(&mut self, batch_size: i64, height: i64, width: i64, device: Device) -> DcllResult<()> {
        let shape = [batch_size, self.input_dims[0], height, width];
        self.allocate(&shape, device)
    }
}

impl<P: Projection> LocalCell<P> {
    fn from_parts(projection: P, alpha: f64, alphas: f64, input_dims: Vec<i64>) -> Self {
        LocalCell { projection, alpha, alphas, input_dims, state: None }
    }

    /// Advance one time step.
    ///
    /// Allocates state on the first call. When the batch size differs from
    /// the stored state, the state is reallocated as zeros for the new batch
    /// and a warning is logged; this is not an error.
    ///
    /// # Errors
    ///
    /// - [`DcllError::InputRank`] if `input` does not have the expected rank.
    /// - [`DcllError::Tensor`] if libtorch rejects the projection or if the
    ///   non-batch dimensions disagree with the stored state. The previous
    ///   state is kept in that case.
    pub fn forward(&mut self, input: &Tensor) -> DcllResult<CellOutput> {
        let shape = input.size();
        if shape.len() != P::INPUT_RANK {
            return Err(DcllError::input_rank(P::INPUT_RANK, &shape));
        }
        let batch = shape[0];

        let prev = match self.state.take() {
            Some(state) if state.matches_batch(batch) => state,
            Some(state) => {
                warn!(
                    previous = state.batch_size(),
                    current = batch,
                    "batch size changed since last step, reallocating synaptic state"
                );
                self.fresh_state(&shape, input.device())?
            }
            None => {
                debug!(batch, "allocating synaptic state");
                self.fresh_state(&shape, input.device())?
            }
        };

        match self.step(&prev, input) {
            Ok((next, out)) => {
                self.state = Some(next);
                Ok(out)
            }
            Err(e) => {
                self.state = Some(prev);
                Err(e)
            }
        }
    }

    fn step(&self, prev: &SynapticState, input: &Tensor) -> DcllResult<(SynapticState, CellOutput)> {
        let isyn = self.projection.project(input)?.f_add(&(&prev.isyn * self.alphas))?;
        let vmem = (&prev.vmem * self.alpha).f_add(&isyn)?;
        let eps0 = input.f_add(&(&prev.eps0 * self.alphas))?;
        let eps1 = (&prev.eps1 * self.alpha).f_add(&eps0)?.detach();
        let pv = self.projection.project(&eps1)?;
        let spikes = vmem.f_gt(0.0)?.f_to_kind(Kind::Float)?;

        trace!(batch = input.size()[0], "cell step");
        let next = SynapticState::detached(&isyn, &vmem, &eps0, &eps1);
        Ok((next, CellOutput { spikes, pv }))
    }

    fn fresh_state(&self, input_shape: &[i64], device: Device) -> DcllResult<SynapticState> {
        let output_shape = self.projection.output_shape(input_shape, device)?;
        Ok(SynapticState::zeros(input_shape, &output_shape, device))
    }

    fn allocate(&mut self, input_shape: &[i64], device: Device) -> DcllResult<()> {
        self.state = Some(self.fresh_state(input_shape, device)?);
        Ok(())
    }

    /// Output shape of the cell for an input of shape `input_shape`.
    pub fn output_shape(&self, input_shape: &[i64], device: Device) -> DcllResult<Vec<i64>> {
        self.projection.output_shape(input_shape, device)
    }

    /// Current state, `None` before the first step or `init_state`.
    pub fn state(&self) -> Option<&SynapticState> {
        self.state.as_ref()
    }

    /// Drop the state; the next step allocates it again.
    pub fn clear_state(&mut self) {
        self.state = None;
    }

    /// The projection holding the trainable weight and bias.
    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Trainable weight.
    pub fn weight(&self) -> &Tensor {
        self.projection.weight()
    }

    /// Trainable bias, when configured.
    pub fn bias(&self) -> Option<&Tensor> {
        self.projection.bias()
    }

    /// Membrane leak α.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Synaptic leak αs.
    pub fn alphas(&self) -> f64 {
        self.alphas
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

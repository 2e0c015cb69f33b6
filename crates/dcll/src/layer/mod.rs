//! DCLL layers: a local cell plus its fixed read-out.
//!
//! ```text
//! input ──► detach ──► LocalCell ──┬──► spikes ──(pool)──────────────────► spikes
//!                                  │
//!                                  └──► pv ──(σ, pool, flatten)──► FixedReadout ──► σ ──► local_signal
//! ```
//!
//! Both layers own a single `VarStore`. The cell weight and bias are its
//! trainable variables; the read-out is stored alongside them as frozen
//! variables, so an optimizer built from [`LocalLayer::var_store`] never
//! touches it while checkpoints still capture it.

mod conv;
mod dense;

pub use conv::ConvDcllLayer;
pub use dense::DenseDcllLayer;

use std::path::Path;
use tch::{nn, Tensor};

use crate::error::{DcllError, DcllResult};

/// Outputs of a single layer step.
#[derive(Debug)]
pub struct LayerOutput {
    /// Binary spikes (pooled for the convolutional layer), no gradient.
    pub spikes: Tensor,
    /// `σ(readout(·))`, shape `[batch, output_size]`, values in (0, 1).
    /// Differentiable with respect to the cell parameters only.
    pub local_signal: Tensor,
}

/// Common surface of the dense and convolutional layers.
pub trait LocalLayer {
    /// Advance one time step.
    fn forward(&mut self, input: &Tensor) -> DcllResult<LayerOutput>;

    /// Zero the synaptic state for a new sequence of `batch_size` samples.
    fn init_hiddens(&mut self, batch_size: i64) -> DcllResult<()>;

    /// Zeros shaped like this layer's spike output for `batch_size` samples.
    fn zero_output(&self, batch_size: i64) -> Tensor;

    /// Width of the local signal.
    fn output_size(&self) -> usize;

    /// The store holding trainable and frozen variables.
    fn var_store(&self) -> &nn::VarStore;

    /// Mutable access to the store (e.g. to move it to another device).
    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    /// Trainable tensors: the cell weight and, if configured, its bias.
    fn trainable_variables(&self) -> Vec<Tensor> {
        self.var_store().trainable_variables()
    }

    /// Number of trainable scalars.
    fn num_parameters(&self) -> usize {
        self.var_store().trainable_variables().iter().map(|t| t.numel() as usize).sum()
    }

    /// Save every variable, frozen read-out included, to `path`.
    fn save(&self, path: &Path) -> DcllResult<()> {
        self.var_store().save(path).map_err(|e| DcllError::checkpoint(path, e))
    }

    /// Load every variable from a checkpoint written by [`LocalLayer::save`].
    ///
    /// Synaptic state is left untouched.
    fn load(&mut self, path: &Path) -> DcllResult<()> {
        self.var_store_mut().load(path).map_err(|e| DcllError::checkpoint(path, e))
    }
}

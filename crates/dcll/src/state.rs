//! Synaptic state carried by a local cell between time steps.

use tch::{Device, Kind, Tensor};

/// Filtered traces of one cell for one batch.
///
/// `isyn` and `vmem` have the cell's output shape, `eps0` and `eps1` the
/// input shape. All four share the batch dimension and never carry gradient
/// history.
#[derive(Debug)]
pub struct SynapticState {
    /// Filtered synaptic current.
    pub isyn: Tensor,
    /// Filtered membrane potential.
    pub vmem: Tensor,
    /// Filtered input trace.
    pub eps0: Tensor,
    /// Doubly-filtered input trace.
    pub eps1: Tensor,
}

impl SynapticState {
    /// Zero state for the given input and output shapes.
    pub fn zeros(input_shape: &[i64], output_shape: &[i64], device: Device) -> Self {
        let opts = (Kind::Float, device);
        SynapticState {
            isyn: Tensor::zeros(output_shape, opts),
            vmem: Tensor::zeros(output_shape, opts),
            eps0: Tensor::zeros(input_shape, opts),
            eps1: Tensor::zeros(input_shape, opts),
        }
    }

    /// Build a state from freshly computed traces, cutting their gradient history.
    pub(crate) fn detached(isyn: &Tensor, vmem: &Tensor, eps0: &Tensor, eps1: &Tensor) -> Self {
        SynapticState { isyn: isyn.detach(), vmem: vmem.detach(), eps0: eps0.detach(), eps1: eps1.detach() }
    }

    /// Batch dimension of `isyn`.
    pub fn batch_size(&self) -> i64 {
        leading_dim(&self.isyn)
    }

    /// `true` when every field's leading dimension equals `batch`.
    pub fn matches_batch(&self, batch: i64) -> bool {
        [&self.isyn, &self.vmem, &self.eps0, &self.eps1]
            .iter()
            .all(|t| leading_dim(t) == batch)
    }

    /// Deep copy of all four traces.
    pub fn snapshot(&self) -> Self {
        SynapticState {
            isyn: self.isyn.copy(),
            vmem: self.vmem.copy(),
            eps0: self.eps0.copy(),
            eps1: self.eps1.copy(),
        }
    }

    /// Iterate over `(name, tensor)` pairs.
    pub fn fields(&self) -> [(&'static str, &Tensor); 4] {
        [("isyn", &self.isyn), ("vmem", &self.vmem), ("eps0", &self.eps0), ("eps1", &self.eps1)]
    }
}

fn leading_dim(t: &Tensor) -> i64 {
    t.size().first().copied().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_have_requested_shapes() {
        let state = SynapticState::zeros(&[3, 5], &[3, 2], Device::Cpu);
        assert_eq!(state.isyn.size(), vec![3, 2]);
        assert_eq!(state.vmem.size(), vec![3, 2]);
        assert_eq!(state.eps0.size(), vec![3, 5]);
        assert_eq!(state.eps1.size(), vec![3, 5]);
        assert_eq!(state.batch_size(), 3);
        assert!(state.matches_batch(3));
        assert!(!state.matches_batch(4));
    }

    #[test]
    fn detached_state_drops_grad() {
        let w = Tensor::ones([2, 2], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let y = &w * 2.0;
        assert!(y.requires_grad());
        let state = SynapticState::detached(&y, &y, &y, &y);
        for (name, t) in state.fields() {
            assert!(!t.requires_grad(), "{name} must not require grad");
        }
    }

    #[test]
    fn mismatched_field_fails_batch_check() {
        let mut state = SynapticState::zeros(&[2, 4], &[2, 4], Device::Cpu);
        state.eps1 = Tensor::zeros([3, 4], (Kind::Float, Device::Cpu));
        assert!(!state.matches_batch(2));
    }

    #[test]
    fn snapshot_is_independent() {
        let state = SynapticState::zeros(&[1, 2], &[1, 2], Device::Cpu);
        let snap = state.snapshot();
        let _ = state.isyn.shallow_clone().fill_(1.0);
        assert_eq!(snap.isyn.sum(Kind::Float).double_value(&[]), 0.0);
    }
}

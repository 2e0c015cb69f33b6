//! Integration tests for [`dcll::cell`].
//!
//! All inputs are built from fixed values; parameter initialisation is
//! seeded with `tch::manual_seed` so every run draws the same weights.

use dcll::{ConvCellConfig, DenseCellConfig, LocalCell, Projection};
use tch::{nn, Device, Kind, Tensor};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cpu() -> Device {
    Device::Cpu
}

fn max_abs(t: &Tensor) -> f64 {
    t.abs().max().double_value(&[])
}

// ---------------------------------------------------------------------------
// Temporal dynamics
// ---------------------------------------------------------------------------

/// A single impulse followed by silence decays the synaptic current by αs
/// per step when the projection has no bias.
#[test]
fn impulse_decays_geometrically_without_bias() {
    tch::manual_seed(7);
    let vs = nn::VarStore::new(cpu());
    let cfg = DenseCellConfig { in_features: 5, out_features: 4, bias: false, alpha: 0.9, alphas: 0.8 };
    let mut cell = LocalCell::dense(&vs.root(), &cfg).unwrap();

    let impulse = Tensor::ones([2, 5], (Kind::Float, cpu()));
    let silence = Tensor::zeros([2, 5], (Kind::Float, cpu()));

    cell.forward(&impulse).unwrap();
    let isyn0 = cell.state().unwrap().isyn.abs();
    assert!(max_abs(&isyn0) > 0.0, "impulse must drive the synaptic current");

    for t in 1..=6 {
        cell.forward(&silence).unwrap();
        let expected = &isyn0 * 0.8f64.powi(t);
        let actual = cell.state().unwrap().isyn.abs();
        let err = max_abs(&(actual - expected));
        assert!(err < 1e-5, "step {t}: |isyn| deviates from αs^t decay by {err}");
    }
}

/// From a fresh state, all-zero input keeps every trace at zero and never
/// spikes, for several choices of decay constants.
#[test]
fn zero_input_is_a_fixed_point() {
    for &(alpha, alphas) in &[(0.9, 0.85), (0.5, 0.5), (0.01, 0.99)] {
        tch::manual_seed(11);
        let vs = nn::VarStore::new(cpu());
        let cfg = DenseCellConfig { in_features: 6, out_features: 3, bias: false, alpha, alphas };
        let mut cell = LocalCell::dense(&vs.root(), &cfg).unwrap();
        cell.init_state(4, cpu()).unwrap();

        let zeros = Tensor::zeros([4, 6], (Kind::Float, cpu()));
        for _ in 0..10 {
            let out = cell.forward(&zeros).unwrap();
            assert_eq!(max_abs(&out.spikes), 0.0);
        }
        for (name, t) in cell.state().unwrap().fields() {
            assert_eq!(max_abs(t), 0.0, "{name} drifted from zero with α={alpha}, αs={alphas}");
        }
    }
}

/// The membrane integrates a constant drive: with positive weights and a
/// positive input the cell starts spiking and keeps spiking.
#[test]
fn constant_positive_drive_produces_spikes() {
    let vs = nn::VarStore::new(cpu());
    let cfg = DenseCellConfig { in_features: 2, out_features: 2, bias: false, ..Default::default() };
    let init = dcll::ParamInit { weight: nn::Init::Const(0.5), bias: nn::Init::Const(0.0) };
    let mut cell = LocalCell::dense_with_init(&vs.root(), &cfg, init).unwrap();

    let x = Tensor::ones([1, 2], (Kind::Float, cpu()));
    for _ in 0..3 {
        let out = cell.forward(&x).unwrap();
        assert_eq!(out.spikes.sum(Kind::Float).double_value(&[]), 2.0);
    }
}

// ---------------------------------------------------------------------------
// Batch-size drift
// ---------------------------------------------------------------------------

/// Changing the batch size reallocates all four traces for the new batch.
#[test]
fn batch_change_reallocates_dense_state() {
    tch::manual_seed(0);
    let vs = nn::VarStore::new(cpu());
    let cfg = DenseCellConfig { in_features: 3, out_features: 2, ..Default::default() };
    let mut cell = LocalCell::dense(&vs.root(), &cfg).unwrap();

    cell.forward(&Tensor::ones([4, 3], (Kind::Float, cpu()))).unwrap();
    assert_eq!(cell.state().unwrap().batch_size(), 4);

    let out = cell.forward(&Tensor::zeros([7, 3], (Kind::Float, cpu()))).unwrap();
    assert_eq!(out.spikes.size(), vec![7, 2]);

    let state = cell.state().unwrap();
    assert!(state.matches_batch(7));
    // Zero input on a zeroed state only leaves the bias in the current.
    assert_eq!(max_abs(&state.eps0), 0.0);
    assert_eq!(max_abs(&state.eps1), 0.0);
}

/// The convolutional cell reallocates using the incoming frame size.
#[test]
fn batch_change_reallocates_conv_state() {
    let vs = nn::VarStore::new(cpu());
    let cfg = ConvCellConfig { in_channels: 2, out_channels: 4, kernel_size: 3, padding: 1, ..Default::default() };
    let mut cell = LocalCell::conv(&vs.root(), &cfg).unwrap();
    cell.init_state(2, 6, 6, cpu()).unwrap();

    let out = cell.forward(&Tensor::ones([3, 2, 5, 7], (Kind::Float, cpu()))).unwrap();
    assert_eq!(out.spikes.size(), vec![3, 4, 5, 7]);
    assert_eq!(out.pv.size(), vec![3, 4, 5, 7]);

    let state = cell.state().unwrap();
    assert_eq!(state.isyn.size(), vec![3, 4, 5, 7]);
    assert_eq!(state.eps1.size(), vec![3, 2, 5, 7]);
}

// ---------------------------------------------------------------------------
// State management and initialisation
// ---------------------------------------------------------------------------

/// After `clear_state` the next step allocates fresh zero traces.
#[test]
fn clear_state_restarts_from_zero() {
    tch::manual_seed(4);
    let vs = nn::VarStore::new(cpu());
    let cfg = DenseCellConfig { in_features: 3, out_features: 2, bias: false, ..Default::default() };
    let mut cell = LocalCell::dense(&vs.root(), &cfg).unwrap();

    let x = Tensor::ones([2, 3], (Kind::Float, cpu()));
    cell.forward(&x).unwrap();
    cell.forward(&x).unwrap();
    assert!(max_abs(&cell.state().unwrap().eps1) > 0.0);

    cell.clear_state();
    assert!(cell.state().is_none());

    cell.forward(&x).unwrap();
    let state = cell.state().unwrap();
    // One step from zero: eps0 = eps1 = x.
    assert_eq!(max_abs(&(&state.eps0 - &x)), 0.0);
    assert_eq!(max_abs(&(&state.eps1 - &x)), 0.0);
}

/// The projection accessor exposes the same parameters as the cell.
#[test]
fn projection_shares_cell_parameters() {
    let vs = nn::VarStore::new(cpu());
    let cfg = ConvCellConfig { in_channels: 2, out_channels: 4, kernel_size: 3, padding: 1, ..Default::default() };
    let cell = LocalCell::conv(&vs.root(), &cfg).unwrap();

    assert!(cell.projection().weight().equal(cell.weight()));
    assert_eq!(cell.projection().bias().map(Tensor::size), Some(vec![4]));
    assert_eq!(cell.alpha(), cfg.alpha);
    assert_eq!(cell.alphas(), cfg.alphas);
}

/// Default conv init is bounded by 1/√(in_channels·k²), whatever the grouping.
#[test]
fn grouped_conv_default_init_uses_full_input_fan_in() {
    tch::manual_seed(8);
    let vs = nn::VarStore::new(cpu());
    let cfg = ConvCellConfig { in_channels: 4, out_channels: 8, kernel_size: 3, groups: 4, ..Default::default() };
    let cell = LocalCell::conv(&vs.root(), &cfg).unwrap();

    let bound = 1.0 / ((4 * 3 * 3) as f64).sqrt();
    assert_eq!(cell.weight().size(), vec![8, 1, 3, 3]);
    assert!(max_abs(cell.weight()) <= bound * (1.0 + 1e-6));
    assert!(max_abs(cell.bias().unwrap()) <= bound * (1.0 + 1e-6));
}

// ---------------------------------------------------------------------------
// Gradient routing
// ---------------------------------------------------------------------------

/// Only the pseudo-voltage carries gradient, and only into the current
/// weight; spikes and stored traces are outside the graph.
#[test]
fn gradient_flows_only_through_pseudo_voltage() {
    tch::manual_seed(2);
    let vs = nn::VarStore::new(cpu());
    let cfg = DenseCellConfig { in_features: 3, out_features: 2, ..Default::default() };
    let mut cell = LocalCell::dense(&vs.root(), &cfg).unwrap();

    let x = Tensor::ones([2, 3], (Kind::Float, cpu()));
    cell.forward(&x).unwrap();
    let out = cell.forward(&x).unwrap();

    assert!(out.pv.requires_grad());
    assert!(!out.spikes.requires_grad());
    for (name, t) in cell.state().unwrap().fields() {
        assert!(!t.requires_grad(), "{name} must be detached");
    }

    out.pv.sum(Kind::Float).backward();
    let grad = cell.weight().grad();
    assert!(grad.defined());

    // d(sum pv)/dW = column sums of eps1, identical for every output row.
    let eps1_sum = cell.state().unwrap().eps1.sum_dim_intlist([0i64].as_slice(), false, Kind::Float);
    let expected = eps1_sum.unsqueeze(0).expand([2, 3], false);
    assert!(max_abs(&(grad - expected)) < 1e-5);
}

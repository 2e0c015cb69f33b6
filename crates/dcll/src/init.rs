//! Initialisation bounds used when a DCLL layer is built.
//!
//! The cell weights start almost at zero so the local signal initially sits
//! at the read-out bias point. The dense bound scales with fan-in while the
//! convolutional bound is a fixed constant.

/// Numerator of the near-zero cell-weight bounds.
pub const TINY_VARIANCE: f64 = 1e-32;

/// Fixed cell-weight bound of the convolutional layer, independent of fan-in.
pub const CONV_CELL_LIMIT: f64 = TINY_VARIANCE;

/// Xavier-style bound `√(6 / (fan_in + fan_out))` for the read-out weight.
pub fn xavier_limit(fan_in: usize, fan_out: usize) -> f64 {
    (6.0 / (fan_in + fan_out) as f64).sqrt()
}

/// Dense cell-weight bound `√(1e-32 / (out_features + in_features))`.
pub fn dense_cell_limit(in_features: usize, out_features: usize) -> f64 {
    (TINY_VARIANCE / (out_features + in_features) as f64).sqrt()
}

/// Default bias bound of a linear map with `fan_in` inputs, `1/√fan_in`.
pub fn linear_bias_limit(fan_in: usize) -> f64 {
    1.0 / (fan_in.max(1) as f64).sqrt()
}

//! # DCLL: Deep Continuous Local Learning layers
//!
//! Spiking layers that keep exponentially filtered state across time steps
//! and emit, at every step, binary spikes together with a local learning
//! signal. Each layer owns a fixed random read-out that maps a low-pass
//! trace of its activity to a target-comparable signal, so a per-layer loss
//! can train it without backpropagation through time or across layers.
//!
//! ## Architecture
//!
//! ```text
//! DenseLayerConfig ──► DenseDcllLayer ──► LocalCell<Affine>           ──► FixedReadout
//! ConvLayerConfig  ──► ConvDcllLayer  ──► LocalCell<Conv2dProjection> ──► max-pool ──► FixedReadout
//!                                              │
//!                                        SynapticState (isyn, vmem, eps0, eps1)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dcll::{DenseDcllLayer, DenseLayerConfig, LocalLayer};
//! use tch::{Device, Kind, Tensor};
//!
//! let cfg = DenseLayerConfig::new(4, 3, 2);
//! let mut layer = DenseDcllLayer::new(&cfg, Device::Cpu).expect("valid config");
//! layer.init_hiddens(8).expect("state allocated");
//!
//! for _ in 0..5 {
//!     let frame = Tensor::ones([8, 4], (Kind::Float, Device::Cpu));
//!     let out = layer.forward(&frame).expect("forward step");
//!     assert_eq!(out.local_signal.size(), vec![8, 2]);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cell;
pub mod config;
pub mod error;
pub mod init;
pub mod layer;
pub mod projection;
pub mod readout;
pub mod state;

// Convenient re-exports at the crate root.
pub use cell::{CellOutput, LocalCell, LocalConvCell, LocalDenseCell};
pub use config::{ConvCellConfig, ConvLayerConfig, DenseCellConfig, DenseLayerConfig};
pub use error::{ConfigError, DcllError, DcllResult};
pub use layer::{ConvDcllLayer, DenseDcllLayer, LayerOutput, LocalLayer};
pub use projection::{Affine, Conv2dProjection, ParamInit, Projection};
pub use readout::FixedReadout;
pub use state::SynapticState;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Construction parameters for DCLL cells and layers.
//!
//! Every struct here has a [`Default`] matching the reference experiments,
//! a `validate()` that reports the first incoherent field, and JSON
//! round-tripping through [`serde`] so a layer description can be stored
//! next to its checkpoint.
//!
//! # Example
//!
//! ```rust
//! use dcll::config::DenseLayerConfig;
//!
//! let mut cfg = DenseLayerConfig::default();
//! cfg.cell.in_features = 4;
//! cfg.cell.out_features = 3;
//! cfg.output_size = Some(2);
//! cfg.validate().expect("config is valid");
//! assert_eq!(cfg.output_size(), 2);
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Cell configurations
// ---------------------------------------------------------------------------

/// Parameters of a fully-connected local cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseCellConfig {
    /// Width of the input vector. Default: **784**.
    pub in_features: usize,

    /// Number of neurons in the cell. Default: **100**.
    pub out_features: usize,

    /// Whether the affine projection carries a bias. Default: **true**.
    pub bias: bool,

    /// Membrane leak α, strictly inside (0, 1). Default: **0.9**.
    pub alpha: f64,

    /// Synaptic leak αs, strictly inside (0, 1). Default: **0.85**.
    pub alphas: f64,
}

impl Default for DenseCellConfig {
    fn default() -> Self {
        DenseCellConfig { in_features: 784, out_features: 100, bias: true, alpha: 0.9, alphas: 0.85 }
    }
}

impl DenseCellConfig {
    /// Validate feature counts and decay constants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("in_features", self.in_features)?;
        positive("out_features", self.out_features)?;
        decay("alpha", self.alpha)?;
        decay("alphas", self.alphas)?;
        Ok(())
    }
}

/// Parameters of a convolutional local cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvCellConfig {
    /// Input channels. Default: **1**.
    pub in_channels: usize,

    /// Output channels. Default: **16**.
    pub out_channels: usize,

    /// Square kernel side length. Default: **5**.
    pub kernel_size: usize,

    /// Convolution stride. Default: **1**.
    pub stride: usize,

    /// Zero padding on each spatial border. Default: **2**.
    pub padding: usize,

    /// Kernel dilation. Default: **1**.
    pub dilation: usize,

    /// Number of blocked connections from input to output channels.
    /// Both channel counts must be divisible by it. Default: **1**.
    pub groups: usize,

    /// Whether the convolution carries a bias. Default: **true**.
    pub bias: bool,

    /// Membrane leak α. Default: **0.95**.
    pub alpha: f64,

    /// Synaptic leak αs. Default: **0.9**.
    pub alphas: f64,
}

impl Default for ConvCellConfig {
    fn default() -> Self {
        ConvCellConfig {
            in_channels: 1,
            out_channels: 16,
            kernel_size: 5,
            stride: 1,
            padding: 2,
            dilation: 1,
            groups: 1,
            bias: true,
            alpha: 0.95,
            alphas: 0.9,
        }
    }
}

impl ConvCellConfig {
    /// Validate geometry, group divisibility and decay constants.
    ///
    /// # Validated invariants
    ///
    /// - Channel counts, kernel size, stride, dilation and groups are >= 1.
    /// - `in_channels` and `out_channels` are multiples of `groups`.
    /// - `alpha` and `alphas` lie strictly inside (0, 1).
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("in_channels", self.in_channels)?;
        positive("out_channels", self.out_channels)?;
        positive("kernel_size", self.kernel_size)?;
        positive("stride", self.stride)?;
        positive("dilation", self.dilation)?;
        positive("groups", self.groups)?;

        if self.in_channels % self.groups != 0 {
            return Err(ConfigError::GroupDivisibility {
                field: "in_channels",
                channels: self.in_channels,
                groups: self.groups,
            });
        }
        if self.out_channels % self.groups != 0 {
            return Err(ConfigError::GroupDivisibility {
                field: "out_channels",
                channels: self.out_channels,
                groups: self.groups,
            });
        }

        decay("alpha", self.alpha)?;
        decay("alphas", self.alphas)?;
        Ok(())
    }

    /// Fan-in used for the default initialisation bound: `in_channels * k * k`.
    ///
    /// Grouping is not taken into account, so grouped convolutions start with
    /// the same bound as their ungrouped counterpart.
    pub fn fan_in(&self) -> usize {
        self.in_channels * self.kernel_size * self.kernel_size
    }
}

// ---------------------------------------------------------------------------
// Layer configurations
// ---------------------------------------------------------------------------

/// Parameters of a [`DenseDcllLayer`](crate::layer::DenseDcllLayer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DenseLayerConfig {
    /// The wrapped cell.
    pub cell: DenseCellConfig,

    /// Width of the local signal. `None` means `cell.out_features`.
    #[serde(default)]
    pub output_size: Option<usize>,
}

impl DenseLayerConfig {
    /// Build a config from the three sizes, keeping default decay constants.
    pub fn new(in_features: usize, out_features: usize, output_size: usize) -> Self {
        DenseLayerConfig {
            cell: DenseCellConfig { in_features, out_features, ..Default::default() },
            output_size: Some(output_size),
        }
    }

    /// Effective local-signal width.
    pub fn output_size(&self) -> usize {
        self.output_size.unwrap_or(self.cell.out_features)
    }

    /// Validate the cell and the read-out width.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cell.validate()?;
        if self.output_size == Some(0) {
            return Err(ConfigError::invalid_value("output_size", "must be > 0"));
        }
        Ok(())
    }

    /// Load and validate a config from a JSON file.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let cfg: Self = read_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config as pretty-printed JSON, creating parent directories.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(self, path)
    }
}

/// Parameters of a [`ConvDcllLayer`](crate::layer::ConvDcllLayer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvLayerConfig {
    /// The wrapped cell.
    pub cell: ConvCellConfig,

    /// Input frame width used for `init_hiddens` and read-out sizing. Default: **28**.
    pub im_width: usize,

    /// Input frame height. Default: **28**.
    pub im_height: usize,

    /// Max-pooling kernel and stride. `1` disables pooling. Default: **1**.
    pub pooling: usize,

    /// Width of the local signal. Default: **10**.
    pub output_size: usize,
}

impl Default for ConvLayerConfig {
    fn default() -> Self {
        ConvLayerConfig {
            cell: ConvCellConfig::default(),
            im_width: 28,
            im_height: 28,
            pooling: 1,
            output_size: 10,
        }
    }
}

impl ConvLayerConfig {
    /// Validate the cell, the frame size, pooling and the read-out width.
    ///
    /// Whether the pooled feature map is non-empty depends on the convolution
    /// geometry and is checked when the layer is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cell.validate()?;
        positive("im_width", self.im_width)?;
        positive("im_height", self.im_height)?;
        positive("pooling", self.pooling)?;
        positive("output_size", self.output_size)?;
        Ok(())
    }

    /// Load and validate a config from a JSON file.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let cfg: Self = read_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this config as pretty-printed JSON, creating parent directories.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(self, path)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid_value(field, "must be > 0"));
    }
    Ok(())
}

fn decay(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value < 1.0) {
        return Err(ConfigError::invalid_value(field, format!("must be in (0.0, 1.0), got {value}")));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
    serde_json::from_str(&contents)
        .map_err(|source| ConfigError::ParseError { path: path.to_path_buf(), source })
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| ConfigError::FileWrite { path: parent.to_path_buf(), source })?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
    std::fs::write(path, json)
        .map_err(|source| ConfigError::FileWrite { path: path.to_path_buf(), source })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Error types for the DCLL layers.
//!
//! Every module that can fail imports its error type from here, keeping the
//! hierarchy in one place.
//!
//! ## Hierarchy
//!
//! ```text
//! DcllError (top-level)
//! ├── ConfigError   (construction-time validation / config file I/O)
//! ├── TchError      (shape and engine errors raised by libtorch)
//! ├── InputRank     (input tensor has the wrong number of dimensions)
//! └── Checkpoint    (VarStore save / load)
//! ```
//!
//! A change of batch size between two forward calls is deliberately *not* an
//! error: the cell reallocates its state and logs a warning instead.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DcllResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used throughout the crate.
pub type DcllResult<T> = Result<T, DcllError>;

// ---------------------------------------------------------------------------
// DcllError: top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for cells and layers.
#[derive(Debug, Error)]
pub enum DcllError {
    /// The layer or cell configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The tensor engine rejected an operation (typically a shape mismatch
    /// between the input and the layer weights).
    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),

    /// The input tensor does not have the rank the cell expects.
    #[error("Expected a {expected}-D input, got {actual}-D tensor of shape {shape:?}")]
    InputRank {
        /// Rank the cell was built for.
        expected: usize,
        /// Rank of the offending input.
        actual: usize,
        /// Full shape of the offending input.
        shape: Vec<i64>,
    },

    /// A checkpoint could not be saved or loaded.
    #[error("Checkpoint error at `{path}`: {source}")]
    Checkpoint {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying libtorch error.
        #[source]
        source: tch::TchError,
    },
}

impl DcllError {
    /// Construct a [`DcllError::InputRank`].
    pub fn input_rank(expected: usize, shape: &[i64]) -> Self {
        DcllError::InputRank { expected, actual: shape.len(), shape: shape.to_vec() }
    }

    /// Construct a [`DcllError::Checkpoint`].
    pub fn checkpoint(path: impl Into<PathBuf>, source: tch::TchError) -> Self {
        DcllError::Checkpoint { path: path.into(), source }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when validating or loading a layer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A channel count is not a multiple of the convolution group count.
    #[error("`{field}` ({channels}) must be divisible by groups ({groups})")]
    GroupDivisibility {
        /// Which channel count failed (`in_channels` or `out_channels`).
        field: &'static str,
        /// The channel count.
        channels: usize,
        /// The configured group count.
        groups: usize,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file or its parent directory could not be written.
    #[error("Cannot write config file `{path}`: {source}")]
    FileWrite {
        /// Path that was being written or created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_rank_records_shape() {
        let err = DcllError::input_rank(4, &[2, 8]);
        match err {
            DcllError::InputRank { expected, actual, shape } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
                assert_eq!(shape, vec![2, 8]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn config_error_converts_into_top_level() {
        let err: DcllError = ConfigError::invalid_value("alpha", "must be in (0, 1)").into();
        assert!(matches!(err, DcllError::Config(ConfigError::InvalidValue { field: "alpha", .. })));
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn group_divisibility_message_names_field() {
        let err = ConfigError::GroupDivisibility { field: "in_channels", channels: 3, groups: 2 };
        assert_eq!(err.to_string(), "`in_channels` (3) must be divisible by groups (2)");
    }
}

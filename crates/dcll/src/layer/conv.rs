//! Convolutional DCLL layer.

use tch::{nn, Device, Kind, Tensor};
use tracing::debug;

use super::{LayerOutput, LocalLayer};
use crate::cell::{CellOutput, LocalCell, LocalConvCell};
use crate::config::ConvLayerConfig;
use crate::error::{ConfigError, DcllResult};
use crate::init::CONV_CELL_LIMIT;
use crate::projection::ParamInit;
use crate::readout::FixedReadout;

/// [`LocalConvCell`] followed by max pooling, a frozen read-out and a sigmoid.
///
/// Pooling (kernel = stride = `pooling`) is applied to the spikes and to
/// `σ(pv)` before it is flattened into the read-out. The cell weight starts
/// uniform in ±1e-32 regardless of fan-in, and the cell bias at zero.
pub struct ConvDcllLayer {
    vs: nn::VarStore,
    config: ConvLayerConfig,
    cell: LocalConvCell,
    readout: FixedReadout,
    /// `[out_channels, H'/p, W'/p]` for the configured frame size.
    pooled_dims: [i64; 3],
}

impl ConvDcllLayer {
    /// Build a layer on `device`.
    ///
    /// The read-out width is derived from a dummy convolution over a
    /// `im_height × im_width` frame followed by pooling.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::GroupDivisibility`] if channels are not multiples of `groups`.
    /// - [`ConfigError::InvalidValue`] if the pooled feature map is empty.
    pub fn new(config: &ConvLayerConfig, device: Device) -> DcllResult<Self> {
        config.validate()?;
        let vs = nn::VarStore::new(device);
        let cfg = &config.cell;
        let pooling = config.pooling as i64;

        let cell = LocalCell::conv_with_init(
            &(vs.root() / "i2h"),
            cfg,
            ParamInit::uniform_zero_bias(CONV_CELL_LIMIT),
        )?;

        let frame = [1, cfg.in_channels as i64, config.im_height as i64, config.im_width as i64];
        let conv_shape = cell.output_shape(&frame, device)?;
        let pooled_dims = [conv_shape[1], conv_shape[2] / pooling, conv_shape[3] / pooling];
        if pooled_dims[1] == 0 || pooled_dims[2] == 0 {
            return Err(ConfigError::invalid_value(
                "pooling",
                format!(
                    "pooling {} leaves no features on a {}x{} feature map",
                    pooling, conv_shape[2], conv_shape[3]
                ),
            )
            .into());
        }
        let features = pooled_dims.iter().product::<i64>() as usize;
        let readout = FixedReadout::new(&(vs.root() / "i2o"), features, config.output_size)?;

        debug!(
            in_channels = cfg.in_channels,
            out_channels = cfg.out_channels,
            features,
            output_size = config.output_size,
            "built convolutional DCLL layer"
        );
        Ok(ConvDcllLayer { vs, config: config.clone(), cell, readout, pooled_dims })
    }

    /// The configuration this layer was built from.
    pub fn config(&self) -> &ConvLayerConfig {
        &self.config
    }

    /// The wrapped cell (parameters and synaptic state).
    pub fn cell(&self) -> &LocalConvCell {
        &self.cell
    }

    /// The frozen read-out.
    pub fn readout(&self) -> &FixedReadout {
        &self.readout
    }

    /// Read-out weight transposed, `[features, output_size]`.
    pub fn feedback_matrix(&self) -> Tensor {
        self.readout.feedback_matrix()
    }

    /// Flattened pooled feature count feeding the read-out.
    pub fn readout_features(&self) -> i64 {
        self.pooled_dims.iter().product()
    }

    fn pool(&self, x: &Tensor) -> DcllResult<Tensor> {
        let p = self.config.pooling as i64;
        Ok(x.f_max_pool2d([p, p], [p, p], [0, 0], [1, 1], false)?)
    }
}

impl LocalLayer for ConvDcllLayer {
    fn forward(&mut self, input: &Tensor) -> DcllResult<LayerOutput> {
        let input = input.detach();
        let batch = input.size().first().copied().unwrap_or(0);
        let CellOutput { spikes, pv } = self.cell.forward(&input)?;

        // A frame size other than the configured one leaves more or fewer
        // pooled features than the read-out expects and fails here.
        let flat = self.pool(&pv.f_sigmoid()?)?.f_reshape([batch, self.readout_features()])?;
        let local_signal = self.readout.forward(&flat)?.f_sigmoid()?;
        let spikes = self.pool(&spikes.detach())?;
        Ok(LayerOutput { spikes, local_signal })
    }

    fn init_hiddens(&mut self, batch_size: i64) -> DcllResult<()> {
        let (h, w) = (self.config.im_height as i64, self.config.im_width as i64);
        self.cell.init_state(batch_size, h, w, self.vs.device())
    }

    fn zero_output(&self, batch_size: i64) -> Tensor {
        let [c, h, w] = self.pooled_dims;
        Tensor::zeros([batch_size, c, h, w], (Kind::Float, self.vs.device()))
    }

    fn output_size(&self) -> usize {
        self.config.output_size
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
}

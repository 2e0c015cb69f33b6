//! Fully-connected DCLL layer.

use tch::{nn, Device, Kind, Tensor};
use tracing::debug;

use super::{LayerOutput, LocalLayer};
use crate::cell::{CellOutput, LocalCell, LocalDenseCell};
use crate::config::DenseLayerConfig;
use crate::error::DcllResult;
use crate::init::dense_cell_limit;
use crate::projection::ParamInit;
use crate::readout::FixedReadout;

/// [`LocalDenseCell`] followed by a frozen read-out and a sigmoid.
///
/// At construction the cell weight is drawn from a near-zero uniform
/// distribution with bound `√(1e-32/(out_features + in_features))` and the
/// cell bias is zero, so the local signal starts at the read-out bias point.
pub struct DenseDcllLayer {
    vs: nn::VarStore,
    config: DenseLayerConfig,
    cell: LocalDenseCell,
    readout: FixedReadout,
}

impl DenseDcllLayer {
    /// Build a layer on `device`.
    ///
    /// # Errors
    ///
    /// Returns [`DcllError::Config`](crate::error::DcllError::Config) if the
    /// configuration does not validate.
    pub fn new(config: &DenseLayerConfig, device: Device) -> DcllResult<Self> {
        config.validate()?;
        let vs = nn::VarStore::new(device);
        let cfg = &config.cell;
        let output_size = config.output_size();

        let (cell, readout) = {
            let root = vs.root();
            let limit = dense_cell_limit(cfg.in_features, cfg.out_features);
            let cell = LocalCell::dense_with_init(&(&root / "i2h"), cfg, ParamInit::uniform_zero_bias(limit))?;
            let readout = FixedReadout::new(&(&root / "i2o"), cfg.out_features, output_size)?;
            (cell, readout)
        };

        debug!(
            in_features = cfg.in_features,
            out_features = cfg.out_features,
            output_size,
            "built dense DCLL layer"
        );
        Ok(DenseDcllLayer { vs, config: config.clone(), cell, readout })
    }

    /// The configuration this layer was built from.
    pub fn config(&self) -> &DenseLayerConfig {
        &self.config
    }

    /// The wrapped cell (parameters and synaptic state).
    pub fn cell(&self) -> &LocalDenseCell {
        &self.cell
    }

    /// The frozen read-out.
    pub fn readout(&self) -> &FixedReadout {
        &self.readout
    }

    /// Read-out weight transposed, `[out_features, output_size]`.
    pub fn feedback_matrix(&self) -> Tensor {
        self.readout.feedback_matrix()
    }
}

impl LocalLayer for DenseDcllLayer {
    fn forward(&mut self, input: &Tensor) -> DcllResult<LayerOutput> {
        let input = input.detach();
        let CellOutput { spikes, pv } = self.cell.forward(&input)?;
        let local_signal = self.readout.forward(&pv)?.f_sigmoid()?;
        Ok(LayerOutput { spikes, local_signal })
    }

    fn init_hiddens(&mut self, batch_size: i64) -> DcllResult<()> {
        self.cell.init_state(batch_size, self.vs.device())
    }

    fn zero_output(&self, batch_size: i64) -> Tensor {
        Tensor::zeros([batch_size, self.config.cell.out_features as i64], (Kind::Float, self.vs.device()))
    }

    fn output_size(&self) -> usize {
        self.config.output_size()
    }

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
}

//! `dcll-probe` binary: drive one DCLL layer over a synthetic spike stream.
//!
//! Feeds Bernoulli spike frames into a dense or convolutional layer and logs
//! the spike rate and local-signal statistics of every step. No learning
//! happens; the probe only exercises the recursion and the read-out.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dcll-probe -- dense --steps 20 --batch 8
//! cargo run --bin dcll-probe -- conv --config conv.json --rate 0.2
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tch::{Device, Kind, Tensor};
use tracing::{error, info};

use dcll::{
    ConvDcllLayer, ConvLayerConfig, DcllResult, DenseDcllLayer, DenseLayerConfig, LocalLayer,
};

/// Which layer variant to probe.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayerKind {
    /// Fully-connected layer, input `[batch, in_features]`.
    Dense,
    /// Convolutional layer, input `[batch, in_channels, im_height, im_width]`.
    Conv,
}

/// Command-line arguments for the probe binary.
#[derive(Parser, Debug)]
#[command(
    name = "dcll-probe",
    version,
    about = "Run a DCLL layer over synthetic spike frames",
    long_about = None
)]
struct Args {
    /// Layer variant.
    #[arg(value_enum)]
    kind: LayerKind,

    /// Path to a JSON layer configuration. Defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of time steps.
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// Batch size.
    #[arg(long, default_value_t = 4)]
    batch: i64,

    /// Per-element spike probability of the input frames.
    #[arg(long, default_value_t = 0.1)]
    rate: f64,

    /// Seed for libtorch's RNG (parameters and input frames).
    #[arg(long, default_value_t = 42)]
    seed: i64,

    /// Use CUDA device 0 when available.
    #[arg(long, default_value_t = false)]
    cuda: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("DCLL probe v{}", dcll::VERSION);

    if !(0.0..=1.0).contains(&args.rate) {
        error!("--rate must be in [0, 1], got {}", args.rate);
        std::process::exit(1);
    }

    tch::manual_seed(args.seed);
    let device = if args.cuda { Device::cuda_if_available() } else { Device::Cpu };
    info!("  device : {:?}", device);

    if let Err(e) = run(&args, device) {
        error!("Probe failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args, device: Device) -> DcllResult<()> {
    match args.kind {
        LayerKind::Dense => {
            let cfg = match args.config.as_deref() {
                Some(path) => {
                    info!("Loading dense layer configuration from {}", path.display());
                    DenseLayerConfig::from_json(path)?
                }
                None => DenseLayerConfig::default(),
            };
            info!("  features: {} -> {} -> {}", cfg.cell.in_features, cfg.cell.out_features, cfg.output_size());
            let mut layer = DenseDcllLayer::new(&cfg, device)?;
            let shape = [args.batch, cfg.cell.in_features as i64];
            drive(&mut layer, &shape, args, device)
        }
        LayerKind::Conv => {
            let cfg = match args.config.as_deref() {
                Some(path) => {
                    info!("Loading conv layer configuration from {}", path.display());
                    ConvLayerConfig::from_json(path)?
                }
                None => ConvLayerConfig::default(),
            };
            info!(
                "  frames  : {}x{}x{} -> {} channels, pooling {}",
                cfg.cell.in_channels, cfg.im_height, cfg.im_width, cfg.cell.out_channels, cfg.pooling
            );
            let mut layer = ConvDcllLayer::new(&cfg, device)?;
            info!("  readout : {} -> {}", layer.readout_features(), cfg.output_size);
            let shape = [
                args.batch,
                cfg.cell.in_channels as i64,
                cfg.im_height as i64,
                cfg.im_width as i64,
            ];
            drive(&mut layer, &shape, args, device)
        }
    }
}

/// Run `args.steps` forward calls on Bernoulli frames of `shape`.
fn drive(layer: &mut dyn LocalLayer, shape: &[i64], args: &Args, device: Device) -> DcllResult<()> {
    info!("  trainable parameters: {}", layer.num_parameters());
    layer.init_hiddens(args.batch)?;

    for step in 0..args.steps {
        let frame = Tensor::rand(shape, (Kind::Float, device))
            .f_lt(args.rate)?
            .f_to_kind(Kind::Float)?;
        let out = layer.forward(&frame)?;

        let spike_rate = out.spikes.f_mean(Kind::Float)?.double_value(&[]);
        let signal_mean = out.local_signal.f_mean(Kind::Float)?.double_value(&[]);
        let signal_min = out.local_signal.f_min()?.double_value(&[]);
        let signal_max = out.local_signal.f_max()?.double_value(&[]);
        info!(
            "step {:>4} | spike rate {:.4} | signal mean {:.4} [{:.4}, {:.4}]",
            step, spike_rate, signal_mean, signal_min, signal_max
        );
    }

    info!("Probe complete");
    Ok(())
}

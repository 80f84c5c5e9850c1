use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ephys-qc",
    version,
    about = "Noise channel detection and cluster reclassification for spike sorting",
    long_about = "Flag noisy channels in raw int16 recordings and relabel Kilosort clusters\n\
                  (good / mua / noise) from their quality metrics. Results are emitted as JSON."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Detect noisy channels in a raw recording
    NoiseChannels(NoiseChannelsArgs),
    /// Reclassify Kilosort clusters from their quality metrics
    Reclassify(ReclassifyArgs),
    /// Show the effective QC thresholds
    Thresholds(ThresholdsArgs),
}

#[derive(Args)]
pub struct NoiseChannelsArgs {
    /// Raw recording (interleaved little-endian int16)
    #[arg(long)]
    pub file: String,

    /// Number of channels in the recording
    #[arg(long)]
    pub num_channels: usize,

    /// Sampling rate in Hz
    #[arg(long)]
    pub sample_rate: f64,

    /// Microvolts per integer step
    #[arg(long)]
    pub bit_volts: f64,

    /// JSON threshold file
    #[arg(long, env = "EPHYS_QC_CONFIG")]
    pub config: Option<String>,

    /// Start of the analysis window in seconds (overrides config)
    #[arg(long)]
    pub noise_delay: Option<f64>,

    /// Length of the analysis window in seconds (overrides config)
    #[arg(long)]
    pub noise_interval: Option<f64>,

    /// RMS excess over the spatial median, in µV (overrides config)
    #[arg(long)]
    pub noise_threshold: Option<f64>,

    /// 0-based channels to mask regardless of their noise level
    #[arg(long, num_args = 1..)]
    pub reference_channels: Vec<usize>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ReclassifyArgs {
    /// Kilosort output directory
    #[arg(long)]
    pub kilosort_dir: String,

    /// Label table inside the Kilosort directory
    #[arg(long, default_value = "cluster_group.tsv")]
    pub cluster_group_file: String,

    /// Cluster metrics CSV (the newest `<name>_N.csv` sibling is used if present)
    #[arg(long)]
    pub metrics: String,

    /// Waveform metrics CSV, merged when the metrics table has no `snr` column
    #[arg(long)]
    pub waveform_metrics: Option<String>,

    /// Cluster table (`[spike_count, channel]` rows) inside the Kilosort directory
    #[arg(long, default_value = "clus_Table.npy")]
    pub cluster_table: String,

    /// JSON threshold file
    #[arg(long, env = "EPHYS_QC_CONFIG")]
    pub config: Option<String>,

    /// Output file for the JSON manifest (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Compute the new labels without touching the label table
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ThresholdsArgs {
    /// JSON threshold file
    #[arg(long, env = "EPHYS_QC_CONFIG")]
    pub config: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

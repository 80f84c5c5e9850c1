use crate::cli::ThresholdsArgs;
use crate::commands::load_thresholds;
use crate::exit_codes;
use crate::output;
use ephys_qc::thresholds::NUM_VIOL_MAX;

pub fn execute(args: ThresholdsArgs) -> i32 {
    let thresholds = match load_thresholds(args.config.as_deref()) {
        Ok(t) => t,
        Err(code) => return code,
    };

    if args.json {
        if let Err(code) = output::emit(&thresholds, false, None) {
            return code;
        }
        return exit_codes::SUCCESS;
    }

    let source = args.config.as_deref().unwrap_or("built-in defaults");
    println!("QC thresholds ({})", source);
    println!();
    println!("Noise channels");
    println!("  {:<20} {} s", "noise_delay", thresholds.noise_delay);
    println!("  {:<20} {} s", "noise_interval", thresholds.noise_interval);
    println!("  {:<20} {} µV", "noise_threshold", thresholds.noise_threshold);
    println!();
    println!("Cluster reclassification");
    println!("  {:<20} {}", "snr_min", thresholds.snr_min);
    println!("  {:<20} {} ms", "halfwidth_max", thresholds.halfwidth_max);
    println!("  {:<20} {} ms", "wide_halfwidth_max", thresholds.wide_halfwidth_max);
    println!("  {:<20} {}", "repo_slope", thresholds.repo_slope);
    println!("  {:<20} {} Hz", "mua_fr_min", thresholds.mua_fr_min);
    println!("  {:<20} {} µm", "depth_max", thresholds.depth_max);
    println!("  {:<20} {}", "isi_viol_max", thresholds.isi_viol_max);
    println!("  {:<20} {}", "contam_rate_max", thresholds.contam_rate_max);
    println!("  {:<20} {} (fixed)", "num_viol_max", NUM_VIOL_MAX);
    if !thresholds.has_wide_halfwidth_band() {
        println!();
        println!("Wide-flat noise rule disabled (halfwidth_max >= wide_halfwidth_max)");
    }

    exit_codes::SUCCESS
}

//! Developer utility to evaluate per-channel mask models against a saved record.

use std::path::{Path, PathBuf};

use earshot::app_dirs;
use earshot::config::{self, SynthConfig};
use earshot::entry::DataEntry;
use earshot::eval;
use earshot::ml::MlpPredictor;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    entry_dir: PathBuf,
    models_dir: PathBuf,
    out_dir: Option<PathBuf>,
    report_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let config = resolve_config(options.config_path.as_deref())?;
    let entry =
        DataEntry::load_record(&options.entry_dir, &config).map_err(|err| err.to_string())?;

    let mut models = Vec::with_capacity(config.freq_channels());
    for channel in 0..config.freq_channels() {
        let path = options.models_dir.join(format!("channel_{channel}.json"));
        let model =
            MlpPredictor::from_json_file(&path).map_err(|err| format!("{}: {err}", path.display()))?;
        models.push(model);
    }

    let outcome = entry
        .evaluate_models(&models, &config)
        .map_err(|err| err.to_string())?;

    println!("ground truth: {:?} deg", outcome.report.ground_truth_deg);
    println!("recovered:    {:?} deg", outcome.report.recovered_deg);
    println!("miss rate: {:.3}", outcome.report.miss_rate);
    println!("false alarm rate: {:.3}", outcome.report.false_alarm_rate);

    if let Some(out_dir) = &options.out_dir {
        entry
            .save_eval_artifacts(&outcome, &config, out_dir)
            .map_err(|err| err.to_string())?;
        println!("Artifacts written to {}", out_dir.display());
    }
    if let Some(report_path) = &options.report_path {
        eval::write_report(&outcome.report, report_path).map_err(|err| err.to_string())?;
        println!("Report written to {}", report_path.display());
    }
    Ok(())
}

fn resolve_config(explicit: Option<&Path>) -> Result<SynthConfig, String> {
    if let Some(path) = explicit {
        return config::load_from_path(path).map_err(|err| err.to_string());
    }
    let default_path = app_dirs::app_root_dir()
        .map_err(|err| err.to_string())?
        .join(config::CONFIG_FILE_NAME);
    if default_path.is_file() {
        return config::load_from_path(&default_path).map_err(|err| err.to_string());
    }
    Ok(SynthConfig::default())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut entry_dir: Option<PathBuf> = None;
    let mut models_dir: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut report_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--entry" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--entry requires a value".to_string())?;
                entry_dir = Some(PathBuf::from(value));
            }
            "--models" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--models requires a value".to_string())?;
                models_dir = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--report" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--report requires a value".to_string())?;
                report_path = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let entry_dir = entry_dir.ok_or_else(|| "--entry is required".to_string())?;
    let models_dir = models_dir.ok_or_else(|| "--models is required".to_string())?;
    Ok(Some(CliOptions {
        entry_dir,
        models_dir,
        out_dir,
        report_path,
        config_path,
    }))
}

fn help_text() -> String {
    [
        "earshot-eval",
        "",
        "Runs per-channel mask models over a saved record and scores the",
        "recovered directions against the planted ones.",
        "",
        "Usage:",
        "  earshot-eval --entry <dir> --models <dir> [options]",
        "",
        "Options:",
        "  --entry <dir>    Record directory written by the synthesizer.",
        "  --models <dir>   Directory holding channel_<i>.json models, one per channel.",
        "  --out <dir>      Write estimated WAVs and the predicted class map here.",
        "  --report <file>  Write the localization report as JSON here.",
        "  --config <path>  TOML config (default: ~/.earshot/earshot.toml when present).",
    ]
    .join("\n")
}

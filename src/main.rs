#![deny(missing_docs)]
#![deny(warnings)]

//! Entry point for the earshot scene synthesizer.
//!
//! Walks a clip pool round-robin, renders each drawn clip through BRIRs
//! at distinct azimuths, mixes them and writes labeled records into
//! per-split directories under the output root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;

use earshot::brir::BrirDatabase;
use earshot::config::{self, SynthConfig};
use earshot::entry::{DataEntry, split_for_entry};
use earshot::{app_dirs, logging, wav};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    clips_dir: PathBuf,
    brir_dir: PathBuf,
    out_dir: PathBuf,
    entries: usize,
    sources_per_entry: usize,
    config_path: Option<PathBuf>,
    seed: Option<u64>,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let config = resolve_config(options.config_path.as_deref())?;
    let brir = BrirDatabase::load(&options.brir_dir).map_err(|err| err.to_string())?;
    let clip_paths = collect_clip_paths(&options.clips_dir)?;
    if clip_paths.len() < options.sources_per_entry {
        return Err(format!(
            "{} holds {} clips, need at least {}",
            options.clips_dir.display(),
            clip_paths.len(),
            options.sources_per_entry
        ));
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut split_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for n in 0..options.entries {
        let mut clips = Vec::with_capacity(options.sources_per_entry);
        for j in 0..options.sources_per_entry {
            let path = &clip_paths[(n * options.sources_per_entry + j) % clip_paths.len()];
            clips.push(load_clip(path, &config)?);
        }
        let entry = DataEntry::synthesize(clips, &brir, &config, &mut rng)
            .map_err(|err| err.to_string())?;
        let split = split_for_entry(&entry.id, &config);
        let record_dir = options
            .out_dir
            .join(split.dir_name())
            .join(format!("entry_{n:04}"));
        entry
            .save_record(&config, &record_dir)
            .map_err(|err| err.to_string())?;
        *split_counts.entry(split.dir_name()).or_default() += 1;
        tracing::info!(
            "Entry {}/{}: {} at {:?} deg -> {}",
            n + 1,
            options.entries,
            entry.id,
            entry.angles_deg,
            record_dir.display()
        );
    }

    println!(
        "Synthesized {} entries into {}",
        options.entries,
        options.out_dir.display()
    );
    for (split, count) in &split_counts {
        println!("  {split}: {count}");
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

fn collect_clip_paths(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries =
        std::fs::read_dir(dir).map_err(|err| format!("Failed to read {}: {err}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(format!("No .wav clips found in {}", dir.display()));
    }
    Ok(paths)
}

/// Read a clip and cut it to the configured signal length.
fn load_clip(path: &Path, config: &SynthConfig) -> Result<Vec<f32>, String> {
    let mut samples = wav::read_mono(path, config.sample_rate_hz).map_err(|err| err.to_string())?;
    let target = config.signal_length_samples();
    if samples.len() < target {
        return Err(format!(
            "{} holds {} samples, need {}",
            path.display(),
            samples.len(),
            target
        ));
    }
    samples.truncate(target);
    Ok(samples)
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut clips_dir: Option<PathBuf> = None;
    let mut brir_dir: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut entries = 1usize;
    let mut sources_per_entry = 2usize;
    let mut config_path: Option<PathBuf> = None;
    let mut seed: Option<u64> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--clips" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--clips requires a value".to_string())?;
                clips_dir = Some(PathBuf::from(value));
            }
            "--brir" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--brir requires a value".to_string())?;
                brir_dir = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--entries" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--entries requires a value".to_string())?;
                entries = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --entries value: {value}"))?;
            }
            "--sources" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--sources requires a value".to_string())?;
                sources_per_entry = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --sources value: {value}"))?;
                if sources_per_entry == 0 {
                    return Err("--sources must be at least 1".to_string());
                }
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--seed" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--seed requires a value".to_string())?;
                seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let clips_dir = clips_dir.ok_or_else(|| "--clips is required".to_string())?;
    let brir_dir = brir_dir.ok_or_else(|| "--brir is required".to_string())?;
    let out_dir = out_dir.ok_or_else(|| "--out is required".to_string())?;
    Ok(Some(CliOptions {
        clips_dir,
        brir_dir,
        out_dir,
        entries,
        sources_per_entry,
        config_path,
        seed,
    }))
}

fn help_text() -> String {
    [
        "earshot",
        "",
        "Synthesizes binaural scenes with ideal binary mask labels.",
        "",
        "Usage:",
        "  earshot --clips <dir> --brir <dir> --out <dir> [options]",
        "",
        "Options:",
        "  --clips <dir>    Directory of WAV clips to draw sources from.",
        "  --brir <dir>     BRIR database directory (manifest.json + impulses.f32le).",
        "  --out <dir>      Dataset root; records land under train/validation/test.",
        "  --entries <n>    Number of scenes to synthesize (default: 1).",
        "  --sources <n>    Sources mixed into each scene (default: 2).",
        "  --config <path>  TOML config (default: ~/.earshot/earshot.toml when present).",
        "  --seed <u64>     RNG seed for azimuth draws (default: OS entropy).",
    ]
    .join("\n")
}

use std::fs;
use std::path::Path;

use ptmc_core::PtError;
use ptmc_exchange::{run_local, HarmonicConfig, HarmonicWalker, RunConfig, RunManifest};
use tempfile::tempdir;

const DIMENSIONS: usize = 3;

fn harmonic_config() -> HarmonicConfig {
    HarmonicConfig {
        dimensions: DIMENSIONS,
        moves_per_step: 500,
        step_size: 1.0,
        equilibration_moves: 2_000,
        target_acceptance: 0.5,
        histogram_bin_width: 0.01,
    }
}

fn run_config(max_iterations: usize) -> RunConfig {
    let mut config = RunConfig::default();
    config.ladder.t_min = 1.0;
    config.ladder.t_max = 2.0;
    config.max_iterations = max_iterations;
    config.persistence_period = 10;
    config.seed_policy.master_seed = 2024;
    config.exchange.timeout_ms = 30_000;
    config
}

fn read_histogram(path: &Path) -> Vec<(f64, f64)> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let mut fields = line.split('\t');
            let energy: f64 = fields.next().unwrap().parse().unwrap();
            let count: f64 = fields.next().unwrap().parse().unwrap();
            (energy, count)
        })
        .collect()
}

fn latest_histogram(rank_dir: &Path) -> std::path::PathBuf {
    let prefix = "Visits.his.";
    fs::read_dir(rank_dir)
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name().into_string().unwrap();
            let steps: usize = name.strip_prefix(prefix)?.parse().ok()?;
            Some((steps, rank_dir.join(name)))
        })
        .max_by_key(|(steps, _)| *steps)
        .map(|(_, path)| path)
        .unwrap()
}

#[test]
fn heat_capacity_of_harmonic_well_matches_dimension() {
    let dir = tempdir().unwrap();
    let results = dir.path().join("ptmc_results");
    let mut config = run_config(200);
    config.output.run_directory = Some(results.clone());

    let participants = 4;
    let run = run_local(&config, participants, |_, seed| {
        HarmonicWalker::new(harmonic_config(), seed)
    })
    .unwrap();
    assert_eq!(run.replicas.len(), participants);

    let temperatures: Vec<f64> = fs::read_to_string(results.join("temperatures"))
        .unwrap()
        .lines()
        .map(|line| line.trim().parse().unwrap())
        .collect();
    assert_eq!(temperatures.len(), participants);

    for (rank, &temperature) in temperatures.iter().enumerate() {
        let histogram = read_histogram(&latest_histogram(&results.join(rank.to_string())));
        let total: f64 = histogram.iter().map(|(_, c)| c).sum();
        let mean: f64 = histogram.iter().map(|(e, c)| e * c).sum::<f64>() / total;
        let mean_sq: f64 = histogram.iter().map(|(e, c)| e * e * c).sum::<f64>() / total;
        let cv = (mean_sq - mean * mean) / (temperature * temperature) + DIMENSIONS as f64 / 2.0;
        assert!(
            (cv - DIMENSIONS as f64).abs() < 0.35,
            "rank {rank}: Cv = {cv} at T = {temperature}"
        );
    }
}

#[test]
fn run_directory_holds_every_artefact() {
    let dir = tempdir().unwrap();
    let results = dir.path().join("out");
    let mut config = run_config(20);
    config.persistence_period = 5;
    config.output.run_directory = Some(results.clone());

    let run = run_local(&config, 3, |_, seed| {
        HarmonicWalker::new(harmonic_config(), seed)
    })
    .unwrap();

    let manifest = RunManifest::load(run.manifest_path.as_ref().unwrap()).unwrap();
    assert_eq!(manifest.participants, 3);
    assert_eq!(manifest.master_seed, 2024);
    assert_eq!(manifest.config_hash.len(), 64);
    assert!(manifest
        .config_hash
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    assert_eq!(
        manifest.config_hash,
        ptmc_exchange::manifest::config_hash(&config).unwrap()
    );
    let ranks: Vec<usize> = manifest.replicas.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
    assert_eq!(
        manifest.replicas.iter().map(|r| r.swaps).collect::<Vec<_>>(),
        run.replicas.iter().map(|r| r.swaps).collect::<Vec<_>>()
    );

    let permutations = fs::read_to_string(results.join("rem_permutations")).unwrap_or_default();
    let root = &run.replicas[0];
    assert_eq!(permutations.lines().count(), root.permutation_entries);
    for line in permutations.lines() {
        let fields: Vec<usize> = line
            .split('\t')
            .filter(|f| !f.is_empty())
            .map(|f| f.parse().unwrap())
            .collect();
        assert_eq!(fields.len(), 4);
        assert!(fields[1..].iter().all(|&p| (1..=3).contains(&p)));
    }

    for rank in 0..3 {
        let rank_dir = results.join(rank.to_string());
        let snapshots = fs::read_dir(&rank_dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("Visits.his.")
            })
            .count();
        assert_eq!(snapshots, 4);
        let parameters = fs::read_to_string(rank_dir.join("parameters")).unwrap();
        assert!(parameters.starts_with(&format!("node:\t{rank}\n")));
        assert!(parameters.contains("PT iterations:\t20\n"));
        assert!(parameters.contains("total MC iterations:\t10000\n"));
    }
}

#[test]
fn swaps_are_counted_on_both_sides() {
    let run = run_local(&run_config(60), 5, |_, seed| {
        HarmonicWalker::new(harmonic_config(), seed)
    })
    .unwrap();
    assert!(run.manifest_path.is_none());
    let stats = run.replicas[0].ladder_statistics.as_ref().unwrap();
    let accepted: usize = stats.accepts.iter().sum();
    let swaps: usize = run.replicas.iter().map(|r| r.swaps).sum();
    assert_eq!(swaps, 2 * accepted);
    assert!(accepted > 0, "neighbouring harmonic replicas should mix");
    // Five slots leave one edge replica idle in both directions.
    assert_eq!(stats.total_attempts(), 60 * 2);

    let means = stats.mean_acceptance();
    let rates = stats.acceptance_rates();
    assert_eq!(means.len(), 4);
    for (mean, rate) in means.iter().zip(&rates) {
        assert!(*mean > 0.0 && *mean <= 1.0, "mean acceptance {mean}");
        assert!((0.0..=1.0).contains(rate));
    }
}

#[test]
fn identical_seeds_reproduce_the_run() {
    let make = |_: usize, seed: u64| HarmonicWalker::new(harmonic_config(), seed);
    let first = run_local(&run_config(30), 4, make).unwrap();
    let second = run_local(&run_config(30), 4, make).unwrap();
    assert_eq!(first.replicas, second.replicas);

    let mut reseeded = run_config(30);
    reseeded.seed_policy.master_seed = 7;
    let third = run_local(&reseeded, 4, make).unwrap();
    assert_ne!(first.replicas, third.replicas);
}

#[test]
fn negative_step_size_is_rejected_before_any_move() {
    let walker = HarmonicConfig {
        step_size: -0.5,
        ..harmonic_config()
    };
    let err = run_local(&run_config(5), 2, |_, seed| {
        HarmonicWalker::new(walker.clone(), seed)
    })
    .unwrap_err();
    assert!(matches!(err, PtError::Config(_)));
    assert_eq!(err.info().code, "walker-step-size");
}

#[test]
fn walker_tunables_are_validated() {
    let rejected = |edit: fn(&mut HarmonicConfig), code: &str| {
        let mut config = harmonic_config();
        edit(&mut config);
        let err = HarmonicWalker::new(config, 1).unwrap_err();
        assert_eq!(err.info().code, code);
    };
    rejected(|c| c.step_size = f64::NAN, "walker-step-size");
    rejected(|c| c.histogram_bin_width = 0.0, "walker-bin-width");
    rejected(|c| c.target_acceptance = 1.0, "walker-target-acceptance");
    rejected(|c| c.dimensions = 0, "walker-dimensions");
    assert!(harmonic_config().validate().is_ok());
}

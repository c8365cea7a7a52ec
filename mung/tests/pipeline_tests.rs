//! Synthetic end-to-end runs: target measurements -> activities ->
//! growth correction -> cross-validated metabolite prediction -> scores.
//!
//! Run: cargo test -p mung --test pipeline_tests

use anyhow::Result;
use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_io::NamedMatrix;
use mung::activity::{ActivityConfig, ActivityEstimator, TargetWeights};
use mung::cv::*;
use mung::io::normalize_key;
use mung::io::results::write_predictions;
use mung::keyed::KeyedVector;
use mung::regression::ElasticNetConfig;
use mung::residualize::regress_out_rows;
use mung::scoring::*;
use nalgebra::DMatrix;
use rand::prelude::*;
use rand_distr::Normal;
use std::collections::HashSet;

const NUM_SAMPLES: usize = 24;
const REGULATORS: [&str; 3] = ["CDC28", "SNF1", "TPK1"];

fn sample_names(n: usize) -> Vec<Box<str>> {
    (0..n)
        .map(|i| format!("cond{:02}", i).into_boxed_str())
        .collect()
}

/// Three regulators with four signed targets each, one shared target
fn weights() -> Result<TargetWeights> {
    let mut triplets = vec![];
    for (k, reg) in REGULATORS.iter().enumerate() {
        for t in 0..4 {
            let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
            triplets.push((*reg, format!("site_{}_{}", k, t), sign));
        }
    }
    triplets.push(("TPK1", "site_0_0".to_string(), 1.0));
    Ok(TargetWeights::from_triplets(triplets)?)
}

struct Simulated {
    truth: DMatrix<f64>,
    measurements: NamedMatrix,
}

/// targets × samples measurements generated from regulators × samples
/// activities
fn simulate(weights: &TargetWeights, rng: &mut StdRng) -> Result<Simulated> {
    let normal = Normal::new(0.0, 1.0)?;
    let noise = Normal::new(0.0, 0.05)?;

    let truth = DMatrix::from_fn(REGULATORS.len(), NUM_SAMPLES, |_, _| normal.sample(rng));

    let targets: Vec<&str> = weights.all_targets().into_iter().collect();
    let mut mat = DMatrix::<f64>::zeros(targets.len(), NUM_SAMPLES);
    for (k, reg) in REGULATORS.iter().enumerate() {
        if let Some(tw) = weights.targets_of(reg) {
            for (t, &w) in tw {
                let i = targets.iter().position(|x| x == &t.as_ref()).unwrap_or(0);
                for j in 0..NUM_SAMPLES {
                    mat[(i, j)] += w * truth[(k, j)];
                }
            }
        }
    }
    for x in mat.iter_mut() {
        *x += noise.sample(rng);
    }
    // one unmeasured site per sample for a few samples
    for j in 0..4 {
        mat[(j, j)] = f64::NAN;
    }

    let measurements = NamedMatrix::new(
        targets.iter().map(|&t| t.into()).collect(),
        sample_names(NUM_SAMPLES),
        mat,
    )?;
    Ok(Simulated {
        truth,
        measurements,
    })
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    score(a, b)
        .ok()
        .and_then(|s| s.correlation)
        .unwrap_or(f64::NAN)
}

#[test]
fn activities_track_the_truth() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let w = weights()?;
    let sim = simulate(&w, &mut rng)?;

    let est = ActivityEstimator::new(w, ActivityConfig::default())?;
    let act = est.estimate_matrix(&sim.measurements)?;

    assert_eq!(act.rows.len(), REGULATORS.len());
    assert_eq!(act.cols, sim.measurements.cols);
    assert!(act.mat.iter().all(|x| x.is_finite()));

    for k in 0..REGULATORS.len() {
        let est_k: Vec<f64> = act.mat.row(k).iter().copied().collect();
        let true_k: Vec<f64> = sim.truth.row(k).iter().copied().collect();
        assert!(pearson(&est_k, &true_k) > 0.9, "{}", REGULATORS[k]);
    }
    Ok(())
}

#[test]
fn activity_table_round_trip_keeps_mz_keys() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let mut rng = StdRng::seed_from_u64(7);
    let w = weights()?;
    let sim = simulate(&w, &mut rng)?;
    let act = ActivityEstimator::new(w, ActivityConfig::default())?
        .estimate_matrix(&sim.measurements)?;

    let file = dir.path().join("activity.tsv.gz");
    let file = file.to_str().unwrap_or_default();
    act.to_file(file, "regulator")?;
    let back = NamedMatrix::from_file(file)?;
    assert_eq!(back.rows, act.rows);
    assert_eq!(back.cols, act.cols);
    for (a, b) in act.mat.iter().zip(back.mat.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }

    // metabolite identifiers
    let mz = NamedMatrix::new(
        vec!["89.0244".into(), "132.05349".into(), "180".into()],
        vec!["s1".into()],
        DMatrix::from_column_slice(3, 1, &[1.0, f64::NAN, 3.0]),
    )?
    .map_row_names(normalize_key);
    let mz_file = dir.path().join("metabolites.csv");
    let mz_file = mz_file.to_str().unwrap_or_default();
    mz.to_file(mz_file, "mz")?;
    let back = NamedMatrix::from_file(mz_file)?.map_row_names(normalize_key);
    let keys: Vec<&str> = back.rows.iter().map(|r| r.as_ref()).collect();
    assert_eq!(keys, vec!["89.0244", "132.0535", "180.0000"]);
    assert!(back.mat[(1, 0)].is_nan());
    Ok(())
}

/// regulators × samples activities, metabolites driven by two of them,
/// and a growth covariate unrelated to either
fn cv_inputs(rng: &mut StdRng) -> Result<(NamedMatrix, NamedMatrix, KeyedVector)> {
    let w = weights()?;
    let sim = simulate(&w, rng)?;
    let act = ActivityEstimator::new(w, ActivityConfig::default())?
        .estimate_matrix(&sim.measurements)?;

    let noise = Normal::new(0.0, 0.05)?;
    let growth: Vec<f64> = (0..NUM_SAMPLES).map(|j| j as f64 / NUM_SAMPLES as f64).collect();

    let mut met = DMatrix::<f64>::zeros(2, NUM_SAMPLES);
    for j in 0..NUM_SAMPLES {
        met[(0, j)] = 2.0 * sim.truth[(0, j)] + noise.sample(rng);
        met[(1, j)] = -1.0 * sim.truth[(2, j)] + noise.sample(rng);
    }
    let metabolites = NamedMatrix::new(
        vec![normalize_key("89.0244"), normalize_key("132.0535")],
        sim.measurements.cols.clone(),
        met,
    )?;

    let growth = KeyedVector::new(sim.measurements.cols.clone(), growth)?;
    Ok((act, metabolites, growth))
}

#[test]
fn leave_one_out_end_to_end() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let (act, metabolites, growth) = cv_inputs(&mut rng)?;

    // growth-corrected activities; growth is independent of the truth
    let act = regress_out_rows(&growth, &act)?;

    let data = align_samples(&act.transpose(), &metabolites.transpose())?;
    assert_eq!(data.num_samples(), NUM_SAMPLES);

    let out = cv_predict(&data, &CvScheme::LeaveOneOut, &CvConfig::default())?;
    assert_eq!(out.skipped_folds, 0);

    // exactly one prediction per (sample, response), each held out
    assert_eq!(out.predictions.len(), NUM_SAMPLES * 2);
    let folds = CvScheme::LeaveOneOut.folds(&data.samples)?;
    for p in &out.predictions {
        let fold = &folds[p.fold];
        let i = data
            .samples
            .iter()
            .position(|s| s == &p.sample)
            .unwrap_or(usize::MAX);
        assert_eq!(fold.test, vec![i]);
        assert!(!fold.train.contains(&i));
    }

    let scores = score_by_response(&out)?;
    for rec in &scores {
        let s = rec.score.ok_or_else(|| anyhow::anyhow!("{} not scored", rec.variable))?;
        let r = s.correlation.unwrap_or(f64::NAN);
        assert!(r > 0.8, "{}: {}", rec.variable, r);
        assert!(s.r_squared > 0.5);
        assert_eq!(s.n, NUM_SAMPLES);
    }

    // the driving regulators come first
    let inter = out.median_coefficients();
    let top: HashSet<(&str, &str)> = inter[..2]
        .iter()
        .map(|x| (x.response.as_ref(), x.feature.as_ref()))
        .collect();
    assert!(top.contains(&("89.0244", "CDC28")));
    assert!(top.contains(&("132.0535", "TPK1")));

    let labels: Vec<bool> = inter
        .iter()
        .map(|x| top.contains(&(x.response.as_ref(), x.feature.as_ref())))
        .collect();
    let scores: Vec<f64> = inter.iter().map(|x| x.coef_abs).collect();
    assert_abs_diff_eq!(roc_auc(&scores, &labels)?, 1.0);
    Ok(())
}

#[test]
fn shuffle_split_record_count() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(2);
    let (act, metabolites, _) = cv_inputs(&mut rng)?;
    let data = align_samples(&act.transpose(), &metabolites.transpose())?;

    let ss = ShuffleSplit {
        n_splits: 7,
        test_fraction: 0.3,
        seed: 11,
    };
    let out = cv_predict(&data, &CvScheme::ShuffleSplit(ss), &CvConfig::default())?;

    // round(0.3 * 24) = 7
    let per_response = 7 * 7;
    assert_eq!(out.predictions.len(), 2 * per_response);
    for r in &data.responses {
        assert_eq!(
            out.predictions.iter().filter(|p| &p.response == r).count(),
            per_response
        );
    }
    assert_eq!(out.coefficients.len(), 2 * 7 * REGULATORS.len());

    // same seed, same folds, same records
    let again = cv_predict(&data, &CvScheme::ShuffleSplit(ss), &CvConfig::default())?;
    assert_eq!(out.predictions, again.predictions);

    let dir = tempfile::tempdir()?;
    let file = dir.path().join("predictions.tsv.gz");
    let file = file.to_str().unwrap_or_default();
    write_predictions(file, &out.predictions)?;
    let lines = matrix_util::common_io::read_lines(file)?;
    assert_eq!(lines.len(), out.predictions.len() + 1);
    Ok(())
}

#[test]
fn unpenalized_fit_with_too_few_samples_fails() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let (act, metabolites, _) = cv_inputs(&mut rng)?;

    let keep: Vec<usize> = (0..3).collect();
    let data = align_samples(
        &act.transpose().select_rows(&keep),
        &metabolites.transpose(),
    )?;
    let config = CvConfig {
        model: ElasticNetConfig {
            alpha: 0.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let err = cv_predict(&data, &CvScheme::LeaveOneOut, &config).unwrap_err();
    assert!(matches!(err, mung::error::MungError::DegenerateFit(_)));
    Ok(())
}

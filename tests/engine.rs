//! End-to-end checks of cursor estimation and the fit engine through the
//! public API.

use std::thread;
use std::time::Duration;

use flim_fit::data::{DecayImage, DecaySpec, simulate_decay, simulate_image};
use flim_fit::domain::{
    BinRange, CancelToken, FitAlgorithm, FitFunction, FitInfo, FitRegion, FitResult, GlobalFitParams,
    NoiseModel, TransientWindow,
};
use flim_fit::error::FitError;
use flim_fit::fit::{EngineConfig, FitEngine, FitOutcome};
use flim_fit::heuristics::{CursorStatus, estimate_cursors};
use flim_fit::images::{FittedValue, fitted_value_image, fractional_intensity};
use flim_fit::models::predict_curve;

const X_INC: f64 = 0.048828125;

/// Recorded 256-bin transient used as both prompt and decay.
const RECORDED: [f64; 256] = [
    1.0, 2.0, 1.0, 3.0, 2.0, 2.0, 0.0, 0.0, 0.0, 1.0, 4.0, 2.0, 1.0, 1.0, 2.0, 1.0,
    2.0, 0.0, 1.0, 0.0, 0.0, 2.0, 1.0, 1.0, 2.0, 1.0, 1.0, 5.0, 9.0, 10.0, 18.0, 17.0,
    17.0, 35.0, 37.0, 32.0, 33.0, 28.0, 39.0, 36.0, 29.0, 32.0, 37.0, 38.0, 27.0, 31.0, 30.0, 32.0,
    26.0, 29.0, 25.0, 25.0, 25.0, 21.0, 35.0, 23.0, 13.0, 15.0, 21.0, 18.0, 8.0, 16.0, 14.0, 20.0,
    12.0, 18.0, 17.0, 17.0, 13.0, 15.0, 14.0, 16.0, 12.0, 18.0, 14.0, 10.0, 8.0, 10.0, 18.0, 7.0,
    10.0, 8.0, 11.0, 11.0, 12.0, 10.0, 13.0, 7.0, 15.0, 8.0, 6.0, 10.0, 8.0, 7.0, 9.0, 11.0,
    15.0, 6.0, 6.0, 10.0, 3.0, 8.0, 5.0, 7.0, 9.0, 7.0, 5.0, 3.0, 5.0, 4.0, 6.0, 5.0,
    6.0, 7.0, 5.0, 8.0, 3.0, 11.0, 5.0, 5.0, 7.0, 10.0, 3.0, 6.0, 11.0, 5.0, 10.0, 3.0,
    5.0, 4.0, 7.0, 2.0, 3.0, 3.0, 4.0, 4.0, 4.0, 5.0, 9.0, 8.0, 5.0, 7.0, 5.0, 4.0,
    2.0, 9.0, 5.0, 2.0, 3.0, 7.0, 5.0, 4.0, 4.0, 0.0, 3.0, 5.0, 6.0, 7.0, 2.0, 2.0,
    0.0, 5.0, 6.0, 1.0, 7.0, 5.0, 5.0, 1.0, 8.0, 4.0, 3.0, 7.0, 3.0, 1.0, 3.0, 2.0,
    0.0, 2.0, 9.0, 3.0, 3.0, 3.0, 3.0, 0.0, 3.0, 2.0, 3.0, 4.0, 5.0, 2.0, 1.0, 1.0,
    1.0, 2.0, 3.0, 4.0, 2.0, 1.0, 4.0, 2.0, 3.0, 2.0, 4.0, 1.0, 1.0, 6.0, 1.0, 3.0,
    0.0, 2.0, 2.0, 3.0, 1.0, 0.0, 1.0, 2.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 0.0,
    2.0, 2.0, 1.0, 0.0, 0.0, 3.0, 3.0, 1.0, 0.0, 2.0, 1.0, 2.0, 2.0, 3.0, 0.0, 2.0,
    1.0, 2.0, 2.0, 2.0, 2.0, 0.0, 4.0, 0.0, 2.0, 2.0, 1.0, 1.0, 1.0, 2.0, 0.0, 2.0,
];

fn engine() -> FitEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    FitEngine::new(EngineConfig::default()).unwrap()
}

#[test]
fn recorded_transient_cursors_are_stable() {
    let _ = env_logger::builder().is_test(true).try_init();
    let estimate = estimate_cursors(X_INC, Some(&RECORDED), &RECORDED, 1.5).unwrap();
    let expected = [27.0, 90.0, 2.477064220183486, 27.0, 37.0, 230.0];
    for (got, want) in estimate.to_array().iter().zip(expected) {
        assert!((got - want).abs() <= 0.1, "got {got}, want {want}");
    }
    assert_eq!(estimate.status, CursorStatus::Converged);
    assert!(estimate.trial_chi_square.unwrap() <= 1.5);
}

/// Fit one transient; an iteration-limited fit still yields its best estimate.
fn fit_or_best(global: &GlobalFitParams, info: &FitInfo, transient: &[f64]) -> FitResult {
    match engine().fit_transient(global, info, transient) {
        Ok(result) => result,
        Err(FitError::ConvergenceFailure { best, .. }) => *best,
        Err(err) => panic!("fit failed: {err}"),
    }
}

fn close(got: f64, want: f64, rel: f64) -> bool {
    (got - want).abs() <= rel * want.abs()
}

#[test]
fn noise_free_single_exponential_is_recovered() {
    let mut spec = DecaySpec::new(FitFunction::Single, vec![1000.0, 2.5, 2.0], 256, X_INC);
    spec.onset = 30;
    spec.noise_free = true;
    let sim = simulate_decay(&spec).unwrap();

    let mut global = GlobalFitParams::new(FitFunction::Single, X_INC, TransientWindow::new(30, 30, 230));
    global.noise_model = NoiseModel::Const;
    let info = FitInfo::from_global(&global, FitRegion::Summed);
    let result = engine().fit_transient(&global, &info, &sim.decay).unwrap();

    assert!(result.converged());
    assert!((result.parameters[0] - 1000.0).abs() < 1e-4);
    assert!((result.parameters[1] - 2.5).abs() < 1e-6);
    assert!((result.parameters[2] - 2.0).abs() < 1e-4);
    assert!(result.chi_square < 1e-6);
}

#[test]
fn fixed_parameters_are_returned_unchanged() {
    let decay = predict_curve(FitFunction::Single, &[800.0, 1.7, 3.0], X_INC, 200);
    let mut global = GlobalFitParams::new(FitFunction::Single, X_INC, TransientWindow::full(200));
    global.noise_model = NoiseModel::Const;
    global.algorithm = FitAlgorithm::Lma;
    global.parameters = Some(vec![500.0, 2.0, 3.0]);
    global.free = vec![true, false, true];
    let info = FitInfo::from_global(&global, FitRegion::Summed);

    let result = fit_or_best(&global, &info, &decay);
    assert_eq!(result.parameters[1], 2.0);
    assert!(result.chi_square > 0.0);
}

#[test]
fn cancelled_request_fits_nothing() {
    let decay = predict_curve(FitFunction::Single, &[800.0, 1.7, 3.0], X_INC, 128);
    let global = GlobalFitParams::new(FitFunction::Single, X_INC, TransientWindow::full(128));
    let cancel = CancelToken::new();
    cancel.cancel();
    let info = FitInfo::from_global(&global, FitRegion::Summed).with_cancel(cancel);

    let err = engine().fit_transient(&global, &info, &decay).unwrap_err();
    assert!(matches!(err, FitError::Cancelled { .. }));
}

#[test]
fn dark_image_has_no_signal_and_nan_values() {
    let image = DecayImage::new(2, 2, 64, vec![0.0; 4 * 64]).unwrap();
    let estimate = estimate_cursors(X_INC, None, &image.summed(), 1.5).unwrap();
    assert_eq!(estimate.status, CursorStatus::NoSignal);

    let mut global = GlobalFitParams::new(FitFunction::Single, X_INC, TransientWindow::full(64));
    global.threshold = 10.0;
    let info = FitInfo::from_global(&global, FitRegion::Each);
    let report = engine().fit(&global, &info, &image, None).unwrap();
    assert_eq!(report.summary.skipped, 4);
    assert!(report.units.iter().all(|u| matches!(u.outcome, FitOutcome::Skipped { .. })));

    let values = fitted_value_image(&report, 2, 2, FittedValue::MeanLifetime).unwrap();
    assert!(values.iter().all(|v| v.is_nan()));
}

#[test]
fn double_exponential_fractions_sum_to_one() {
    let decay = predict_curve(FitFunction::Double, &[600.0, 3.0, 400.0, 0.6, 1.0], X_INC, 256);
    let mut global = GlobalFitParams::new(FitFunction::Double, X_INC, TransientWindow::full(256));
    global.noise_model = NoiseModel::Const;
    let info = FitInfo::from_global(&global, FitRegion::Summed);

    let result = fit_or_best(&global, &info, &decay);
    let total: f64 = (0..2).map(|i| fractional_intensity(&result.parameters, i, 2)).sum();
    assert!((total - 1.0).abs() < 1e-12);
    assert!(result.reduced_chi_square < 1e-3);
}

#[test]
fn convolved_decay_is_recovered_with_the_prompt_in_place() {
    let mut spec = DecaySpec::new(FitFunction::Single, vec![1000.0, 2.5, 2.0], 256, X_INC);
    spec.onset = 40;
    spec.prompt_sigma = Some(2.0);
    spec.noise_free = true;
    let sim = simulate_decay(&spec).unwrap();

    // The prompt starts well before the fitted window.
    let mut global = GlobalFitParams::new(FitFunction::Single, X_INC, TransientWindow::new(36, 42, 230));
    global.noise_model = NoiseModel::Const;
    global.prompt = sim.prompt.clone();
    global.prompt_window = BinRange::new(20, 70);
    global.prompt_baseline = 0.0;
    let info = FitInfo::from_global(&global, FitRegion::Summed);
    let result = fit_or_best(&global, &info, &sim.decay);

    let p = &result.parameters;
    assert!(close(p[1], 2.5, 1e-5), "tau {}", p[1]);
    assert!(close(p[0], 1000.0, 1e-4), "amplitude {}", p[0]);
    assert!((p[2] - 2.0).abs() < 1e-3, "offset {}", p[2]);
    assert_eq!(result.fitted.len(), 230 - 42);
}

#[test]
fn rld_alone_recovers_a_clean_single_exponential() {
    let decay = predict_curve(FitFunction::Single, &[1000.0, 2.5, 2.0], X_INC, 256);
    let mut global = GlobalFitParams::new(FitFunction::Single, X_INC, TransientWindow::full(256));
    global.algorithm = FitAlgorithm::Rld;
    let info = FitInfo::from_global(&global, FitRegion::Summed);

    let result = engine().fit_transient(&global, &info, &decay).unwrap();
    assert!(result.converged());
    assert_eq!(result.iterations, 0);
    assert!(close(result.parameters[0], 1000.0, 1e-8));
    assert!(close(result.parameters[1], 2.5, 1e-8));
    assert!((result.parameters[2] - 2.0).abs() < 1e-6);
}

#[test]
fn stretched_exponential_is_recovered() {
    let truth = [1000.0, 2.0, 1.3, 2.0];
    let decay = predict_curve(FitFunction::Stretched, &truth, X_INC, 256);
    let mut global = GlobalFitParams::new(FitFunction::Stretched, X_INC, TransientWindow::full(256));
    global.noise_model = NoiseModel::Const;
    let info = FitInfo::from_global(&global, FitRegion::Summed);

    let result = fit_or_best(&global, &info, &decay);
    for (got, want) in result.parameters.iter().zip(truth) {
        assert!(close(*got, want, 1e-3), "got {:?}", result.parameters);
    }
}

#[test]
fn triple_exponential_is_recovered() {
    let truth = [500.0, 0.3, 300.0, 1.5, 200.0, 5.0, 1.0];
    let decay = predict_curve(FitFunction::Triple, &truth, X_INC, 256);
    let mut global = GlobalFitParams::new(FitFunction::Triple, X_INC, TransientWindow::full(256));
    global.noise_model = NoiseModel::Const;
    let info = FitInfo::from_global(&global, FitRegion::Summed);

    let result = fit_or_best(&global, &info, &decay);
    assert!(result.reduced_chi_square < 1e-2, "chi2 {}", result.reduced_chi_square);
    let mut taus: Vec<f64> = (0..3).map(|i| result.parameters[2 * i + 1]).collect();
    taus.sort_by(f64::total_cmp);
    for (got, want) in taus.iter().zip([0.3, 1.5, 5.0]) {
        assert!(close(*got, want, 0.05), "lifetimes {taus:?}");
    }
    let total: f64 = (0..3).map(|i| fractional_intensity(&result.parameters, i, 3)).sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn cancelling_mid_batch_leaves_whole_units() {
    let spec = DecaySpec::new(FitFunction::Double, vec![600.0, 3.0, 400.0, 0.6, 1.0], 256, X_INC);
    let image = simulate_image(&spec, 40, 40).unwrap();
    let global = GlobalFitParams::new(FitFunction::Double, X_INC, TransientWindow::full(256));
    let cancel = CancelToken::new();
    let info = FitInfo::from_global(&global, FitRegion::Each).with_cancel(cancel.clone());

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
    });
    let report = engine().fit(&global, &info, &image, None).unwrap();
    canceller.join().unwrap();

    assert_eq!(report.units.len(), 1600);
    for unit in &report.units {
        match &unit.outcome {
            FitOutcome::Fitted(result) | FitOutcome::Unconverged(result) => {
                assert_eq!(result.parameters.len(), 5);
                assert!(result.parameters.iter().all(|v| v.is_finite()));
            }
            FitOutcome::Cancelled => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    let summary = report.summary;
    assert_eq!(summary.failed + summary.skipped, 0);
    assert_eq!(summary.fitted + summary.unconverged + summary.cancelled, 1600);
}

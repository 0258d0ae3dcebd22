//! End-to-end behaviour of `Study::optimize` with pruning, failures and
//! time limits.

use std::time::Duration;

use trainer::hpo::{Direction, HpoError, MedianPruner, NopPruner, ParamValue, Study, Trial, TrialPruned, TrialState};

/// Reports a flat curve for five steps and prunes when asked.
fn curve_objective(trial: &Trial, level: f64) -> anyhow::Result<f64> {
    for step in 0..5 {
        trial.report(level, step);
        if trial.should_prune() {
            return Err(TrialPruned.into());
        }
    }
    Ok(level)
}

#[test]
fn median_pruner_stops_bad_trials() {
    let mut study = Study::new(Direction::Minimize).with_pruner(MedianPruner::new(3, 0, 1));
    let levels = [1.0, 1.0, 1.0, 10.0, 0.5];

    study
        .optimize(|trial| curve_objective(trial, levels[trial.number()]), Some(levels.len()), None)
        .unwrap();

    let states: Vec<TrialState> = study.trials().iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            TrialState::Complete,
            TrialState::Complete,
            TrialState::Complete,
            TrialState::Pruned,
            TrialState::Complete,
        ]
    );

    let pruned = &study.trials()[3];
    assert_eq!(pruned.value, Some(10.0));
    assert_eq!(pruned.intermediate_values.len(), 1);

    let best = study.best_trial().unwrap();
    assert_eq!(best.number, 4);
    assert_eq!(best.value, Some(0.5));
}

#[test]
fn random_search_is_reproducible() {
    let run = |seed: u64| {
        let mut study = Study::new(Direction::Minimize).with_pruner(NopPruner).with_seed(seed);
        study
            .optimize(
                |trial| {
                    let x = trial.suggest_float("x", -2.0, 2.0)?;
                    let n = trial.suggest_int("n", 1, 3)?;
                    let act = trial.suggest_categorical("act", &["relu", "tanh"])?;
                    let penalty = if act == "relu" { 0.0 } else { 0.1 };
                    Ok(x * x + n as f64 + penalty)
                },
                Some(10),
                None,
            )
            .unwrap();
        study
    };

    let a = run(7);
    let b = run(7);
    assert_eq!(a.trials().len(), 10);
    for (ta, tb) in a.trials().iter().zip(b.trials()) {
        assert_eq!(ta.params, tb.params);
        assert_eq!(ta.value, tb.value);
    }

    for trial in a.trials() {
        let x = trial.params["x"].as_float().unwrap();
        assert!((-2.0..=2.0).contains(&x));
        assert!(matches!(trial.params["n"], ParamValue::Int(1..=3)));
    }

    let best = a.best_value().unwrap();
    assert!(a.trials().iter().all(|t| t.value.unwrap() >= best));
}

#[test]
fn failing_objective_is_recorded_and_propagated() {
    let mut study = Study::new(Direction::Minimize);
    let err = study
        .optimize(
            |trial| {
                if trial.number() == 1 {
                    anyhow::bail!("out of memory");
                }
                Ok(0.3)
            },
            Some(5),
            None,
        )
        .unwrap_err();

    assert!(format!("{:#}", err).contains("out of memory"));
    assert_eq!(study.trials().len(), 2);
    assert_eq!(study.trials()[1].state, TrialState::Fail);
    assert_eq!(study.best_value().unwrap(), 0.3);
}

#[test]
fn elapsed_timeout_starts_no_trials() {
    let mut study = Study::new(Direction::Minimize);
    study
        .optimize(|_| Ok(1.0), Some(5), Some(Duration::ZERO))
        .unwrap();
    assert!(study.trials().is_empty());
    assert_eq!(study.best_trial().unwrap_err(), HpoError::NoCompletedTrials);
}

#[test]
fn timeout_never_interrupts_a_running_trial() {
    let mut study = Study::new(Direction::Minimize);
    study
        .optimize(
            |_| {
                std::thread::sleep(Duration::from_millis(30));
                Ok(1.0)
            },
            None,
            Some(Duration::from_millis(10)),
        )
        .unwrap();
    assert_eq!(study.trials().len(), 1);
    assert_eq!(study.trials()[0].state, TrialState::Complete);
}

#[test]
fn invalid_suggestion_fails_the_trial() {
    let mut study = Study::new(Direction::Minimize);
    let err = study
        .optimize(|trial| Ok(trial.suggest_float("lr", 1e-3, 1e-4)? * 2.0), Some(1), None)
        .unwrap_err();
    assert!(err.chain().any(|e| e.downcast_ref::<HpoError>().is_some()));
    assert_eq!(study.trials()[0].state, TrialState::Fail);
}

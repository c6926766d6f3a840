use std::fmt::Display;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::error::{Result, TunerError};
use crate::space::{format_params, validate_space, Distribution, ParamValue, Params, SearchSpace};

/// Proposes the next candidate parameter set.
pub trait Sampler {
    fn sample(&mut self, space: &SearchSpace, trial_number: usize) -> Params;
}

/// Independent uniform draws for every option, reproducible from a seed.
///
/// Expects a space that passed [`validate_space`], which [`Study::new`] checks.
pub struct RandomSampler {
    rng: ChaCha8Rng,
}

impl RandomSampler {

    pub fn new(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    fn draw(&mut self, distribution: &Distribution) -> ParamValue {
        match distribution {
            Distribution::Int { low, high, step } => {
                let n_steps = (high - low) / step;
                ParamValue::Int(low + self.rng.gen_range(0..=n_steps) * step)
            }
            Distribution::Float { low, high, log } => {
                if low >= high {
                    return ParamValue::Float(*low);
                }
                if *log {
                    let x = self.rng.gen_range(low.ln()..=high.ln()).exp();
                    // exp(ln(x)) can land a hair outside the declared range
                    ParamValue::Float(x.clamp(*low, *high))
                } else {
                    ParamValue::Float(self.rng.gen_range(*low..=*high))
                }
            }
            Distribution::Categorical { choices } => {
                let i = self.rng.gen_range(0..choices.len());
                choices[i].clone()
            }
        }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, space: &SearchSpace, _trial_number: usize) -> Params {
        // BTreeMap order keeps the draws stable for a given seed
        space
            .iter()
            .map(|(name, distribution)| (name.to_owned(), self.draw(distribution)))
            .collect()
    }
}

/// A scalar score to maximize for a parameter set.
pub trait Objective {
    fn evaluate(&mut self, params: &Params) -> Result<f64>;
}

impl<F> Objective for F
where
    F: FnMut(&Params) -> Result<f64>,
{
    fn evaluate(&mut self, params: &Params) -> Result<f64> {
        self(params)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialState {
    Complete,
    Failed,
}

impl Display for TrialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrialState::Complete => write!(f, "complete"),
            TrialState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trial {
    pub number: usize,
    pub params: Params,
    /// `None` for failed trials. May be non-finite for complete ones.
    pub value: Option<f64>,
    pub state: TrialState,
    pub duration: Duration,
}

impl Trial {
    // non-finite values rank below everything else
    fn rank_value(&self) -> Option<f64> {
        match (self.state, self.value) {
            (TrialState::Complete, Some(v)) if v.is_finite() => Some(v),
            _ => None,
        }
    }
}

/// A maximization over a search space, one trial at a time.
pub struct Study<S: Sampler> {
    sampler: S,
    space: SearchSpace,
    trials: Vec<Trial>,
}

impl<S: Sampler> Study<S> {

    /// Fails with `TunerError::Config` when the space cannot be sampled from.
    pub fn new(sampler: S, space: SearchSpace) -> Result<Self> {
        validate_space(&space).map_err(TunerError::Config)?;
        Ok(Self { sampler, space, trials: Vec::new() })
    }

    /// Runs trials until `n_trials` more have run or `timeout` has elapsed,
    /// whichever comes first. A running trial is never interrupted.
    pub fn optimize<O: Objective + ?Sized>(&mut self, objective: &mut O, n_trials: usize, timeout: Option<Duration>) {

        let timer = Instant::now();
        for _ in 0..n_trials {

            if let Some(timeout) = timeout {
                if timer.elapsed() >= timeout {
                    info!("timeout of {} seconds reached after {} trials", timeout.as_secs(), self.trials.len());
                    break;
                }
            }

            let number = self.trials.len();
            let params = self.sampler.sample(&self.space, number);
            let trial_timer = Instant::now();

            let (value, state) = match objective.evaluate(&params) {
                Ok(value) => (Some(value), TrialState::Complete),
                Err(e) => {
                    warn!("trial {} failed with params [{}]: {}", number, format_params(&params), e);
                    (None, TrialState::Failed)
                }
            };

            let trial = Trial { number, params, value, state, duration: trial_timer.elapsed() };
            if let Some(value) = trial.value {
                info!(
                    "trial {} finished with value {} in {} seconds, params [{}]",
                    number, value, trial.duration.as_secs(), format_params(&trial.params)
                );
            }
            self.trials.push(trial);

            if let Some(best) = self.best_trial() {
                info!("best so far is trial {} with value {}", best.number, best.value.unwrap_or(f64::NAN));
            }
        }
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// The complete trial with the greatest finite value, the earliest one on ties.
    pub fn best_trial(&self) -> Option<&Trial> {
        let mut best: Option<(&Trial, f64)> = None;
        for trial in &self.trials {
            if let Some(v) = trial.rank_value() {
                match best {
                    Some((_, b)) if v <= b => {}
                    _ => best = Some((trial, v)),
                }
            }
        }
        best.map(|(trial, _)| trial)
    }

    pub fn best_params(&self) -> Option<&Params> {
        self.best_trial().map(|t| &t.params)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::space::default_search_space;

    fn space_xy() -> SearchSpace {
        let mut space = SearchSpace::new();
        space.insert("x".to_string(), Distribution::Int { low: 0, high: 9, step: 1 });
        space
    }

    #[test]
    fn random_sampler_stays_in_bounds() {
        let space = default_search_space();
        let mut sampler = RandomSampler::new(0);
        for i in 0..500 {
            let params = sampler.sample(&space, i);
            assert_eq!(params.len(), space.len());
            for (name, value) in &params {
                assert!(space[name].contains(value), "{} = {} outside its range", name, value);
            }
        }
    }

    #[test]
    fn random_sampler_covers_steps_and_choices() {
        let mut space = SearchSpace::new();
        space.insert("size".to_string(), Distribution::Int { low: 50, high: 150, step: 50 });
        space.insert("kind".to_string(), Distribution::Categorical {
            choices: vec![ParamValue::Text("a".to_string()), ParamValue::Text("b".to_string())],
        });

        let mut sampler = RandomSampler::new(1);
        let mut sizes = std::collections::BTreeSet::new();
        let mut kinds = std::collections::BTreeSet::new();
        for i in 0..200 {
            let params = sampler.sample(&space, i);
            sizes.insert(params["size"].as_i64().unwrap());
            kinds.insert(params["kind"].to_string());
        }
        assert_eq!(sizes.into_iter().collect::<Vec<i64>>(), vec![50, 100, 150]);
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn log_floats_spread_over_decades() {
        let mut space = SearchSpace::new();
        space.insert("alpha".to_string(), Distribution::Float { low: 1e-4, high: 1e-1, log: true });
        let mut sampler = RandomSampler::new(2);
        let below = (0..1000)
            .filter(|i| sampler.sample(&space, *i)["alpha"].as_f64().unwrap() < 1e-2)
            .count();
        // two decades of three lie under 1e-2
        assert!(below > 580 && below < 750, "{} draws under 1e-2", below);
    }

    #[test]
    fn same_seed_same_draws() {
        let space = default_search_space();
        let mut first = RandomSampler::new(9);
        let mut second = RandomSampler::new(9);
        for i in 0..20 {
            assert_eq!(first.sample(&space, i), second.sample(&space, i));
        }
    }

    #[test]
    fn study_finds_maximum_and_counts_trials() {
        let mut study = Study::new(RandomSampler::new(3), space_xy()).unwrap();
        let mut objective = |p: &Params| -> Result<f64> {
            let x = p["x"].as_f64().unwrap_or(0.0);
            Ok(-(x - 4.0) * (x - 4.0))
        };
        study.optimize(&mut objective, 200, None);

        assert_eq!(study.trials().len(), 200);
        assert!(study.trials().iter().enumerate().all(|(i, t)| t.number == i));
        assert_eq!(study.best_value(), Some(0.0));
        assert_eq!(study.best_params().unwrap()["x"], ParamValue::Int(4));
    }

    #[test]
    fn non_finite_and_failed_trials_never_win() {
        let mut calls = 0;
        let mut objective = |_: &Params| -> Result<f64> {
            calls += 1;
            match calls {
                1 => Ok(f64::NAN),
                2 => Ok(f64::INFINITY),
                3 => Err(TunerError::invalid_param("x", "boom")),
                4 => Ok(f64::NEG_INFINITY),
                _ => Ok(-3.0),
            }
        };

        let mut study = Study::new(RandomSampler::new(4), space_xy()).unwrap();
        study.optimize(&mut objective, 6, None);

        let states: Vec<TrialState> = study.trials().iter().map(|t| t.state).collect();
        assert_eq!(states[2], TrialState::Failed);
        assert_eq!(study.trials()[2].value, None);
        assert_eq!(states.iter().filter(|s| **s == TrialState::Complete).count(), 5);

        // ties keep the earliest trial
        let best = study.best_trial().unwrap();
        assert_eq!(best.number, 4);
        assert_eq!(best.value, Some(-3.0));
    }

    #[test]
    fn nothing_completed_means_no_best() {
        let mut objective = |_: &Params| -> Result<f64> { Ok(f64::NAN) };
        let mut study = Study::new(RandomSampler::new(5), space_xy()).unwrap();
        study.optimize(&mut objective, 3, None);
        assert_eq!(study.trials().len(), 3);
        assert!(study.best_trial().is_none());
        assert!(study.best_params().is_none());
    }

    #[test]
    fn unusable_spaces_are_rejected() {
        let zero_step = SearchSpace::from([("x".to_string(), Distribution::Int { low: 0, high: 4, step: 0 })]);
        let no_choices = SearchSpace::from([("kind".to_string(), Distribution::Categorical { choices: Vec::new() })]);
        let inverted = SearchSpace::from([("alpha".to_string(), Distribution::Float { low: 0.1, high: 0.01, log: false })]);

        for space in [zero_step, no_choices, inverted, SearchSpace::new()] {
            let study = Study::new(RandomSampler::new(0), space.clone());
            assert!(matches!(study, Err(TunerError::Config(_))), "{:?}", space);
        }
    }

    #[test]
    fn zero_timeout_runs_nothing() {
        let mut objective = |_: &Params| -> Result<f64> { Ok(1.0) };
        let mut study = Study::new(RandomSampler::new(6), space_xy()).unwrap();
        study.optimize(&mut objective, 10, Some(Duration::ZERO));
        assert!(study.trials().is_empty());
    }

    #[test]
    fn timeout_stops_between_trials() {
        let mut objective = |_: &Params| -> Result<f64> {
            std::thread::sleep(Duration::from_millis(30));
            Ok(1.0)
        };
        let mut study = Study::new(RandomSampler::new(7), space_xy()).unwrap();
        study.optimize(&mut objective, 1000, Some(Duration::from_millis(100)));
        let n = study.trials().len();
        assert!(n >= 1 && n < 1000, "ran {} trials", n);
    }
}

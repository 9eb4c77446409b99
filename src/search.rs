//! Hyperparameter Search
//!
//! Two stage search for the forest hyperparameters. A randomized stage samples
//! configurations from the declared domains, then a refinement stage evaluates a
//! narrow grid around the randomized winner. Every configuration is scored by
//! k-fold cross validation on the training rows, refitting the preprocessor on
//! each fold's training rows.
use crate::config::{PipelineConfig, RefinementConfig};
use crate::errors::PcnError;
use crate::metric::{is_comparison_better, metric_callables, Metric};
use crate::params::{ForestParams, MaxFeatures, ParamDistributions};
use crate::pipeline::ForestPipeline;
use crate::preprocessing::CategoricalEncoding;
use crate::split::{kfold, Fold};
use crate::table::SampleTable;
use crate::utils::{mean, precision_round};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cross validation score of a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScore {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

impl CvScore {
    pub fn from_folds(fold_scores: Vec<f64>) -> Self {
        let mean_score = mean(&fold_scores);
        let var = fold_scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / fold_scores.len() as f64;
        CvScore {
            fold_scores,
            mean_score,
            std_score: var.sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStage {
    Randomized,
    Refinement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub params: ForestParams,
    pub score: CvScore,
}

/// A configuration that could not be fitted on one of the folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub params: ForestParams,
    pub error: String,
}

/// Every configuration evaluated by one stage, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: SearchStage,
    pub candidates: Vec<ScoredCandidate>,
    pub failures: Vec<CandidateFailure>,
    /// Position of the winner in `candidates`.
    pub best: usize,
}

impl StageResult {
    pub fn best_candidate(&self) -> &ScoredCandidate {
        &self.candidates[self.best]
    }
}

/// Annotation of a search whose winner is not better than predicting the mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SearchWarning {
    NoImprovementOverBaseline { best: f64, baseline: f64 },
}

impl fmt::Display for SearchWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SearchWarning::NoImprovementOverBaseline { best, baseline } => write!(
                f,
                "best cross validation score {:.4} does not improve on the mean predictor baseline {:.4}",
                best, baseline
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub scoring: Metric,
    pub best_params: ForestParams,
    pub best_score: f64,
    pub baseline_score: f64,
    pub randomized: StageResult,
    pub refinement: Option<StageResult>,
    pub warning: Option<SearchWarning>,
    /// Pipeline refitted with `best_params` on every training row.
    pub pipeline: ForestPipeline,
}

/// Cross validated search over the forest hyperparameters.
#[derive(Debug, Clone)]
pub struct HyperparameterSearch {
    pub cv_folds: usize,
    pub random_samples: usize,
    pub seed: u64,
    pub scoring: Metric,
    pub encoding: CategoricalEncoding,
    pub distributions: ParamDistributions,
    pub refinement: RefinementConfig,
}

/// `{b - delta, b, b + delta}` without values under `min`.
fn around(b: usize, delta: usize, min: usize) -> Vec<usize> {
    let mut values: Vec<usize> = [b.checked_sub(delta), Some(b), b.checked_add(delta)]
        .into_iter()
        .flatten()
        .filter(|v| *v >= min)
        .collect();
    values.dedup();
    values
}

impl HyperparameterSearch {
    pub fn from_config(config: &PipelineConfig) -> Self {
        HyperparameterSearch {
            cv_folds: config.cv_folds,
            random_samples: config.random_samples,
            seed: config.seed,
            scoring: config.scoring,
            encoding: config.encoding,
            distributions: config.distributions.clone(),
            refinement: config.refinement,
        }
    }

    /// Score a configuration on every fold, folds in parallel.
    pub fn cross_validate(
        &self,
        table: &SampleTable,
        folds: &[Fold],
        params: &ForestParams,
    ) -> Result<CvScore, PcnError> {
        let scores = folds
            .par_iter()
            .map(|fold| {
                let train = table.take_rows(&fold.train);
                let validation = table.take_rows(&fold.validation);
                let pipeline = ForestPipeline::fit(&train, self.encoding, *params, self.seed)?;
                pipeline.score(&validation, &self.scoring)
            })
            .collect::<Result<Vec<f64>, PcnError>>()?;
        Ok(CvScore::from_folds(scores))
    }

    /// Score of predicting the fold training mean, on the same folds.
    pub fn baseline_score(&self, table: &SampleTable, folds: &[Fold]) -> f64 {
        let (metric_fn, _) = metric_callables(&self.scoring);
        let y = table.target_values();
        let scores: Vec<f64> = folds
            .iter()
            .map(|fold| {
                let train_y: Vec<f64> = fold.train.iter().map(|&i| y[i]).collect();
                let valid_y: Vec<f64> = fold.validation.iter().map(|&i| y[i]).collect();
                let yhat = vec![mean(&train_y); valid_y.len()];
                metric_fn(&valid_y, &yhat)
            })
            .collect();
        mean(&scores)
    }

    /// Configurations of the randomized stage, sampled without replacement from the grid.
    pub fn sample_candidates(&self) -> Result<Vec<ForestParams>, PcnError> {
        let grid_size = self.distributions.grid_size()?;
        if self.random_samples >= grid_size {
            warn!(
                "{} samples requested from a grid of {} configurations, evaluating the full grid.",
                self.random_samples, grid_size
            );
            return self.distributions.grid();
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(index::sample(&mut rng, grid_size, self.random_samples)
            .into_iter()
            .filter_map(|i| self.distributions.candidate(i))
            .collect())
    }

    /// Narrow grid around `best`. `best` itself comes first.
    pub fn refinement_grid(&self, best: &ForestParams) -> Result<Vec<ForestParams>, PcnError> {
        let r = &self.refinement;
        let max_features = match best.max_features {
            MaxFeatures::Fraction(f) => {
                let mut values: Vec<MaxFeatures> = [f - r.max_features_delta, f, f + r.max_features_delta]
                    .into_iter()
                    .map(|v| precision_round(v.min(1.0), 10))
                    .filter(|v| *v > 0.0)
                    .map(MaxFeatures::Fraction)
                    .collect();
                values.dedup();
                values
            }
            other => vec![other],
        };
        let max_depth = match best.max_depth {
            Some(d) => around(d, r.max_depth_delta, 1).into_iter().map(Some).collect(),
            None => vec![None],
        };
        let distributions = ParamDistributions {
            n_estimators: around(best.n_estimators, r.n_estimators_delta, 1),
            max_features,
            max_depth,
            min_samples_split: around(best.min_samples_split, 1, 2),
            min_samples_leaf: around(best.min_samples_leaf, 1, 1),
            bootstrap: vec![best.bootstrap],
        };
        let mut grid: Vec<ForestParams> = distributions.grid()?.into_iter().filter(|p| p != best).collect();
        grid.insert(0, *best);
        Ok(grid)
    }

    /// Score every candidate, candidates in parallel. Fit errors are recorded as
    /// failures, any other error ends the search.
    pub fn evaluate_stage(
        &self,
        stage: SearchStage,
        table: &SampleTable,
        folds: &[Fold],
        candidates: Vec<ForestParams>,
    ) -> Result<StageResult, PcnError> {
        let outcomes: Vec<(ForestParams, Result<CvScore, PcnError>)> = candidates
            .into_par_iter()
            .map(|params| {
                let score = self.cross_validate(table, folds, &params);
                (params, score)
            })
            .collect();

        let (_, maximize) = metric_callables(&self.scoring);
        let mut scored: Vec<ScoredCandidate> = Vec::new();
        let mut failures = Vec::new();
        let mut best: Option<usize> = None;
        for (params, outcome) in outcomes {
            match outcome {
                Ok(score) => {
                    debug!("{:?} candidate {} scored {:.4}", stage, params, score.mean_score);
                    let better = best.map_or(true, |b| {
                        is_comparison_better(scored[b].score.mean_score, score.mean_score, maximize)
                    });
                    if better {
                        best = Some(scored.len());
                    }
                    scored.push(ScoredCandidate { params, score });
                }
                Err(e) if e.is_fit_error() => {
                    warn!("{:?} candidate {} failed: {}", stage, params, e);
                    failures.push(CandidateFailure {
                        params,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        let best = best.ok_or(PcnError::NoCandidates(failures.len()))?;
        Ok(StageResult {
            stage,
            candidates: scored,
            failures,
            best,
        })
    }

    /// Run both stages on the training rows and refit the winner on all of them.
    pub fn run(&self, table: &SampleTable) -> Result<SearchResult, PcnError> {
        let folds = kfold(table.n_rows(), self.cv_folds)?;
        let (_, maximize) = metric_callables(&self.scoring);
        let baseline_score = self.baseline_score(table, &folds);

        let candidates = self.sample_candidates()?;
        info!("Randomized search over {} configurations.", candidates.len());
        let randomized = self.evaluate_stage(SearchStage::Randomized, table, &folds, candidates)?;
        let stage_best = randomized.best_candidate().clone();
        info!(
            "Randomized winner {} with cross validation score {:.4}.",
            stage_best.params, stage_best.score.mean_score
        );

        let refinement = if self.refinement.enabled {
            let grid = self.refinement_grid(&stage_best.params)?;
            info!("Refinement search over {} configurations.", grid.len());
            Some(self.evaluate_stage(SearchStage::Refinement, table, &folds, grid)?)
        } else {
            None
        };

        let winner = match &refinement {
            Some(r) => r.best_candidate().clone(),
            None => stage_best,
        };
        info!(
            "Tuned configuration {} with cross validation score {:.4}.",
            winner.params, winner.score.mean_score
        );

        let warning = if is_comparison_better(baseline_score, winner.score.mean_score, maximize) {
            None
        } else {
            let w = SearchWarning::NoImprovementOverBaseline {
                best: winner.score.mean_score,
                baseline: baseline_score,
            };
            warn!("Search exhausted: {}.", w);
            Some(w)
        };

        let pipeline = ForestPipeline::fit(table, self.encoding, winner.params, self.seed)?;
        Ok(SearchResult {
            scoring: self.scoring,
            best_params: winner.params,
            best_score: winner.score.mean_score,
            baseline_score,
            randomized,
            refinement,
            warning,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table(n: usize) -> SampleTable {
        let size: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let noise: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64).collect();
        let hosts: Vec<&str> = (0..n).map(|i| ["a", "b", "c"][i % 3]).collect();
        let pcn: Vec<f64> = (0..n).map(|i| i as f64 * 2.0 + 1.0).collect();
        SampleTable::new(
            vec![
                Column::numeric("Size", size),
                Column::numeric("Noise", noise),
                Column::categorical("Host", hosts),
                Column::numeric("PCN", pcn),
            ],
            "PCN",
        )
        .unwrap()
    }

    fn small_distributions() -> ParamDistributions {
        ParamDistributions {
            n_estimators: vec![5, 10],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Fraction(0.5)],
            max_depth: vec![Some(3), None],
            min_samples_split: vec![2, 4],
            min_samples_leaf: vec![1, 2],
            bootstrap: vec![true, false],
        }
    }

    fn search() -> HyperparameterSearch {
        let config = PipelineConfig::default()
            .set_random_samples(4)
            .set_distributions(small_distributions())
            .set_refinement(RefinementConfig {
                enabled: true,
                n_estimators_delta: 5,
                max_depth_delta: 1,
                max_features_delta: 0.1,
            });
        HyperparameterSearch::from_config(&config)
    }

    #[test]
    fn test_sample_candidates() {
        let s = search();
        let c = s.sample_candidates().unwrap();
        assert_eq!(c.len(), 4);
        assert_eq!(c, s.sample_candidates().unwrap());
        for (i, p) in c.iter().enumerate() {
            assert!(!c[i + 1..].contains(p));
        }

        let mut s = search();
        s.random_samples = 1000;
        assert_eq!(s.sample_candidates().unwrap().len(), 64);
    }

    #[test]
    fn test_refinement_grid() {
        let s = search();
        let best = ForestParams {
            n_estimators: 5,
            max_features: MaxFeatures::Fraction(1.0),
            max_depth: Some(1),
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: false,
        };
        let grid = s.refinement_grid(&best).unwrap();
        assert_eq!(grid[0], best);
        // n_estimators {5, 10}, max_features {0.9, 1.0}, max_depth {1, 2}, split {2, 3}, leaf {1, 2}
        assert_eq!(grid.len(), 2 * 2 * 2 * 2 * 2);
        assert!(grid.iter().all(|p| !p.bootstrap));
        assert!(grid.iter().all(|p| p.validate().is_ok()));
        assert!(grid.contains(&best.set_max_features(MaxFeatures::Fraction(0.9))));

        let sqrt = best.set_max_features(MaxFeatures::Sqrt).set_max_depth(None);
        let grid = s.refinement_grid(&sqrt).unwrap();
        assert!(grid.iter().all(|p| p.max_features == MaxFeatures::Sqrt && p.max_depth.is_none()));
    }

    #[test]
    fn test_cross_validate_and_baseline() {
        let s = search();
        let t = table(30);
        let folds = kfold(t.n_rows(), 5).unwrap();
        let params = ForestParams::default().set_n_estimators(10);
        let score = s.cross_validate(&t, &folds, &params).unwrap();
        assert_eq!(score.fold_scores.len(), 5);
        let baseline = s.baseline_score(&t, &folds);
        assert!(score.mean_score < baseline);
    }

    #[test]
    fn test_run_is_deterministic() {
        let s = search();
        let t = table(30);
        let a = s.run(&t).unwrap();
        let b = s.run(&t).unwrap();
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_score, b.best_score);
        assert_eq!(a.randomized.candidates.len(), 4);
        let refinement = a.refinement.as_ref().unwrap();
        // The randomized winner is re-scored first, refinement never does worse.
        assert_eq!(refinement.candidates[0].params, a.randomized.best_candidate().params);
        assert!(a.best_score <= a.randomized.best_candidate().score.mean_score);
        assert!(a.warning.is_none());
    }

    #[test]
    fn test_candidate_failures_are_recorded() {
        let s = search();
        let t = table(30);
        let folds = kfold(t.n_rows(), 5).unwrap();
        let bad = ForestParams::default().set_min_samples_split(1);
        let good = ForestParams::default().set_n_estimators(5);
        let stage = s
            .evaluate_stage(SearchStage::Randomized, &t, &folds, vec![bad, good])
            .unwrap();
        assert_eq!(stage.failures.len(), 1);
        assert_eq!(stage.candidates.len(), 1);
        assert_eq!(stage.best_candidate().params, good);

        let err = s
            .evaluate_stage(SearchStage::Randomized, &t, &folds, vec![bad])
            .unwrap_err();
        assert!(matches!(err, PcnError::NoCandidates(1)));
    }

    #[test]
    fn test_baseline_warning() {
        // A constant target leaves nothing to improve on.
        let n = 20;
        let t = SampleTable::new(
            vec![
                Column::numeric("Size", (0..n).map(|i| i as f64).collect()),
                Column::numeric("PCN", vec![5.0; n]),
            ],
            "PCN",
        )
        .unwrap();
        let mut s = search();
        s.refinement.enabled = false;
        s.distributions = ParamDistributions {
            n_estimators: vec![5],
            max_features: vec![MaxFeatures::All],
            max_depth: vec![Some(1)],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1],
            bootstrap: vec![true],
        };
        let result = s.run(&t).unwrap();
        assert!(result.refinement.is_none());
        assert_eq!(result.best_score, 0.0);
        assert!(matches!(
            result.warning,
            Some(SearchWarning::NoImprovementOverBaseline { .. })
        ));
    }
}

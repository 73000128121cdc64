//! Ансамбль деревьев решений для бинарной классификации

#![allow(non_snake_case)]

use linfa::prelude::*;
use linfa_tree::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Параметры ансамбля; сложность подбирается по объему данных
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Доля строк на одно дерево
    pub subsample: f64,
    /// Доля признаков на одно дерево
    pub colsample: f64,
    pub seed: u64,
}

impl ClassifierParams {
    pub const MIN_ESTIMATORS: usize = 10;
    pub const MAX_ESTIMATORS: usize = 50;
    pub const MIN_DEPTH: usize = 2;
    pub const MAX_DEPTH: usize = 4;
    pub const MIN_LEAF: usize = 5;

    /// Консервативная сложность: меньше деревьев и мельче глубина на малых выборках
    pub fn for_sample_size(n_train: usize, n_features: usize, seed: u64) -> Self {
        Self {
            n_estimators: (n_train / 2).clamp(Self::MIN_ESTIMATORS, Self::MAX_ESTIMATORS),
            max_depth: (n_features / 5).clamp(Self::MIN_DEPTH, Self::MAX_DEPTH),
            min_samples_leaf: Self::MIN_LEAF.max(n_train / 20),
            subsample: 0.8,
            colsample: 0.8,
            seed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BaggedTree {
    columns: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

/// Бэггинг деревьев linfa-tree со взвешиванием классов
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    n_features: usize,
    trees: Vec<BaggedTree>,
}

impl TreeEnsemble {
    pub fn fit(X: &Array2<f64>, y: &Array1<usize>, params: ClassifierParams) -> Result<Self> {
        let n_samples = X.nrows();
        let n_features = X.ncols();

        if n_samples == 0 {
            return Err(PipelineError::EmptyDataset);
        }
        if n_features == 0 {
            return Err(PipelineError::Fit("no features to fit on".to_string()));
        }
        if y.len() != n_samples {
            return Err(PipelineError::DimensionMismatch {
                expected: n_samples,
                actual: y.len(),
            });
        }

        let weights = balanced_weights(y);
        let rows_per_tree = sample_size(n_samples, params.subsample);
        let cols_per_tree = sample_size(n_features, params.colsample);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            // Подвыборка строк без возвращения и случайное подмножество признаков
            let mut rows = index::sample(&mut rng, n_samples, rows_per_tree).into_vec();
            rows.sort_unstable();
            let mut columns = index::sample(&mut rng, n_features, cols_per_tree).into_vec();
            columns.sort_unstable();

            let records = X.select(Axis(0), &rows).select(Axis(1), &columns);
            let targets = y.select(Axis(0), &rows);
            let tree_weights = weights.select(Axis(0), &rows);
            let dataset = Dataset::new(records, targets).with_weights(tree_weights);

            let tree = DecisionTree::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(Some(params.max_depth))
                .min_weight_leaf(params.min_samples_leaf as f32)
                .min_weight_split(2.0 * params.min_samples_leaf as f32)
                .fit(&dataset)
                .map_err(|err| PipelineError::Fit(err.to_string()))?;

            trees.push(BaggedTree { columns, tree });
        }

        Ok(Self {
            n_features,
            trees,
        })
    }

    /// Вероятность положительного класса: сглаженная доля голосов деревьев
    pub fn predict_proba(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        if X.ncols() != self.n_features {
            return Err(PipelineError::DimensionMismatch {
                expected: self.n_features,
                actual: X.ncols(),
            });
        }
        if self.trees.is_empty() {
            return Err(PipelineError::NotFitted);
        }

        let mut votes = Array1::<f64>::zeros(X.nrows());
        for bagged in &self.trees {
            let subset = X.select(Axis(1), &bagged.columns);
            let predicted: Array1<usize> = bagged.tree.predict(&subset);
            for (vote, label) in votes.iter_mut().zip(predicted.iter()) {
                if *label == 1 {
                    *vote += 1.0;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        Ok(votes.mapv(|v| (v + 1.0) / (n_trees + 2.0)))
    }

    pub fn predict(&self, X: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(self
            .predict_proba(X)?
            .mapv(|p| if p >= 0.5 { 1 } else { 0 }))
    }
}

/// Веса n / (k · n_c), как class_weight="balanced"
fn balanced_weights(y: &Array1<usize>) -> Array1<f32> {
    let n = y.len() as f32;
    let positives = y.iter().filter(|&&label| label == 1).count() as f32;
    let negatives = n - positives;
    if positives == 0.0 || negatives == 0.0 {
        return Array1::from_elem(y.len(), 1.0);
    }
    y.mapv(|label| {
        if label == 1 {
            n / (2.0 * positives)
        } else {
            n / (2.0 * negatives)
        }
    })
}

fn sample_size(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction).round() as usize).clamp(1, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    /// Положительный класс при x0 > 0
    fn separable() -> (Array2<f64>, Array1<usize>) {
        let n = 60;
        let X = Array::from_shape_fn((n, 3), |(i, j)| match j {
            0 => i as f64 - 30.0,
            1 => ((i * 7) % 11) as f64,
            _ => ((i * 3) % 5) as f64,
        });
        let y = Array::from_shape_fn(n, |i| usize::from(i >= 30));
        (X, y)
    }

    #[test]
    fn complexity_scales_with_sample_size() {
        let small = ClassifierParams::for_sample_size(12, 4, 42);
        assert_eq!(small.n_estimators, 10);
        assert_eq!(small.max_depth, 2);
        assert_eq!(small.min_samples_leaf, 5);

        let large = ClassifierParams::for_sample_size(400, 30, 42);
        assert_eq!(large.n_estimators, 50);
        assert_eq!(large.max_depth, 4);
        assert_eq!(large.min_samples_leaf, 20);
    }

    #[test]
    fn learns_a_separable_boundary() {
        let (X, y) = separable();
        let params = ClassifierParams {
            colsample: 1.0,
            ..ClassifierParams::for_sample_size(X.nrows(), X.ncols(), 7)
        };
        let model = TreeEnsemble::fit(&X, &y, params).unwrap();

        let proba = model.predict_proba(&X).unwrap();
        assert!(proba.iter().all(|p| *p > 0.0 && *p < 1.0));
        assert!(proba[0] < 0.5);
        assert!(proba[59] > 0.5);

        let predicted = model.predict(&X).unwrap();
        let correct = predicted.iter().zip(y.iter()).filter(|(a, b)| a == b).count();
        assert!(correct >= 54);
    }

    #[test]
    fn fitting_is_reproducible_for_a_seed() {
        let (X, y) = separable();
        let params = ClassifierParams::for_sample_size(X.nrows(), X.ncols(), 11);
        let first = TreeEnsemble::fit(&X, &y, params).unwrap();
        let second = TreeEnsemble::fit(&X, &y, params).unwrap();
        assert_eq!(first.predict_proba(&X).unwrap(), second.predict_proba(&X).unwrap());
    }

    #[test]
    fn single_class_targets_still_fit() {
        let (X, _) = separable();
        let y = Array1::zeros(X.nrows());
        let model = TreeEnsemble::fit(&X, &y, ClassifierParams::for_sample_size(60, 3, 1)).unwrap();
        let proba = model.predict_proba(&X).unwrap();
        assert!(proba.iter().all(|p| *p < 0.5));
    }

    #[test]
    fn rejects_wrong_width() {
        let (X, y) = separable();
        let model = TreeEnsemble::fit(&X, &y, ClassifierParams::for_sample_size(60, 3, 1)).unwrap();
        let narrow = Array2::zeros((1, 2));
        assert!(matches!(
            model.predict_proba(&narrow),
            Err(PipelineError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let (X, y) = separable();
        let model = TreeEnsemble::fit(&X, &y, ClassifierParams::for_sample_size(60, 3, 3)).unwrap();
        let restored: TreeEnsemble =
            serde_json::from_str(&serde_json::to_string(&model).unwrap()).unwrap();
        assert_eq!(model.predict_proba(&X).unwrap(), restored.predict_proba(&X).unwrap());
    }
}

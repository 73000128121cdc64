//! Активный набор моделей и журнал обучения

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::classifier::TreeEnsemble;
use crate::preprocessing::{FeatureFrame, FeatureSchema, PreprocessingTransform, Preprocessor};
use crate::types::{Target, TrainingRecord};

/// Обученная пара (преобразование, классификатор) для одной цели
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub target: Target,
    pub version: String,
    pub transform: PreprocessingTransform,
    pub classifier: TreeEnsemble,
}

impl TrainedModel {
    /// Вероятность положительного класса для первой строки кадра
    pub fn probability(&self, frame: &FeatureFrame) -> Result<f64> {
        let encoded = Preprocessor::apply(&self.transform, frame)?;
        let proba = self.classifier.predict_proba(&encoded)?;
        proba
            .first()
            .copied()
            .ok_or(PipelineError::EmptyDataset)
    }
}

/// Результат одного успешного обучения: схема и модели одной версии
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub version: String,
    pub schema: FeatureSchema,
    pub approval: Option<TrainedModel>,
    pub withdrawal: Option<TrainedModel>,
}

impl ModelSet {
    pub fn model(&self, target: Target) -> Option<&TrainedModel> {
        match target {
            Target::Approval => self.approval.as_ref(),
            Target::Withdrawal => self.withdrawal.as_ref(),
        }
    }

    pub fn loaded_targets(&self) -> Vec<Target> {
        Target::ALL
            .into_iter()
            .filter(|target| self.model(*target).is_some())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.approval.is_none() && self.withdrawal.is_none()
    }
}

/// Ссылка на активную версию. Новый набор подменяется целиком,
/// читатели, уже получившие Arc, дорабатывают со старой версией.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    active: RwLock<Option<Arc<ModelSet>>>,
    history: RwLock<Vec<TrainingRecord>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ModelSet>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Атомарная установка нового набора вместе с журналом
    pub fn install(&self, set: ModelSet, history: Vec<TrainingRecord>) {
        let set = Arc::new(set);
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let mut log = self.history.write().unwrap_or_else(PoisonError::into_inner);
        *active = Some(set);
        *log = history;
    }

    /// Журнал без смены моделей (загрузка при отсутствии артефактов)
    pub fn set_history(&self, history: Vec<TrainingRecord>) {
        *self.history.write().unwrap_or_else(PoisonError::into_inner) = history;
    }

    pub fn history(&self) -> Vec<TrainingRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Последние `limit` записей журнала, от старых к новым
    pub fn recent_history(&self, limit: usize) -> Vec<TrainingRecord> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    pub fn last_record(&self) -> Option<TrainingRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassificationMetrics, TrainingMetrics};

    fn record(version: &str) -> TrainingRecord {
        let metrics = ClassificationMetrics {
            accuracy: 0.7,
            precision: 0.6,
            recall: 0.5,
            f1: 0.55,
            auc: 0.72,
            cv_mean_accuracy: Some(0.68),
            cv_std_accuracy: Some(0.04),
            cv_scores: vec![0.64, 0.68, 0.72],
            overfit_detected: false,
        };
        TrainingRecord {
            timestamp: "2026-01-01T00:00:00".to_string(),
            source: "test".to_string(),
            records: 100,
            metrics: TrainingMetrics {
                approval: metrics.clone(),
                withdrawal: metrics,
            },
            version: version.to_string(),
            training_data_file: String::new(),
        }
    }

    fn empty_set(version: &str) -> ModelSet {
        ModelSet {
            version: version.to_string(),
            schema: FeatureSchema::default(),
            approval: None,
            withdrawal: None,
        }
    }

    #[test]
    fn install_swaps_the_whole_set() {
        let registry = ModelRegistry::new();
        assert!(registry.current().is_none());

        registry.install(empty_set("v1"), vec![record("v1")]);
        let held = registry.current().unwrap();

        registry.install(empty_set("v2"), vec![record("v1"), record("v2")]);
        // ранее полученная ссылка остается на старой версии
        assert_eq!(held.version, "v1");
        assert_eq!(registry.current().unwrap().version, "v2");
        assert_eq!(registry.last_record().unwrap().version, "v2");
    }

    #[test]
    fn recent_history_keeps_latest_entries() {
        let registry = ModelRegistry::new();
        let history: Vec<_> = (0..8).map(|i| record(&format!("v{i}"))).collect();
        registry.set_history(history);

        let recent = registry.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].version, "v3");
        assert_eq!(recent[4].version, "v7");
        assert_eq!(registry.history().len(), 8);
    }
}

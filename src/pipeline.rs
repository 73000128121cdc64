//! Фасад конвейера: хранилище, активные модели, прогноз и обучение

use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::models::{
    ModelRegistry, ModelStore, PredictionEngine, RuleBasedScorer, TrainingOrchestrator,
};
use crate::sample_data;
use crate::types::{ApplicationRecord, ModelInfo, PredictionResult, TrainingResult};

/// Сколько записей журнала показывать в сводке
pub const HISTORY_PREVIEW: usize = 5;

pub struct CreditPipeline {
    config: PipelineConfig,
    registry: Arc<ModelRegistry>,
    engine: PredictionEngine,
    trainer: TrainingOrchestrator,
}

impl CreditPipeline {
    /// Загружает последнюю зафиксированную версию, если она есть.
    /// Отсутствие моделей не ошибка: прогноз пойдет по правилам.
    pub fn open(config: PipelineConfig) -> Self {
        let store = Arc::new(ModelStore::new(&config.weights_dir, &config.data_dir));
        let registry = Arc::new(ModelRegistry::new());

        match store.load_latest() {
            Ok((set, history)) => registry.install(set, history),
            Err(PipelineError::NotFound(dir)) => {
                tracing::info!(dir = %dir.display(), "No trained models found");
                registry.set_history(store.load_history());
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load models, using rule-based scoring");
            }
        }

        let engine = PredictionEngine::new(
            Arc::clone(&registry),
            RuleBasedScorer::from_config(&config.jitter),
        );
        let trainer = TrainingOrchestrator::new(store, Arc::clone(&registry), config.seed);

        Self {
            config,
            registry,
            engine,
            trainer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_models(&self) -> bool {
        self.registry.current().is_some()
    }

    pub fn predict(&self, record: &ApplicationRecord) -> PredictionResult {
        self.engine.predict(record)
    }

    pub fn train(&self, records: &[ApplicationRecord], source: &str) -> TrainingResult {
        self.trainer.train(records, source)
    }

    /// Обучение, результат которого отбрасывается после крайнего срока
    pub fn train_until(
        &self,
        records: &[ApplicationRecord],
        source: &str,
        deadline: Instant,
    ) -> TrainingResult {
        self.trainer.train_until(records, source, Some(deadline))
    }

    pub fn train_from_database(&self, rows: &[ApplicationRecord]) -> TrainingResult {
        self.trainer.train_from_database(rows)
    }

    /// Если моделей нет, один раз обучается на синтетических данных
    pub fn ensure_models(&self) -> Option<TrainingResult> {
        if self.has_models() {
            return None;
        }
        tracing::info!(
            samples = self.config.bootstrap_samples,
            "Bootstrapping models on synthetic applications"
        );
        let records = sample_data::generate_applications(self.config.bootstrap_samples, self.config.seed);
        Some(self.trainer.train(&records, "sample"))
    }

    pub fn model_info(&self) -> ModelInfo {
        let current = self.registry.current();
        ModelInfo {
            models_loaded: current
                .as_ref()
                .map(|set| set.loaded_targets())
                .unwrap_or_default(),
            feature_count: current.as_ref().map_or(0, |set| set.schema.len()),
            current_version: current.as_ref().map(|set| set.version.clone()),
            training_history: self.registry.recent_history(HISTORY_PREVIEW),
            last_metrics: self.registry.last_record().map(|record| record.metrics),
        }
    }
}

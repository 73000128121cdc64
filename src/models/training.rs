//! Обучение моделей одобрения и отзыва заявок

#![allow(non_snake_case)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use ndarray::Array1;

use crate::error::{PipelineError, Result};
use crate::models::classifier::{ClassifierParams, TreeEnsemble};
use crate::models::evaluation::{self, CrossValidation};
use crate::models::registry::{ModelRegistry, ModelSet, TrainedModel};
use crate::models::store::ModelStore;
use crate::preprocessing::{FeatureEngineer, FeatureFrame, FeatureSchema, Preprocessor};
use crate::types::{
    fields, ApplicationRecord, ApplicationStatus, ClassificationMetrics, FieldValue, Target,
    TrainingMetrics, TrainingRecord, TrainingResult,
};

/// Минимум заявок для обучения на данных из хранилища
pub const MIN_DATABASE_RECORDS: usize = 10;

/// Значения по умолчанию для заявок из хранилища
const STORED_DEFAULTS: &[(&str, StoredDefault)] = &[
    (fields::AGE, StoredDefault::Number(35.0)),
    (fields::GENDER, StoredDefault::Text("Unknown")),
    (fields::CREDIT_SCORE, StoredDefault::Number(650.0)),
    (fields::MONTHLY_INCOME, StoredDefault::Number(35000.0)),
    (fields::DTI_RATIO, StoredDefault::Number(0.35)),
    (fields::EMPLOYMENT_STATUS, StoredDefault::Text("Employed")),
    (fields::EMPLOYMENT_DURATION_MONTHS, StoredDefault::Number(24.0)),
    (fields::LOAN_AMOUNT, StoredDefault::Number(500000.0)),
    (fields::PROPERTY_PRICE, StoredDefault::Number(750000.0)),
    (fields::DOWN_PAYMENT, StoredDefault::Number(250000.0)),
    (fields::INTEREST_RATE, StoredDefault::Number(7.5)),
    (fields::LOAN_DURATION, StoredDefault::Number(20.0)),
    (fields::DOCUMENTS_SUBMITTED, StoredDefault::Number(0.0)),
    (fields::PROCESSING_TIME_DAYS, StoredDefault::Number(15.0)),
    (fields::DAYS_IN_PROCESS, StoredDefault::Number(15.0)),
    (fields::COMMUNICATION_FREQUENCY, StoredDefault::Number(1.0)),
    (fields::COMPLETENESS_SCORE, StoredDefault::Number(0.0)),
];

enum StoredDefault {
    Number(f64),
    Text(&'static str),
}

impl StoredDefault {
    fn value(&self) -> FieldValue {
        match self {
            StoredDefault::Number(value) => FieldValue::Number(*value),
            StoredDefault::Text(value) => FieldValue::from(*value),
        }
    }
}

/// Заявка из хранилища: неизвестный статус становится In-Process,
/// отсутствующие поля получают значения по умолчанию
pub fn normalize_stored_application(row: &ApplicationRecord) -> ApplicationRecord {
    let mut record = row.clone();
    for (name, default) in STORED_DEFAULTS {
        if record.number(name).is_none() && record.text(name).is_none() {
            record.insert(name, default.value());
        }
    }
    let status = record.status().unwrap_or(ApplicationStatus::InProcess);
    record.insert(fields::STATUS, status.as_str());
    record
}

/// Результат обучения до фиксации в хранилище
struct FittedModels {
    set: ModelSet,
    metrics: TrainingMetrics,
}

pub struct TrainingOrchestrator {
    store: Arc<ModelStore>,
    registry: Arc<ModelRegistry>,
    seed: u64,
    // Обучение не реентерабельно: журнал дописывается последовательно
    lock: Mutex<()>,
}

impl TrainingOrchestrator {
    pub fn new(store: Arc<ModelStore>, registry: Arc<ModelRegistry>, seed: u64) -> Self {
        Self {
            store,
            registry,
            seed,
            lock: Mutex::new(()),
        }
    }

    pub fn train(&self, dataset: &[ApplicationRecord], source: &str) -> TrainingResult {
        self.train_until(dataset, source, None)
    }

    /// Обучение с крайним сроком: если он истек до фиксации,
    /// результат отбрасывается и активная модель не меняется
    pub fn train_until(
        &self,
        dataset: &[ApplicationRecord],
        source: &str,
        deadline: Option<Instant>,
    ) -> TrainingResult {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        tracing::info!(records = dataset.len(), source, "Training started");

        let version = ModelStore::next_version();
        let fitted = match self.fit_models(dataset, &version) {
            Ok(fitted) => fitted,
            Err(err) => {
                tracing::error!(error = %err, "Training failed");
                return TrainingResult::failure(format!("Training failed: {err}"), dataset.len());
            }
        };

        if deadline.is_some_and(|deadline| Instant::now() > deadline) {
            tracing::warn!(version = %version, "Training deadline exceeded, discarding models");
            return TrainingResult::failure("Training timed out", dataset.len());
        }

        let training_data_file = match self.store.archive_training_data(dataset, source, &version) {
            Ok(path) => Some(path.display().to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to archive training data");
                None
            }
        };

        let record = TrainingRecord {
            timestamp: chrono::Local::now().to_rfc3339(),
            source: source.to_string(),
            records: dataset.len(),
            metrics: fitted.metrics.clone(),
            version: version.clone(),
            training_data_file: training_data_file.clone().unwrap_or_default(),
        };
        let mut history = self.registry.history();
        history.push(record);

        if let Err(err) = self.store.save(&fitted.set, &history) {
            tracing::error!(error = %err, "Failed to persist models");
            return TrainingResult::failure(format!("Failed to save models: {err}"), dataset.len());
        }
        self.registry.install(fitted.set, history);

        tracing::info!(
            version = %version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            approval_accuracy = fitted.metrics.approval.accuracy,
            withdrawal_accuracy = fitted.metrics.withdrawal.accuracy,
            "Training completed"
        );

        TrainingResult {
            success: true,
            message: format!("Models trained successfully on {} records", dataset.len()),
            metrics: Some(fitted.metrics),
            records_used: dataset.len(),
            training_data_saved: training_data_file,
        }
    }

    /// Обучение на заявках из внешнего хранилища
    pub fn train_from_database(&self, rows: &[ApplicationRecord]) -> TrainingResult {
        if rows.len() < MIN_DATABASE_RECORDS {
            let err = PipelineError::InsufficientData {
                found: rows.len(),
                required: MIN_DATABASE_RECORDS,
            };
            tracing::warn!(error = %err, "Not enough stored applications");
            return TrainingResult::failure(err.to_string(), rows.len());
        }
        let dataset: Vec<ApplicationRecord> =
            rows.iter().map(normalize_stored_application).collect();
        self.train(&dataset, "database")
    }

    /// Все вычисления без побочных эффектов; в хранилище ничего не пишется
    fn fit_models(&self, dataset: &[ApplicationRecord], version: &str) -> Result<FittedModels> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        if !dataset.iter().any(|record| record.contains(fields::STATUS)) {
            return Err(PipelineError::MissingStatusColumn);
        }

        let features = FeatureEngineer::engineer_batch(dataset);
        let frame = FeatureFrame::from_features(&features);
        if frame.n_columns() == 0 {
            return Err(PipelineError::Fit("no usable feature columns".to_string()));
        }
        let schema = FeatureSchema::infer(&frame);
        tracing::debug!(features = schema.len(), "Feature schema inferred");

        let statuses: Vec<Option<ApplicationStatus>> =
            dataset.iter().map(ApplicationRecord::status).collect();

        let mut fitted = Vec::with_capacity(Target::ALL.len());
        for (offset, target) in Target::ALL.into_iter().enumerate() {
            let labels: Vec<usize> = statuses.iter().map(|status| target.label(*status)).collect();
            let seed = self.seed.wrapping_add(offset as u64);
            fitted.push(self.fit_target(target, &frame, &schema, &labels, version, seed)?);
        }

        let mut fitted = fitted.into_iter();
        let (approval, approval_metrics) = fitted
            .next()
            .ok_or_else(|| PipelineError::Fit("approval model missing".to_string()))?;
        let (withdrawal, withdrawal_metrics) = fitted
            .next()
            .ok_or_else(|| PipelineError::Fit("withdrawal model missing".to_string()))?;

        Ok(FittedModels {
            set: ModelSet {
                version: version.to_string(),
                schema,
                approval: Some(approval),
                withdrawal: Some(withdrawal),
            },
            metrics: TrainingMetrics {
                approval: approval_metrics,
                withdrawal: withdrawal_metrics,
            },
        })
    }

    fn fit_target(
        &self,
        target: Target,
        frame: &FeatureFrame,
        schema: &FeatureSchema,
        labels: &[usize],
        version: &str,
        seed: u64,
    ) -> Result<(TrainedModel, ClassificationMetrics)> {
        let n = labels.len();
        let positives = labels.iter().sum::<usize>();
        tracing::info!(%target, positives, negatives = n - positives, "Target distribution");

        let sparse = !evaluation::can_stratify(labels);
        if sparse {
            tracing::warn!(%target, positives, "Class too sparse to stratify, using random split");
        }

        let split = evaluation::train_test_split(labels, evaluation::test_fraction(n), seed);
        // Редкий класс: отложенная выборка ничего не измерит, модель видит все строки
        let fit_rows: Vec<usize> = if sparse {
            (0..n).collect()
        } else {
            split.train.clone()
        };
        let (model, params) = fit_on_rows(target, frame, schema, labels, &fit_rows, version, seed)?;
        tracing::info!(
            %target,
            n_estimators = params.n_estimators,
            max_depth = params.max_depth,
            min_samples_leaf = params.min_samples_leaf,
            train_rows = fit_rows.len(),
            test_rows = if sparse { 0 } else { split.test.len() },
            "Classifier fitted"
        );

        if sparse {
            // Для редкого класса метрики не информативны
            return Ok((model, baseline_metrics()));
        }

        let test_frame = frame.select_rows(&split.test);
        let y_test: Vec<usize> = split.test.iter().map(|&i| labels[i]).collect();
        let test_metrics = if split.test.is_empty() {
            evaluation::evaluate(&[], &[])
        } else {
            let X_test = Preprocessor::apply(&model.transform, &test_frame)?;
            let proba = model.classifier.predict_proba(&X_test)?.to_vec();
            evaluation::evaluate(&y_test, &proba)
        };

        let cv = cross_validate(target, frame, schema, labels, version, seed);
        tracing::info!(
            %target,
            cv_mean = cv.mean,
            cv_std = cv.std,
            test_accuracy = test_metrics.accuracy,
            "Cross-validation finished"
        );

        let metrics = evaluation::combine(test_metrics, cv);
        if metrics.overfit_detected {
            tracing::warn!(
                %target,
                accuracy = metrics.accuracy,
                "Overfitting detected, reporting cross-validated accuracy"
            );
        }
        Ok((model, metrics))
    }
}

/// Базовые метрики для вырожденных данных
fn baseline_metrics() -> ClassificationMetrics {
    let cv = CrossValidation::baseline();
    ClassificationMetrics {
        accuracy: 0.5,
        precision: 0.5,
        recall: 0.5,
        f1: 0.5,
        auc: 0.5,
        cv_mean_accuracy: Some(cv.mean),
        cv_std_accuracy: Some(cv.std),
        cv_scores: cv.scores,
        overfit_detected: false,
    }
}

/// Преобразование и классификатор, обученные на подмножестве строк
fn fit_on_rows(
    target: Target,
    frame: &FeatureFrame,
    schema: &FeatureSchema,
    labels: &[usize],
    rows: &[usize],
    version: &str,
    seed: u64,
) -> Result<(TrainedModel, ClassifierParams)> {
    let train_frame = frame.select_rows(rows);
    let transform = Preprocessor::fit_with_schema(&train_frame, schema)?;
    let X_train = Preprocessor::apply(&transform, &train_frame)?;
    let y_train: Array1<usize> = rows.iter().map(|&i| labels[i]).collect();

    // Глубина зависит от числа исходных колонок, а не от ширины после one-hot
    let params = ClassifierParams::for_sample_size(rows.len(), schema.len(), seed);
    let classifier = TreeEnsemble::fit(&X_train, &y_train, params)?;

    Ok((
        TrainedModel {
            target,
            version: version.to_string(),
            transform,
            classifier,
        },
        params,
    ))
}

/// k-блочная проверка; преобразование переобучается в каждом блоке
fn cross_validate(
    target: Target,
    frame: &FeatureFrame,
    schema: &FeatureSchema,
    labels: &[usize],
    version: &str,
    seed: u64,
) -> CrossValidation {
    let k = evaluation::fold_count(labels.len());
    let Some(folds) = evaluation::stratified_folds(labels, k, seed) else {
        tracing::warn!(%target, k, "Too few samples per class for cross-validation");
        return CrossValidation::baseline();
    };

    let mut scores = Vec::with_capacity(k);
    for (held_out, fold) in folds.iter().enumerate() {
        let train_rows: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != held_out)
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect();

        let score = fit_on_rows(target, frame, schema, labels, &train_rows, version, seed).and_then(
            |(model, _)| {
                let X = Preprocessor::apply(&model.transform, &frame.select_rows(fold))?;
                let predicted = model.classifier.predict(&X)?;
                let y: Vec<usize> = fold.iter().map(|&i| labels[i]).collect();
                Ok(evaluation::accuracy(&y, &predicted.to_vec()))
            },
        );

        match score {
            Ok(score) => scores.push(score),
            Err(err) => {
                tracing::warn!(%target, fold = held_out, error = %err, "Cross-validation fold failed");
                return CrossValidation::baseline();
            }
        }
    }

    CrossValidation::from_scores(scores)
}

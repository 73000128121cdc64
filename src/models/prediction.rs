//! Прогноз по одной заявке: модель, бизнес-корректировки и эвристический запасной путь

use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::models::registry::{ModelRegistry, ModelSet};
use crate::models::rules::{round1, RuleBasedScorer, RuleInputs};
use crate::preprocessing::{EngineeredFeatures, FeatureEngineer};
use crate::types::{fields, ApplicationRecord, PredictionResult, Target};

/// Итоговые границы вероятностей
pub const APPROVAL_BOUNDS: (f64, f64) = (0.10, 0.90);
pub const WITHDRAWAL_BOUNDS: (f64, f64) = (0.05, 0.85);
/// Вне этих границ ответ модели считается переуверенным
const APPROVAL_TRUSTED: (f64, f64) = (0.05, 0.95);
const WITHDRAWAL_TRUSTED: (f64, f64) = (0.05, 0.95);

pub struct PredictionEngine {
    registry: Arc<ModelRegistry>,
    scorer: RuleBasedScorer,
}

impl PredictionEngine {
    pub fn new(registry: Arc<ModelRegistry>, scorer: RuleBasedScorer) -> Self {
        Self { registry, scorer }
    }

    pub fn scorer(&self) -> &RuleBasedScorer {
        &self.scorer
    }

    /// Оба поля заполняются всегда; ошибка модели заменяется эвристикой
    pub fn predict(&self, record: &ApplicationRecord) -> PredictionResult {
        let features = FeatureEngineer::engineer(record);
        let inputs = RuleInputs::from_record(record);
        let models = self.registry.current();

        let success_probability = match model_probability(models.as_deref(), Target::Approval, &features) {
            Some(Ok(probability)) => blend_approval(probability, &inputs),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Approval model failed, using rule-based score");
                self.scorer.score_approval(&features)
            }
            None => self.scorer.score_approval(&features),
        };

        let withdrawal_risk = match model_probability(models.as_deref(), Target::Withdrawal, &features) {
            Some(Ok(probability)) => {
                if probability < WITHDRAWAL_TRUSTED.0 || probability > WITHDRAWAL_TRUSTED.1 {
                    tracing::warn!(probability, "Extreme withdrawal probability, using rule-based score");
                    self.scorer.score_withdrawal(&features)
                } else {
                    blend_withdrawal(probability, &inputs)
                }
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Withdrawal model failed, using rule-based score");
                self.scorer.score_withdrawal(&features)
            }
            None => self.scorer.score_withdrawal(&features),
        };

        PredictionResult {
            success_probability,
            withdrawal_risk,
            completeness_score: record.number_or(fields::COMPLETENESS_SCORE, 0.0),
        }
    }
}

/// None, если модели для цели нет
fn model_probability(
    models: Option<&ModelSet>,
    target: Target,
    features: &EngineeredFeatures,
) -> Option<Result<f64>> {
    let models = models?;
    let model = models.model(target)?;
    let frame = models.schema.align(features);
    Some(model.probability(&frame).and_then(|probability| {
        if probability.is_finite() {
            Ok(probability)
        } else {
            Err(PipelineError::Fit(format!("non-finite probability {probability}")))
        }
    }))
}

/// Корректировки применяются в фиксированном порядке:
/// рейтинг, долговая нагрузка, доход, стаж
pub fn blend_approval(probability: f64, inputs: &RuleInputs) -> f64 {
    let mut p = probability;
    if p > APPROVAL_TRUSTED.1 || p < APPROVAL_TRUSTED.0 {
        tracing::warn!(probability = p, "Overconfident approval probability, clamping");
        p = p.clamp(APPROVAL_BOUNDS.0, APPROVAL_BOUNDS.1);
    }

    let credit = inputs.credit_score;
    if credit >= 750.0 {
        p = (p * 1.10).min(0.85);
    } else if credit >= 700.0 {
        p = (p * 1.05).min(0.80);
    } else if credit < 600.0 {
        p = (p * 0.70).max(0.15);
    } else if credit < 650.0 {
        p = (p * 0.85).max(0.25);
    }

    let dti = inputs.dti_ratio;
    if dti > 0.43 {
        p = (p * 0.80).max(0.20);
    } else if dti > 0.36 {
        p = (p * 0.90).max(0.30);
    } else if dti <= 0.28 {
        p = (p * 1.05).min(0.85);
    }

    let income = inputs.monthly_income;
    if income < 25000.0 {
        p = (p * 0.85).max(0.20);
    } else if income > 60000.0 {
        p = (p * 1.03).min(0.85);
    }

    let employment = inputs.employment_months;
    if employment < 12.0 {
        p = (p * 0.90).max(0.25);
    } else if employment >= 36.0 {
        p = (p * 1.02).min(0.85);
    }

    round1(p.clamp(APPROVAL_BOUNDS.0, APPROVAL_BOUNDS.1) * 100.0)
}

/// Аддитивные поправки риска отзыва, у каждой свой предел
pub fn blend_withdrawal(probability: f64, inputs: &RuleInputs) -> f64 {
    let mut r = probability;

    let days = inputs.days_in_process;
    if days > 30.0 {
        r = (r + 0.15).min(0.85);
    } else if days > 20.0 {
        r = (r + 0.08).min(0.70);
    }

    let communication = inputs.communication_frequency;
    if communication < 0.5 {
        r = (r + 0.12).min(0.80);
    } else if communication > 2.0 {
        r = (r - 0.05).max(0.10);
    }

    let completeness = inputs.completeness;
    if completeness < 60.0 {
        r = (r + 0.10).min(0.75);
    } else if completeness >= 90.0 {
        r = (r - 0.05).max(0.15);
    }

    round1(r.clamp(WITHDRAWAL_BOUNDS.0, WITHDRAWAL_BOUNDS.1) * 100.0)
}

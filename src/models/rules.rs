/// Эвристическая оценка заявок без обученной модели

use rand::Rng;

use crate::config::JitterConfig;
use crate::preprocessing::EngineeredFeatures;
use crate::types::{fields, ApplicationRecord};

pub const APPROVAL_MIN: f64 = 20.0;
pub const APPROVAL_MAX: f64 = 75.0;
pub const WITHDRAWAL_MIN: f64 = 0.05;
pub const WITHDRAWAL_MAX: f64 = 0.80;

/// Значения по умолчанию для отсутствующих полей
pub(crate) mod defaults {
    pub const CREDIT_SCORE: f64 = 650.0;
    pub const DTI_RATIO: f64 = 0.35;
    pub const MONTHLY_INCOME: f64 = 35000.0;
    pub const EMPLOYMENT_DURATION_MONTHS: f64 = 24.0;
    pub const COMPLETENESS_SCORE: f64 = 80.0;
    pub const DAYS_IN_PROCESS: f64 = 15.0;
    pub const COMMUNICATION_FREQUENCY: f64 = 1.0;
    pub const DOCUMENTS_SUBMITTED: f64 = 4.0;
    pub const LOAN_AMOUNT: f64 = 0.0;
    pub const PROPERTY_PRICE: f64 = 1.0;
    pub const AGE: f64 = 35.0;
}

/// Источник случайного разброса оценок
pub trait NoiseSource: Send + Sync {
    /// Значение из [-amplitude, amplitude]
    fn sample(&self, amplitude: f64) -> f64;
}

/// Без разброса: оценки полностью детерминированы
pub struct NoJitter;

impl NoiseSource for NoJitter {
    fn sample(&self, _amplitude: f64) -> f64 {
        0.0
    }
}

/// Равномерный разброс
pub struct UniformJitter;

impl NoiseSource for UniformJitter {
    fn sample(&self, amplitude: f64) -> f64 {
        if amplitude <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(-amplitude..=amplitude)
    }
}

/// Входы правил, прочитанные из заявки с подстановкой значений по умолчанию
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleInputs {
    pub credit_score: f64,
    pub dti_ratio: f64,
    pub monthly_income: f64,
    pub employment_months: f64,
    pub completeness: f64,
    pub days_in_process: f64,
    pub communication_frequency: f64,
    pub documents_submitted: f64,
    pub loan_amount: f64,
    pub property_price: f64,
    pub age: f64,
}

impl RuleInputs {
    pub fn from_record(record: &ApplicationRecord) -> Self {
        let days_in_process = record
            .number(fields::DAYS_IN_PROCESS)
            .or_else(|| record.number(fields::PROCESSING_TIME_DAYS))
            .unwrap_or(defaults::DAYS_IN_PROCESS);

        Self {
            credit_score: record.number_or(fields::CREDIT_SCORE, defaults::CREDIT_SCORE),
            dti_ratio: record.number_or(fields::DTI_RATIO, defaults::DTI_RATIO),
            monthly_income: record.number_or(fields::MONTHLY_INCOME, defaults::MONTHLY_INCOME),
            employment_months: record.number_or(
                fields::EMPLOYMENT_DURATION_MONTHS,
                defaults::EMPLOYMENT_DURATION_MONTHS,
            ),
            completeness: record.number_or(fields::COMPLETENESS_SCORE, defaults::COMPLETENESS_SCORE),
            days_in_process,
            communication_frequency: record.number_or(
                fields::COMMUNICATION_FREQUENCY,
                defaults::COMMUNICATION_FREQUENCY,
            ),
            documents_submitted: record
                .number_or(fields::DOCUMENTS_SUBMITTED, defaults::DOCUMENTS_SUBMITTED),
            loan_amount: record.number_or(fields::LOAN_AMOUNT, defaults::LOAN_AMOUNT),
            property_price: record.number_or(fields::PROPERTY_PRICE, defaults::PROPERTY_PRICE),
            age: record.number_or(fields::AGE, defaults::AGE),
        }
    }

    /// Отношение кредита к стоимости; None, если цена не положительна
    fn ltv(&self) -> Option<f64> {
        (self.property_price > 0.0).then(|| self.loan_amount / self.property_price)
    }
}

/// Аддитивная балльная система андеррайтинга
pub struct RuleBasedScorer {
    noise: Box<dyn NoiseSource>,
    approval_amplitude: f64,
    withdrawal_amplitude: f64,
}

impl RuleBasedScorer {
    pub fn new(noise: Box<dyn NoiseSource>, approval_amplitude: f64, withdrawal_amplitude: f64) -> Self {
        Self {
            noise,
            approval_amplitude,
            withdrawal_amplitude,
        }
    }

    pub fn deterministic() -> Self {
        Self::new(Box::new(NoJitter), 0.0, 0.0)
    }

    pub fn from_config(config: &JitterConfig) -> Self {
        if config.enabled {
            Self::new(
                Box::new(UniformJitter),
                config.approval_amplitude,
                config.withdrawal_amplitude,
            )
        } else {
            Self::deterministic()
        }
    }

    /// Оценка одобрения в процентах, в пределах [20, 75]
    pub fn score_approval(&self, features: &EngineeredFeatures) -> f64 {
        let inputs = RuleInputs::from_record(features.record());
        let mut score = 50.0 + approval_points(&inputs);
        score += self.noise.sample(self.approval_amplitude);
        round1(score.clamp(APPROVAL_MIN, APPROVAL_MAX))
    }

    /// Вероятность отзыва заявки как доля, в пределах [0.05, 0.80]
    pub fn withdrawal_probability(&self, features: &EngineeredFeatures) -> f64 {
        let inputs = RuleInputs::from_record(features.record());
        let mut score = 25.0 + withdrawal_points(&inputs);
        score += self.noise.sample(self.withdrawal_amplitude);
        (score / 100.0).clamp(WITHDRAWAL_MIN, WITHDRAWAL_MAX)
    }

    /// Риск отзыва в процентах
    pub fn score_withdrawal(&self, features: &EngineeredFeatures) -> f64 {
        round1(self.withdrawal_probability(features) * 100.0)
    }
}

fn approval_points(inputs: &RuleInputs) -> f64 {
    let mut points = 0.0;

    // Кредитный рейтинг
    points += match inputs.credit_score {
        s if s >= 780.0 => 20.0,
        s if s >= 740.0 => 15.0,
        s if s >= 700.0 => 10.0,
        s if s >= 650.0 => 3.0,
        s if s >= 600.0 => -10.0,
        s if s >= 550.0 => -18.0,
        _ => -25.0,
    };

    // Долговая нагрузка
    points += match inputs.dti_ratio {
        d if d <= 0.28 => 10.0,
        d if d <= 0.36 => 3.0,
        d if d <= 0.43 => -5.0,
        d if d <= 0.50 => -15.0,
        _ => -25.0,
    };

    // Доход
    points += match inputs.monthly_income {
        i if i >= 80000.0 => 8.0,
        i if i >= 50000.0 => 4.0,
        i if i >= 35000.0 => 1.0,
        i if i < 25000.0 => -10.0,
        _ => 0.0,
    };

    // Стаж
    points += match inputs.employment_months {
        m if m >= 36.0 => 5.0,
        m if m >= 24.0 => 2.0,
        m if m < 6.0 => -15.0,
        m if m < 12.0 => -8.0,
        _ => 0.0,
    };

    // Полнота документов
    points += match inputs.completeness {
        c if c >= 95.0 => 3.0,
        c if c >= 80.0 => 1.0,
        c if c < 40.0 => -15.0,
        c if c < 60.0 => -8.0,
        _ => 0.0,
    };

    if let Some(ltv) = inputs.ltv() {
        points += match ltv * 100.0 {
            l if l <= 70.0 => 4.0,
            l if l <= 80.0 => 1.0,
            l if l <= 90.0 => -3.0,
            l if l > 95.0 => -12.0,
            _ => 0.0,
        };
    }

    points += match inputs.age {
        a if (30.0..=50.0).contains(&a) => 2.0,
        a if a < 25.0 => -3.0,
        a if a > 65.0 => -5.0,
        _ => 0.0,
    };

    points
}

fn withdrawal_points(inputs: &RuleInputs) -> f64 {
    let mut points = 0.0;

    // Длительное рассмотрение повышает риск отзыва
    points += match inputs.days_in_process {
        d if d > 45.0 => 25.0,
        d if d > 30.0 => 15.0,
        d if d > 20.0 => 8.0,
        d if d < 10.0 => -5.0,
        _ => 0.0,
    };

    points += match inputs.communication_frequency {
        f if f < 0.3 => 20.0,
        f if f < 0.7 => 10.0,
        f if f > 2.0 => -8.0,
        f if f > 1.5 => -3.0,
        _ => 0.0,
    };

    points += match inputs.completeness {
        c if c < 40.0 => 15.0,
        c if c < 60.0 => 8.0,
        c if c >= 90.0 => -5.0,
        _ => 0.0,
    };

    points += match inputs.documents_submitted {
        d if d <= 2.0 => 12.0,
        d if d <= 3.0 => 5.0,
        d if d >= 5.0 => -3.0,
        _ => 0.0,
    };

    points += match inputs.credit_score {
        s if s < 550.0 => 10.0,
        s if s < 600.0 => 5.0,
        s if s >= 750.0 => -5.0,
        _ => 0.0,
    };

    if let Some(ltv) = inputs.ltv() {
        points += match ltv {
            l if l > 0.90 => 8.0,
            l if l > 0.85 => 4.0,
            l if l < 0.75 => -2.0,
            _ => 0.0,
        };
    }

    points += match inputs.dti_ratio {
        d if d > 0.45 => 8.0,
        d if d > 0.40 => 4.0,
        d if d < 0.30 => -3.0,
        _ => 0.0,
    };

    points
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::FeatureEngineer;

    fn features(record: ApplicationRecord) -> EngineeredFeatures {
        FeatureEngineer::engineer(&record)
    }

    fn applicant(credit_score: f64, dti: f64) -> ApplicationRecord {
        ApplicationRecord::new()
            .with(fields::CREDIT_SCORE, credit_score)
            .with(fields::DTI_RATIO, dti)
            .with(fields::MONTHLY_INCOME, 40000.0)
            .with(fields::EMPLOYMENT_DURATION_MONTHS, 18.0)
            .with(fields::COMPLETENESS_SCORE, 70.0)
            .with(fields::LOAN_AMOUNT, 850000.0)
            .with(fields::PROPERTY_PRICE, 1000000.0)
            .with(fields::AGE, 22.0)
    }

    #[test]
    fn strong_applicant_outscores_weak_one() {
        let scorer = RuleBasedScorer::deterministic();
        let strong = ApplicationRecord::new()
            .with(fields::CREDIT_SCORE, 780.0)
            .with(fields::DTI_RATIO, 0.25)
            .with(fields::MONTHLY_INCOME, 70000.0)
            .with(fields::EMPLOYMENT_DURATION_MONTHS, 48.0)
            .with(fields::COMPLETENESS_SCORE, 95.0);
        let weak = strong
            .clone()
            .with(fields::CREDIT_SCORE, 550.0)
            .with(fields::DTI_RATIO, 0.55)
            .with(fields::EMPLOYMENT_DURATION_MONTHS, 8.0)
            .with(fields::COMPLETENESS_SCORE, 40.0);

        let strong_score = scorer.score_approval(&features(strong));
        let weak_score = scorer.score_approval(&features(weak));

        assert_eq!(strong_score, APPROVAL_MAX);
        assert_eq!(weak_score, APPROVAL_MIN);
        assert!(strong_score > weak_score);
    }

    #[test]
    fn approval_is_monotonic_in_credit_score() {
        let scorer = RuleBasedScorer::deterministic();
        let mut previous = f64::MIN;
        for score in (550..=800).step_by(5) {
            let current = scorer.score_approval(&features(applicant(score as f64, 0.33)));
            assert!(current >= previous, "credit {score}: {current} < {previous}");
            previous = current;
        }
    }

    #[test]
    fn approval_never_rises_with_dti() {
        let scorer = RuleBasedScorer::deterministic();
        let mut previous = f64::MAX;
        for step in 0..=30 {
            let dti = 0.25 + step as f64 * 0.01;
            let current = scorer.score_approval(&features(applicant(720.0, dti)));
            assert!(current <= previous, "dti {dti}: {current} > {previous}");
            previous = current;
        }
    }

    #[test]
    fn exact_points_for_a_typical_applicant() {
        // 50 + 10 + 3 + 1 - 3 (LTV 85%) - 3 (возраст 22)
        let scorer = RuleBasedScorer::deterministic();
        assert_eq!(scorer.score_approval(&features(applicant(720.0, 0.33))), 58.0);
    }

    #[test]
    fn ltv_rules_skip_non_positive_price() {
        let scorer = RuleBasedScorer::deterministic();
        let zero_price = applicant(720.0, 0.33).with(fields::PROPERTY_PRICE, 0.0);
        // Без штрафа за LTV
        assert_eq!(scorer.score_approval(&features(zero_price)), 61.0);
    }

    #[test]
    fn withdrawal_risk_rises_with_stalled_applications() {
        let scorer = RuleBasedScorer::deterministic();
        let engaged = ApplicationRecord::new()
            .with(fields::DAYS_IN_PROCESS, 5.0)
            .with(fields::COMMUNICATION_FREQUENCY, 2.5)
            .with(fields::COMPLETENESS_SCORE, 95.0)
            .with(fields::DOCUMENTS_SUBMITTED, 6.0)
            .with(fields::CREDIT_SCORE, 760.0)
            .with(fields::DTI_RATIO, 0.25);
        let stalled = ApplicationRecord::new()
            .with(fields::PROCESSING_TIME_DAYS, 50.0)
            .with(fields::COMMUNICATION_FREQUENCY, 0.2)
            .with(fields::COMPLETENESS_SCORE, 30.0)
            .with(fields::DOCUMENTS_SUBMITTED, 1.0)
            .with(fields::CREDIT_SCORE, 520.0)
            .with(fields::DTI_RATIO, 0.5);

        assert_eq!(scorer.score_withdrawal(&features(engaged)), 5.0);
        assert_eq!(scorer.score_withdrawal(&features(stalled)), 80.0);
        assert_eq!(scorer.withdrawal_probability(&features(ApplicationRecord::new())), 0.23);
    }

    struct Fixed(f64);

    impl NoiseSource for Fixed {
        fn sample(&self, amplitude: f64) -> f64 {
            self.0.clamp(-amplitude, amplitude)
        }
    }

    #[test]
    fn injected_noise_is_bounded_by_amplitude() {
        let scorer = RuleBasedScorer::new(Box::new(Fixed(10.0)), 4.0, 3.0);
        let base = RuleBasedScorer::deterministic();
        let record = features(applicant(720.0, 0.33));

        assert_eq!(scorer.score_approval(&record), base.score_approval(&record) + 4.0);
        assert_eq!(scorer.score_withdrawal(&record), base.score_withdrawal(&record) + 3.0);
    }

    #[test]
    fn uniform_jitter_stays_in_range() {
        let jitter = UniformJitter;
        for _ in 0..100 {
            let value = jitter.sample(4.0);
            assert!((-4.0..=4.0).contains(&value));
        }
        assert_eq!(jitter.sample(0.0), 0.0);
    }
}

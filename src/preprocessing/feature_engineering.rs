//! Feature engineering для кредитных заявок

use serde::{Deserialize, Serialize};

use crate::types::{fields, ApplicationRecord};

/// Категория кредитного риска по скорингу (правая граница включительно)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditRiskCategory {
    VeryPoor,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl CreditRiskCategory {
    /// Границы: (0, 580], (580, 620], (620, 680], (680, 740], (740, 850]
    pub fn from_score(score: f64) -> Option<Self> {
        if !(score > 0.0 && score <= 850.0) {
            return None;
        }
        let category = if score <= 580.0 {
            Self::VeryPoor
        } else if score <= 620.0 {
            Self::Poor
        } else if score <= 680.0 {
            Self::Fair
        } else if score <= 740.0 {
            Self::Good
        } else {
            Self::Excellent
        };
        Some(category)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryPoor => "Very_Poor",
            Self::Poor => "Poor",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        }
    }
}

/// Заявка вместе с производными признаками
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredFeatures {
    record: ApplicationRecord,
}

impl EngineeredFeatures {
    pub fn record(&self) -> &ApplicationRecord {
        &self.record
    }

    pub fn ltv_ratio(&self) -> Option<f64> {
        self.record.number(fields::LTV_RATIO)
    }

    pub fn down_payment_percentage(&self) -> Option<f64> {
        self.record.number(fields::DOWN_PAYMENT_PERCENTAGE)
    }

    pub fn monthly_payment(&self) -> Option<f64> {
        self.record.number(fields::MONTHLY_PAYMENT)
    }

    pub fn calculated_dti(&self) -> Option<f64> {
        self.record.number(fields::CALCULATED_DTI)
    }

    pub fn long_processing(&self) -> Option<bool> {
        self.record.number(fields::LONG_PROCESSING).map(|flag| flag > 0.0)
    }

    pub fn low_documentation(&self) -> Option<bool> {
        self.record.number(fields::LOW_DOCUMENTATION).map(|flag| flag > 0.0)
    }

    pub fn credit_risk_category(&self) -> Option<&str> {
        self.record.text(fields::CREDIT_RISK_CATEGORY)
    }
}

pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Производные финансовые коэффициенты и индикаторы риска.
    /// Отсутствующие входы просто пропускают зависящий от них признак.
    pub fn engineer(record: &ApplicationRecord) -> EngineeredFeatures {
        let mut features = record.clone();

        let loan_amount = record.number(fields::LOAN_AMOUNT);
        let property_price = record.number(fields::PROPERTY_PRICE);

        // Финансовые коэффициенты
        if let (Some(loan), Some(price)) = (loan_amount, property_price) {
            features.insert(fields::LTV_RATIO, loan / safe_denominator(price));
        }
        if let (Some(down), Some(price)) = (record.number(fields::DOWN_PAYMENT), property_price) {
            features.insert(fields::DOWN_PAYMENT_PERCENTAGE, down / safe_denominator(price));
        }

        // Ежемесячный платеж по формуле аннуитета
        if let (Some(loan), Some(rate), Some(years)) = (
            loan_amount,
            record.number(fields::INTEREST_RATE),
            record.number(fields::LOAN_DURATION),
        ) {
            if let Some(payment) = monthly_payment(loan, rate, years) {
                features.insert(fields::MONTHLY_PAYMENT, payment);

                if let Some(income) = record.number(fields::MONTHLY_INCOME) {
                    features.insert(fields::CALCULATED_DTI, payment / safe_denominator(income));
                }
            }
        }

        // Индикаторы риска
        if let Some(days) = record.number(fields::DAYS_IN_PROCESS) {
            features.insert(fields::LONG_PROCESSING, flag(days > 30.0));
        }
        if let Some(documents) = record.number(fields::DOCUMENTS_SUBMITTED) {
            features.insert(fields::LOW_DOCUMENTATION, flag(documents < 3.0));
        }
        if let Some(category) = record
            .number(fields::CREDIT_SCORE)
            .and_then(CreditRiskCategory::from_score)
        {
            features.insert(fields::CREDIT_RISK_CATEGORY, category.as_str());
        }

        EngineeredFeatures { record: features }
    }

    pub fn engineer_batch(records: &[ApplicationRecord]) -> Vec<EngineeredFeatures> {
        records.iter().map(Self::engineer).collect()
    }
}

/// P = L·r(1+r)^n / ((1+r)^n − 1), при r = 0 просто L/n
pub fn monthly_payment(loan_amount: f64, annual_rate_percent: f64, years: f64) -> Option<f64> {
    let n_payments = years * 12.0;
    if !(n_payments > 0.0) {
        return None;
    }

    let monthly_rate = annual_rate_percent / 100.0 / 12.0;
    let payment = if monthly_rate > 0.0 {
        let growth = (1.0 + monthly_rate).powf(n_payments);
        loan_amount * (monthly_rate * growth) / (growth - 1.0)
    } else {
        loan_amount / n_payments
    };

    payment.is_finite().then_some(payment)
}

fn safe_denominator(value: f64) -> f64 {
    value.max(1.0)
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

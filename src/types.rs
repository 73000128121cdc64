//! Типы данных для кредитного ML модуля

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Имена полей заявки (совпадают с колонками выгрузки)
pub mod fields {
    pub const AGE: &str = "Age";
    pub const GENDER: &str = "Gender";
    pub const CREDIT_SCORE: &str = "Credit_Score";
    pub const MONTHLY_INCOME: &str = "Monthly_Income";
    pub const DTI_RATIO: &str = "DTI_Ratio";
    pub const EMPLOYMENT_STATUS: &str = "Employment_Status";
    pub const EMPLOYMENT_DURATION_MONTHS: &str = "Employment_Duration_Months";
    pub const DOCUMENTS_SUBMITTED: &str = "Documents_Submitted";
    pub const DAYS_IN_PROCESS: &str = "Days_In_Process";
    pub const PROCESSING_TIME_DAYS: &str = "Processing_Time_Days";
    pub const COMMUNICATION_FREQUENCY: &str = "Communication_Frequency";
    pub const LOAN_AMOUNT: &str = "Loan_Amount";
    pub const PROPERTY_PRICE: &str = "Property_Price";
    pub const DOWN_PAYMENT: &str = "Down_Payment";
    pub const INTEREST_RATE: &str = "Interest_Rate";
    pub const LOAN_DURATION: &str = "Loan_Duration";
    pub const COMPLETENESS_SCORE: &str = "completeness_score";
    pub const STATUS: &str = "Status";

    // Производные признаки
    pub const LTV_RATIO: &str = "LTV_Ratio";
    pub const DOWN_PAYMENT_PERCENTAGE: &str = "Down_Payment_Percentage";
    pub const MONTHLY_PAYMENT: &str = "Monthly_Payment";
    pub const CALCULATED_DTI: &str = "Calculated_DTI";
    pub const LONG_PROCESSING: &str = "Long_Processing";
    pub const LOW_DOCUMENTATION: &str = "Low_Documentation";
    pub const CREDIT_RISK_CATEGORY: &str = "Credit_Risk_Category";

    /// Идентификаторы и свободный текст, которые не идут в признаки
    pub const EXCLUDED: &[&str] = &[
        STATUS,
        "Application_ID",
        "Application_Date",
        "application_id",
        "client_name",
        "dpi",
        "email",
        "phone",
        "address",
        "notes",
    ];
}

/// Скалярное значение поля: число или строка
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// Входное представление: логические значения становятся флагами 0/1
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawFieldValue::deserialize(deserializer)? {
            RawFieldValue::Number(value) => FieldValue::Number(value),
            RawFieldValue::Flag(value) => FieldValue::Number(if value { 1.0 } else { 0.0 }),
            RawFieldValue::Text(value) => FieldValue::Text(value),
        })
    }
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Number(_) => None,
            FieldValue::Text(value) => Some(value),
        }
    }

    /// Строковое представление для категориальных колонок
    pub fn to_category(&self) -> String {
        match self {
            FieldValue::Text(value) => value.clone(),
            FieldValue::Number(value) if value.fract() == 0.0 && value.is_finite() => {
                format!("{}", *value as i64)
            }
            FieldValue::Number(value) => value.to_string(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Исход заявки, источник меток для обучения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Approved,
    Declined,
    Withdrawn,
    #[serde(rename = "In-Process")]
    InProcess,
}

impl ApplicationStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Approved" => Some(Self::Approved),
            "Declined" => Some(Self::Declined),
            "Withdrawn" => Some(Self::Withdrawn),
            "In-Process" => Some(Self::InProcess),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Declined => "Declined",
            Self::Withdrawn => "Withdrawn",
            Self::InProcess => "In-Process",
        }
    }
}

/// Заявка: отображение имени поля в скалярное значение
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApplicationRecord {
    fields: BTreeMap<String, FieldValue>,
}

/// Поле со значением null считается отсутствующим
impl<'de> Deserialize<'de> for ApplicationRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<FieldValue>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value)))
            .collect())
    }
}

impl ApplicationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Числовое значение поля; строки и NaN считаются отсутствующими
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name)
            .and_then(FieldValue::as_f64)
            .filter(|value| !value.is_nan())
    }

    pub fn number_or(&self, name: &str, default: f64) -> f64 {
        self.number(name).unwrap_or(default)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn status(&self) -> Option<ApplicationStatus> {
        self.text(fields::STATUS).and_then(ApplicationStatus::parse)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for ApplicationRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Бинарная цель классификатора
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Approval,
    Withdrawal,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Approval, Target::Withdrawal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Approval => "approval",
            Target::Withdrawal => "withdrawal",
        }
    }

    /// Метка для обучения: 1 если статус совпадает с целевым
    pub fn label(&self, status: Option<ApplicationStatus>) -> usize {
        let positive = match self {
            Target::Approval => ApplicationStatus::Approved,
            Target::Withdrawal => ApplicationStatus::Withdrawn,
        };
        usize::from(status == Some(positive))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub success_probability: f64, // 0-100
    pub withdrawal_risk: f64,     // 0-100
    pub completeness_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_mean_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_std_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cv_scores: Vec<f64>,
    #[serde(default)]
    pub overfit_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub approval: ClassificationMetrics,
    pub withdrawal: ClassificationMetrics,
}

impl TrainingMetrics {
    pub fn for_target(&self, target: Target) -> &ClassificationMetrics {
        match target {
            Target::Approval => &self.approval,
            Target::Withdrawal => &self.withdrawal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    pub records_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_data_saved: Option<String>,
}

impl TrainingResult {
    pub fn failure(message: impl Into<String>, records_used: usize) -> Self {
        Self {
            success: false,
            message: message.into(),
            metrics: None,
            records_used,
            training_data_saved: None,
        }
    }
}

/// Запись журнала обучения; после создания не изменяется
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub timestamp: String,
    pub source: String,
    pub records: usize,
    pub metrics: TrainingMetrics,
    pub version: String,
    pub training_data_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub models_loaded: Vec<Target>,
    pub feature_count: usize,
    pub current_version: Option<String>,
    pub training_history: Vec<TrainingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<TrainingMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_deserializes_from_flat_json() {
        let record: ApplicationRecord = serde_json::from_str(
            r#"{"Credit_Score": 720, "Gender": "Female", "Status": "In-Process"}"#,
        )
        .unwrap();

        assert_eq!(record.number(fields::CREDIT_SCORE), Some(720.0));
        assert_eq!(record.text(fields::GENDER), Some("Female"));
        assert_eq!(record.status(), Some(ApplicationStatus::InProcess));
    }

    #[test]
    fn null_fields_are_missing_and_booleans_are_flags() {
        let record: ApplicationRecord = serde_json::from_str(
            r#"{"Age": null, "Credit_Score": 700, "Long_Processing": true, "Low_Documentation": false}"#,
        )
        .unwrap();

        assert!(!record.contains(fields::AGE));
        assert_eq!(record.number_or(fields::AGE, 35.0), 35.0);
        assert_eq!(record.number(fields::LONG_PROCESSING), Some(1.0));
        assert_eq!(record.number(fields::LOW_DOCUMENTATION), Some(0.0));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn numeric_looking_text_is_not_a_number() {
        let record = ApplicationRecord::new().with(fields::AGE, "42");
        assert_eq!(record.number(fields::AGE), None);
        assert_eq!(record.number_or(fields::AGE, 35.0), 35.0);
    }

    #[test]
    fn labels_follow_status() {
        assert_eq!(Target::Approval.label(Some(ApplicationStatus::Approved)), 1);
        assert_eq!(Target::Approval.label(Some(ApplicationStatus::Withdrawn)), 0);
        assert_eq!(Target::Withdrawal.label(Some(ApplicationStatus::Withdrawn)), 1);
        assert_eq!(Target::Withdrawal.label(None), 0);
    }

    #[test]
    fn categories_render_integral_numbers_without_fraction() {
        assert_eq!(FieldValue::Number(3.0).to_category(), "3");
        assert_eq!(FieldValue::Number(2.5).to_category(), "2.5");
        assert_eq!(FieldValue::from("Employed").to_category(), "Employed");
    }
}

/// Модуль предобработки данных

pub mod encoding;
pub mod feature_engineering;
pub mod frame;
pub mod normalization;

pub use encoding::{PreprocessingTransform, Preprocessor};
pub use feature_engineering::{CreditRiskCategory, EngineeredFeatures, FeatureEngineer};
pub use frame::{ColumnKind, FeatureColumn, FeatureFrame, FeatureSchema, UNKNOWN_CATEGORY};
pub use normalization::DataNormalizer;

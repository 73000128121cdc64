/// ML модели

pub mod classifier;
pub mod evaluation;
pub mod prediction;
pub mod registry;
pub mod rules;
pub mod store;
pub mod training;

pub use classifier::{ClassifierParams, TreeEnsemble};
pub use prediction::PredictionEngine;
pub use registry::{ModelRegistry, ModelSet, TrainedModel};
pub use rules::{NoJitter, NoiseSource, RuleBasedScorer, UniformJitter};
pub use store::{ModelMetadata, ModelStore};
pub use training::TrainingOrchestrator;

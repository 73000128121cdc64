//! Версионное хранилище моделей, схемы признаков и журнала обучения

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::registry::{ModelSet, TrainedModel};
use crate::preprocessing::FeatureSchema;
use crate::types::{ApplicationRecord, Target, TrainingRecord};

const METADATA_FILE: &str = "model_metadata.json";
const HISTORY_FILE: &str = "training_history.json";
const LATEST: &str = "latest";

/// Документ метаданных; его запись фиксирует новую версию
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    pub feature_names: Vec<String>,
    pub feature_dtypes: BTreeMap<String, String>,
    pub last_trained: String,
}

/// Артефакт модели хранит и схему, чтобы его можно было загрузить без метаданных
#[derive(Serialize)]
struct ArtifactRef<'a> {
    schema: &'a FeatureSchema,
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct Artifact {
    schema: FeatureSchema,
    model: TrainedModel,
}

pub struct ModelStore {
    weights_dir: PathBuf,
    data_dir: PathBuf,
}

impl ModelStore {
    pub fn new(weights_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            weights_dir: weights_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Метка версии с точностью до миллисекунд
    pub fn next_version() -> String {
        chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
    }

    fn artifact_path(&self, target: Target, version: &str) -> PathBuf {
        self.weights_dir
            .join(format!("{}_model_{}.json", target.as_str(), version))
    }

    /// Порядок записи: версионные артефакты, алиасы latest, журнал, метаданные.
    /// Пока метаданные не переименованы, действует предыдущая версия.
    pub fn save(&self, set: &ModelSet, history: &[TrainingRecord]) -> Result<()> {
        fs::create_dir_all(&self.weights_dir)?;

        let models: Vec<&TrainedModel> = Target::ALL
            .iter()
            .filter_map(|target| set.model(*target))
            .collect();

        for model in &models {
            let artifact = ArtifactRef {
                schema: &set.schema,
                model,
            };
            write_json(&self.artifact_path(model.target, &set.version), &artifact)?;
        }
        for model in &models {
            let artifact = ArtifactRef {
                schema: &set.schema,
                model,
            };
            write_json(&self.artifact_path(model.target, LATEST), &artifact)?;
        }

        write_json(&self.weights_dir.join(HISTORY_FILE), &history)?;

        let metadata = ModelMetadata {
            version: set.version.clone(),
            feature_names: set.schema.names(),
            feature_dtypes: set.schema.dtypes(),
            last_trained: chrono::Local::now().to_rfc3339(),
        };
        write_json(&self.weights_dir.join(METADATA_FILE), &metadata)?;

        tracing::info!(
            version = %set.version,
            models = models.len(),
            dir = %self.weights_dir.display(),
            "Models saved"
        );
        Ok(())
    }

    /// Последняя зафиксированная версия и полный журнал
    pub fn load_latest(&self) -> Result<(ModelSet, Vec<TrainingRecord>)> {
        let set = match self.read_metadata() {
            Some(metadata) => self
                .load_version(&metadata)
                .or_else(|| self.load_aliases()),
            None => self.load_aliases(),
        };

        match set {
            Some(set) if !set.is_empty() => {
                tracing::info!(
                    version = %set.version,
                    targets = ?set.loaded_targets(),
                    features = set.schema.len(),
                    "Models loaded"
                );
                let history = self.committed_history(&set.version);
                Ok((set, history))
            }
            _ => Err(PipelineError::NotFound(self.weights_dir.clone())),
        }
    }

    /// Журнал обучения; нечитаемый файл считается пустым журналом
    pub fn load_history(&self) -> Vec<TrainingRecord> {
        read_json(&self.weights_dir.join(HISTORY_FILE)).unwrap_or_default()
    }

    /// Записи журнала не новее зафиксированной версии. Метки версий
    /// сортируются лексически в порядке времени, поэтому более поздняя
    /// запись осталась от сохранения, оборванного до записи метаданных.
    fn committed_history(&self, version: &str) -> Vec<TrainingRecord> {
        let mut history = self.load_history();
        let total = history.len();
        history.retain(|record| record.version.as_str() <= version);
        if history.len() < total {
            tracing::warn!(
                version,
                dropped = total - history.len(),
                "Ignoring history entries of uncommitted versions"
            );
        }
        history
    }

    fn read_metadata(&self) -> Option<ModelMetadata> {
        read_json(&self.weights_dir.join(METADATA_FILE))
    }

    fn load_version(&self, metadata: &ModelMetadata) -> Option<ModelSet> {
        let schema = FeatureSchema::from_metadata(&metadata.feature_names, &metadata.feature_dtypes);
        let mut set = ModelSet {
            version: metadata.version.clone(),
            schema,
            approval: None,
            withdrawal: None,
        };

        for target in Target::ALL {
            let path = self.artifact_path(target, &metadata.version);
            match read_json::<Artifact>(&path) {
                Some(artifact) => assign(&mut set, target, artifact.model),
                None => tracing::warn!(
                    %target,
                    version = %metadata.version,
                    "Versioned artifact missing"
                ),
            }
        }

        (!set.is_empty()).then_some(set)
    }

    /// Без метаданных: алиасы latest со встроенной схемой
    fn load_aliases(&self) -> Option<ModelSet> {
        let mut set: Option<ModelSet> = None;

        for target in Target::ALL {
            let Some(artifact) = read_json::<Artifact>(&self.artifact_path(target, LATEST)) else {
                continue;
            };
            let set = set.get_or_insert_with(|| ModelSet {
                version: artifact.model.version.clone(),
                schema: artifact.schema.clone(),
                approval: None,
                withdrawal: None,
            });
            if artifact.model.version != set.version {
                tracing::warn!(
                    %target,
                    expected = %set.version,
                    found = %artifact.model.version,
                    "Skipping artifact from a different version"
                );
                continue;
            }
            assign(set, target, artifact.model);
        }

        if set.is_some() {
            tracing::warn!("Model metadata unavailable, loaded latest aliases");
        }
        set
    }

    /// Архив входных данных обучения в data_dir
    pub fn archive_training_data(
        &self,
        records: &[ApplicationRecord],
        source: &str,
        version: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self
            .data_dir
            .join(format!("training_data_{}_{}.json", sanitize(source), version));
        write_json(&path, &records)?;
        tracing::debug!(path = %path.display(), records = records.len(), "Training data archived");
        Ok(path)
    }
}

fn assign(set: &mut ModelSet, target: Target, model: TrainedModel) {
    match target {
        Target::Approval => set.approval = Some(model),
        Target::Withdrawal => set.withdrawal = Some(model),
    }
}

/// Метка источника попадает в имя файла
fn sanitize(source: &str) -> String {
    let cleaned: String = source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to read file");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Unreadable document, ignoring");
            None
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

/// Запись во временный файл, fsync и переименование поверх цели
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

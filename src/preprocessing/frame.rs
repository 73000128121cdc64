//! Табличное представление признаков и зафиксированная схема колонок

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::preprocessing::EngineeredFeatures;
use crate::types::{fields, ApplicationRecord, FieldValue};

/// Категория, подставляемая для отсутствующих категориальных колонок
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Тип колонки, фиксируемый при обучении
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Integer,
    Float,
    Category,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnKind::Category)
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "int64",
            ColumnKind::Float => "float64",
            ColumnKind::Category => "object",
        }
    }

    /// Обратное преобразование строки dtype из метаданных.
    /// Неизвестные значения трактуются как категориальные.
    pub fn from_dtype_name(name: &str) -> Self {
        match name.trim() {
            "int64" | "int32" | "int" | "bool" => ColumnKind::Integer,
            "float64" | "float32" | "float" => ColumnKind::Float,
            "object" | "str" | "category" => ColumnKind::Category,
            other => {
                tracing::warn!(dtype = other, "Unknown feature dtype, treating column as categorical");
                ColumnKind::Category
            }
        }
    }

    fn infer<'a>(values: impl Iterator<Item = Option<&'a FieldValue>>) -> Self {
        let mut integral = true;
        for value in values.flatten() {
            match value {
                FieldValue::Text(_) => return ColumnKind::Category,
                FieldValue::Number(number) => integral &= number.fract() == 0.0,
            }
        }
        if integral {
            ColumnKind::Integer
        } else {
            ColumnKind::Float
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Набор, порядок и типы колонок, которые ожидает обученная модель
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn infer(frame: &FeatureFrame) -> Self {
        let columns = frame
            .columns
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let all_missing = frame.rows.iter().all(|row| row[index].is_none());
                let kind = if all_missing {
                    ColumnKind::Float
                } else {
                    ColumnKind::infer(frame.rows.iter().map(|row| row[index].as_ref()))
                };
                FeatureColumn {
                    name: name.clone(),
                    kind,
                }
            })
            .collect();
        Self { columns }
    }

    /// Восстановление схемы из метаданных (имена + строки dtype)
    pub fn from_metadata(names: &[String], dtypes: &BTreeMap<String, String>) -> Self {
        let columns = names
            .iter()
            .map(|name| FeatureColumn {
                name: name.clone(),
                kind: dtypes
                    .get(name)
                    .map(|dtype| ColumnKind::from_dtype_name(dtype))
                    .unwrap_or(ColumnKind::Category),
            })
            .collect();
        Self { columns }
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn dtypes(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .map(|column| (column.name.clone(), column.kind.dtype_name().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.kind)
    }

    /// Приведение одной заявки к схеме: недостающие числовые колонки получают 0,
    /// категориальные "Unknown", лишние колонки отбрасываются
    pub fn align(&self, features: &EngineeredFeatures) -> FeatureFrame {
        let record = features.record();
        let row = self
            .columns
            .iter()
            .map(|column| {
                let value = record.get(&column.name).cloned().unwrap_or_else(|| {
                    if column.kind.is_numeric() {
                        FieldValue::Number(0.0)
                    } else {
                        FieldValue::Text(UNKNOWN_CATEGORY.to_string())
                    }
                });
                Some(value)
            })
            .collect();

        FeatureFrame {
            columns: self.names(),
            rows: vec![row],
        }
    }
}

/// Матрица признаков: именованные колонки, ячейки могут отсутствовать
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<FieldValue>>>,
}

impl FeatureFrame {
    /// Колонки: объединение полей всех заявок без служебных полей
    pub fn from_features(features: &[EngineeredFeatures]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for feature in features {
            for name in feature.record().names() {
                if !fields::EXCLUDED.contains(&name) && !columns.iter().any(|c| c == name) {
                    columns.push(name.to_string());
                }
            }
        }
        columns.sort();

        let records: Vec<&ApplicationRecord> = features.iter().map(|f| f.record()).collect();
        Self::from_records(&records, columns)
    }

    pub fn from_records(records: &[&ApplicationRecord], columns: Vec<String>) -> Self {
        let rows = records
            .iter()
            .map(|record| columns.iter().map(|name| record.get(name).cloned()).collect())
            .collect();
        Self { columns, rows }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Подвыборка строк по индексам
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

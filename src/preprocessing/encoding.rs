//! Кодирование признаков: масштабирование числовых и one-hot для категориальных колонок

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::preprocessing::{DataNormalizer, FeatureFrame, FeatureSchema};
use crate::types::FieldValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    /// Категории, увиденные при обучении (отсортированы)
    pub categories: Vec<String>,
}

/// Переиспользуемая схема кодирования; разбиение колонок на числовые и
/// категориальные фиксируется при обучении и больше не пересматривается
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingTransform {
    numeric: Vec<String>,
    normalizer: DataNormalizer,
    categorical: Vec<CategoricalColumn>,
}

impl PreprocessingTransform {
    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric
    }

    /// Ширина выходной матрицы
    pub fn output_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|column| column.categories.len())
                .sum::<usize>()
    }

    pub fn output_names(&self) -> Vec<String> {
        let mut names = self.numeric.clone();
        for column in &self.categorical {
            for category in &column.categories {
                names.push(format!("{}_{}", column.name, category));
            }
        }
        names
    }
}

pub struct Preprocessor;

impl Preprocessor {
    /// Типы колонок определяются по самим обучающим данным
    pub fn fit(frame: &FeatureFrame) -> Result<PreprocessingTransform> {
        let schema = FeatureSchema::infer(frame);
        Self::fit_with_schema(frame, &schema)
    }

    /// Обучение с заранее зафиксированным разбиением колонок
    pub fn fit_with_schema(
        frame: &FeatureFrame,
        schema: &FeatureSchema,
    ) -> Result<PreprocessingTransform> {
        if frame.n_rows() == 0 {
            return Err(PipelineError::EmptyDataset);
        }

        let numeric: Vec<String> = schema
            .columns
            .iter()
            .filter(|column| column.kind.is_numeric())
            .map(|column| column.name.clone())
            .collect();

        let categorical = schema
            .columns
            .iter()
            .filter(|column| !column.kind.is_numeric())
            .map(|column| {
                let categories: BTreeSet<String> = frame
                    .column_index(&column.name)
                    .map(|index| {
                        frame
                            .rows
                            .iter()
                            .filter_map(|row| row[index].as_ref().map(FieldValue::to_category))
                            .collect()
                    })
                    .unwrap_or_default();
                CategoricalColumn {
                    name: column.name.clone(),
                    categories: categories.into_iter().collect(),
                }
            })
            .collect();

        let mut normalizer = DataNormalizer::new();
        normalizer.fit(&numeric_block(frame, &numeric))?;

        Ok(PreprocessingTransform {
            numeric,
            normalizer,
            categorical,
        })
    }

    /// Колонки ищутся по имени; отсутствующая колонка трактуется как пропуск.
    /// Категория, не встречавшаяся при обучении, дает нулевой индикатор.
    pub fn apply(transform: &PreprocessingTransform, frame: &FeatureFrame) -> Result<Array2<f64>> {
        let scaled = transform
            .normalizer
            .transform(&numeric_block(frame, &transform.numeric))?;

        let mut output = Array2::zeros((frame.n_rows(), transform.output_width()));
        output
            .slice_mut(ndarray::s![.., ..transform.numeric.len()])
            .assign(&scaled);

        let mut offset = transform.numeric.len();
        for column in &transform.categorical {
            if let Some(index) = frame.column_index(&column.name) {
                for (row_idx, row) in frame.rows.iter().enumerate() {
                    let Some(value) = row[index].as_ref() else {
                        continue;
                    };
                    let category = value.to_category();
                    if let Ok(position) = column.categories.binary_search(&category) {
                        output[[row_idx, offset + position]] = 1.0;
                    }
                }
            }
            offset += column.categories.len();
        }

        Ok(output)
    }
}

/// Числовой блок; строки в числовой колонке разбираются как числа, иначе пропуск
fn numeric_block(frame: &FeatureFrame, columns: &[String]) -> Array2<f64> {
    let mut block = Array2::from_elem((frame.n_rows(), columns.len()), f64::NAN);
    for (col_idx, name) in columns.iter().enumerate() {
        let Some(index) = frame.column_index(name) else {
            continue;
        };
        for (row_idx, row) in frame.rows.iter().enumerate() {
            let value = match row[index].as_ref() {
                Some(FieldValue::Number(number)) => *number,
                Some(FieldValue::Text(text)) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
                None => f64::NAN,
            };
            block[[row_idx, col_idx]] = value;
        }
    }
    block
}

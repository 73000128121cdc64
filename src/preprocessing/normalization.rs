//! Нормализация данных

#![allow(non_snake_case)]

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Z-нормализация со статистиками, снятыми при обучении
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataNormalizer {
    mean: Vec<f64>,
    std: Vec<f64>,
    is_fitted: bool,
}

impl DataNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Пропуски (NaN) не участвуют в статистике колонки
    pub fn fit(&mut self, X: &Array2<f64>) -> Result<()> {
        if X.nrows() == 0 {
            return Err(PipelineError::EmptyDataset);
        }

        let mut mean = Vec::with_capacity(X.ncols());
        let mut std = Vec::with_capacity(X.ncols());

        for column in X.axis_iter(Axis(1)) {
            let present: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            if present.is_empty() {
                mean.push(0.0);
                std.push(1.0);
                continue;
            }

            let n = present.len() as f64;
            let column_mean = present.iter().sum::<f64>() / n;
            let variance = present.iter().map(|v| (v - column_mean).powi(2)).sum::<f64>() / n;
            let column_std = variance.sqrt();

            mean.push(column_mean);
            // Избегаем деления на ноль
            std.push(if column_std < 1e-10 { 1.0 } else { column_std });
        }

        self.mean = mean;
        self.std = std;
        self.is_fitted = true;
        Ok(())
    }

    /// (X - mean) / std; пропуски заменяются средним, т.е. нулем после масштабирования
    pub fn transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted);
        }
        if X.ncols() != self.mean.len() {
            return Err(PipelineError::DimensionMismatch {
                expected: self.mean.len(),
                actual: X.ncols(),
            });
        }

        let mut normalized = X.clone();
        for mut row in normalized.rows_mut() {
            for (i, val) in row.iter_mut().enumerate() {
                *val = if val.is_finite() {
                    (*val - self.mean[i]) / self.std[i]
                } else {
                    0.0
                };
            }
        }

        Ok(normalized)
    }

    pub fn fit_transform(&mut self, X: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(X)?;
        self.transform(X)
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }
}

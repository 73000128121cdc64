use std::path::PathBuf;
use std::time::Instant;

use credit_ml::models::evaluation::{ACCURACY_CEILING, AUC_CEILING};
use credit_ml::sample_data::generate_applications;
use credit_ml::types::fields;
use credit_ml::{ApplicationRecord, CreditPipeline, PipelineConfig, Target};

fn config(name: &str) -> PipelineConfig {
    let dir: PathBuf = std::env::temp_dir().join(format!(
        "credit-ml-it-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    PipelineConfig {
        weights_dir: dir.join("weights"),
        data_dir: dir.join("data"),
        bootstrap_samples: 80,
        ..PipelineConfig::default()
    }
}

fn probe_records() -> Vec<ApplicationRecord> {
    vec![
        ApplicationRecord::new(),
        ApplicationRecord::new()
            .with(fields::CREDIT_SCORE, 780.0)
            .with(fields::DTI_RATIO, 0.25)
            .with(fields::MONTHLY_INCOME, 70000.0)
            .with(fields::EMPLOYMENT_DURATION_MONTHS, 48.0)
            .with(fields::COMPLETENESS_SCORE, 95.0),
        ApplicationRecord::new()
            .with(fields::CREDIT_SCORE, 540.0)
            .with(fields::PROPERTY_PRICE, 0.0)
            .with(fields::MONTHLY_INCOME, 0.0)
            .with(fields::LOAN_AMOUNT, 400000.0)
            .with(fields::INTEREST_RATE, 8.0)
            .with(fields::LOAN_DURATION, 20.0)
            .with(fields::GENDER, "Other")
            .with(fields::EMPLOYMENT_STATUS, "Contractor"),
    ]
}

fn assert_bounded(pipeline: &CreditPipeline) {
    for record in probe_records() {
        let result = pipeline.predict(&record);
        assert!((0.0..=100.0).contains(&result.success_probability), "{result:?}");
        assert!((0.0..=100.0).contains(&result.withdrawal_risk), "{result:?}");
    }
}

#[test]
fn predictions_are_bounded_without_models() {
    let pipeline = CreditPipeline::open(config("no-models"));
    assert!(!pipeline.has_models());
    assert_bounded(&pipeline);

    let strong = pipeline.predict(&probe_records()[1]);
    let weak = pipeline.predict(
        &probe_records()[1]
            .clone()
            .with(fields::CREDIT_SCORE, 550.0)
            .with(fields::DTI_RATIO, 0.55)
            .with(fields::EMPLOYMENT_DURATION_MONTHS, 8.0)
            .with(fields::COMPLETENESS_SCORE, 40.0),
    );
    assert!(strong.success_probability > weak.success_probability);
    assert!((20.0..=75.0).contains(&strong.success_probability));
}

#[test]
fn training_installs_and_persists_models() {
    let config = config("train");
    let pipeline = CreditPipeline::open(config.clone());
    let result = pipeline.train(&generate_applications(120, 3), "upload");

    assert!(result.success, "{}", result.message);
    assert_eq!(result.records_used, 120);
    let metrics = result.metrics.expect("metrics");
    for target in Target::ALL {
        let m = metrics.for_target(target);
        assert!(m.accuracy <= ACCURACY_CEILING);
        assert!(m.auc <= AUC_CEILING);
    }
    let archive = result.training_data_saved.expect("archive path");
    assert!(PathBuf::from(&archive).exists());
    assert!(archive.contains("training_data_upload_"));

    let info = pipeline.model_info();
    assert_eq!(info.models_loaded, vec![Target::Approval, Target::Withdrawal]);
    assert!(info.feature_count > 0);
    assert_eq!(info.training_history.len(), 1);
    assert_eq!(info.training_history[0].source, "upload");
    assert_bounded(&pipeline);

    // Повторное открытие поднимает ту же версию
    let reopened = CreditPipeline::open(config);
    assert_eq!(reopened.model_info().current_version, info.current_version);
    for record in probe_records() {
        let before = pipeline.predict(&record);
        let after = reopened.predict(&record);
        assert!((before.success_probability - after.success_probability).abs() <= 0.1);
        assert!((before.withdrawal_risk - after.withdrawal_risk).abs() <= 0.1);
    }
}

#[test]
fn rare_withdrawals_yield_baseline_metrics() {
    let pipeline = CreditPipeline::open(config("rare"));
    let mut records = generate_applications(60, 11);
    for (i, record) in records.iter_mut().enumerate() {
        let status = match i {
            0 => "Withdrawn",
            i if i % 2 == 0 => "Approved",
            _ => "Declined",
        };
        record.insert(fields::STATUS, status);
    }

    let result = pipeline.train(&records, "rare");
    assert!(result.success, "{}", result.message);

    let withdrawal = result.metrics.expect("metrics").withdrawal;
    assert_eq!(withdrawal.accuracy, 0.5);
    assert_eq!(withdrawal.auc, 0.5);
    assert_eq!(withdrawal.cv_mean_accuracy, Some(0.5));
    assert_eq!(withdrawal.cv_std_accuracy, Some(0.1));
}

#[test]
fn failed_training_keeps_previous_model() {
    let pipeline = CreditPipeline::open(config("failure"));
    assert!(pipeline.train(&generate_applications(60, 5), "first").success);
    let before = pipeline.model_info();

    let mut unlabeled = generate_applications(30, 6);
    for record in &mut unlabeled {
        record.remove(fields::STATUS);
    }
    let result = pipeline.train(&unlabeled, "second");
    assert!(!result.success);
    assert!(result.metrics.is_none());

    let empty = pipeline.train(&[], "third");
    assert!(!empty.success);
    assert_eq!(empty.records_used, 0);

    let after = pipeline.model_info();
    assert_eq!(after.current_version, before.current_version);
    assert_eq!(after.training_history.len(), 1);
}

#[test]
fn expired_deadline_discards_the_run() {
    let pipeline = CreditPipeline::open(config("deadline"));
    let result = pipeline.train_until(&generate_applications(40, 9), "late", Instant::now());

    assert!(!result.success);
    assert!(!pipeline.has_models());
    assert!(pipeline.model_info().training_history.is_empty());
}

#[test]
fn database_training_requires_enough_rows() {
    let pipeline = CreditPipeline::open(config("database"));
    let rows: Vec<ApplicationRecord> = generate_applications(5, 1);
    let result = pipeline.train_from_database(&rows);
    assert!(!result.success);
    assert!(result.message.contains("10"));

    // Неполные строки дополняются значениями по умолчанию
    let rows: Vec<ApplicationRecord> = generate_applications(40, 2)
        .into_iter()
        .enumerate()
        .map(|(i, mut record)| {
            record.remove(fields::LOAN_AMOUNT);
            if i % 7 == 0 {
                record.insert(fields::STATUS, "Under Review");
            }
            record
        })
        .collect();
    let result = pipeline.train_from_database(&rows);
    assert!(result.success, "{}", result.message);
    assert_eq!(pipeline.model_info().training_history[0].source, "database");
}

#[test]
fn bootstrap_trains_once_on_synthetic_data() {
    let pipeline = CreditPipeline::open(config("bootstrap"));
    let first = pipeline.ensure_models().expect("bootstrap run");
    assert!(first.success, "{}", first.message);
    assert_eq!(first.records_used, 80);
    assert!(pipeline.ensure_models().is_none());
    assert_eq!(pipeline.model_info().training_history[0].source, "sample");
}

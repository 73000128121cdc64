//! Синтетические заявки для первичного обучения и тестов

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::preprocessing::feature_engineering::monthly_payment;
use crate::types::{fields, ApplicationRecord, ApplicationStatus};

/// Нормальное распределение (Бокс-Мюллер)
fn normal(rng: &mut StdRng, mean: f64, std: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    mean + std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn lognormal(rng: &mut StdRng, mu: f64, sigma: f64) -> f64 {
    normal(rng, mu, sigma).exp()
}

/// Выбор по весам; веса в сумме дают 1
fn pick<T: Copy>(rng: &mut StdRng, options: &[(T, f64)]) -> T {
    let mut draw: f64 = rng.gen();
    for (value, weight) in options {
        if draw < *weight {
            return *value;
        }
        draw -= weight;
    }
    options[options.len() - 1].0
}

/// Ставка зависит от рейтинга и срока, в пределах 5.5–12%
fn interest_rate(rng: &mut StdRng, credit_score: f64, years: f64) -> f64 {
    let mut rate: f64 = 7.5;
    rate += match credit_score {
        s if s >= 750.0 => -1.0,
        s if s >= 700.0 => -0.5,
        s if s >= 650.0 => 0.0,
        s if s >= 600.0 => 0.5,
        s if s >= 550.0 => 1.0,
        _ => 2.0,
    };
    if years >= 25.0 {
        rate += 0.5;
    } else if years >= 20.0 {
        rate += 0.3;
    }
    rate += rng.gen_range(-0.3..0.3);
    rate.clamp(5.5, 12.0)
}

/// Балл андеррайтинга, по которому разыгрывается исход заявки
fn underwriting_score(
    rng: &mut StdRng,
    credit_score: f64,
    dti: f64,
    ltv_percent: f64,
    employment_months: f64,
    income: f64,
) -> f64 {
    let mut score: f64 = match credit_score {
        s if s >= 720.0 => 40.0,
        s if s >= 680.0 => 35.0,
        s if s >= 640.0 => 25.0,
        s if s >= 600.0 => 15.0,
        s if s >= 550.0 => 5.0,
        _ => 0.0,
    };
    score += match dti {
        d if d <= 0.28 => 30.0,
        d if d <= 0.36 => 25.0,
        d if d <= 0.43 => 15.0,
        d if d <= 0.50 => 5.0,
        _ => 0.0,
    };
    score += match ltv_percent {
        l if l <= 80.0 => 20.0,
        l if l <= 85.0 => 15.0,
        l if l <= 90.0 => 10.0,
        l if l <= 95.0 => 5.0,
        _ => 0.0,
    };
    score += match employment_months {
        m if m >= 24.0 => 5.0,
        m if m >= 12.0 => 3.0,
        m if m >= 6.0 => 1.0,
        _ => 0.0,
    };
    score += match income {
        i if i >= 60000.0 => 5.0,
        i if i >= 40000.0 => 3.0,
        i if i >= 25000.0 => 1.0,
        _ => 0.0,
    };

    // Шум, чтобы исход не восстанавливался по правилам без ошибок
    score += rng.gen_range(-15.0..15.0);
    if rng.gen_bool(0.1) {
        score += rng.gen_range(-20.0..20.0);
    }
    score.clamp(0.0, 100.0)
}

fn draw_status(rng: &mut StdRng, score: f64) -> ApplicationStatus {
    use ApplicationStatus::*;

    let adjusted = score + rng.gen_range(-10.0..10.0);
    match adjusted {
        s if s >= 80.0 => pick(rng, &[(Approved, 0.85), (InProcess, 0.15)]),
        s if s >= 65.0 => pick(rng, &[(Approved, 0.6), (InProcess, 0.35), (Withdrawn, 0.05)]),
        s if s >= 45.0 => pick(
            rng,
            &[(Approved, 0.25), (InProcess, 0.4), (Declined, 0.25), (Withdrawn, 0.1)],
        ),
        s if s >= 25.0 => pick(
            rng,
            &[(Declined, 0.5), (InProcess, 0.3), (Withdrawn, 0.15), (Approved, 0.05)],
        ),
        _ => pick(rng, &[(Declined, 0.7), (Withdrawn, 0.25), (InProcess, 0.05)]),
    }
}

/// Одна заявка с согласованными финансовыми показателями
fn generate_application(rng: &mut StdRng, index: usize) -> ApplicationRecord {
    let age = rng.gen_range(25..65) as f64;
    let gender = pick(rng, &[("Male", 0.55), ("Female", 0.45)]);
    let employment_status = pick(rng, &[("Employed", 0.8), ("Self-Employed", 0.2)]);
    let employment_months = normal(rng, 36.0, 24.0).max(0.0).trunc();

    let monthly_income = if employment_status == "Employed" {
        lognormal(rng, 10.5, 0.6).max(15000.0)
    } else {
        lognormal(rng, 10.3, 0.8).max(12000.0)
    }
    .min(200000.0);

    let credit_score = normal(rng, 650.0, 80.0).trunc().clamp(300.0, 850.0);

    // Цена жилья в 2.5–6 годовых доходов, с округлением до 10 000
    let property_price =
        ((monthly_income * 12.0 * rng.gen_range(2.5..6.0)) / 10000.0).round().max(1.0) * 10000.0;
    let down_share = if credit_score >= 700.0 {
        rng.gen_range(0.15..0.25)
    } else {
        rng.gen_range(0.10..0.30)
    };
    let down_payment = property_price * down_share;
    let loan_amount = property_price - down_payment;

    let years = pick(rng, &[(15.0, 0.2), (20.0, 0.4), (25.0, 0.3), (30.0, 0.1)]);
    let rate = interest_rate(rng, credit_score, years);
    let payment = monthly_payment(loan_amount, rate, years).unwrap_or(0.0);
    let dti = payment / monthly_income;
    let ltv_percent = loan_amount / property_price * 100.0;

    let score = underwriting_score(rng, credit_score, dti, ltv_percent, employment_months, monthly_income);
    let status = draw_status(rng, score);

    // Ход рассмотрения зависит от исхода
    let variation = rng.gen_range(0.8..1.2);
    let (days, documents, completeness, communication) = match status {
        ApplicationStatus::Approved => (
            (normal(rng, 25.0, 8.0) * variation).trunc().max(5.0),
            rng.gen_range(3..6),
            (normal(rng, 85.0, 10.0) * variation).max(50.0),
            (normal(rng, 2.0, 0.5) * variation).max(0.5),
        ),
        ApplicationStatus::Declined => (
            (normal(rng, 18.0, 7.0) * variation).trunc().max(3.0),
            rng.gen_range(1..5),
            (normal(rng, 55.0, 15.0) * variation).max(20.0),
            (normal(rng, 1.0, 0.4) * variation).max(0.1),
        ),
        ApplicationStatus::Withdrawn => (
            (normal(rng, 35.0, 15.0) * variation).trunc().max(5.0),
            rng.gen_range(1..5),
            (normal(rng, 60.0, 20.0) * variation).max(15.0),
            (normal(rng, 0.8, 0.4) * variation).max(0.1),
        ),
        ApplicationStatus::InProcess => (
            (normal(rng, 15.0, 8.0) * variation).trunc().max(1.0),
            rng.gen_range(2..6),
            (normal(rng, 75.0, 15.0) * variation).max(30.0),
            (normal(rng, 1.5, 0.6) * variation).max(0.2),
        ),
    };

    ApplicationRecord::new()
        .with("Application_ID", format!("APP-{:06}", index + 1))
        .with(fields::AGE, age)
        .with(fields::GENDER, gender)
        .with(fields::EMPLOYMENT_STATUS, employment_status)
        .with(fields::EMPLOYMENT_DURATION_MONTHS, employment_months)
        .with(fields::MONTHLY_INCOME, round_to(monthly_income, 2))
        .with(fields::CREDIT_SCORE, credit_score)
        .with(fields::DTI_RATIO, round_to(dti, 4))
        .with(fields::LOAN_AMOUNT, round_to(loan_amount, 2))
        .with(fields::PROPERTY_PRICE, round_to(property_price, 2))
        .with(fields::DOWN_PAYMENT, round_to(down_payment, 2))
        .with(fields::INTEREST_RATE, round_to(rate, 2))
        .with(fields::LOAN_DURATION, years)
        .with(fields::DOCUMENTS_SUBMITTED, documents as f64)
        .with(fields::DAYS_IN_PROCESS, days)
        .with(fields::PROCESSING_TIME_DAYS, days)
        .with(fields::COMMUNICATION_FREQUENCY, round_to(communication.clamp(0.1, 5.0), 2))
        .with(fields::COMPLETENESS_SCORE, round_to(completeness.clamp(0.0, 100.0), 1))
        .with(fields::STATUS, status.as_str())
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// `n` синтетических заявок; одинаковый seed дает одинаковую выборку
pub fn generate_applications(n: usize, seed: u64) -> Vec<ApplicationRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|index| generate_application(&mut rng, index)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_reproducible() {
        assert_eq!(generate_applications(20, 7), generate_applications(20, 7));
        assert_ne!(generate_applications(20, 7), generate_applications(20, 8));
    }

    #[test]
    fn applications_are_internally_consistent() {
        for record in generate_applications(200, 42) {
            let price = record.number(fields::PROPERTY_PRICE).unwrap();
            let loan = record.number(fields::LOAN_AMOUNT).unwrap();
            let score = record.number(fields::CREDIT_SCORE).unwrap();
            let rate = record.number(fields::INTEREST_RATE).unwrap();

            assert!(price >= 10000.0);
            assert!(loan < price && loan > 0.0);
            assert!((300.0..=850.0).contains(&score));
            assert!((5.5..=12.0).contains(&rate));
            assert!(record.number(fields::DTI_RATIO).unwrap() > 0.0);
            assert!(record.status().is_some());
        }
    }

    #[test]
    fn every_outcome_occurs_in_a_large_sample() {
        let records = generate_applications(500, 42);
        for status in [
            ApplicationStatus::Approved,
            ApplicationStatus::Declined,
            ApplicationStatus::Withdrawn,
            ApplicationStatus::InProcess,
        ] {
            let count = records.iter().filter(|r| r.status() == Some(status)).count();
            assert!(count > 5, "{status:?}: {count}");
        }
    }
}

//! Synthetic telco churn data with a known churn-probability model.
//!
//! Month-to-month contracts, fiber optic internet, electronic checks, short
//! tenure, high monthly charges and senior customers push churn up; two-year
//! contracts, credit-card payment and long tenure push it down.

use crate::error::{ProcessingError, Result, ResultExt};
use polars::prelude::*;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Exp, Normal};

/// Row count used by the sample dataset.
pub const DEFAULT_ROWS: usize = 1000;
/// Seed used by the sample dataset.
pub const DEFAULT_SEED: u64 = 42;

const PAYMENT_METHODS: [&str; 4] = [
    "Electronic check",
    "Mailed check",
    "Bank transfer (automatic)",
    "Credit card (automatic)",
];

/// Draw `n` values from `choices` with the given weights.
fn choose(
    rng: &mut ChaCha8Rng,
    n: usize,
    choices: &[&'static str],
    weights: &[f64],
) -> Result<Vec<&'static str>> {
    let dist = WeightedIndex::new(weights)
        .map_err(|e| ProcessingError::InvalidData(format!("Invalid weights: {}", e)))?;
    Ok((0..n).map(|_| choices[dist.sample(rng)]).collect())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Generate `n_rows` telco customers deterministically from `seed`.
pub fn generate_churn_dataset(n_rows: usize, seed: u64) -> Result<DataFrame> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let yes_no = ["Yes", "No"];
    let online = ["Yes", "No", "No internet service"];

    let gender = choose(&mut rng, n_rows, &["Male", "Female"], &[0.5, 0.5])?;
    let senior: Vec<i64> = (0..n_rows)
        .map(|_| i64::from(rng.gen_bool(0.2)))
        .collect();
    let partner = choose(&mut rng, n_rows, &yes_no, &[0.5, 0.5])?;
    let dependents = choose(&mut rng, n_rows, &yes_no, &[0.3, 0.7])?;

    let phone_service = choose(&mut rng, n_rows, &yes_no, &[0.9, 0.1])?;
    let multiple_lines = choose(
        &mut rng,
        n_rows,
        &["Yes", "No", "No phone service"],
        &[0.4, 0.4, 0.2],
    )?;
    let internet_service = choose(
        &mut rng,
        n_rows,
        &["DSL", "Fiber optic", "No"],
        &[0.3, 0.4, 0.3],
    )?;

    let online_security = choose(&mut rng, n_rows, &online, &[0.3, 0.5, 0.2])?;
    let online_backup = choose(&mut rng, n_rows, &online, &[0.3, 0.5, 0.2])?;
    let device_protection = choose(&mut rng, n_rows, &online, &[0.3, 0.5, 0.2])?;
    let tech_support = choose(&mut rng, n_rows, &online, &[0.3, 0.5, 0.2])?;
    let streaming_tv = choose(&mut rng, n_rows, &online, &[0.4, 0.4, 0.2])?;
    let streaming_movies = choose(&mut rng, n_rows, &online, &[0.4, 0.4, 0.2])?;

    let contract = choose(
        &mut rng,
        n_rows,
        &["Month-to-month", "One year", "Two year"],
        &[0.5, 0.3, 0.2],
    )?;
    let paperless = choose(&mut rng, n_rows, &yes_no, &[0.6, 0.4])?;
    let payment = choose(&mut rng, n_rows, &PAYMENT_METHODS, &[1.0; 4])?;

    let charges_dist = Normal::new(65.0_f64, 30.0)
        .map_err(|e| ProcessingError::InvalidData(format!("Invalid normal: {}", e)))?;
    let monthly: Vec<f64> = (0..n_rows)
        .map(|_| charges_dist.sample(&mut rng).clamp(20.0, 120.0))
        .collect();
    let total: Vec<f64> = monthly
        .iter()
        .map(|m| m * rng.gen_range(1.0_f64..72.0))
        .collect();

    let tenure_dist = Exp::new(1.0_f64 / 30.0)
        .map_err(|e| ProcessingError::InvalidData(format!("Invalid exponential: {}", e)))?;
    let tenure: Vec<i64> = (0..n_rows)
        .map(|_| tenure_dist.sample(&mut rng).clamp(1.0, 72.0) as i64)
        .collect();

    let churn: Vec<&str> = (0..n_rows)
        .map(|i| {
            let mut p = 0.0;
            match contract[i] {
                "Month-to-month" => p += 0.3,
                "Two year" => p -= 0.3,
                _ => {}
            }
            if internet_service[i] == "Fiber optic" {
                p += 0.2;
            }
            match payment[i] {
                "Electronic check" => p += 0.1,
                "Credit card (automatic)" => p -= 0.1,
                _ => {}
            }
            if tenure[i] < 12 {
                p += 0.2;
            }
            if tenure[i] > 24 {
                p -= 0.2;
            }
            if monthly[i] > 80.0 {
                p += 0.1;
            }
            if senior[i] == 1 {
                p += 0.1;
            }
            let p: f64 = f64::clamp(p, 0.0, 1.0);
            if rng.gen_bool(p) { "Yes" } else { "No" }
        })
        .collect();

    let ids: Vec<String> = (1..=n_rows).map(|i| format!("CUST{:04}", i)).collect();
    let monthly: Vec<f64> = monthly.into_iter().map(round2).collect();
    let total: Vec<f64> = total.into_iter().map(round2).collect();

    df![
        "customerID" => ids,
        "gender" => gender,
        "SeniorCitizen" => senior,
        "Partner" => partner,
        "Dependents" => dependents,
        "tenure" => tenure,
        "PhoneService" => phone_service,
        "MultipleLines" => multiple_lines,
        "InternetService" => internet_service,
        "OnlineSecurity" => online_security,
        "OnlineBackup" => online_backup,
        "DeviceProtection" => device_protection,
        "TechSupport" => tech_support,
        "StreamingTV" => streaming_tv,
        "StreamingMovies" => streaming_movies,
        "Contract" => contract,
        "PaperlessBilling" => paperless,
        "PaymentMethod" => payment,
        "MonthlyCharges" => monthly,
        "TotalCharges" => total,
        "Churn" => churn,
    ]
    .context("Building synthetic dataset")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::string_values;

    #[test]
    fn test_shape_and_determinism() {
        let a = generate_churn_dataset(200, 7).unwrap();
        let b = generate_churn_dataset(200, 7).unwrap();
        assert_eq!(a.shape(), (200, 21));
        assert!(a.equals(&b));
    }

    #[test]
    fn test_value_ranges() {
        let df = generate_churn_dataset(DEFAULT_ROWS, DEFAULT_SEED).unwrap();
        let monthly = df.column("MonthlyCharges").unwrap().as_materialized_series().clone();
        assert!(monthly.f64().unwrap().into_iter().flatten().all(|v| (20.0..=120.0).contains(&v)));
        let tenure = df.column("tenure").unwrap().as_materialized_series().clone();
        assert!(tenure.i64().unwrap().into_iter().flatten().all(|v| (1..=72).contains(&v)));
    }

    #[test]
    fn test_month_to_month_churns_more_than_two_year() {
        let df = generate_churn_dataset(DEFAULT_ROWS, DEFAULT_SEED).unwrap();
        let contract =
            string_values(df.column("Contract").unwrap().as_materialized_series()).unwrap();
        let churn = string_values(df.column("Churn").unwrap().as_materialized_series()).unwrap();

        let rate = |kind: &str| {
            let rows: Vec<bool> = contract
                .iter()
                .zip(&churn)
                .filter(|(c, _)| c.as_deref() == Some(kind))
                .map(|(_, y)| y.as_deref() == Some("Yes"))
                .collect();
            rows.iter().filter(|y| **y).count() as f64 / rows.len() as f64
        };
        assert!(rate("Month-to-month") > rate("Two year") + 0.2);
    }
}

#![cfg(feature = "pipeline")]

use allocator_core::black_litterman::{OmegaMethod, View, ViewSpecification, ViewType};
use allocator_core::config::AllocatorConfig;
use allocator_core::moments::ReturnsMatrix;
use allocator_core::pipeline::{run_allocation, AllocationInput};
use allocator_core::AllocatorError;
use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Deterministic daily returns for three assets with distinct volatilities.
fn returns(periods: i64) -> ReturnsMatrix {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let dates = (0..periods).map(|t| start + Duration::days(t)).collect();
    let rows = (0..periods)
        .map(|t| {
            let a = Decimal::from((t * 7 + 3) % 11 - 5);
            let b = Decimal::from((t * 5 + 1) % 13 - 6);
            let c = Decimal::from((t * 3 + 2) % 7 - 3);
            vec![
                dec!(0.0004) + dec!(0.002) * a,
                dec!(0.0003) + dec!(0.001) * b + dec!(0.0005) * a,
                dec!(0.0002) + dec!(0.0008) * c,
            ]
        })
        .collect();
    ReturnsMatrix::from_rows(
        vec!["Equity".into(), "Credit".into(), "Rates".into()],
        dates,
        rows,
    )
    .unwrap()
}

fn input() -> AllocationInput {
    AllocationInput {
        returns: returns(60),
        annualization_factor: Some(dec!(252)),
        view_specification: None,
        views: Vec::new(),
        omega_method: OmegaMethod::Proportional,
        current_weights: None,
        config: AllocatorConfig::default(),
    }
}

fn relative_view() -> View {
    View {
        view_type: ViewType::Relative,
        assets: vec!["Equity".into(), "Credit".into()],
        asset_weights: vec![dec!(1), dec!(-1)],
        expected_return: dec!(0.10),
        confidence: Some(dec!(0.7)),
    }
}

fn sum(w: &[Decimal]) -> Decimal {
    w.iter().sum()
}

// ---------------------------------------------------------------------------
// End-to-end
// ---------------------------------------------------------------------------

#[test]
fn test_pipeline_without_views_keeps_prior_mean() {
    let out = run_allocation(&input()).unwrap();
    let res = &out.result;

    assert_eq!(res.posterior.mu_post, res.prior.mu);
    assert_eq!(res.allocations.len(), 3);
    assert_eq!(res.allocations[2].name, "Rates");
    assert!(out.warnings.iter().any(|w| w.contains("No views")));

    assert!((sum(&res.mean_variance.weights) - Decimal::ONE).abs() < dec!(0.000000001));
    assert!((sum(&res.risk_parity.weights) - Decimal::ONE).abs() < dec!(0.000000001));
    assert!(res.mean_variance.weights.iter().all(|w| *w >= Decimal::ZERO));
    assert!(res.risk_parity.weights.iter().all(|w| *w >= Decimal::ZERO));
}

#[test]
fn test_pipeline_relative_view_moves_spread() {
    let base = run_allocation(&input()).unwrap().result;

    let mut with_view = input();
    with_view.views = vec![relative_view()];
    with_view.omega_method = OmegaMethod::Confidence;
    let res = run_allocation(&with_view).unwrap().result;

    let prior_spread = base.prior.mu[0] - base.prior.mu[1];
    let post_spread = res.posterior.mu_post[0] - res.posterior.mu_post[1];
    assert!(
        (post_spread - dec!(0.10)).abs() < (prior_spread - dec!(0.10)).abs(),
        "spread {} should move from {} toward 0.10",
        post_spread,
        prior_spread
    );
}

#[test]
fn test_pipeline_explicit_views_match_named_views() {
    let mut named = input();
    named.views = vec![relative_view()];
    let named_out = run_allocation(&named).unwrap().result;

    let prior = &named_out.prior;
    let mut explicit = input();
    explicit.view_specification = Some(
        ViewSpecification::from_views(
            &prior.assets,
            &[relative_view()],
            &prior.sigma,
            dec!(0.05),
            OmegaMethod::Proportional,
        )
        .unwrap(),
    );
    let explicit_out = run_allocation(&explicit).unwrap().result;
    assert_eq!(named_out.posterior.mu_post, explicit_out.posterior.mu_post);
}

#[test]
fn test_pipeline_honours_current_weights_and_costs() {
    let mut costly = input();
    costly.current_weights = Some(vec![dec!(0.2), dec!(0.3), dec!(0.5)]);
    costly.config.optimizer.transaction_cost_rate = dec!(5);
    let res = run_allocation(&costly).unwrap().result;
    for (w, c) in res.mean_variance.weights.iter().zip([dec!(0.2), dec!(0.3), dec!(0.5)]) {
        assert!((w - c).abs() < dec!(0.000001));
    }
    assert!(res.mean_variance.turnover < dec!(0.000001));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_pipeline_too_few_observations() {
    let mut short = input();
    short.returns = returns(3);
    assert!(matches!(
        run_allocation(&short),
        Err(AllocatorError::InsufficientData(_))
    ));
}

#[test]
fn test_pipeline_rejects_both_view_forms() {
    let mut both = input();
    both.views = vec![relative_view()];
    both.view_specification = Some(ViewSpecification::identity(
        vec![dec!(0.05); 3],
        vec![vec![dec!(0.001), Decimal::ZERO, Decimal::ZERO]; 3],
    ));
    assert!(run_allocation(&both).is_err());
}

#[test]
fn test_pipeline_rejects_invalid_config() {
    let mut bad = input();
    bad.config.black_litterman.tau = Decimal::ZERO;
    assert!(matches!(
        run_allocation(&bad),
        Err(AllocatorError::InvalidInput { .. })
    ));
}

// ---------------------------------------------------------------------------
// JSON shape
// ---------------------------------------------------------------------------

#[test]
fn test_allocation_input_from_json() {
    let json = r#"{
        "returns": {
            "assets": ["A", "B"],
            "observations": [
                {"date": "2024-01-02", "returns": {"A": "0.010", "B": "-0.004"}},
                {"date": "2024-01-03", "returns": {"A": "-0.006", "B": "0.002"}},
                {"date": "2024-01-04", "returns": {"A": "0.004", "B": "0.001"}},
                {"date": "2024-01-05", "returns": {"A": "0.002", "B": "-0.003"}}
            ]
        },
        "views": [
            {"view_type": "Absolute", "assets": ["B"], "asset_weights": ["1"], "expected_return": "0.01"}
        ],
        "config": {"optimizer": {"risk_aversion": "4"}}
    }"#;
    let input: AllocationInput = serde_json::from_str(json).unwrap();
    assert_eq!(input.config.optimizer.risk_aversion, dec!(4));
    assert_eq!(input.config.black_litterman.tau, dec!(0.05));
    let out = run_allocation(&input).unwrap();
    assert_eq!(out.result.allocations[1].name, "B");
    assert!(out.result.posterior.mu_post[1] > out.result.prior.mu[1]);
}

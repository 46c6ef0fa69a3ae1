#[allow(dead_code)]
mod common;

use ccsim::experiment;
use ccsim::{StrategyConfig, StrategyKind};

#[test]
fn fixed_rate_flow() {
    let strategy_config = StrategyConfig {
        kind: StrategyKind::PacingOnly,
        rate_lambda: 10.0,
        seed: Some(1),
        ..Default::default()
    };

    let result = experiment::run_flow(&strategy_config, &common::short_flow(1_000, 500)).unwrap();
    let report = &result.sender;

    assert_eq!(report.strategy, StrategyKind::PacingOnly);
    assert!(
        (1..=40).contains(&report.packets_sent),
        "sent {} packets at λ = 10 over 1s",
        report.packets_sent
    );
    assert_eq!(report.acks_received, report.packets_sent);
    assert_eq!(report.metrics.loss_rate, 0.0);
    assert_eq!(report.metrics.duplicate_ack_percentage, 0.0);
    assert_eq!(report.metrics.sequential_ack_ratio, 1.0);
    assert!(report.metrics.average_rtt_ms.is_finite());
    assert!(report.cwnd_history.is_empty());

    assert_eq!(result.receiver.total_received, report.packets_sent);
    assert_eq!(result.receiver.out_of_order, 0);
}

#[test]
fn aimd_flow_grows_window() {
    let strategy_config = StrategyConfig {
        kind: StrategyKind::Aimd,
        rate_lambda: 200.0,
        ssthresh: 8.0,
        seed: Some(2),
        ..Default::default()
    };

    let result = experiment::run_flow(&strategy_config, &common::short_flow(500, 300)).unwrap();
    let report = &result.sender;

    assert!(report.packets_sent > 0);
    assert!(report.acks_received > 0);
    assert_eq!(report.cwnd_history.len(), report.ssthresh_history.len());

    // Without loss the window never shrinks
    assert!(report.cwnd_history.windows(2).all(|w| w[1] >= w[0]));
    assert!(report.cwnd_history.iter().all(|&cwnd| cwnd >= 1.0));
    assert!(report.metrics.throughput > 0.0);
}

#[test]
fn cubic_flow() {
    let strategy_config = StrategyConfig {
        kind: StrategyKind::Cubic,
        rate_lambda: 200.0,
        ssthresh: 4.0,
        seed: Some(3),
        ..Default::default()
    };

    let result = experiment::run_flow(&strategy_config, &common::short_flow(500, 300)).unwrap();
    let report = &result.sender;

    assert_eq!(report.strategy, StrategyKind::Cubic);
    assert!(report.packets_sent > 0);
    assert!(report.acks_received <= report.packets_sent);
    assert!(report.cwnd_history.iter().all(|&cwnd| cwnd >= 1.0));
    assert!(report.metrics.loss_rate >= 0.0 && report.metrics.loss_rate <= 100.0);
}

#[test]
fn parallel_flows() {
    let kinds = [StrategyKind::PacingOnly, StrategyKind::Aimd, StrategyKind::Cubic];
    let strategies: Vec<StrategyConfig> = kinds
        .into_iter()
        .map(|kind| StrategyConfig {
            kind,
            rate_lambda: 50.0,
            ..Default::default()
        })
        .collect();

    let results = experiment::run_parallel(&strategies, &common::short_flow(400, 200)).unwrap();

    assert_eq!(results.len(), 3);
    for (result, config) in results.iter().zip(&strategies) {
        assert_eq!(result.sender.strategy, config.kind);
        assert!(result.sender.packets_sent > 0);
        assert!(result.receiver.total_received <= result.sender.packets_sent);
    }
}

#[test]
fn comparison_report_serializes() {
    let base = StrategyConfig {
        rate_lambda: 50.0,
        seed: Some(11),
        ..Default::default()
    };

    let results = experiment::compare(
        &[StrategyKind::Aimd, StrategyKind::Cubic],
        &base,
        &common::short_flow(200, 100),
        2,
    )
    .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|entry| entry.runs.len() == 2));

    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json[0]["strategy"], "aimd");
    assert_eq!(json[1]["strategy"], "cubic");
    assert!(json[0]["runs"][0]["sender"]["metrics"]["loss_rate"].is_number());
}

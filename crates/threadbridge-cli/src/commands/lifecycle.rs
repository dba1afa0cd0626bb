use chrono::{DateTime, Utc};
use threadbridge_core::config::BridgeConfig;
use threadbridge_core::lifecycle::LifecycleReport;
use threadbridge_core::models::Ticket;

use crate::commands::common::{candidate_item, format_candidate_line, Bridge, CandidateItem};
use crate::error::CliError;

pub async fn run_dusty(config: BridgeConfig, dry_run: bool, as_json: bool) -> Result<(), CliError> {
    let bridge = Bridge::connect(config).await?;
    let lifecycle = bridge.lifecycle();
    let now = Utc::now();

    if dry_run {
        let tickets = lifecycle.dusty_candidates(now).await?;
        return print_candidates(&tickets, now, as_json);
    }
    let report = lifecycle.dusty_sweep(now).await?;
    print_report("Reminders", &report, as_json)
}

pub async fn run_recycle(
    config: BridgeConfig,
    dry_run: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let bridge = Bridge::connect(config).await?;
    let lifecycle = bridge.lifecycle();
    let now = Utc::now();

    if dry_run {
        let tickets = lifecycle.recycle_candidates(now).await?;
        return print_candidates(&tickets, now, as_json);
    }
    let report = lifecycle.recycle_sweep(now).await?;
    print_report("Recycle", &report, as_json)
}

fn print_candidates(tickets: &[Ticket], now: DateTime<Utc>, as_json: bool) -> Result<(), CliError> {
    let items: Vec<CandidateItem> = tickets
        .iter()
        .map(|ticket| candidate_item(ticket, now))
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("No tickets found.");
        return Ok(());
    }
    for item in &items {
        println!("{}", format_candidate_line(item));
    }
    Ok(())
}

fn print_report(label: &str, report: &LifecycleReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{label}: {} candidate(s), {} recycled, {} notified, {} without a channel, {} failed",
        report.candidates, report.recycled, report.notified, report.unnotified, report.failed
    );
    Ok(())
}

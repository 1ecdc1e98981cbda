use anyhow::Result;
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use snapcal_core::db::Database;
use snapcal_core::rollup::{DailyProgress, RollupDay, RollupStats};
use snapcal_core::session::SessionController;

use super::helpers::{no_neg_zero, parse_date};

const BAR_WIDTH: usize = 20;

pub(crate) fn cmd_today(
    session: &SessionController<Database>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct TodayView {
        date: chrono::NaiveDate,
        #[serde(flatten)]
        progress: DailyProgress,
    }

    let date = parse_date(date)?;
    let progress = session.progress(date);

    if json {
        let view = TodayView { date, progress };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let total = no_neg_zero(progress.total_kcal);
    let goal = progress.goal_kcal;
    println!("=== {date} ===\n");
    println!("  EATEN:     {total:.0} kcal");
    println!("  GOAL:      {goal:.0} kcal");
    if progress.over_goal {
        let over = progress.total_kcal - progress.goal_kcal;
        println!("  OVER:      {over:.0} kcal");
    } else {
        let remaining = no_neg_zero(progress.remaining_kcal);
        println!("  REMAINING: {remaining:.0} kcal");
    }
    let percent = progress.percent;
    println!("  {} {percent:.0}%", progress_bar(percent));
    Ok(())
}

pub(crate) fn cmd_week(
    session: &SessionController<Database>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct WeekView<'a> {
        days: &'a [RollupDay],
        stats: RollupStats,
    }

    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Day")]
        label: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        kcal: String,
        #[tabled(rename = "Goal")]
        goal: String,
        #[tabled(rename = "")]
        flag: &'static str,
    }

    let end = parse_date(end)?;
    let days = session.rollup(end);
    let stats = RollupStats::from_days(&days);

    if json {
        let view = WeekView {
            days: &days,
            stats,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if stats.logged_days == 0 {
        if let Some(first) = days.first() {
            eprintln!("No meals logged between {} and {end}", first.date);
        }
        process::exit(2);
    }

    let rows: Vec<WeekRow> = days
        .iter()
        .map(|d| WeekRow {
            label: d.label.clone(),
            date: d.date.to_string(),
            kcal: format!("{:.0}", no_neg_zero(d.kcal)),
            goal: format!("{:.0}", d.goal),
            flag: if d.is_over_goal() { "over" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let total = no_neg_zero(stats.total_kcal);
    let avg = no_neg_zero(stats.average_logged_kcal);
    let logged = stats.logged_days;
    let over = stats.days_over_goal;
    println!("  TOTAL: {total:.0} kcal | AVG: {avg:.0} kcal over {logged} logged day(s)");
    if over > 0 {
        println!("  Over goal on {over} day(s)");
    }
    Ok(())
}

pub(crate) fn cmd_history(session: &SessionController<Database>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        kcal: String,
        #[tabled(rename = "")]
        flag: &'static str,
    }

    let days = session.ledger().sorted_by_date();

    if json {
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    if days.is_empty() {
        eprintln!("No meals logged yet");
        process::exit(2);
    }

    let goal = session.goal();
    let rows: Vec<HistoryRow> = days
        .iter()
        .map(|d| HistoryRow {
            date: d.date.to_string(),
            kcal: format!("{:.0}", no_neg_zero(d.total_kcal)),
            flag: if d.total_kcal > goal { "over" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!("  {} day(s) logged, goal {goal:.0} kcal", days.len());
    Ok(())
}

#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

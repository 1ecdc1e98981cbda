use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::ledger::Ledger;

pub const ROLLUP_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupDay {
    /// Short weekday name, e.g. "Mon".
    pub label: String,
    pub date: NaiveDate,
    pub kcal: f64,
    pub goal: f64,
}

impl RollupDay {
    #[must_use]
    pub fn is_over_goal(&self) -> bool {
        self.kcal > self.goal
    }
}

/// The last seven calendar days ending with `today`, oldest first. Days with
/// no ledger entry report 0 kcal.
#[must_use]
pub fn rollup(ledger: &Ledger, goal: f64, today: NaiveDate) -> Vec<RollupDay> {
    (0..ROLLUP_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            RollupDay {
                label: date.format("%a").to_string(),
                date,
                kcal: ledger.total_for(date),
                goal,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupStats {
    pub total_kcal: f64,
    /// Mean over days with something logged; 0 when nothing was.
    pub average_logged_kcal: f64,
    pub logged_days: usize,
    pub days_over_goal: usize,
}

impl RollupStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_days(days: &[RollupDay]) -> Self {
        let total_kcal: f64 = days.iter().map(|d| d.kcal).sum();
        let logged_days = days.iter().filter(|d| d.kcal > 0.0).count();
        let average_logged_kcal = if logged_days == 0 {
            0.0
        } else {
            total_kcal / logged_days as f64
        };
        Self {
            total_kcal,
            average_logged_kcal,
            logged_days,
            days_over_goal: days.iter().filter(|d| d.is_over_goal()).count(),
        }
    }
}

/// Where today's total stands against the goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProgress {
    pub total_kcal: f64,
    pub goal_kcal: f64,
    /// Negative once the goal is exceeded.
    pub remaining_kcal: f64,
    /// Share of the goal eaten, capped at 100.
    pub percent: f64,
    pub over_goal: bool,
}

impl DailyProgress {
    #[must_use]
    pub fn new(total_kcal: f64, goal_kcal: f64) -> Self {
        let percent = if goal_kcal > 0.0 {
            (total_kcal / goal_kcal * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            total_kcal,
            goal_kcal,
            remaining_kcal: goal_kcal - total_kcal,
            percent,
            over_goal: total_kcal > goal_kcal,
        }
    }
}

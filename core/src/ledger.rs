use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::DailyIntake;

/// Per-day calorie totals, at most one entry per date.
///
/// Storage order is insertion order; callers wanting chronological output use
/// [`Ledger::sorted_by_date`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<DailyIntake>,
}

/// Result of folding one meal into the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct MealRecord {
    pub ledger: Ledger,
    pub previous_total: f64,
    pub new_total: f64,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from raw entries. When a date appears more than once the
    /// last value wins, kept at the position of the first occurrence.
    #[must_use]
    pub fn from_entries(entries: Vec<DailyIntake>) -> Self {
        let mut deduped: Vec<DailyIntake> = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(existing) = deduped.iter_mut().find(|e| e.date == entry.date) {
                existing.total_kcal = entry.total_kcal;
            } else {
                deduped.push(entry);
            }
        }
        Self { entries: deduped }
    }

    #[must_use]
    pub fn entries(&self) -> &[DailyIntake] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&DailyIntake> {
        self.entries.iter().find(|e| e.date == date)
    }

    /// Total for `date`, 0 when nothing was logged.
    #[must_use]
    pub fn total_for(&self, date: NaiveDate) -> f64 {
        self.get(date).map_or(0.0, |e| e.total_kcal)
    }

    #[must_use]
    pub fn sorted_by_date(&self) -> Vec<DailyIntake> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|e| e.date);
        sorted
    }

    /// Replace the entry for `date` (if any) with a fresh one at the end.
    fn upsert(&mut self, date: NaiveDate, total_kcal: f64) {
        self.entries.retain(|e| e.date != date);
        self.entries.push(DailyIntake { date, total_kcal });
    }
}

impl<'de> Deserialize<'de> for Ledger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<DailyIntake>::deserialize(deserializer)?;
        Ok(Self::from_entries(entries))
    }
}

/// Add a meal's calories to today's running total.
///
/// The input ledger is left alone; the returned one has exactly one entry for
/// `today` holding `previous_total + meal_kcal`. The sum is trusted as given.
#[must_use]
pub fn record_meal(ledger: &Ledger, today: NaiveDate, meal_kcal: f64) -> MealRecord {
    let previous_total = ledger.total_for(today);
    let new_total = previous_total + meal_kcal;

    let mut updated = ledger.clone();
    updated.upsert(today, new_total);

    MealRecord {
        ledger: updated,
        previous_total,
        new_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn intake(d: u32, kcal: f64) -> DailyIntake {
        DailyIntake {
            date: day(d),
            total_kcal: kcal,
        }
    }

    fn count_for(ledger: &Ledger, date: NaiveDate) -> usize {
        ledger.entries().iter().filter(|e| e.date == date).count()
    }

    #[test]
    fn test_zero_meal_on_new_date_inserts_zero_entry() {
        let ledger = Ledger::from_entries(vec![intake(1, 1500.0), intake(2, 1700.0)]);
        let record = record_meal(&ledger, day(10), 0.0);

        assert!((record.previous_total - 0.0).abs() < f64::EPSILON);
        assert!((record.new_total - 0.0).abs() < f64::EPSILON);
        assert_eq!(count_for(&record.ledger, day(10)), 1);
        assert_eq!(record.ledger.len(), 3);
    }

    #[test]
    fn test_adds_to_existing_total() {
        let ledger = Ledger::from_entries(vec![intake(10, 800.0)]);
        let record = record_meal(&ledger, day(10), 450.0);

        assert!((record.previous_total - 800.0).abs() < f64::EPSILON);
        assert!((record.new_total - 1250.0).abs() < f64::EPSILON);
        assert_eq!(count_for(&record.ledger, day(10)), 1);
        assert!((record.ledger.total_for(day(10)) - 1250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exactly_one_entry_after_repeated_meals() {
        let mut ledger = Ledger::new();
        let meals = [300.0, 0.0, 650.5, 120.0];
        for kcal in meals {
            ledger = record_meal(&ledger, day(10), kcal).ledger;
            assert_eq!(count_for(&ledger, day(10)), 1);
        }
        let expected: f64 = meals.iter().sum();
        assert!((ledger.total_for(day(10)) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_other_entries_keep_their_order() {
        let ledger = Ledger::from_entries(vec![intake(3, 1.0), intake(10, 2.0), intake(1, 3.0)]);
        let record = record_meal(&ledger, day(10), 5.0);

        let dates: Vec<NaiveDate> = record.ledger.entries().iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(3), day(1), day(10)]);
    }

    #[test]
    fn test_input_ledger_is_not_mutated() {
        let ledger = Ledger::from_entries(vec![intake(10, 100.0)]);
        let _ = record_meal(&ledger, day(10), 50.0);
        assert!((ledger.total_for(day(10)) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_entries_dedups_last_wins() {
        let ledger = Ledger::from_entries(vec![intake(1, 100.0), intake(2, 200.0), intake(1, 300.0)]);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[0].date, day(1));
        assert!((ledger.total_for(day(1)) - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_normalizes_duplicates() {
        let json = r#"[
            {"date": "2024-06-01", "total_kcal": 100},
            {"date": "2024-06-01", "total_kcal": 250}
        ]"#;
        let ledger: Ledger = serde_json::from_str(json).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!((ledger.total_for(day(1)) - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let ledger = Ledger::from_entries(vec![intake(1, 100.0)]);
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "date": "2024-06-01", "total_kcal": 100.0 }])
        );
    }

    #[test]
    fn test_sorted_by_date() {
        let ledger = Ledger::from_entries(vec![intake(5, 1.0), intake(2, 2.0), intake(9, 3.0)]);
        let dates: Vec<NaiveDate> = ledger.sorted_by_date().iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(2), day(5), day(9)]);
    }

    #[test]
    fn test_total_for_missing_date() {
        let ledger = Ledger::new();
        assert!((ledger.total_for(day(1)) - 0.0).abs() < f64::EPSILON);
        assert!(ledger.get(day(1)).is_none());
    }
}

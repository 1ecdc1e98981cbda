use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use snapcal_core::models::FoodItem;

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today()),
        Some(s) => match s.as_str() {
            "today" => Ok(today()),
            "yesterday" => Ok(today() - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD, today or yesterday")),
        },
    }
}

/// Parse a non-negative number such as "250", "250kcal" or "150g".
pub(crate) fn parse_amount(s: &str, suffix: &str) -> Result<f64> {
    let trimmed = s.trim();
    let number = trimmed.strip_suffix(suffix).unwrap_or(trimmed).trim();
    let value: f64 = number
        .parse()
        .with_context(|| format!("Invalid number: '{s}'"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("Value must be 0 or more, got '{s}'");
    }
    Ok(value)
}

/// Prompt on stderr and read one trimmed line from `input`.
pub(crate) fn prompt_line(input: &mut dyn BufRead, prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("No input");
    }
    Ok(line.trim().to_string())
}

/// Prompt for an optional amount, asking again until the answer is blank
/// or parses.
pub(crate) fn prompt_amount(
    input: &mut dyn BufRead,
    prompt: &str,
    suffix: &str,
) -> Result<Option<f64>> {
    loop {
        let answer = prompt_line(input, prompt)?;
        if answer.is_empty() {
            return Ok(None);
        }
        match parse_amount(&answer, suffix) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => eprintln!("{e:#}"),
        }
    }
}

pub(crate) fn print_items_table(items: &[FoodItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "Calories")]
        calories: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .enumerate()
        .map(|(i, item)| ItemRow {
            idx: i + 1,
            name: truncate(&item.food_name, 35),
            serving: format!("{:.0}g", item.serving_size_grams),
            calories: format!("{:.0}", no_neg_zero(item.calories)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use snapcal_core::analysis::FoodAnalyzer;
use snapcal_core::db::Database;
use snapcal_core::models::{FoodItem, FoodItemUpdate, sum_calories};
use snapcal_core::session::{SaveOutcome, SessionController};

use super::helpers::{
    json_error, no_neg_zero, print_items_table, prompt_amount, prompt_line, today,
};

#[derive(Debug, PartialEq)]
pub(crate) enum ReviewAction {
    Save,
    Cancel,
    Edit(usize),
    Delete(usize),
}

/// Parse a review prompt answer. Item numbers are 1-based as displayed.
pub(crate) fn parse_review_action(input: &str, item_count: usize) -> Result<ReviewAction> {
    let mut parts = input.split_whitespace();
    let verb = parts.next().unwrap_or("").to_lowercase();
    let index = |arg: Option<&str>| -> Result<usize> {
        let n: usize = arg
            .context("Which item? e.g. 'e 2'")?
            .parse()
            .context("Item must be a number")?;
        if n < 1 || n > item_count {
            bail!("Item {n} does not exist (1-{item_count})");
        }
        Ok(n - 1)
    };

    match verb.as_str() {
        "s" | "save" => Ok(ReviewAction::Save),
        "c" | "cancel" => Ok(ReviewAction::Cancel),
        "e" | "edit" => Ok(ReviewAction::Edit(index(parts.next())?)),
        "d" | "delete" => Ok(ReviewAction::Delete(index(parts.next())?)),
        _ => bail!("Unknown choice '{input}'. Use s, c, e <n> or d <n>"),
    }
}

pub(crate) fn cmd_analyze(
    session: &mut SessionController<Database>,
    analyzer: &dyn FoodAnalyzer,
    image: &Path,
    yes: bool,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(image)
        .with_context(|| format!("Could not read the image file: {}", image.display()))?;

    let items = session.analyze(analyzer, bytes)?.to_vec();

    if yes || json {
        let outcome = session.save(today())?;
        return print_outcome(&outcome, json);
    }

    let stdin = io::stdin();
    match review_interactively(session, items, today(), &mut stdin.lock())? {
        Some(outcome) => print_outcome(&outcome, false),
        None => {
            println!("Meal discarded");
            Ok(())
        }
    }
}

/// Loop until the user saves (`Some`) or cancels (`None`).
fn review_interactively(
    session: &mut SessionController<Database>,
    mut items: Vec<FoodItem>,
    date: NaiveDate,
    input: &mut dyn BufRead,
) -> Result<Option<SaveOutcome>> {
    loop {
        if items.is_empty() {
            println!("No food items left.");
        } else {
            print_items_table(&items);
        }
        let total = no_neg_zero(sum_calories(&items));
        println!("  MEAL TOTAL: {total:.0} kcal\n");

        let answer = prompt_line(input, "[s]ave, [c]ancel, [e]dit <n>, [d]elete <n>: ")?;
        let action = match parse_review_action(&answer, items.len()) {
            Ok(action) => action,
            Err(e) => {
                eprintln!("{e:#}");
                continue;
            }
        };

        match action {
            ReviewAction::Save => match session.save(date) {
                Ok(outcome) => return Ok(Some(outcome)),
                Err(e) => eprintln!("{e}"),
            },
            ReviewAction::Cancel => {
                session.cancel()?;
                return Ok(None);
            }
            ReviewAction::Delete(idx) => {
                let id = items[idx].id.clone();
                session.remove_item(&id)?;
            }
            ReviewAction::Edit(idx) => {
                let id = items[idx].id.clone();
                let update = prompt_update(&items[idx], input)?;
                if let Err(e) = session.update_item(&id, &update) {
                    eprintln!("{e}");
                }
            }
        }
        items = session.items()?.to_vec();
    }
}

fn prompt_update(item: &FoodItem, input: &mut dyn BufRead) -> Result<FoodItemUpdate> {
    let name = prompt_line(input, &format!("Name [{}]: ", item.food_name))?;
    let calories = prompt_amount(input, &format!("Calories [{:.0}]: ", item.calories), "kcal")?;
    let serving_size_grams = prompt_amount(
        input,
        &format!("Serving grams [{:.0}]: ", item.serving_size_grams),
        "g",
    )?;

    Ok(FoodItemUpdate {
        food_name: (!name.is_empty()).then_some(name),
        calories,
        serving_size_grams,
    })
}

fn print_outcome(outcome: &SaveOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        if !outcome.persisted {
            eprintln!(
                "{}",
                json_error("Could not write to the database; this meal is not saved on disk")
            );
        }
        return Ok(());
    }

    let meal = no_neg_zero(outcome.meal_kcal);
    let total = no_neg_zero(outcome.new_total);
    let goal = outcome.goal;
    println!("Saved meal: {meal:.0} kcal. Today: {total:.0} / {goal:.0} kcal");
    if let Some(note) = &outcome.notification {
        println!("{}", note.message);
    }
    if !outcome.persisted {
        eprintln!("Warning: could not write to the database; this meal is not saved on disk");
    }
    Ok(())
}

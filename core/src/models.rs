use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily calorie goal used until the user configures one.
pub const DEFAULT_GOAL_KCAL: f64 = 2000.0;

/// Store key holding the daily goal (a single number).
pub const GOAL_KEY: &str = "snapcal:goal";

/// Store key holding the ledger (a list of `{date, total_kcal}`).
pub const HISTORY_KEY: &str = "snapcal:history";

/// Upper bound on uploaded meal photos.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// A food item under review. The id only lives as long as the review session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub id: String,
    pub food_name: String,
    pub calories: f64,
    pub serving_size_grams: f64,
}

impl FoodItem {
    #[must_use]
    pub fn from_analyzed(food: AnalyzedFood) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            food_name: food.food_name,
            calories: food.calories,
            serving_size_grams: food.serving_size_grams,
        }
    }

    /// Apply a partial edit. Fields are validated before anything is changed,
    /// so a rejected edit leaves the item untouched.
    pub fn apply(&mut self, update: &FoodItemUpdate) -> Result<()> {
        if let Some(name) = &update.food_name {
            validate_food_name(name)?;
        }
        if let Some(calories) = update.calories {
            validate_calories(calories)?;
        }
        if let Some(serving) = update.serving_size_grams {
            validate_serving(serving)?;
        }

        if let Some(name) = &update.food_name {
            self.food_name = name.trim().to_string();
        }
        if let Some(calories) = update.calories {
            self.calories = calories;
        }
        if let Some(serving) = update.serving_size_grams {
            self.serving_size_grams = serving;
        }
        Ok(())
    }
}

/// One item as reported by the image analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedFood {
    pub food_name: String,
    pub calories: f64,
    pub serving_size_grams: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItemUpdate {
    pub food_name: Option<String>,
    pub calories: Option<f64>,
    pub serving_size_grams: Option<f64>,
}

impl FoodItemUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.food_name.is_none() && self.calories.is_none() && self.serving_size_grams.is_none()
    }
}

/// Calories eaten on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyIntake {
    pub date: NaiveDate,
    pub total_kcal: f64,
}

#[must_use]
pub fn sum_calories(items: &[FoodItem]) -> f64 {
    items.iter().map(|item| item.calories).sum()
}

pub fn validate_goal(kcal: f64) -> Result<f64> {
    if !kcal.is_finite() || kcal <= 0.0 {
        bail!("Daily goal must be a number greater than 0, got {kcal}");
    }
    Ok(kcal)
}

pub fn validate_calories(kcal: f64) -> Result<f64> {
    if !kcal.is_finite() || kcal < 0.0 {
        bail!("Calories must be a non-negative number, got {kcal}");
    }
    Ok(kcal)
}

pub fn validate_serving(grams: f64) -> Result<f64> {
    if !grams.is_finite() || grams < 0.0 {
        bail!("Serving size must be a non-negative number of grams, got {grams}");
    }
    Ok(grams)
}

pub fn validate_food_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Food name cannot be empty");
    }
    Ok(trimmed)
}

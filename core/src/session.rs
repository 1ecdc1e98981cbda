use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::analysis::{FoodAnalyzer, ImageUpload, parse_analysis_response};
use crate::error::SnapcalError;
use crate::ledger::{Ledger, record_meal};
use crate::models::{
    DEFAULT_GOAL_KCAL, FoodItem, FoodItemUpdate, GOAL_KEY, HISTORY_KEY, sum_calories,
    validate_goal,
};
use crate::notify::{Notification, Transition, classify_transition};
use crate::rollup::{DailyProgress, RollupDay, rollup};
use crate::store::{PersistedStore, StorageBackend};

/// Identifies one analysis request so late responses can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AnalysisTicket(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Analyzing { ticket: AnalysisTicket },
    Reviewing { items: Vec<FoodItem> },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Reviewing { item_count: usize },
    Failed {
        message: String,
        notification: Notification,
    },
    /// The session moved on before the response arrived.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub date: NaiveDate,
    pub meal_kcal: f64,
    pub previous_total: f64,
    pub new_total: f64,
    pub goal: f64,
    pub transition: Transition,
    pub notification: Option<Notification>,
    /// False once the store has fallen back to memory-only operation.
    pub persisted: bool,
}

/// Drives one user's meal logging: `Idle → Analyzing → Reviewing | Failed → Idle`.
///
/// Only the goal and the ledger outlive the controller; review items are
/// dropped on save, cancel or restart.
pub struct SessionController<B> {
    store: PersistedStore<B>,
    state: SessionState,
    next_ticket: u64,
}

impl<B: StorageBackend> SessionController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            store: PersistedStore::new(backend),
            state: SessionState::Idle,
            next_ticket: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn store(&self) -> &PersistedStore<B> {
        &self.store
    }

    /// Re-read goal and ledger from the medium.
    pub fn refresh(&mut self) {
        self.store.refresh();
    }

    // --- Goal ---

    /// True until the user has configured a goal at least once.
    #[must_use]
    pub fn needs_goal_setup(&self) -> bool {
        !self.store.has(GOAL_KEY)
    }

    #[must_use]
    pub fn goal(&self) -> f64 {
        let goal = self.store.get(GOAL_KEY, DEFAULT_GOAL_KCAL);
        if validate_goal(goal).is_err() {
            warn!(goal, "stored goal is not a positive number, using default");
            return DEFAULT_GOAL_KCAL;
        }
        goal
    }

    pub fn set_goal(&mut self, kcal: f64) -> Result<Notification, SnapcalError> {
        let kcal = validate_goal(kcal).map_err(|e| SnapcalError::validation(&e))?;
        self.store
            .set(GOAL_KEY, &kcal)
            .map_err(|e| SnapcalError::validation(&e))?;
        info!(goal = kcal, "daily goal updated");
        Ok(Notification::success("Daily goal updated successfully!"))
    }

    /// Forget the configured goal so the next run asks for one again.
    /// Returns whether a goal was set.
    pub fn clear_goal(&mut self) -> bool {
        let existed = self.store.remove(GOAL_KEY);
        if existed {
            info!("daily goal cleared");
        }
        existed
    }

    // --- Ledger views ---

    #[must_use]
    pub fn ledger(&self) -> Ledger {
        self.store.get(HISTORY_KEY, Ledger::new())
    }

    #[must_use]
    pub fn today_total(&self, today: NaiveDate) -> f64 {
        self.ledger().total_for(today)
    }

    #[must_use]
    pub fn progress(&self, today: NaiveDate) -> DailyProgress {
        DailyProgress::new(self.today_total(today), self.goal())
    }

    #[must_use]
    pub fn rollup(&self, today: NaiveDate) -> Vec<RollupDay> {
        rollup(&self.ledger(), self.goal(), today)
    }

    // --- Analysis ---

    /// Accept a photo and move to `Analyzing`. A rejected photo leaves the
    /// session `Idle`.
    pub fn begin_analysis(
        &mut self,
        image: Vec<u8>,
    ) -> Result<(AnalysisTicket, ImageUpload), SnapcalError> {
        if self.needs_goal_setup() {
            return Err(SnapcalError::GoalNotConfigured);
        }
        if !matches!(self.state, SessionState::Idle) {
            return Err(SnapcalError::Busy);
        }
        let upload = ImageUpload::from_bytes(image)?;

        self.next_ticket += 1;
        let ticket = AnalysisTicket(self.next_ticket);
        self.state = SessionState::Analyzing { ticket };
        debug!(ticket = ticket.0, mime = upload.mime_type(), "analysis started");
        Ok((ticket, upload))
    }

    /// Feed the analysis service's answer back in.
    pub fn complete_analysis(
        &mut self,
        ticket: AnalysisTicket,
        response: Result<Value>,
    ) -> AnalysisOutcome {
        match self.state {
            SessionState::Analyzing { ticket: current } if current == ticket => {}
            _ => {
                debug!(ticket = ticket.0, "discarding stale analysis response");
                return AnalysisOutcome::Discarded;
            }
        }

        let parsed = response
            .map_err(|e| SnapcalError::Analysis(format!("{e:#}")))
            .and_then(parse_analysis_response);

        match parsed {
            Ok(foods) => {
                let items: Vec<FoodItem> =
                    foods.into_iter().map(FoodItem::from_analyzed).collect();
                let item_count = items.len();
                info!(ticket = ticket.0, item_count, "analysis ready for review");
                self.state = SessionState::Reviewing { items };
                AnalysisOutcome::Reviewing { item_count }
            }
            Err(e) => {
                let message = match e {
                    SnapcalError::Analysis(detail) => detail,
                    other => other.to_string(),
                };
                warn!(ticket = ticket.0, error = %message, "analysis failed");
                self.state = SessionState::Failed {
                    message: message.clone(),
                };
                AnalysisOutcome::Failed {
                    message,
                    notification: Notification::error(
                        "Failed to analyze image. Please try again.",
                    ),
                }
            }
        }
    }

    /// Run a whole analysis synchronously against `analyzer`.
    pub fn analyze(
        &mut self,
        analyzer: &dyn FoodAnalyzer,
        image: Vec<u8>,
    ) -> Result<&[FoodItem], SnapcalError> {
        let (ticket, upload) = self.begin_analysis(image)?;
        let response = analyzer.analyze(&upload);
        match self.complete_analysis(ticket, response) {
            AnalysisOutcome::Reviewing { .. } => self.items(),
            AnalysisOutcome::Failed { message, .. } => Err(SnapcalError::Analysis(message)),
            AnalysisOutcome::Discarded => Err(SnapcalError::NotReviewing),
        }
    }

    // --- Review ---

    pub fn items(&self) -> Result<&[FoodItem], SnapcalError> {
        match &self.state {
            SessionState::Reviewing { items } => Ok(items.as_slice()),
            _ => Err(SnapcalError::NotReviewing),
        }
    }

    /// Calories of the items currently under review.
    pub fn review_total(&self) -> Result<f64, SnapcalError> {
        self.items().map(sum_calories)
    }

    pub fn update_item(
        &mut self,
        id: &str,
        update: &FoodItemUpdate,
    ) -> Result<&FoodItem, SnapcalError> {
        let items = self.items_mut()?;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| SnapcalError::ItemNotFound(id.to_string()))?;
        item.apply(update).map_err(|e| SnapcalError::validation(&e))?;
        Ok(item)
    }

    pub fn remove_item(&mut self, id: &str) -> Result<FoodItem, SnapcalError> {
        let items = self.items_mut()?;
        let idx = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| SnapcalError::ItemNotFound(id.to_string()))?;
        Ok(items.remove(idx))
    }

    /// Fold the reviewed items into `today`'s total and return to `Idle`.
    pub fn save(&mut self, today: NaiveDate) -> Result<SaveOutcome, SnapcalError> {
        let meal_kcal = self.review_total()?;
        let goal = self.goal();
        let record = record_meal(&self.ledger(), today, meal_kcal);
        if !meal_kcal.is_finite() || !record.new_total.is_finite() {
            return Err(SnapcalError::Validation(format!(
                "A meal of {meal_kcal} kcal cannot be added to today's total"
            )));
        }

        if let Err(e) = self.store.set(HISTORY_KEY, &record.ledger) {
            warn!(error = %format!("{e:#}"), "could not store updated ledger");
        }

        let transition = classify_transition(record.previous_total, record.new_total, goal);
        self.state = SessionState::Idle;
        info!(
            %today,
            meal_kcal,
            new_total = record.new_total,
            ?transition,
            "meal saved"
        );

        Ok(SaveOutcome {
            date: today,
            meal_kcal,
            previous_total: record.previous_total,
            new_total: record.new_total,
            goal,
            transition,
            notification: transition.notification(goal),
            persisted: !self.store.is_degraded(),
        })
    }

    /// Drop the current review, or abandon a pending analysis. Leaves the
    /// ledger untouched.
    pub fn cancel(&mut self) -> Result<(), SnapcalError> {
        match self.state {
            SessionState::Reviewing { .. } | SessionState::Analyzing { .. } => {
                debug!("review cancelled");
                self.state = SessionState::Idle;
                Ok(())
            }
            _ => Err(SnapcalError::NotReviewing),
        }
    }

    /// Clear a failed analysis so a new photo can be uploaded. Returns
    /// whether there was anything to dismiss.
    pub fn dismiss(&mut self) -> bool {
        if matches!(self.state, SessionState::Failed { .. }) {
            self.state = SessionState::Idle;
            true
        } else {
            false
        }
    }

    fn items_mut(&mut self) -> Result<&mut Vec<FoodItem>, SnapcalError> {
        match &mut self.state {
            SessionState::Reviewing { items } => Ok(items),
            _ => Err(SnapcalError::NotReviewing),
        }
    }
}

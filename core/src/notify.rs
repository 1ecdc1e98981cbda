use std::time::Duration;

use serde::Serialize;

/// How long a notification stays on screen before dismissing itself.
pub const NOTIFICATION_DURATION: Duration = Duration::from_secs(5);

/// Goal-related change caused by one saved meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    None,
    Reached,
    Exceeded,
}

/// Classify the move from `previous_total` to `new_total` against `goal`.
///
/// Two checks in priority order: first "was below, now at or above", then
/// "was below, now strictly above". The first check takes precedence, so a
/// meal that jumps past the goal reports `Reached`.
#[must_use]
pub fn classify_transition(previous_total: f64, new_total: f64, goal: f64) -> Transition {
    let reached_before = previous_total >= goal;
    let reached_after = new_total >= goal;

    if !reached_before && reached_after {
        Transition::Reached
    } else if previous_total < goal && new_total > goal {
        Transition::Exceeded
    } else {
        Transition::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
}

/// One-shot message for the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            duration: NOTIFICATION_DURATION,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }
}

impl Transition {
    #[must_use]
    pub fn notification(self, goal: f64) -> Option<Notification> {
        match self {
            Transition::None => None,
            Transition::Reached => Some(Notification::success(format!(
                "Goal of {goal:.0} kcal reached!"
            ))),
            Transition::Exceeded => {
                Some(Notification::warning("You've exceeded your daily goal!"))
            }
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

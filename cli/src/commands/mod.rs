mod analyze;
mod goal;
mod helpers;
mod summary;

pub(crate) use analyze::cmd_analyze;
pub(crate) use goal::{cmd_goal_clear, cmd_goal_set, cmd_goal_show};
pub(crate) use summary::{cmd_history, cmd_today, cmd_week};

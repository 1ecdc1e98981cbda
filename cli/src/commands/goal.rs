use anyhow::Result;
use serde::Serialize;

use snapcal_core::db::Database;
use snapcal_core::models::DEFAULT_GOAL_KCAL;
use snapcal_core::session::SessionController;

use super::helpers::parse_amount;

#[derive(Serialize)]
struct GoalView {
    goal_kcal: f64,
    configured: bool,
}

pub(crate) fn cmd_goal_set(
    session: &mut SessionController<Database>,
    kcal: &str,
    json: bool,
) -> Result<()> {
    let kcal = parse_amount(kcal, "kcal")?;
    let note = session.set_goal(kcal)?;
    let goal = session.goal();

    if json {
        let view = GoalView {
            goal_kcal: goal,
            configured: true,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{} ({goal:.0} kcal/day)", note.message);
    }
    if session.store().is_degraded() {
        eprintln!("Warning: could not write to the database; the goal is not saved on disk");
    }
    Ok(())
}

pub(crate) fn cmd_goal_show(session: &SessionController<Database>, json: bool) -> Result<()> {
    let configured = !session.needs_goal_setup();
    let goal = session.goal();

    if json {
        let view = GoalView {
            goal_kcal: goal,
            configured,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else if configured {
        println!("Daily goal: {goal:.0} kcal");
    } else {
        println!("Daily goal: not configured (default {DEFAULT_GOAL_KCAL:.0} kcal)");
        println!("Set one with: snapcal goal set <kcal>");
    }
    Ok(())
}

pub(crate) fn cmd_goal_clear(session: &mut SessionController<Database>, json: bool) -> Result<()> {
    let cleared = session.clear_goal();

    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Daily goal cleared");
    } else {
        println!("No daily goal was set");
    }
    Ok(())
}

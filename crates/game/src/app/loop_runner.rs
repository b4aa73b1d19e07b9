use std::process::ExitCode;

use tracing::{error, info};

use super::bootstrap::{AppError, AppWiring};
use super::scenario::{Scenario, ScenarioSummary};

pub(crate) fn run(app: Result<AppWiring, AppError>) -> ExitCode {
    let app = match app {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let summary = run_scenario(app);
    info!(
        ticks = summary.ticks,
        live_entities = summary.live_entities,
        player_alive = summary.player_alive,
        player_health = summary.player_health,
        credits = summary.credits,
        credits_hud = ?summary.credits_hud,
        experience = summary.experience,
        kills = summary.kills,
        interactions = summary.interactions,
        effects = summary.effects,
        carried = ?summary.carried,
        collectibles_left = summary.collectibles_left,
        "scenario_finished"
    );
    ExitCode::SUCCESS
}

/// Runs the fixed-step loop for the configured number of ticks.
pub(crate) fn run_scenario(app: AppWiring) -> ScenarioSummary {
    let mut scenario = Scenario::load(&app.config, app.services);
    for _ in 0..app.config.max_ticks {
        scenario.step();
    }
    scenario.summary()
}

//! Spec command - print the file spec of a local chart archive

use std::path::Path;

use chartbundle_core::{load_archive, plan_chart};
use chartbundle_engine::Engine;
use console::style;

use crate::error::{CliError, Result};

pub fn run(archive: &Path, docker_repo: &str, chart_repo: &str, expected: bool) -> Result<()> {
    let data = std::fs::read(archive).map_err(|e| CliError::io_at(archive.display(), e))?;
    let chart = load_archive(&data)?;

    eprintln!(
        "{} {} {}",
        style("Planning").cyan().bold(),
        chart.name(),
        style(chart.version()).dim()
    );

    let engine = Engine::new(false);
    let plan = plan_chart(&chart, &engine, docker_repo, chart_repo)?;

    if expected {
        for name in plan.names() {
            println!("{}", name);
        }
    } else {
        let json = plan.spec.to_json_pretty()?;
        println!("{}", json);
    }

    Ok(())
}

//! Queue inspection: stats, dead letters and stale recovery.

use colored::Colorize;
use courier_config::CourierConfig;
use courier_queue::{QueueClass, QueueStats, Task};
use std::fmt::Write;
use std::time::Duration;

use crate::error::CliResult;
use crate::setup;

pub async fn stats(config: &CourierConfig, json: bool) -> CliResult<()> {
    let queue = setup::open_queue(config).await?;
    let stats = queue.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", format_stats(&stats));
    }
    Ok(())
}

pub async fn dead_letters(config: &CourierConfig, limit: usize, json: bool) -> CliResult<()> {
    let queue = setup::open_queue(config).await?;
    let tasks = queue.dead_letters(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else if tasks.is_empty() {
        println!("{}", "No dead letters.".green());
    } else {
        print!("{}", format_dead_letters(&tasks));
    }
    Ok(())
}

pub async fn recover(config: &CourierConfig, older_than: Option<Duration>) -> CliResult<()> {
    let queue = setup::open_queue(config).await?;
    let recovered = match older_than {
        Some(age) => queue.recover_older_than(age).await?,
        None => queue.recover_stale().await?,
    };

    println!("{} {} stale task(s)", "recovered".green().bold(), recovered);
    Ok(())
}

pub fn format_stats(stats: &QueueStats) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:>9} {:>10} {:>11} {:>10} {:>6}",
        "class", "pending", "scheduled", "processing", "completed", "dead"
    );

    let rows = QueueClass::ALL
        .iter()
        .map(|class| (class.as_str(), stats.class(*class)))
        .chain(std::iter::once(("total", stats.total())));
    for (name, counts) in rows {
        let _ = writeln!(
            out,
            "{:<10} {:>9} {:>10} {:>11} {:>10} {:>6}",
            name, counts.pending, counts.scheduled, counts.processing, counts.completed, counts.dead
        );
    }
    out
}

pub fn format_dead_letters(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let _ = writeln!(
            out,
            "{}  {}  {}  attempts {}/{}  died {}",
            task.id,
            task.class,
            task.task_type,
            task.attempt,
            task.max_attempts,
            task.finished_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        );
        if let Some(error) = &task.last_error {
            let _ = writeln!(out, "    {}", error);
        }
    }
    out
}

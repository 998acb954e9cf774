//! Task queue commands.

use super::get_database;
use anyhow::Result;
use colored::{ColoredString, Colorize};
use fixfinder_core::{IngestionTask, TaskStatus};

pub fn list(status: Option<String>, limit: usize) -> Result<()> {
    let db = get_database()?;

    let status = match status.as_deref() {
        Some(s) => Some(
            TaskStatus::from_str(s)
                .ok_or_else(|| anyhow::anyhow!("Unknown task status '{}'", s))?,
        ),
        None => None,
    };

    let tasks = db.list_tasks(status, None, limit)?;
    if tasks.is_empty() {
        println!("{}", "No tasks.".dimmed());
        return Ok(());
    }

    for task in &tasks {
        print_task_line(task);
    }
    Ok(())
}

pub fn show(id: &str) -> Result<()> {
    let db = get_database()?;
    let task = db.get_task(&id.to_string())?;

    println!("{} {}", "Task".cyan().bold(), task.id);
    println!("{}", "─".repeat(60));
    println!("  Type:      {}", task.task_type);
    println!("  Target:    {}", task.target_ref);
    println!("  Status:    {}", status_badge(task.status));
    println!("  Priority:  {}", task.priority);
    println!("  Retries:   {}/{}", task.retry_count, task.max_retries);
    println!("  Scheduled: {}", task.scheduled_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(started) = task.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = task.completed_at {
        println!("  Finished:  {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if task.cancel_requested {
        println!("  {}", "Cancellation requested".yellow());
    }
    if let Some(error) = &task.error_message {
        println!("  {} {}", "Last error:".red().bold(), error);
    }
    Ok(())
}

pub fn cancel(id: &str) -> Result<()> {
    let db = get_database()?;
    let task = db.get_task(&id.to_string())?;

    if task.status.is_terminal() {
        println!(
            "{} Task is already {}",
            "Note:".yellow().bold(),
            task.status
        );
        return Ok(());
    }

    let immediate = db.cancel_task(&id.to_string())?;
    if immediate {
        println!("{} Task cancelled", "✓".green());
    } else {
        println!(
            "{} Cancellation requested; the worker will stop it",
            "✓".green()
        );
    }
    Ok(())
}

pub fn dead_letter() -> Result<()> {
    let db = get_database()?;
    let tasks = db.dead_letter_tasks()?;

    if tasks.is_empty() {
        println!("{}", "No dead-lettered tasks.".dimmed());
        return Ok(());
    }

    println!("{} ({})", "Dead-lettered tasks".red().bold(), tasks.len());
    println!("{}", "─".repeat(70));
    for task in &tasks {
        print_task_line(task);
        if let Some(error) = &task.error_message {
            println!("    {}", error.red());
        }
    }
    Ok(())
}

fn print_task_line(task: &IngestionTask) {
    println!(
        "{}  {:<20} {}  {}",
        status_badge(task.status),
        task.task_type.to_string(),
        short_ref(&task.target_ref).dimmed(),
        task.id.get(..8).unwrap_or(&task.id).dimmed()
    );
}

fn status_badge(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => "pending   ".yellow(),
        TaskStatus::Processing => "processing".cyan(),
        TaskStatus::Completed => "completed ".green(),
        TaskStatus::Failed => "failed    ".red(),
        TaskStatus::Cancelled => "cancelled ".dimmed(),
    }
}

fn short_ref(target_ref: &str) -> String {
    if target_ref.len() <= 40 {
        return target_ref.to_string();
    }
    // Queued-intake refs are JSON payloads with user-supplied titles, so the
    // cut point must land on a char boundary
    let mut end = 37;
    while !target_ref.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &target_ref[..end])
}

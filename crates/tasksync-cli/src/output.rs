//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde_json::Value;

use tasksync_core::Task;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single task
    pub fn print_task(&self, task: &Task) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:     {}", task.id);
                println!("Title:  {}", task.title);
                println!("Done:   {}", if task.done { "yes" } else { "no" });
            }
            OutputFormat::Json => println!("{:#}", task.to_document()),
            OutputFormat::Quiet => println!("{}", task.id),
        }
    }

    /// Print a list of tasks
    pub fn print_tasks(&self, tasks: &[Task]) {
        match self.format {
            OutputFormat::Human => {
                if tasks.is_empty() {
                    println!("No tasks.");
                    return;
                }
                for task in tasks {
                    println!("{}", format_task_line(task));
                }
                println!("\n{} task(s)", tasks.len());
            }
            OutputFormat::Json => println!("{:#}", tasks_json(tasks)),
            OutputFormat::Quiet => {
                for task in tasks {
                    println!("{}", task.id);
                }
            }
        }
    }

    /// Print the sync state
    pub fn print_sync_state(&self, enabled: bool) {
        match self.format {
            OutputFormat::Human => println!("{}", sync_state_text(enabled)),
            OutputFormat::Json => println!("{}", serde_json::json!({ "sync_state": enabled })),
            OutputFormat::Quiet => println!("{}", enabled),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an error that doesn't end the command
    pub fn error(&self, msg: &str) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "error", "message": msg}));
            }
            _ => eprintln!("Error: {}", msg),
        }
    }
}

/// Tasks as a JSON array of stored documents
pub fn tasks_json(tasks: &[Task]) -> Value {
    Value::Array(tasks.iter().map(Task::to_document).collect())
}

/// Human-readable sync state, as shown by `sync status` and `sync watch`
pub fn sync_state_text(enabled: bool) -> String {
    format!("Sync State: {}", enabled)
}

/// One-line task summary: short id, checkbox, title
pub fn format_task_line(task: &Task) -> String {
    format!(
        "{} [{}] {}",
        short_id(&task.id),
        if task.done { "x" } else { " " },
        truncate(&task.title, 60)
    )
}

/// First eight characters of an id
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_task_line() {
        let mut task = Task::with_id("0123456789abcdef", "Buy milk");
        assert_eq!(format_task_line(&task), "01234567 [ ] Buy milk");

        task.done = true;
        assert_eq!(format_task_line(&task), "01234567 [x] Buy milk");
    }

    #[test]
    fn test_short_id_of_short_ids() {
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_tasks_json_uses_stored_names() {
        let json = tasks_json(&[Task::with_id("t1", "Walk dog")]);
        assert_eq!(json[0]["_id"], "t1");
        assert_eq!(json[0]["deleted"], false);
    }

    #[test]
    fn test_sync_state_text() {
        assert_eq!(sync_state_text(true), "Sync State: true");
        assert_eq!(sync_state_text(false), "Sync State: false");
    }
}

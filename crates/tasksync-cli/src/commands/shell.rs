//! Interactive shell
//!
//! Prints task and sync-state snapshots as they arrive while reading
//! commands from stdin, one per line.

use anyhow::{bail, Result};
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use tasksync_core::{Task, TaskApp};

use crate::output::{format_task_line, short_id, Output};
use crate::sse::SseEvent;

const HELP: &str = "\
Commands:
  add <title>          Add a task
  rename <id> <title>  Rename a task
  toggle <id>          Mark a task done or not done
  delete <id>          Delete a task
  sync                 Toggle sync
  help                 Show this help
  quit                 Leave the shell";

/// A parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add(String),
    Rename { id: String, title: String },
    Toggle(String),
    Delete(String),
    ToggleSync,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse a line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "add" | "a" => Self::Add(required(rest, "add <title>")?.to_string()),
            "rename" | "mv" => {
                let Some((id, title)) = rest.split_once(char::is_whitespace) else {
                    bail!("Usage: rename <id> <title>");
                };
                Self::Rename {
                    id: id.to_string(),
                    title: title.trim().to_string(),
                }
            }
            "toggle" | "t" | "done" => Self::Toggle(required(rest, "toggle <id>")?.to_string()),
            "delete" | "rm" => Self::Delete(required(rest, "delete <id>")?.to_string()),
            "sync" => Self::ToggleSync,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("Unknown command: '{}' (try 'help')", other),
        };
        Ok(Some(command))
    }
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str> {
    if rest.is_empty() {
        bail!("Usage: {}", usage);
    }
    Ok(rest)
}

/// Run the shell until stdin closes or `quit`
pub async fn run(app: &TaskApp, sse: bool, output: &Output) -> Result<()> {
    let mut tasks = app.observe_tasks()?;
    let mut sync_states = app.observe_sync_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !sse && !output.is_quiet() && !output.is_json() {
        println!("{}\n", HELP);
    }

    loop {
        tokio::select! {
            Some(snapshot) = tasks.next() => render_tasks(&snapshot, sse, output),
            Some(enabled) = sync_states.next() => {
                if sse {
                    print!("{}", SseEvent::sync_state(enabled));
                } else {
                    output.print_sync_state(enabled);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match ShellCommand::parse(&line) {
                    Ok(Some(ShellCommand::Quit)) => break,
                    Ok(Some(ShellCommand::Help)) => println!("{}", HELP),
                    Ok(Some(command)) => {
                        if let Err(e) = apply(app, command, output).await {
                            output.error(&format!("{:#}", e));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => output.error(&e.to_string()),
                }
            }
        }
    }

    tasks.cancel()?;
    Ok(())
}

async fn apply(app: &TaskApp, command: ShellCommand, output: &Output) -> Result<()> {
    match command {
        ShellCommand::Add(title) => {
            let task = app.add_task(&title).await?;
            output.success(&format!("Added task: {}", short_id(&task.id)));
        }
        ShellCommand::Rename { id, title } => {
            let id = app.tasks().resolve_id(&id).await?;
            app.rename_task(&id, &title).await?;
        }
        ShellCommand::Toggle(id) => {
            let id = app.tasks().resolve_id(&id).await?;
            app.toggle_task_done(&id).await?;
        }
        ShellCommand::Delete(id) => {
            let id = app.tasks().resolve_id(&id).await?;
            app.delete_task(&id).await?;
        }
        ShellCommand::ToggleSync => {
            app.toggle_sync().await?;
        }
        ShellCommand::Help | ShellCommand::Quit => {}
    }
    Ok(())
}

fn render_tasks(tasks: &[Task], sse: bool, output: &Output) {
    if sse {
        print!("{}", SseEvent::task_list(tasks));
    } else if output.is_json() || output.is_quiet() {
        output.print_tasks(tasks);
    } else {
        println!("-- Tasks ({}) --", tasks.len());
        for task in tasks {
            println!("{}", format_task_line(task));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        assert_eq!(
            ShellCommand::parse("add Buy oat milk").unwrap(),
            Some(ShellCommand::Add("Buy oat milk".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("  a   spaced  ").unwrap(),
            Some(ShellCommand::Add("spaced".to_string()))
        );
    }

    #[test]
    fn test_parse_rename() {
        assert_eq!(
            ShellCommand::parse("rename 0123 New title").unwrap(),
            Some(ShellCommand::Rename {
                id: "0123".to_string(),
                title: "New title".to_string()
            })
        );
        assert!(ShellCommand::parse("rename 0123").is_err());
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(
            ShellCommand::parse("toggle ab12").unwrap(),
            Some(ShellCommand::Toggle("ab12".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("rm ab12").unwrap(),
            Some(ShellCommand::Delete("ab12".to_string()))
        );
    }

    #[test]
    fn test_parse_missing_argument() {
        assert!(ShellCommand::parse("add").is_err());
        assert!(ShellCommand::parse("toggle").is_err());
        assert!(ShellCommand::parse("delete   ").is_err());
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            ShellCommand::parse("sync").unwrap(),
            Some(ShellCommand::ToggleSync)
        );
        assert_eq!(ShellCommand::parse("exit").unwrap(), Some(ShellCommand::Quit));
        assert_eq!(ShellCommand::parse("?").unwrap(), Some(ShellCommand::Help));
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(ShellCommand::parse("   ").unwrap(), None);
        assert!(ShellCommand::parse("frobnicate").is_err());
    }
}

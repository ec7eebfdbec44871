//! Row editing in an external editor, and yes/no prompts

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use jobtrack_core::Row;

const FALLBACK_EDITOR: &str = "vi";

/// Parse a JSON object into a row
pub fn parse_row(text: &str) -> Result<Row> {
    match serde_json::from_str(text).context("Row is not valid JSON")? {
        Value::Object(row) => Ok(row),
        other => bail!("Expected a JSON object, got: {}", other),
    }
}

/// Let the user rewrite `row` as pretty-printed JSON
///
/// Text that does not parse as an object reopens the editor with the
/// rejected text, as long as the user agrees to retry.
pub fn edit_row(row: &Row) -> Result<Row> {
    let editor = editor_command(std::env::var("VISUAL").ok(), std::env::var("EDITOR").ok());
    let mut text = serde_json::to_string_pretty(row).context("Failed to encode row")?;

    loop {
        text = run_editor(&editor, &text)?;
        match parse_row(&text) {
            Ok(edited) => return Ok(edited),
            Err(e) => {
                eprintln!("✗ {:#}", e);
                if !confirm("Edit again?")? {
                    return Err(e.context("Edit abandoned"));
                }
            }
        }
    }
}

/// $VISUAL wins over $EDITOR; blank values are ignored
fn editor_command(visual: Option<String>, editor: Option<String>) -> String {
    [visual, editor]
        .into_iter()
        .flatten()
        .map(|command| command.trim().to_string())
        .find(|command| !command.is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string())
}

/// Write `text` to a scratch file, run the editor on it, and read it back
fn run_editor(editor: &str, text: &str) -> Result<String> {
    let mut scratch = tempfile::Builder::new()
        .prefix("jobtrack-")
        .suffix(".json")
        .tempfile()
        .context("Failed to create scratch file")?;
    scratch
        .write_all(text.as_bytes())
        .and_then(|()| scratch.flush())
        .context("Failed to write scratch file")?;

    // Commands such as "code --wait" carry their own arguments
    let mut words = editor.split_whitespace();
    let Some(program) = words.next() else {
        bail!("Editor command is empty");
    };
    let status = Command::new(program)
        .args(words)
        .arg(scratch.path())
        .status()
        .with_context(|| format!("Failed to start editor '{}'", editor))?;
    if !status.success() {
        bail!("Editor '{}' failed ({}); row left unchanged", editor, status);
    }

    fs::read_to_string(scratch.path()).context("Failed to read back edited row")
}

/// Ask a yes/no question on the terminal
///
/// Without a terminal on stdin the answer is no.
pub fn confirm(question: &str) -> Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

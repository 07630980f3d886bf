// UI layer: the blocking prompts and notifications used by the import flow.
// `Prompter` is the seam; `TerminalPrompter` implements it with `dialoguer`
// for text input, `rfd` for the file picker and `crossterm` for colors.

use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::{Input, Password};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Ordered input requests and notifications. `None` from any `ask_*` or
/// `pick_*` method means the user gave nothing (empty input or cancelled).
pub trait Prompter {
    fn ask_text(&mut self, prompt: &str, initial: Option<&str>) -> Result<Option<String>>;
    fn ask_password(&mut self, prompt: &str) -> Result<Option<String>>;
    fn ask_integer(&mut self, prompt: &str) -> Result<Option<i64>>;
    fn pick_csv_file(&mut self, title: &str) -> Result<Option<PathBuf>>;
    fn notify(&mut self, level: Level, title: &str, message: &str);
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Interactive prompts in the terminal, native dialog for the file picker.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask_text(&mut self, prompt: &str, initial: Option<&str>) -> Result<Option<String>> {
        let mut input = Input::<String>::new();
        input.with_prompt(prompt).allow_empty(true);
        if let Some(initial) = initial {
            input.with_initial_text(initial);
        }
        Ok(non_empty(input.interact_text()?))
    }

    fn ask_password(&mut self, prompt: &str) -> Result<Option<String>> {
        // `Password` hides input in terminal for passwords.
        let password = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(if password.is_empty() { None } else { Some(password) })
    }

    fn ask_integer(&mut self, prompt: &str) -> Result<Option<i64>> {
        // Re-ask until the input is an integer; empty input cancels.
        let answer: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .validate_with(|input: &String| -> Result<(), &str> {
                let input = input.trim();
                if input.is_empty() || input.parse::<i64>().is_ok() {
                    Ok(())
                } else {
                    Err("please enter an integer")
                }
            })
            .interact_text()?;
        Ok(answer.trim().parse::<i64>().ok())
    }

    fn pick_csv_file(&mut self, title: &str) -> Result<Option<PathBuf>> {
        let mut dialog = rfd::FileDialog::new()
            .set_title(title)
            .add_filter("CSV Files", &["csv"]);
        if let Some(home) = dirs::home_dir() {
            dialog = dialog.set_directory(home);
        }
        Ok(dialog.pick_file())
    }

    fn notify(&mut self, level: Level, title: &str, message: &str) {
        let heading = match level {
            Level::Info => format!("[{title}]").green().bold(),
            Level::Warning => format!("[{title}]").yellow().bold(),
            Level::Error => format!("[{title}]").red().bold(),
        };
        println!("\n{heading}\n{message}\n");
    }
}

use std::collections::VecDeque;
use std::io::{self, BufRead};

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};

use super::CliError;

/// What the user wants after filling a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Next,
    Back,
    Cancel,
}

/// Source of answers for the wizard runner. `None` keeps the current value.
pub trait Prompter {
    fn text(&mut self, label: &str, current: Option<&str>) -> Result<Option<String>, CliError>;
    fn choose(
        &mut self,
        label: &str,
        options: &[String],
        current: Option<&str>,
    ) -> Result<Option<String>, CliError>;
    fn confirm(&mut self, label: &str, default: bool) -> Result<bool, CliError>;
    fn navigation(&mut self, can_go_back: bool, is_last: bool) -> Result<NavAction, CliError>;
}

pub struct InteractivePrompter {
    theme: ColorfulTheme,
}

impl InteractivePrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for InteractivePrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for InteractivePrompter {
    fn text(&mut self, label: &str, current: Option<&str>) -> Result<Option<String>, CliError> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(label)
            .allow_empty(true);
        if let Some(current) = current.filter(|current| !current.is_empty()) {
            input = input.default(current.to_string());
        }
        let answer = input.interact_text()?;
        Ok(Some(answer).filter(|answer| !answer.trim().is_empty()))
    }

    fn choose(
        &mut self,
        label: &str,
        options: &[String],
        current: Option<&str>,
    ) -> Result<Option<String>, CliError> {
        let default = current
            .and_then(|current| options.iter().position(|option| option == current))
            .unwrap_or(0);
        let index = Select::with_theme(&self.theme)
            .with_prompt(label)
            .items(options)
            .default(default)
            .interact()?;
        Ok(options.get(index).cloned())
    }

    fn confirm(&mut self, label: &str, default: bool) -> Result<bool, CliError> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(label)
            .default(default)
            .interact()?)
    }

    fn navigation(&mut self, can_go_back: bool, is_last: bool) -> Result<NavAction, CliError> {
        let mut actions = vec![(if is_last { "Submit" } else { "Next" }, NavAction::Next)];
        if can_go_back {
            actions.push(("Back", NavAction::Back));
        }
        actions.push(("Cancel", NavAction::Cancel));
        let labels: Vec<&str> = actions.iter().map(|(label, _)| *label).collect();
        let index = Select::with_theme(&self.theme)
            .items(&labels)
            .default(0)
            .interact()?;
        Ok(actions
            .get(index)
            .map(|(_, action)| *action)
            .unwrap_or(NavAction::Cancel))
    }
}

/// Reads one answer per line, for piping answers into the binary.
pub struct ScriptPrompter {
    lines: VecDeque<String>,
}

impl ScriptPrompter {
    pub fn new<I: IntoIterator<Item = String>>(lines: I) -> Self {
        Self {
            lines: lines.into_iter().collect(),
        }
    }

    pub fn from_stdin() -> Result<Self, CliError> {
        let lines = io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(lines))
    }

    fn next_line(&mut self) -> Result<String, CliError> {
        self.lines
            .pop_front()
            .map(|line| line.trim().to_string())
            .ok_or(CliError::Aborted)
    }
}

impl Prompter for ScriptPrompter {
    fn text(&mut self, _label: &str, _current: Option<&str>) -> Result<Option<String>, CliError> {
        let line = self.next_line()?;
        Ok(Some(line).filter(|line| !line.is_empty()))
    }

    fn choose(
        &mut self,
        label: &str,
        options: &[String],
        _current: Option<&str>,
    ) -> Result<Option<String>, CliError> {
        let line = self.next_line()?;
        if line.is_empty() {
            return Ok(None);
        }
        options
            .iter()
            .find(|option| option.eq_ignore_ascii_case(&line))
            .cloned()
            .map(Some)
            .ok_or_else(|| CliError::Usage(format!("`{line}` is not an option for {label}")))
    }

    fn confirm(&mut self, _label: &str, default: bool) -> Result<bool, CliError> {
        let line = self.next_line()?.to_lowercase();
        Ok(match line.as_str() {
            "" => default,
            "y" | "yes" | "s" | "sim" | "true" => true,
            _ => false,
        })
    }

    fn navigation(&mut self, can_go_back: bool, _is_last: bool) -> Result<NavAction, CliError> {
        let line = self.next_line()?.to_lowercase();
        Ok(match line.as_str() {
            "back" | "b" if can_go_back => NavAction::Back,
            "cancel" | "quit" | "q" => NavAction::Cancel,
            _ => NavAction::Next,
        })
    }
}

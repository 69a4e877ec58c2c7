//! Operator prompts.
//!
//! Provisioning and the menus never read the terminal directly; they go
//! through [`OperatorPrompt`] so the state machine can be driven by a
//! scripted source in tests.

use dialoguer::{Input, Password};

use crate::error::SetupError;

/// Source of operator answers.
pub trait OperatorPrompt {
    /// Ask a free-form question. An empty answer yields `default` when given.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String, SetupError>;

    /// Ask for a secret without echoing it.
    fn ask_secret(&mut self, question: &str) -> Result<String, SetupError>;

    /// Block until the operator confirms they have done something by hand.
    fn acknowledge(&mut self, message: &str) -> Result<(), SetupError>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

fn prompt_error(e: &dialoguer::Error) -> SetupError {
    SetupError::Prompt(e.to_string())
}

impl OperatorPrompt for TerminalPrompt {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String, SetupError> {
        let mut input = Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true);
        if let Some(d) = default {
            input = input.default(d.to_string());
        }
        let answer = input.interact_text().map_err(|e| prompt_error(&e))?;
        Ok(answer.trim().to_string())
    }

    fn ask_secret(&mut self, question: &str) -> Result<String, SetupError> {
        Password::new()
            .with_prompt(question)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| prompt_error(&e))
    }

    fn acknowledge(&mut self, message: &str) -> Result<(), SetupError> {
        Input::<String>::new()
            .with_prompt(message)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| prompt_error(&e))?;
        Ok(())
    }
}

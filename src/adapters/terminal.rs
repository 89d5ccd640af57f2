use std::io::{IsTerminal, Write, stderr, stdin};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::core::activation::Prompter;

/// Prompts on the controlling terminal. Messages go to stderr so stdout keeps
/// only command results.
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    fn show(&self, message: &str) {
        eprintln!("{message}");
    }

    async fn acknowledge(&self, prompt: &str) -> Result<bool> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            eprint!("{prompt} ");
            stderr().flush()?;

            let mut input = String::new();
            let read = stdin().read_line(&mut input)?;
            // EOF: the operator closed the input stream.
            Ok::<bool, anyhow::Error>(read > 0)
        })
        .await
        .context("Prompt task failed")?
    }
}

/// Whether a human can answer prompts.
pub fn is_interactive() -> bool {
    stdin().is_terminal()
}

//! Operator confirmation
//!
//! Terminal reads block, so prompts run on the blocking pool and the caller
//! can still race them against shutdown signals.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Asks the operator a yes/no question
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompts on stdout and reads the answer from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> Result<bool> {
        ask(question, || (io::stdin().lock(), io::stdout())).await
    }
}

/// Answers yes without asking, for `--yes`
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Write `question` and read one answer line, off the async executor
async fn ask<F, R, W>(question: &str, open: F) -> Result<bool>
where
    F: FnOnce() -> (R, W) + Send + 'static,
    R: BufRead + 'static,
    W: Write + 'static,
{
    let question = question.to_string();

    tokio::task::spawn_blocking(move || -> Result<bool> {
        let (mut input, mut output) = open();
        write!(output, "{} [y/N]: ", question)?;
        output.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(is_yes(&answer))
    })
    .await
    .map_err(|e| Error::transport(format!("Confirmation prompt failed: {}", e)))?
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

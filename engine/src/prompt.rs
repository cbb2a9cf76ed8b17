//! Operator input seam.
//!
//! The supervisor blocks on operator input when a run's configuration is
//! incomplete — confirmation to enter assisted mode, the remote computer's
//! name, a username, a password. The `InputProvider` trait keeps that
//! sequencing logic independent of a live terminal: the CLI implements it
//! over stdin and a no-echo password reader, tests script it.

use std::collections::VecDeque;
use std::io;

/// Synchronous operator prompts. Every call blocks until answered; there is
/// no timeout.
pub trait InputProvider {
    /// Ask a yes/no question.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;

    /// Ask for one line of input.
    fn line(&mut self, prompt: &str) -> io::Result<String>;

    /// Ask for a secret (echo suppressed where the provider can).
    fn secret(&mut self, prompt: &str) -> io::Result<String>;
}

/// Pre-supplied answers, consumed in order. Used for scripted runs and for
/// exercising the supervisor without a terminal.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInput {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    fn next(&mut self, prompt: &str) -> io::Result<String> {
        self.answers.pop_front().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no scripted answer left for prompt {:?}", prompt),
            )
        })
    }
}

impl InputProvider for ScriptedInput {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        let answer = self.next(prompt)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    fn line(&mut self, prompt: &str) -> io::Result<String> {
        self.next(prompt)
    }

    fn secret(&mut self, prompt: &str) -> io::Result<String> {
        self.next(prompt)
    }
}

//! Column prompting capability.
//!
//! When neither configuration nor naming convention identifies a lookup
//! column, the resolver asks a [`ColumnResolver`]. Answers are validated by
//! the caller, so implementations may return anything.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, BufRead, Write},
};

pub trait ColumnResolver {
    fn ask(&self, prompt: &str, candidates: &[String]) -> Option<String>;
}

/// Never answers; unresolved columns stay unresolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl ColumnResolver for NoPrompt {
    fn ask(&self, _prompt: &str, _candidates: &[String]) -> Option<String> {
        None
    }
}

/// Replays queued answers in order and records every prompt it receives.
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    answers: RefCell<VecDeque<Option<String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(|a| a.map(Into::into)).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ColumnResolver for ScriptedResolver {
    fn ask(&self, prompt: &str, _candidates: &[String]) -> Option<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.answers.borrow_mut().pop_front().flatten()
    }
}

/// Asks a human on stderr and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinResolver;

impl ColumnResolver for StdinResolver {
    fn ask(&self, prompt: &str, candidates: &[String]) -> Option<String> {
        let stdin = io::stdin();
        ask_with(prompt, candidates, &mut stdin.lock(), &mut io::stderr())
    }
}

fn ask_with<R, W>(prompt: &str, candidates: &[String], input: &mut R, output: &mut W) -> Option<String>
where
    R: BufRead,
    W: Write,
{
    let _ = writeln!(output, "{prompt}");
    let _ = writeln!(output, "Available columns: {}", candidates.join(", "));
    let _ = write!(output, "Column name: ");
    let _ = output.flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let answer = line.trim();
            (!answer.is_empty()).then(|| answer.to_string())
        }
    }
}

//! User decisions.
//!
//! Provisioning asks yes/no questions, offers menus and reads secrets only
//! through [`DecisionSource`]. The binary supplies a terminal implementation;
//! [`ScriptedDecisions`] replays fixed answers.

use std::collections::VecDeque;

use crate::error::{Result, SetupError};

/// Severity of a user-facing progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Headline of a setup step.
    Step,
    Info,
    Success,
    Warning,
    Error,
}

/// Answers the questions setup needs to ask.
pub trait DecisionSource: Send {
    /// Yes/no question.
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Pick one of `options`; returns its index.
    fn choose(&mut self, prompt: &str, options: &[String], default: usize) -> Result<usize>;

    /// Free-text answer. `secret` answers are not echoed.
    fn input(&mut self, prompt: &str, secret: bool) -> Result<String>;

    /// Show a progress line.
    fn notify(&mut self, _level: NoticeLevel, _message: &str) {}
}

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Confirm(bool),
    Choose(usize),
    Input(String),
    /// Accept whatever default the question offers.
    Default,
}

/// Replays answers in order; when the script runs out, defaults are used.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    answers: VecDeque<Answer>,
    /// Prompts asked, in order.
    pub prompts: Vec<String>,
    /// Notices received, in order.
    pub notices: Vec<(NoticeLevel, String)>,
}

impl ScriptedDecisions {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Answers not consumed yet.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    /// Whether any notice at `level` contains `needle`.
    pub fn noticed(&self, level: NoticeLevel, needle: &str) -> bool {
        self.notices
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    fn next(&mut self, prompt: &str) -> Answer {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front().unwrap_or(Answer::Default)
    }
}

impl DecisionSource for ScriptedDecisions {
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        match self.next(prompt) {
            Answer::Confirm(v) => Ok(v),
            Answer::Default => Ok(default),
            other => Err(SetupError::precondition(format!(
                "scripted answer {:?} does not fit confirm prompt '{}'",
                other, prompt
            ))),
        }
    }

    fn choose(&mut self, prompt: &str, options: &[String], default: usize) -> Result<usize> {
        match self.next(prompt) {
            Answer::Choose(i) if i < options.len() => Ok(i),
            Answer::Default => Ok(default),
            other => Err(SetupError::precondition(format!(
                "scripted answer {:?} does not fit choice prompt '{}'",
                other, prompt
            ))),
        }
    }

    fn input(&mut self, prompt: &str, _secret: bool) -> Result<String> {
        match self.next(prompt) {
            Answer::Input(s) => Ok(s),
            Answer::Default => Ok(String::new()),
            other => Err(SetupError::precondition(format!(
                "scripted answer {:?} does not fit input prompt '{}'",
                other, prompt
            ))),
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.notices.push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_in_order() {
        let mut d = ScriptedDecisions::new([
            Answer::Confirm(false),
            Answer::Choose(1),
            Answer::Input("pa-key".into()),
        ]);
        let opts = vec!["a".to_string(), "b".to_string()];
        assert!(!d.confirm("install?", true).unwrap());
        assert_eq!(d.choose("which?", &opts, 0).unwrap(), 1);
        assert_eq!(d.input("key?", true).unwrap(), "pa-key");
        assert_eq!(d.prompts, vec!["install?", "which?", "key?"]);
        assert_eq!(d.remaining(), 0);
    }

    #[test]
    fn test_exhausted_script_uses_defaults() {
        let mut d = ScriptedDecisions::default();
        assert!(d.confirm("x", true).unwrap());
        assert!(!d.confirm("y", false).unwrap());
        assert_eq!(d.choose("z", &["a".into(), "b".into()], 1).unwrap(), 1);
        assert_eq!(d.input("k", false).unwrap(), "");
    }

    #[test]
    fn test_mismatched_answer_errors() {
        let mut d = ScriptedDecisions::new([Answer::Input("oops".into())]);
        assert!(d.confirm("x", true).is_err());

        let mut d = ScriptedDecisions::new([Answer::Choose(5)]);
        assert!(d.choose("x", &["a".into()], 0).is_err());
    }

    #[test]
    fn test_notices_recorded() {
        let mut d = ScriptedDecisions::default();
        d.notify(NoticeLevel::Warning, "dataset looks odd");
        assert!(d.noticed(NoticeLevel::Warning, "odd"));
        assert!(!d.noticed(NoticeLevel::Error, "odd"));
    }
}

//! Terminal implementation of [`DecisionSource`].

use console::{Style, Term, style};
use hytale_rag_setup::{DecisionSource, NoticeLevel, SetupError};

type Result<T> = std::result::Result<T, SetupError>;

/// Asks on stderr and reads answers from the terminal.
///
/// With `assume_yes` every question takes its default; free-text questions
/// then fail because there is nothing to default to.
pub struct TerminalDecisions {
    term: Term,
    assume_yes: bool,
}

impl TerminalDecisions {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            term: Term::stderr(),
            assume_yes,
        }
    }

    fn ask(&self, question: &str) -> Result<String> {
        self.term
            .write_str(question)
            .and_then(|_| self.term.read_line())
            .map_err(SetupError::Prompt)
    }

    fn say(&self, line: &str) {
        if let Err(e) = self.term.write_line(line) {
            tracing::debug!(error = %e, "could not write to terminal");
        }
    }
}

impl DecisionSource for TerminalDecisions {
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        if self.assume_yes {
            let answer = if default { "yes" } else { "no" };
            self.say(&format!("{} {} {}", prompt, hint, style(answer).dim()));
            return Ok(default);
        }

        loop {
            let answer = self.ask(&format!("{} {} ", prompt, hint))?;
            match parse_confirm(&answer, default) {
                Some(value) => return Ok(value),
                None => self.say("Please answer y or n."),
            }
        }
    }

    fn choose(&mut self, prompt: &str, options: &[String], default: usize) -> Result<usize> {
        self.say(prompt);
        for (i, option) in options.iter().enumerate() {
            let marker = if i == default { "*" } else { " " };
            self.say(&format!("  {} {}. {}", marker, style(i + 1).cyan(), option));
        }
        if self.assume_yes {
            return Ok(default);
        }

        loop {
            let answer = self.ask(&format!("Select [1-{}] (default {}): ", options.len(), default + 1))?;
            match parse_choice(&answer, options.len(), default) {
                Some(idx) => return Ok(idx),
                None => self.say(&format!("Enter a number from 1 to {}.", options.len())),
            }
        }
    }

    fn input(&mut self, prompt: &str, secret: bool) -> Result<String> {
        if self.assume_yes {
            return Err(SetupError::precondition(format!(
                "'{}' has no default and cannot be answered with --yes. Re-run interactively",
                prompt
            )));
        }
        if secret && self.term.is_term() {
            return rpassword::prompt_password(format!("{} (input hidden): ", prompt))
                .map_err(SetupError::Prompt);
        }
        self.ask(&format!("{}: ", prompt))
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        let line = match level {
            NoticeLevel::Step => {
                format!("\n{} {}", style("==>").cyan().bold(), style(message).bold())
            }
            NoticeLevel::Info => format!("    {}", message),
            NoticeLevel::Success => format!("  {} {}", style("✓").green(), message),
            NoticeLevel::Warning => {
                let yellow = Style::new().yellow();
                format!("  {} {}", yellow.apply_to("!"), yellow.apply_to(message))
            }
            NoticeLevel::Error => format!("  {} {}", style("✗").red(), style(message).red()),
        };
        self.say(&line);
    }
}

fn parse_confirm(answer: &str, default: bool) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn parse_choice(answer: &str, len: usize, default: usize) -> Option<usize> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Some(default);
    }
    match answer.parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

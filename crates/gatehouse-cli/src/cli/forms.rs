//! Input collection and form checks for the account commands.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use gatehouse_types::AccountUpdate;
use regex::Regex;

const MIN_NAME_LEN: usize = 2;
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(email))
}

/// Field problems, reported together.
#[derive(Debug, Default)]
struct FormErrors(Vec<&'static str>);

impl FormErrors {
    fn check(&mut self, failed: bool, message: &'static str) {
        if failed {
            self.0.push(message);
        }
    }

    fn email(&mut self, email: &str) {
        if email.trim().is_empty() {
            self.0.push("Email is required");
        } else {
            self.check(!is_valid_email(email.trim()), "Please enter a valid email");
        }
    }

    fn password(&mut self, password: &str) {
        if password.is_empty() {
            self.0.push("Password is required");
        } else {
            self.check(
                password.chars().count() < MIN_PASSWORD_LEN,
                "Password must be at least 6 characters",
            );
        }
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            bail!("{}", self.0.join("\n"))
        }
    }
}

pub fn validate_signup(name: &str, email: &str, password: &str, confirmation: &str) -> Result<()> {
    let mut errors = FormErrors::default();

    let name = name.trim();
    if name.is_empty() {
        errors.0.push("Name is required");
    } else {
        errors.check(
            name.chars().count() < MIN_NAME_LEN,
            "Name must be at least 2 characters",
        );
    }
    errors.email(email);
    errors.password(password);
    if confirmation.is_empty() {
        errors.0.push("Please confirm your password");
    } else {
        errors.check(password != confirmation, "Passwords do not match");
    }

    errors.finish()
}

pub fn validate_login(email: &str, password: &str) -> Result<()> {
    let mut errors = FormErrors::default();
    errors.email(email);
    errors.check(password.is_empty(), "Password is required");
    errors.finish()
}

pub fn validate_email(email: &str) -> Result<()> {
    let mut errors = FormErrors::default();
    errors.email(email);
    errors.finish()
}

pub fn validate_new_password(password: &str) -> Result<()> {
    let mut errors = FormErrors::default();
    errors.password(password);
    errors.finish()
}

/// Builds an account update from the given flags.
pub fn account_update(
    name: Option<String>,
    avatar_url: Option<String>,
    email: Option<String>,
) -> Result<AccountUpdate> {
    let update = AccountUpdate {
        name: name.map(|n| n.trim().to_string()),
        avatar_url,
        email: email.map(|e| e.trim().to_string()),
    };
    if update.is_empty() {
        bail!("Nothing to update: pass --name, --avatar-url or --email");
    }

    let mut errors = FormErrors::default();
    if let Some(name) = &update.name {
        errors.check(
            name.chars().count() < MIN_NAME_LEN,
            "Name must be at least 2 characters",
        );
    }
    if let Some(email) = &update.email {
        errors.email(email);
    }
    errors.finish()?;
    Ok(update)
}

/// Returns `given`, or reads one line from stdin.
pub fn read_password(given: Option<String>, prompt: &str) -> Result<String> {
    match given {
        Some(password) => Ok(password),
        None => read_line(&mut std::io::stdin().lock(), prompt),
    }
}

/// Returns the password and its confirmation.
///
/// A password given on the command line confirms itself; otherwise both are
/// read from stdin, one per line.
pub fn read_new_password(given: Option<String>) -> Result<(String, String)> {
    if let Some(password) = given {
        return Ok((password.clone(), password));
    }
    let mut stdin = std::io::stdin().lock();
    let password = read_line(&mut stdin, "Password: ")?;
    let confirmation = read_line(&mut stdin, "Confirm password: ")?;
    Ok((password, confirmation))
}

fn read_line(input: &mut impl BufRead, prompt: &str) -> Result<String> {
    if std::io::stdin().is_terminal() {
        eprint!("{prompt}");
        std::io::stderr().flush().ok();
    }
    let mut line = String::new();
    input.read_line(&mut line).context("read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

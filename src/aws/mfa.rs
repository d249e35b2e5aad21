use std::{
    env,
    io::{self, IsTerminal},
    process::{Command, Stdio},
};

use dialoguer::{Password, theme::ColorfulTheme};
use tracing::warn;

use crate::{constants::NESTED_PROMPT_ENV, error::AuthError};

/// Source of one-time MFA codes
pub trait MfaPrompt: Send + Sync {
    fn prompt(&self, profile: &str) -> Result<String, AuthError>;
}

/// Reads the MFA code from the terminal without echoing it
///
/// Writes to stderr, so it is safe to use while stdout carries proxied bytes.
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt;

impl MfaPrompt for TerminalPrompt {
    fn prompt(&self, profile: &str) -> Result<String, AuthError> {
        // A nested launch already asked; asking again would hang its caller.
        if env::var_os(NESTED_PROMPT_ENV).is_some() {
            return Err(AuthError::PromptUnavailable(format!(
                "{NESTED_PROMPT_ENV} is set; refresh credentials for '{profile}' from a terminal first"
            )));
        }

        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Enter MFA Code for {profile}"))
            .interact()
            .map(|code| code.trim().to_string())
            .map_err(|e| AuthError::Prompt(e.to_string()))
    }
}

/// Interactive recovery run once the MFA retry budget is exhausted
pub trait Relogin: Send + Sync {
    fn relogin(&self, profile: &str);
}

/// Runs `aws configure` for the profile so the operator can fix its keys
///
/// The command talks to the controlling terminal, never to piped stdio: in
/// proxy mode stdin and stdout carry SSH traffic.
#[derive(Debug, Clone, Default)]
pub struct AwsConfigureRelogin;

impl Relogin for AwsConfigureRelogin {
    fn relogin(&self, profile: &str) {
        let Some((stdin, stdout)) = terminal_stdio() else {
            warn!("No terminal to run `aws configure` on; fix profile '{profile}' by hand");
            return;
        };

        eprintln!(
            "\n------\nPlease, fix your AWS credentials and come back again. Profile name \"{profile}\"\n"
        );

        let program = if cfg!(windows) { "aws.exe" } else { "aws" };
        match Command::new(program)
            .arg("configure")
            .arg(format!("--profile={profile}"))
            .stdin(stdin)
            .stdout(stdout)
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("`{program} configure` exited with {status}"),
            Err(e) => warn!("Failed to run `{program} configure`: {e}"),
        }
    }
}

/// Stdio attached to the operator's terminal, if there is one
fn terminal_stdio() -> Option<(Stdio, Stdio)> {
    if io::stdin().is_terminal() && io::stdout().is_terminal() {
        return Some((Stdio::inherit(), Stdio::inherit()));
    }

    #[cfg(unix)]
    {
        let tty = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .ok()?;
        let output = tty.try_clone().ok()?;
        Some((Stdio::from(tty), Stdio::from(output)))
    }

    #[cfg(not(unix))]
    {
        None
    }
}

/// MFA device ARN of an IAM user: the first `user` in the ARN becomes `mfa`
///
/// `arn:aws:iam::123456789012:user/alice` → `arn:aws:iam::123456789012:mfa/alice`
pub fn mfa_serial_from_arn(caller_arn: &str) -> String {
    caller_arn.replacen("user", "mfa", 1)
}

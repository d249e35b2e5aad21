use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use crate::{commands::credential_cache, session::Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `export KEY=value` lines for `eval`
    Exports,
    /// The cached credential document
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct CredentialsCommand {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value_t = OutputFormat::Exports,
        help = "Output format"
    )]
    pub format: OutputFormat,
}

impl CredentialsCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        info!("Fetching credentials for profile: {}", profile);

        let cache = credential_cache()?;
        let credential = cache
            .get(profile)
            .await
            .with_context(|| format!("Failed to get credentials for profile '{profile}'"))?;

        print!("{}", self.render(&Session::new(profile, credential))?);
        Ok(())
    }

    pub fn render(&self, session: &Session) -> Result<String> {
        match self.format {
            OutputFormat::Exports => Ok(session
                .env()
                .into_iter()
                .map(|(key, value)| format!("export {key}={value}\n"))
                .collect()),
            OutputFormat::Json => {
                let mut json = serde_json::to_string_pretty(&session.credential)
                    .context("Failed to serialize credentials")?;
                json.push('\n');
                Ok(json)
            }
        }
    }
}

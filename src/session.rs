use crate::{aws::Credential, constants::DEFAULT_AWS_REGION};

/// An authenticated AWS context, passed explicitly to whatever needs it
#[derive(Debug, Clone)]
pub struct Session {
    pub profile: String,
    pub credential: Credential,
}

impl Session {
    pub fn new(profile: impl Into<String>, credential: Credential) -> Self {
        Self {
            profile: profile.into(),
            credential,
        }
    }

    pub fn region(&self) -> &str {
        self.credential
            .region
            .as_deref()
            .unwrap_or(DEFAULT_AWS_REGION)
    }

    /// Variables injected into child processes (AWS CLI and plugins)
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            (
                "AWS_ACCESS_KEY_ID".to_string(),
                self.credential.access_key_id.clone(),
            ),
            (
                "AWS_SECRET_ACCESS_KEY".to_string(),
                self.credential.secret_access_key.clone(),
            ),
            (
                "AWS_SESSION_TOKEN".to_string(),
                self.credential.session_token.clone(),
            ),
            ("AWS_DEFAULT_REGION".to_string(), self.region().to_string()),
        ]
    }
}

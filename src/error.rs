use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the credential cache
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to determine credential cache directory")]
    NoDataDir,

    #[error("Credential cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential cache file {path} is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures resolving profiles from the AWS shared config
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read AWS config file {path}: {message}")]
    ConfigFile { path: PathBuf, message: String },

    #[error("Profile '{0}' not found in AWS config")]
    NotFound(String),

    #[error("Profile '{profile}' has role_arn but no source_profile")]
    MissingSourceProfile { profile: String },

    #[error("Profile chain cycles back to '{profile}': {}", .chain.join(" -> "))]
    Cycle { profile: String, chain: Vec<String> },
}

/// Errors reported by the identity provider (STS)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Wrong MFA code, expired token or malformed request parameters
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Identity provider error: {0}")]
    Service(String),
}

/// Failures obtaining credentials for a profile
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Failed to read MFA code: {0}")]
    Prompt(String),

    #[error("MFA prompt unavailable: {0}")]
    PromptUnavailable(String),

    #[error(
        "Giving up on profile '{profile}' after {attempts} failed attempts. Fix the credentials with `aws configure --profile={profile}` and try again"
    )]
    Exhausted { profile: String, attempts: u32 },
}

impl AuthError {
    /// Whether the error is worth another MFA attempt
    pub fn is_rejected(&self) -> bool {
        matches!(self, AuthError::Identity(IdentityError::Rejected(_)))
    }
}

/// Failures of the tunnel subsystem
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("No free local port in range {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("Failed to spawn tunnel command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tunnel on port {port} not ready after {waited_secs}s")]
    Timeout { port: u16, waited_secs: u64 },

    #[error("Tunnel process exited with {}", describe_exit(.code))]
    Exited { code: Option<i32> },

    #[error("SSH client exited with {}", describe_exit(.code))]
    ClientExited { code: Option<i32> },

    #[error("Failed to supervise tunnel process {pid}: {source}")]
    Process {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop tunnel process {pid}: {message}")]
    Stop { pid: u32, message: String },

    #[error("Proxy I/O error: {0}")]
    ProxyIo(#[from] std::io::Error),

    #[error("Invalid tunnel target: {0}")]
    InvalidTarget(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
pub type TunnelResult<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_is_retryable() {
        let err = AuthError::from(IdentityError::Rejected("bad code".to_string()));
        assert!(err.is_rejected());

        let err = AuthError::from(IdentityError::Service("throttled".to_string()));
        assert!(!err.is_rejected());
    }

    #[test]
    fn test_exhausted_message_names_fix_command() {
        let err = AuthError::Exhausted {
            profile: "dev".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("aws configure --profile=dev"));
    }

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = ProfileError::Cycle {
            profile: "a".to_string(),
            chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Profile chain cycles back to 'a': a -> b -> a");
    }

    #[test]
    fn test_process_errors_are_not_reported_as_proxy_errors() {
        let err = TunnelError::Process {
            pid: 42,
            source: std::io::Error::other("wait failed"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to supervise tunnel process 42: wait failed"
        );

        let err = TunnelError::from(std::io::Error::other("broken pipe"));
        assert!(matches!(err, TunnelError::ProxyIo(_)));
    }

    #[test]
    fn test_exited_message() {
        assert_eq!(
            TunnelError::Exited { code: Some(2) }.to_string(),
            "Tunnel process exited with code 2"
        );
        assert_eq!(
            TunnelError::Exited { code: None }.to_string(),
            "Tunnel process exited with a signal"
        );
    }
}

use std::{env, path::PathBuf, time::Duration};

use dirs;

/// Directory name under the user data directory holding cached credentials
pub const DATA_DIR_NAME: &str = "clvm";

/// Environment variable overriding the credential cache directory
pub const DATA_DIR_ENV: &str = "CLVM_DATA_DIR";

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// AWS shared credentials file name
pub const AWS_CREDENTIALS_FILE_NAME: &str = "credentials";

/// Profile used when none is given
pub const DEFAULT_PROFILE: &str = "default";

/// Default AWS region for STS operations when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// First port scanned when allocating a local tunnel endpoint
pub const DEFAULT_PORT_RANGE_START: u16 = 44500;

/// Last port (inclusive) scanned when allocating a local tunnel endpoint
pub const DEFAULT_PORT_RANGE_END: u16 = 45500;

/// How long a freshly spawned tunnel may take to accept connections
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between readiness checks of the local tunnel port
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Time a tunnel process group gets between SIGTERM and SIGKILL
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// MFA prompts attempted before falling back to re-login
pub const DEFAULT_MFA_MAX_TRIES: u32 = 3;

/// First backoff delay after a rejected MFA attempt (doubles per attempt)
pub const DEFAULT_MFA_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Set by an outer launcher that already prompted for the MFA code
pub const NESTED_PROMPT_ENV: &str = "VSCODE_AWS_PROMPT";

/// SSH sessions attempted while a fresh tunnel is still settling
pub const SSH_CONNECT_ATTEMPTS: u32 = 10;

/// Pause between SSH connection attempts
pub const SSH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// `ConnectTimeout` handed to ssh, in seconds
pub const SSH_CONNECT_TIMEOUT_SECS: u32 = 5;

/// Transfer buffer size of the byte proxy
pub const PROXY_BUFFER_SIZE: usize = 4096;

/// Get the credential cache directory
/// Respects CLVM_DATA_DIR environment variable if set
pub fn get_data_dir() -> Option<PathBuf> {
    if let Ok(path) = env::var(DATA_DIR_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .map(|dir| dir.join(DATA_DIR_NAME))
}

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE environment variable if set
pub fn get_aws_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| {
        home.join(AWS_CONFIG_DIR_NAME)
            .join(AWS_CREDENTIALS_FILE_NAME)
    })
}

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::{
    Client as StsClient,
    config::Credentials as StaticCredentials,
    error::{DisplayErrorContext, SdkError},
    types::Credentials as StsCredentials,
};
use aws_smithy_types::DateTime;
use chrono::{DateTime as ChronoDateTime, Utc};
use tracing::{debug, info};

use super::{Credential, ProfileConfig};
use crate::{constants::DEFAULT_AWS_REGION, error::IdentityError};

/// The identity-provider calls the credential acquirer depends on
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// ARN of the IAM user behind the profile's long-lived keys
    async fn caller_arn(&self, profile: &ProfileConfig) -> Result<String, IdentityError>;

    /// Exchange the profile's long-lived keys and an MFA code for a session
    async fn get_session_token(
        &self,
        profile: &ProfileConfig,
        serial_number: &str,
        token_code: &str,
    ) -> Result<Credential, IdentityError>;

    /// Assume `role_arn` using already-obtained temporary credentials
    async fn assume_role(
        &self,
        source: &Credential,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credential, IdentityError>;
}

/// [`IdentityProvider`] backed by AWS STS
#[derive(Debug, Clone, Default)]
pub struct StsIdentityProvider;

impl StsIdentityProvider {
    pub fn new() -> Self {
        Self
    }

    /// Client for a root profile, signing with the profile's own keys
    async fn profile_client(&self, profile: &ProfileConfig) -> StsClient {
        let region = profile
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(&profile.name)
            .region(Region::new(region));

        if let (Some(key), Some(secret)) = (&profile.access_key_id, &profile.secret_access_key) {
            loader = loader.credentials_provider(StaticCredentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "clvm-profile",
            ));
        }

        StsClient::new(&loader.load().await)
    }

    /// Client signing with temporary credentials from a previous hop
    fn session_client(&self, source: &Credential) -> StsClient {
        let region = source
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

        let config = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(StaticCredentials::new(
                source.access_key_id.clone(),
                source.secret_access_key.clone(),
                Some(source.session_token.clone()),
                None,
                "clvm-session",
            ))
            .build();

        StsClient::from_conf(config)
    }
}

#[async_trait]
impl IdentityProvider for StsIdentityProvider {
    async fn caller_arn(&self, profile: &ProfileConfig) -> Result<String, IdentityError> {
        debug!("Calling AWS STS GetCallerIdentity for profile: {}", profile.name);

        let response = self
            .profile_client(profile)
            .await
            .get_caller_identity()
            .send()
            .await
            .map_err(classify)?;

        response
            .arn()
            .map(str::to_string)
            .ok_or_else(|| IdentityError::Service("AWS STS returned no caller ARN".to_string()))
    }

    async fn get_session_token(
        &self,
        profile: &ProfileConfig,
        serial_number: &str,
        token_code: &str,
    ) -> Result<Credential, IdentityError> {
        info!("Calling AWS STS GetSessionToken");
        debug!("Profile: {}", profile.name);
        debug!("MFA serial: {}", serial_number);

        let response = self
            .profile_client(profile)
            .await
            .get_session_token()
            .serial_number(serial_number)
            .token_code(token_code)
            .send()
            .await
            .map_err(classify)?;

        let credential = response
            .credentials()
            .map(|creds| to_credential(creds, profile.region.clone()))
            .ok_or_else(|| IdentityError::Service("AWS STS returned no credentials".to_string()))?;

        info!("Successfully obtained AWS session credentials");
        Ok(credential)
    }

    async fn assume_role(
        &self,
        source: &Credential,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credential, IdentityError> {
        info!("Calling AWS STS AssumeRole");
        debug!("Role ARN: {}", role_arn);
        debug!("Session name: {}", session_name);

        let response = self
            .session_client(source)
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(classify)?;

        let credential = response
            .credentials()
            .map(|creds| to_credential(creds, None))
            .ok_or_else(|| IdentityError::Service("AWS STS returned no credentials".to_string()))?;

        info!("Successfully assumed role {}", role_arn);
        Ok(credential)
    }
}

/// Service rejections and request-construction failures are worth a retry
fn classify<E, R>(err: SdkError<E, R>) -> IdentityError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) | SdkError::ConstructionFailure(_) => {
            IdentityError::Rejected(message)
        }
        _ => IdentityError::Service(message),
    }
}

fn to_credential(creds: &StsCredentials, region: Option<String>) -> Credential {
    Credential {
        access_key_id: creds.access_key_id().to_string(),
        secret_access_key: creds.secret_access_key().to_string(),
        session_token: creds.session_token().to_string(),
        expiration: to_chrono(creds.expiration()),
        region,
    }
}

fn to_chrono(expiration: &DateTime) -> ChronoDateTime<Utc> {
    ChronoDateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_to_chrono_preserves_instant() {
        let smithy = DateTime::from_secs(1_900_000_000);
        assert_eq!(
            to_chrono(&smithy),
            Utc.timestamp_opt(1_900_000_000, 0).unwrap()
        );
    }

    #[test]
    fn test_to_credential_copies_fields() {
        let creds = StsCredentials::builder()
            .access_key_id("ASIAEXAMPLE")
            .secret_access_key("secret")
            .session_token("token")
            .expiration(DateTime::from_secs(1_900_000_000))
            .build()
            .unwrap();

        let cred = to_credential(&creds, Some("ap-south-1".to_string()));
        assert_eq!(cred.access_key_id, "ASIAEXAMPLE");
        assert_eq!(cred.secret_access_key, "secret");
        assert_eq!(cred.session_token, "token");
        assert_eq!(cred.region.as_deref(), Some("ap-south-1"));
    }

    type TestSdkError = SdkError<std::io::Error, ()>;

    #[test]
    fn test_service_error_is_rejection() {
        let err = TestSdkError::service_error(
            std::io::Error::other("invalid MFA one time pass code"),
            (),
        );

        let classified = classify(err);

        assert!(matches!(&classified, IdentityError::Rejected(m) if m.contains("invalid MFA")));
    }

    #[test]
    fn test_construction_failure_is_rejection() {
        let err = TestSdkError::construction_failure("serial number must be at least 9 characters");

        assert!(matches!(classify(err), IdentityError::Rejected(_)));
    }

    #[test]
    fn test_transport_failures_are_service_errors() {
        let timeout = TestSdkError::timeout_error("operation timed out");
        assert!(matches!(classify(timeout), IdentityError::Service(_)));
    }
}

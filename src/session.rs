use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::{debug, info};

use crate::ec2::api_error;
use crate::error::{FleetError, Result};

/// Region used for account-level calls when nothing else is configured.
const DEFAULT_REGION: &str = "us-east-1";

/// The AWS configuration resolved once at startup and shared by every client.
#[derive(Clone, Debug)]
pub struct Session {
    sdk_config: SdkConfig,
    home_region: String,
}

impl Session {
    /// Resolves credentials and the home region, then proves the credentials
    /// work with STS `GetCallerIdentity`.
    ///
    /// Region resolution priority:
    /// 1. Explicit region (--region CLI arg or AWS_REGION env var)
    /// 2. AWS SDK defaults (profile config, IMDS)
    /// 3. `us-east-1`
    pub async fn load(profile: Option<&str>, region: Option<&str>) -> Result<Self> {
        info!(profile = ?profile, "Initializing AWS SDK configuration");

        let region_provider = RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
            .or_default_provider()
            .or_else(DEFAULT_REGION);

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        if sdk_config.credentials_provider().is_none() {
            return Err(FleetError::Credential(
                "no credentials provider configured".to_string(),
            ));
        }

        let home_region = sdk_config
            .region()
            .map(|r| r.as_ref())
            .unwrap_or(DEFAULT_REGION)
            .to_string();

        let identity = aws_sdk_sts::Client::new(&sdk_config)
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| FleetError::Credential(api_error("GetCallerIdentity", e).to_string()))?;

        info!(
            account = identity.account().unwrap_or("unknown"),
            arn = identity.arn().unwrap_or("unknown"),
            home_region = %home_region,
            "AWS credentials verified"
        );
        debug!(user_id = ?identity.user_id(), "STS caller identity");

        Ok(Self {
            sdk_config,
            home_region,
        })
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    pub fn home_region(&self) -> &str {
        &self.home_region
    }
}

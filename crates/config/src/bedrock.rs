//! AWS Bedrock connection settings.

use secrecy::SecretString;
use serde::Deserialize;

/// AWS Bedrock connection settings.
///
/// All fields are optional; anything not set here is resolved through the
/// standard AWS environment chain (`AWS_REGION`, shared credentials file,
/// instance metadata).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BedrockConfig {
    /// AWS region hosting the Bedrock endpoint.
    pub region: Option<String>,

    /// AWS Access Key ID (optional - uses credential chain if not provided).
    pub access_key_id: Option<SecretString>,

    /// AWS Secret Access Key (required if access_key_id is provided).
    pub secret_access_key: Option<SecretString>,

    /// AWS Session Token (optional - for temporary credentials).
    pub session_token: Option<SecretString>,

    /// AWS Profile name (optional - uses default profile if not specified).
    pub profile: Option<String>,

    /// Custom endpoint URL (optional - for VPC endpoints or local stacks).
    pub base_url: Option<String>,
}

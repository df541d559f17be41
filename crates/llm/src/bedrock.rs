//! AWS Bedrock runtime invocation.
//!
//! Thin wrapper over the Bedrock runtime SDK client: builds the SDK
//! configuration from the environment chain plus explicit overrides, invokes
//! models in unary or streaming mode, and maps SDK failures onto the gateway
//! error taxonomy.

use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_bedrockruntime::{
    Client as BedrockRuntimeClient, error::ProvideErrorMetadata,
    operation::invoke_model_with_response_stream::InvokeModelWithResponseStreamOutput,
};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::Blob;
use config::BedrockConfig;
use secrecy::ExposeSecret;

use crate::error::{LlmError, LlmResult};

/// Process-wide handle to the Bedrock runtime endpoint.
pub(crate) struct BedrockRuntime {
    client: BedrockRuntimeClient,
}

impl BedrockRuntime {
    /// Create a new runtime handle from the gateway configuration.
    pub async fn new(config: &BedrockConfig) -> anyhow::Result<Self> {
        let sdk_config = create_aws_config(config).await;

        Ok(Self {
            client: BedrockRuntimeClient::new(&sdk_config),
        })
    }

    /// Invoke a model in unary mode, returning the raw JSON response body.
    pub async fn invoke(&self, model_id: &str, body: Vec<u8>) -> LlmResult<Vec<u8>> {
        log::debug!("Invoking Bedrock model: {model_id}");

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                log::error!("Bedrock invocation failed: {e:?}");
                handle_bedrock_error(e)
            })?;

        Ok(output.body.into_inner())
    }

    /// Invoke a model in streaming mode, returning the backend event source.
    pub async fn invoke_stream(&self, model_id: &str, body: Vec<u8>) -> LlmResult<InvokeModelWithResponseStreamOutput> {
        log::debug!("Invoking Bedrock model with response stream: {model_id}");

        self.client
            .invoke_model_with_response_stream()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                log::error!("Bedrock stream invocation failed: {e:?}");
                handle_bedrock_error(e)
            })
    }
}

/// Create AWS SDK configuration from the gateway config.
///
/// Anything not set explicitly resolves through the standard environment
/// chain, so `AWS_REGION` and shared credentials keep working untouched.
async fn create_aws_config(config: &BedrockConfig) -> aws_config::SdkConfig {
    let mut config_loader = aws_config::from_env();

    if let Some(region) = &config.region {
        config_loader = config_loader.region(Region::new(region.clone()));
    }

    // Use explicit credentials if provided
    if let (Some(access_key), Some(secret_key)) = (&config.access_key_id, &config.secret_access_key) {
        config_loader = config_loader.credentials_provider(Credentials::new(
            access_key.expose_secret(),
            secret_key.expose_secret(),
            config.session_token.as_ref().map(|t| t.expose_secret().to_string()),
            None,
            "bedrock_gateway",
        ));
    }

    if let Some(profile) = &config.profile {
        config_loader = config_loader.profile_name(profile);
    }

    let mut sdk_config = config_loader.load().await;

    // Apply custom endpoint if specified (for testing)
    if let Some(base_url) = &config.base_url {
        log::debug!("Using custom Bedrock endpoint: {base_url}");
        sdk_config = sdk_config.into_builder().endpoint_url(base_url).build();
    }

    sdk_config
}

/// Map Bedrock SDK errors onto the gateway error taxonomy.
///
/// A rejected request body surfaces as a 400, everything else as a 500.
fn handle_bedrock_error<E, R>(error: SdkError<E, R>) -> LlmError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    match &error {
        SdkError::ServiceError(service_error) => {
            let err = service_error.err();
            let message = err.message().unwrap_or("Unknown error").to_string();

            match err.code() {
                Some("ValidationException") => LlmError::Validation(message),
                _ => LlmError::Internal(message),
            }
        }
        _ => LlmError::Internal(format!("{error:?}")),
    }
}

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::{DisplayErrorContext, SdkError};
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::backend::AuthBackend;
use crate::error::BackendError;
use crate::types::{Identity, SessionChange};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "cognito";

/// Tokens for the session currently held by this client
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

/// Compute the SECRET_HASH for Cognito authentication
pub fn compute_secret_hash(
    username: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, BackendError> {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| BackendError::service(SERVICE, e))?;
    mac.update(message.as_bytes());
    let result = mac.finalize();
    Ok(general_purpose::STANDARD.encode(result.into_bytes()))
}

/// Auth backend on a Cognito user pool app client
pub struct CognitoAuth {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
    user_pool_id: Option<String>,
    tokens: RwLock<Option<SessionTokens>>,
    changes: broadcast::Sender<SessionChange>,
}

impl CognitoAuth {
    pub fn new(
        client: CognitoClient,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_pool_id: Option<String>,
    ) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_pool_id,
            tokens: RwLock::new(None),
            changes,
        }
    }

    /// Resume a session from an access token the caller already holds
    pub fn with_access_token(self, access_token: impl Into<String>) -> Self {
        self.store_tokens(Some(SessionTokens {
            id_token: String::new(),
            access_token: access_token.into(),
            refresh_token: String::new(),
            expires_in: 0,
        }));
        self
    }

    pub fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.read().ok().and_then(|tokens| tokens.clone())
    }

    fn access_token(&self) -> Option<String> {
        self.tokens().map(|tokens| tokens.access_token)
    }

    fn store_tokens(&self, tokens: Option<SessionTokens>) {
        if let Ok(mut current) = self.tokens.write() {
            *current = tokens;
        }
    }

    fn notify(&self, change: SessionChange) {
        // No receivers simply means nobody is listening yet
        let _ = self.changes.send(change);
    }

    async fn identity_for(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
        let result = self.client.get_user().access_token(access_token).send().await;

        match result {
            Ok(user) => {
                let attribute = |name: &str| {
                    user.user_attributes()
                        .iter()
                        .find(|attr| attr.name() == name)
                        .and_then(|attr| attr.value())
                        .map(|value| value.to_string())
                };
                let id = attribute("sub").unwrap_or_else(|| user.username().to_string());
                let email = attribute("email").unwrap_or_default();
                Ok(Some(Identity { id, email }))
            }
            Err(SdkError::ServiceError(e)) if e.err().is_not_authorized_exception() => {
                tracing::info!("Stored access token is no longer valid");
                Ok(None)
            }
            Err(e) => Err(BackendError::service(SERVICE, DisplayErrorContext(&e))),
        }
    }

    async fn open_session(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let secret_hash = compute_secret_hash(email, &self.client_id, &self.client_secret)?;

        let response = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await
            .map_err(|e| {
                let rejected = e.as_service_error().map_or(false, |se| {
                    se.is_not_authorized_exception() || se.is_user_not_found_exception()
                });
                if rejected {
                    BackendError::InvalidCredentials
                } else if e
                    .as_service_error()
                    .map_or(false, |se| se.is_user_not_confirmed_exception())
                {
                    BackendError::Rejected("Please verify your email before logging in".to_string())
                } else {
                    BackendError::service(SERVICE, DisplayErrorContext(&e))
                }
            })?;

        let auth_result = response
            .authentication_result()
            .ok_or_else(|| BackendError::service(SERVICE, "no authentication result returned"))?;

        let tokens = SessionTokens {
            id_token: auth_result.id_token().unwrap_or_default().to_string(),
            access_token: auth_result.access_token().unwrap_or_default().to_string(),
            refresh_token: auth_result.refresh_token().unwrap_or_default().to_string(),
            expires_in: auth_result.expires_in(),
        };

        let identity = self
            .identity_for(&tokens.access_token)
            .await?
            .ok_or(BackendError::InvalidCredentials)?;

        self.store_tokens(Some(tokens));
        tracing::info!("Authentication successful for user: {}", email);
        self.notify(SessionChange::SignedIn(identity.clone()));
        Ok(identity)
    }
}

#[async_trait]
impl AuthBackend for CognitoAuth {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let secret_hash = compute_secret_hash(email, &self.client_id, &self.client_secret)?;
        let email_attribute = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| BackendError::service(SERVICE, e))?;

        let response = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .secret_hash(&secret_hash)
            .user_attributes(email_attribute)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Cognito signup error: {}", DisplayErrorContext(&e));
                match e.as_service_error() {
                    Some(se) if se.is_username_exists_exception() => BackendError::Rejected(
                        "An account with this email already exists".to_string(),
                    ),
                    Some(se) if se.is_invalid_password_exception() => BackendError::Rejected(
                        "Password does not meet the account password policy".to_string(),
                    ),
                    Some(se) if se.is_invalid_parameter_exception() => {
                        BackendError::Rejected("Invalid email or password format".to_string())
                    }
                    _ => BackendError::service(SERVICE, DisplayErrorContext(&e)),
                }
            })?;

        let identity = Identity {
            id: response.user_sub().to_string(),
            email: email.to_string(),
        };
        tracing::info!("Signup successful for user: {}", email);

        let Some(user_pool_id) = &self.user_pool_id else {
            tracing::warn!("COGNITO_USER_POOL_ID not set; skipping auto-confirm");
            return Ok(identity);
        };

        if let Err(e) = self
            .client
            .admin_confirm_sign_up()
            .user_pool_id(user_pool_id)
            .username(email)
            .send()
            .await
        {
            // The user can still confirm through the emailed code
            tracing::error!("Failed to auto-confirm user: {}", DisplayErrorContext(&e));
            return Ok(identity);
        }

        match self.open_session(email, password).await {
            Ok(signed_in) => Ok(signed_in),
            Err(e) => {
                tracing::warn!("Account created but session not opened: {}", e);
                Ok(identity)
            }
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        tracing::info!("Authenticating user: {}", email);
        self.open_session(email, password).await
    }

    async fn end_session(&self) -> Result<(), BackendError> {
        let Some(access_token) = self.access_token() else {
            return Ok(());
        };

        let result = self
            .client
            .global_sign_out()
            .access_token(&access_token)
            .send()
            .await;

        // Local tokens are dropped whatever the service says
        self.store_tokens(None);
        self.notify(SessionChange::SignedOut);

        result
            .map(|_| ())
            .map_err(|e| BackendError::service(SERVICE, DisplayErrorContext(&e)))
    }

    async fn current_session(&self) -> Result<Option<Identity>, BackendError> {
        let Some(access_token) = self.access_token() else {
            return Ok(None);
        };

        let identity = self.identity_for(&access_token).await?;
        if identity.is_none() {
            self.store_tokens(None);
        }
        Ok(identity)
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}

#![forbid(unsafe_code)]

use core::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Wrapper that redacts in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

/// Bearer token for one connect or request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(SecretString);

impl AccessToken {
	pub fn new(token: impl Into<String>) -> Self {
		Self(SecretString::new(token))
	}

	pub fn expose(&self) -> &str {
		self.0.expose()
	}
}

impl From<SecretString> for AccessToken {
	fn from(s: SecretString) -> Self {
		Self(s)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
	#[error("no access token available")]
	Unavailable,

	#[error("token refresh rejected: {0}")]
	Rejected(String),
}

/// Source of valid bearer tokens. Refresh, if any, happens behind this call.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync + 'static {
	async fn valid_token(&self) -> Result<AccessToken, AuthError>;
}

/// Provider backed by a fixed token (config or env).
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
	token: Option<SecretString>,
}

impl StaticTokenProvider {
	pub fn new(token: Option<SecretString>) -> Self {
		Self {
			token: token.filter(|t| !t.expose().trim().is_empty()),
		}
	}
}

#[async_trait]
impl AuthTokenProvider for StaticTokenProvider {
	async fn valid_token(&self) -> Result<AccessToken, AuthError> {
		self.token.clone().map(AccessToken::from).ok_or(AuthError::Unavailable)
	}
}

#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use classchat_domain::{ChannelId, ChannelKind, MessageId};
use classchat_protocol::{HistoryBody, RawMessage};
use classchat_util::endpoint::ServiceEndpoint;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{AuthError, AuthTokenProvider};

pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 1000;

/// One page of historical messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
	pub messages: Vec<RawMessage>,
	/// Cursor of the following page, if the server has more.
	pub next_cursor: Option<u32>,
	/// Entries the server sent that did not decode.
	pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum HistoryError {
	#[error(transparent)]
	Auth(#[from] AuthError),

	#[error("unauthorized: status={0}")]
	Unauthorized(StatusCode),

	#[error("request failed: status={0}")]
	Status(StatusCode),

	#[error("server rejected request: {0}")]
	Rejected(String),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("not supported for {0} channels")]
	Unsupported(ChannelKind),
}

/// Request/response access to a channel's history and request-based deletes.
#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
	async fn fetch(&self, channel: &ChannelId, kind: ChannelKind, cursor: Option<u32>) -> Result<HistoryPage, HistoryError>;

	async fn delete_message(&self, channel: &ChannelId, kind: ChannelKind, id: &MessageId) -> Result<(), HistoryError> {
		let _ = (channel, id);
		Err(HistoryError::Unsupported(kind))
	}
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
	#[serde(default, alias = "isSuccess")]
	is_success: Option<bool>,
	#[serde(default)]
	message: Option<String>,
}

/// reqwest-backed history client.
#[derive(Clone)]
pub struct HttpHistoryClient {
	base: ServiceEndpoint,
	page_size: u32,
	auth: Arc<dyn AuthTokenProvider>,
	client: reqwest::Client,
}

impl HttpHistoryClient {
	pub fn new(base: ServiceEndpoint, page_size: u32, auth: Arc<dyn AuthTokenProvider>) -> Self {
		Self {
			base,
			page_size: page_size.max(1),
			auth,
			client: reqwest::Client::new(),
		}
	}

	/// URL for `channel` history at `cursor` (page number, 1-based).
	pub fn history_url(&self, channel: &ChannelId, kind: ChannelKind, cursor: Option<u32>) -> String {
		let id = urlencoding::encode(channel.as_str());
		match kind {
			ChannelKind::Classroom => self.base.join(&format!("/api/classroom/chat/{id}/messages/")),
			ChannelKind::Discussion => {
				let page = cursor.unwrap_or(1).max(1);
				format!(
					"{}?page={}&pageSize={}",
					self.base.join(&format!("/api/forum/{id}/messages")),
					page,
					self.page_size
				)
			}
		}
	}

	pub fn delete_url(&self, channel: &ChannelId, id: &MessageId) -> String {
		format!(
			"{}?messageId={}",
			self.base.join(&format!("/api/forum/{}/delete-message", urlencoding::encode(channel.as_str()))),
			urlencoding::encode(id.as_str())
		)
	}

	async fn auth_header(&self) -> Result<String, HistoryError> {
		let token = self.auth.valid_token().await?;
		Ok(format!("Bearer {}", token.expose().trim()))
	}
}

fn check_status(status: StatusCode) -> Result<(), HistoryError> {
	match status {
		s if s.is_success() => Ok(()),
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HistoryError::Unauthorized(status)),
		s => Err(HistoryError::Status(s)),
	}
}

#[async_trait]
impl HistorySource for HttpHistoryClient {
	async fn fetch(&self, channel: &ChannelId, kind: ChannelKind, cursor: Option<u32>) -> Result<HistoryPage, HistoryError> {
		let url = self.history_url(channel, kind, cursor);
		let resp = self
			.client
			.get(url)
			.header("Authorization", self.auth_header().await?)
			.send()
			.await?;
		check_status(resp.status())?;

		let body: HistoryBody = resp.json().await?;
		let entries = body.into_entries();
		for bad in &entries.malformed {
			warn!(channel = %channel, index = bad.index, error = %bad.error, "skipping malformed history entry");
		}
		let next_cursor = match (kind, entries.next_page) {
			(ChannelKind::Classroom, _) => None,
			(ChannelKind::Discussion, Some(next)) => Some(next),
			// no marker: a full page suggests more
			(ChannelKind::Discussion, None) if entries.total() as u64 >= u64::from(self.page_size) => {
				Some(cursor.unwrap_or(1).max(1).saturating_add(1))
			}
			(ChannelKind::Discussion, None) => None,
		};

		let skipped = entries.malformed.len();
		debug!(channel = %channel, %kind, count = entries.messages.len(), skipped, ?next_cursor, "history page fetched");
		Ok(HistoryPage {
			messages: entries.messages,
			next_cursor,
			skipped,
		})
	}

	async fn delete_message(&self, channel: &ChannelId, kind: ChannelKind, id: &MessageId) -> Result<(), HistoryError> {
		if kind != ChannelKind::Discussion {
			return Err(HistoryError::Unsupported(kind));
		}

		let resp = self
			.client
			.delete(self.delete_url(channel, id))
			.header("Authorization", self.auth_header().await?)
			.send()
			.await?;
		check_status(resp.status())?;

		let text = resp.text().await?;
		if let Ok(body) = serde_json::from_str::<DeleteResponse>(&text)
			&& body.is_success == Some(false)
		{
			return Err(HistoryError::Rejected(
				body.message.unwrap_or_else(|| "delete not accepted".to_string()),
			));
		}
		Ok(())
	}
}

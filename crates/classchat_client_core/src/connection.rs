#![forbid(unsafe_code)]

use core::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
	#[default]
	Idle,
	Connecting,
	Open,
	Closing,
	Closed,
	Reconnecting,
}

impl ConnectionStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			ConnectionStatus::Idle => "idle",
			ConnectionStatus::Connecting => "connecting",
			ConnectionStatus::Open => "open",
			ConnectionStatus::Closing => "closing",
			ConnectionStatus::Closed => "closed",
			ConnectionStatus::Reconnecting => "reconnecting",
		}
	}

	/// Whether `self -> to` is a legal lifecycle step.
	pub const fn can_transition(self, to: ConnectionStatus) -> bool {
		use ConnectionStatus::*;
		matches!(
			(self, to),
			(Idle, Connecting)
				| (Idle, Closed)
				| (Connecting, Open)
				| (Connecting, Reconnecting)
				| (Connecting, Closed)
				| (Open, Reconnecting)
				| (Open, Closing)
				| (Open, Closed)
				| (Closing, Closed)
				| (Reconnecting, Connecting)
				| (Reconnecting, Closed)
		)
	}
}

impl fmt::Display for ConnectionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Why a channel connection reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
	Deselected,
	AuthFailed,
	RetriesExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal connection transition: {from} -> {to}")]
pub struct TransitionError {
	pub from: ConnectionStatus,
	pub to: ConnectionStatus,
}

/// Connection state of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
	pub status: ConnectionStatus,
	pub retry_count: u32,
	pub last_error: Option<String>,
	pub close_reason: Option<CloseReason>,
}

impl ConnectionState {
	pub fn is_open(&self) -> bool {
		self.status == ConnectionStatus::Open
	}

	pub fn is_closed(&self) -> bool {
		self.status == ConnectionStatus::Closed
	}

	/// Move to `to`; illegal steps leave the state untouched.
	pub fn transition(&mut self, to: ConnectionStatus) -> Result<(), TransitionError> {
		if !self.status.can_transition(to) {
			return Err(TransitionError { from: self.status, to });
		}
		self.status = to;
		Ok(())
	}

	pub fn begin_connect(&mut self) -> Result<(), TransitionError> {
		self.transition(ConnectionStatus::Connecting)
	}

	pub fn opened(&mut self) -> Result<(), TransitionError> {
		self.transition(ConnectionStatus::Open)?;
		self.last_error = None;
		Ok(())
	}

	pub fn lost(&mut self, retry_count: u32, error: impl Into<String>) -> Result<(), TransitionError> {
		self.transition(ConnectionStatus::Reconnecting)?;
		self.retry_count = retry_count;
		self.last_error = Some(error.into());
		Ok(())
	}

	/// Terminal close. `Open` passes through `Closing` first.
	pub fn close(&mut self, reason: CloseReason) -> Result<(), TransitionError> {
		if self.status == ConnectionStatus::Open {
			self.transition(ConnectionStatus::Closing)?;
		}
		self.transition(ConnectionStatus::Closed)?;
		self.close_reason = Some(reason);
		Ok(())
	}
}

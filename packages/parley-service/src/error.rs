pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String, retryable: bool },
	#[error("Mail history cursor expired.")]
	CursorExpired,
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Transient failures that a later attempt may get past.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Provider { retryable, .. } => *retryable,
			Self::Storage { .. } => true,
			_ => false,
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<parley_storage::Error> for Error {
	fn from(err: parley_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<parley_providers::Error> for Error {
	fn from(err: parley_providers::Error) -> Self {
		match err {
			parley_providers::Error::CursorExpired => Self::CursorExpired,
			other => Self::Provider { retryable: other.is_retryable(), message: other.to_string() },
		}
	}
}
impl From<parley_domain::suggestion::InvalidTransition> for Error {
	fn from(err: parley_domain::suggestion::InvalidTransition) -> Self {
		Self::Conflict { message: err.to_string() }
	}
}

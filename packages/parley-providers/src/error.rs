use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Provider returned HTTP {status}: {body}")]
	Status { status: StatusCode, body: String },
	/// The model answered, but not with the JSON shape that was asked for. `raw` is the answer
	/// verbatim.
	#[error("Provider returned malformed JSON: {message}")]
	MalformedJson { message: String, raw: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("History cursor is no longer available from the mail provider.")]
	CursorExpired,
}
impl Error {
	/// Timeouts, connection failures, 429 and 5xx are worth another attempt; everything else is a
	/// caller or contract problem that a retry cannot fix.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Reqwest(err) => {
				if let Some(status) = err.status() {
					return status_is_retryable(status);
				}

				err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
			},
			Self::Status { status, .. } => status_is_retryable(*status),
			_ => false,
		}
	}
}

pub(crate) fn status_is_retryable(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status.is_server_error()
}

use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider request timed out.")]
	Timeout,
	#[error("Provider rate limited the request.")]
	RateLimited { retry_after: Option<Duration> },
	#[error("Provider is unavailable: {message}")]
	Unavailable { message: String },
	#[error("Provider rejected the request with status {status}.")]
	Rejected { status: u16 },
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	/// Whether repeating the same request may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Timeout | Self::RateLimited { .. } | Self::Unavailable { .. })
	}
}

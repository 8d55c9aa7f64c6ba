use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	Validation { message: String },
	#[error("{message}")]
	UpstreamTimeout { message: String },
	#[error("{message}")]
	UpstreamUnavailable { message: String },
	/// The upstream refused the request itself; repeating it cannot help.
	#[error("{message}")]
	UpstreamRejected { message: String },
	#[error("{message}")]
	RateLimited { message: String, retry_after_ms: Option<u64> },
	#[error("{message}")]
	InternalFusion { message: String },
	#[error("{message}")]
	NotFound { message: String },
	#[error("{message}")]
	Conflict { message: String },
}
impl Error {
	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Validation { .. } => "INVALID_REQUEST",
			Self::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
			Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
			Self::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
			Self::RateLimited { .. } => "RATE_LIMITED",
			Self::InternalFusion { .. } => "INTERNAL_FUSION_ERROR",
			Self::NotFound { .. } => "NOT_FOUND",
			Self::Conflict { .. } => "CONFLICT",
		}
	}

	/// Idempotent calls failing this way may be repeated after a backoff.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::UpstreamTimeout { .. }
				| Self::UpstreamUnavailable { .. }
				| Self::RateLimited { .. }
		)
	}

	/// Delay the upstream asked for, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after_ms: Some(ms), .. } => Some(Duration::from_millis(*ms)),
			_ => None,
		}
	}
}
impl From<tcr_providers::Error> for Error {
	fn from(err: tcr_providers::Error) -> Self {
		match err {
			tcr_providers::Error::Timeout =>
				Self::UpstreamTimeout { message: "Provider request timed out.".to_string() },
			tcr_providers::Error::RateLimited { retry_after } => Self::RateLimited {
				message: "Provider rate limited the request.".to_string(),
				retry_after_ms: retry_after.map(|delay| delay.as_millis() as u64),
			},
			tcr_providers::Error::InvalidConfig { message } => Self::Validation { message },
			other if other.is_transient() =>
				Self::UpstreamUnavailable { message: other.to_string() },
			other => Self::UpstreamRejected { message: other.to_string() },
		}
	}
}
impl From<tcr_storage::Error> for Error {
	fn from(err: tcr_storage::Error) -> Self {
		match err {
			tcr_storage::Error::InvalidArgument(message) => Self::Validation { message },
			other => Self::UpstreamUnavailable { message: other.to_string() },
		}
	}
}

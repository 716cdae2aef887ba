pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid config: {message}")]
	InvalidConfig { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<recall_config::Error> for Error {
	fn from(err: recall_config::Error) -> Self {
		Self::InvalidConfig { message: err.to_string() }
	}
}

impl From<recall_storage::Error> for Error {
	fn from(err: recall_storage::Error) -> Self {
		match err {
			recall_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			recall_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			recall_storage::Error::InvalidRow(message) => Self::Storage { message },
			recall_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<recall_providers::Error> for Error {
	fn from(err: recall_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

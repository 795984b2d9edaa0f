//! Maps weather crate errors to weatherly_core::AppError for consistent user-facing messages.

use weatherly_core::{AppError, NetworkError, ReqwestErrorExt, StorageError, WeatherError};

use crate::types::{HistoryError, ProviderError};

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(place) => AppError::Weather(WeatherError::PlaceNotFound(place)),
            ProviderError::Unauthorized(_) => AppError::Weather(WeatherError::InvalidApiKey),
            ProviderError::Status { status, message } if status >= 500 => {
                AppError::Network(NetworkError::ServerError { status, message })
            }
            ProviderError::Status { message, .. } => {
                AppError::Weather(WeatherError::ApiError(message))
            }
            ProviderError::Network(err) => AppError::Network(err.into_network_error()),
            ProviderError::Parse(s) => AppError::Network(NetworkError::InvalidResponse(s)),
            ProviderError::Aborted(s) => AppError::Weather(WeatherError::ServiceUnavailable(s)),
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::PersistenceRead(s) => AppError::Storage(StorageError::ReadFailed(s)),
            HistoryError::PersistenceWrite(s) => AppError::Storage(StorageError::WriteFailed(s)),
        }
    }
}

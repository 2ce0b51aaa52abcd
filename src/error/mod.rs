use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Configuration Error: {0} should be {1}")]
    Configuration(String, String),

    #[error("Resource Exhaustion Error: {0}")]
    ResourceExhaustion(String),

    #[error("Synchronization Timeout: {semaphore} was not signaled within {timeout:?}")]
    SynchronizationTimeout {
        semaphore: String,
        timeout: Duration,
    },

    #[error("Synchronization Error: {0}")]
    Synchronization(String),

    #[error("Handle Import Error: {0}")]
    HandleImport(String),

    #[error("Device Lost: {0}")]
    DeviceLost(String),

    #[error("Tensor Error: {0}")]
    Tensor(String),

    #[error("Record Layout Error: {0}")]
    Layout(String),
}

impl From<burn::tensor::DataError> for Error {
    fn from(error: burn::tensor::DataError) -> Self {
        Self::Tensor(format!("{error:?}"))
    }
}

impl From<bytemuck::PodCastError> for Error {
    fn from(error: bytemuck::PodCastError) -> Self {
        Self::Layout(format!("{error:?}"))
    }
}

use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::RegistryError;
use omg_micro_command::CommandError;

pub type Result<T> = std::result::Result<T, MicroError>;

#[derive(Debug, Error)]
pub enum MicroError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("image build failed")]
    BuildFailed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

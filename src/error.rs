use thiserror::Error;


/// Failures surfaced by configuration checks, dataset validation
/// and checkpoint IO.

#[derive(Error, Debug)]
pub enum Error {
  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("covariance and correlation penalties are mutually exclusive")]
  ExclusivePenalties,

  #[error("invalid dataset: {0}")]
  Data(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error("checkpoint codec failed: {0}")]
  Checkpoint(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

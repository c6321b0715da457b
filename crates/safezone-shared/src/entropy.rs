//! High-entropy samples used to seed identity derivation.
//!
//! The camera collaborator hands over one captured still; the core only ever
//! treats it as an opaque byte buffer to be hashed.

use std::path::PathBuf;

use crate::error::IdentityError;

/// Anything that can supply one sample of local high-entropy material.
pub trait EntropySource {
    fn read_sample(&mut self) -> Result<Vec<u8>, IdentityError>;
}

/// A still image already written to disk by the capture layer.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    path: PathBuf,
}

impl CapturedImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EntropySource for CapturedImage {
    fn read_sample(&mut self) -> Result<Vec<u8>, IdentityError> {
        std::fs::read(&self.path).map_err(|e| {
            IdentityError::EntropyUnavailable(format!("{}: {e}", self.path.display()))
        })
    }
}

impl EntropySource for Vec<u8> {
    fn read_sample(&mut self) -> Result<Vec<u8>, IdentityError> {
        Ok(self.clone())
    }
}

impl EntropySource for &[u8] {
    fn read_sample(&mut self) -> Result<Vec<u8>, IdentityError> {
        Ok(self.to_vec())
    }
}

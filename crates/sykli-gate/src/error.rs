// SPDX-License-Identifier: MIT OR Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("gate configuration error: {0}")]
    Configuration(String),

    #[error("gate I/O error: {0}")]
    Io(#[from] std::io::Error),
}

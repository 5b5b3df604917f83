// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run-history errors, convertible into the shared [`sykli_error::SykliError`]
//! taxonomy at the boundary where history crosses into the CLI.

use sykli_error::{ErrorCode, SykliError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glob expansion failed: {0}")]
    Glob(#[from] sykli_glob::GlobError),
}

impl From<HistoryError> for SykliError {
    fn from(err: HistoryError) -> Self {
        let code = match &err {
            HistoryError::Io(_) => ErrorCode::Internal,
            HistoryError::Glob(_) => ErrorCode::Internal,
        };
        SykliError::new(code, err.to_string())
    }
}

//! Top-level error type for callers that want a single error to propagate.
//!
//! Most of the interesting error detail lives in [`crate::smp::SmpError`];
//! this wraps it for crates that also want a place to put I/O errors from
//! their own transport/storage glue.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SMP error: {0}")]
    Smp(#[from] crate::smp::SmpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

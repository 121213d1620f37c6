//! Object storage for relayed files.
//!
//! [`StorageBackend`] is the capability the transfer engine drives: a
//! resumable create, chunk submission, a public-read grant and a link
//! lookup. [`DriveClient`] implements it against the Google Drive v3 API.
//! [`TransferEngine`] composes those calls into one [`DeliveryOutcome`]
//! and always releases the job's [`TempHolding`].
//!
//! [`DeliveryOutcome`]: tgdrive_common::DeliveryOutcome

pub mod auth;
pub mod backend;
pub mod drive;
pub mod error;
pub mod temp;
pub mod transfer;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use {
    auth::{ServiceAccountAuth, StaticToken, TokenSource},
    backend::{ChunkStatus, ObjectId, ResumableRequest, ShareableLinks, StorageBackend, UploadHandle},
    drive::{DriveClient, DriveEndpoints},
    error::{Error, Result},
    temp::TempHolding,
    transfer::{FinalizeStage, RetryPolicy, TransferEngine, TransferError, TransferJob, TransferState},
};

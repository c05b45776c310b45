/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

pub mod bootentry;
pub mod classify;
pub mod driver;
pub mod efivars;
pub mod fru;
pub mod mac;
pub mod netinv;

/// Error taxonomy shared by every flashing component.
///
/// `Precondition` aborts the flashing phase outright; `Execution` and
/// `Verification` are recovered through the operator retry loop;
/// verification problems are always surfaced, never swallowed.
#[derive(thiserror::Error, Debug)]
pub enum FlashError {
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("EFI variable {0} not found")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlashError {
    /// Precondition errors are fatal and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlashError::Precondition(_))
    }
}

pub type FlashResult<T> = std::result::Result<T, FlashError>;

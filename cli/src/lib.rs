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

pub mod cfg;
pub mod fields;
pub mod report;
pub mod session;
pub mod sysinfo;

#[derive(thiserror::Error, Debug)]
pub enum AnvilError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("could not parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("field collection failed: {0}")]
    Fields(String),
}

pub type AnvilResult<T> = std::result::Result<T, AnvilError>;

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

use serde::{Deserialize, Serialize};

/// One diagnostic test as declared by configuration. The checker itself
/// is an opaque command; only its exit code and output are observed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-test deadline in seconds; falls back to the suite default.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Suppress the captured output when the attempt passed.
    #[serde(default)]
    pub collapse_output_on_success: bool,
}

fn default_required() -> bool {
    true
}

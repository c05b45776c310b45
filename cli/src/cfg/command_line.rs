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
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = env!("CARGO_PKG_NAME"), version)]
pub struct Options {
    #[clap(
        short,
        long,
        default_value = "config.yaml",
        help = "Path of the YAML configuration file"
    )]
    pub config: PathBuf,

    #[clap(
        long,
        conflicts_with = "flash_only",
        help = "Run the test suites only, skip the flashing phase"
    )]
    pub tests_only: bool,

    #[clap(long, help = "Skip the test suites, go straight to flashing")]
    pub flash_only: bool,

    #[clap(
        long,
        help = "Never prompt; failures are resolved automatically (tests continue, flashing aborts)"
    )]
    pub non_interactive: bool,

    #[clap(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    pub verbose: u8,
}

impl Options {
    pub fn load() -> Self {
        Self::parse()
    }
}

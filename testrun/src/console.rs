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

use std::io::Write;
use std::sync::Mutex;

/// Serializes operator-facing output from concurrent test tasks. Each
/// call holds the lock for the whole message so interleaved lines never
/// corrupt each other.
#[derive(Default)]
pub struct Console {
    lock: Mutex<()>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, text: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "{text}");
    }

    pub fn block(&self, header: &str, body: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "{header}");
        if !body.is_empty() {
            let _ = write!(stdout, "{body}");
            if !body.ends_with('\n') {
                let _ = writeln!(stdout);
            }
        }
        let _ = stdout.flush();
    }
}

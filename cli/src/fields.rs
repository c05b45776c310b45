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

use std::collections::HashMap;
use std::io::Write;

use regex::Regex;
use tracing::warn;

use crate::cfg::FieldSpec;
use crate::{AnvilError, AnvilResult};

/// Collected `name -> value` identity fields.
pub type FieldValues = HashMap<String, String>;

/// Prompts for every configured field on the console, re-asking until
/// the value matches the field's pattern. Prompting cannot happen in
/// non-interactive mode, so configured fields are an error there.
pub fn collect(specs: &[FieldSpec], interactive: bool) -> AnvilResult<FieldValues> {
    if specs.is_empty() {
        return Ok(FieldValues::new());
    }
    if !interactive {
        return Err(AnvilError::Fields(
            "identity fields are configured but prompting is disabled".to_string(),
        ));
    }

    let mut values = FieldValues::new();
    for spec in specs {
        let pattern = Regex::new(&spec.regex)
            .map_err(|e| AnvilError::Fields(format!("field '{}': {e}", spec.name)))?;
        loop {
            print!("{} ", spec.prompt);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            let value = line.trim();
            if validate(&pattern, value) {
                values.insert(spec.name.clone(), value.to_string());
                break;
            }
            warn!(field = %spec.name, "value does not match {}", spec.regex);
        }
    }
    Ok(values)
}

/// A field value must match its pattern in full; a partial hit is not
/// acceptance.
pub fn validate(pattern: &Regex, value: &str) -> bool {
    !value.is_empty()
        && pattern
            .find(value)
            .map(|m| m.start() == 0 && m.end() == value.len())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_full_match() {
        let pattern = Regex::new(r"[A-Z]{2}\d{4}").unwrap();
        assert!(validate(&pattern, "AB1234"));
        assert!(!validate(&pattern, "AB1234X"));
        assert!(!validate(&pattern, "xAB1234"));
        assert!(!validate(&pattern, ""));
    }
}

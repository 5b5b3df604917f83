// SPDX-License-Identifier: MIT OR Apache-2.0
//! Likely-cause correlation (§4.7): intersect the files changed since the
//! last good run with a failed task's `inputs` glob expansion.

use std::path::PathBuf;

use sykli_glob::{GlobError, IncludeExcludeGlobs};

/// Returns the subset of `changed` that matches one of `input_globs`, or
/// `None` when there is nothing to correlate against (no inputs declared,
/// or nothing changed).
pub fn correlate(changed: &[PathBuf], input_globs: &[String]) -> Result<Option<Vec<String>>, GlobError> {
    if input_globs.is_empty() || changed.is_empty() {
        return Ok(None);
    }
    let globs = IncludeExcludeGlobs::new(input_globs, &[])?;
    let matched: Vec<String> = changed
        .iter()
        .filter(|path| globs.decide_path(path).is_allowed())
        .map(|path| path.to_string_lossy().replace('\\', "/"))
        .collect();
    Ok(if matched.is_empty() { None } else { Some(matched) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(values: &[&str]) -> Vec<PathBuf> {
        values.iter().map(PathBuf::from).collect()
    }

    fn globs(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn intersects_changed_files_with_input_globs() {
        let changed = paths(&["src/main.rs", "README.md", "src/lib.rs"]);
        let result = correlate(&changed, &globs(&["src/**/*.rs"])).unwrap();
        assert_eq!(result, Some(vec!["src/main.rs".to_string(), "src/lib.rs".to_string()]));
    }

    #[test]
    fn no_overlap_is_none() {
        let changed = paths(&["README.md"]);
        let result = correlate(&changed, &globs(&["src/**/*.rs"])).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn empty_inputs_is_none() {
        let changed = paths(&["src/main.rs"]);
        assert_eq!(correlate(&changed, &[]).unwrap(), None);
    }

    #[test]
    fn nothing_changed_is_none() {
        assert_eq!(correlate(&[], &globs(&["src/**/*.rs"])).unwrap(), None);
    }
}

//! Splitting file paths into a shared prefix and a per-file suffix.

use crate::collect::error::CollectError;

/// A path split at `prefix_depth` components from the end.
///
/// `prefix + suffix` always reproduces the original path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitPath {
    /// Leading components followed by a trailing separator, or empty when
    /// the path has exactly `prefix_depth` components.
    pub prefix: String,
    /// The last `prefix_depth` components.
    pub suffix: String,
}

/// Split `path` so the suffix holds its last `prefix_depth` components.
///
/// Absolute paths keep their leading separator in the prefix
/// (`/data/a.root` → `/data/` + `a.root`).
pub fn split_path(
    path: &str,
    prefix_depth: usize,
    separator: char,
) -> Result<SplitPath, CollectError> {
    let components = path.split(separator).count();
    if components < prefix_depth {
        return Err(CollectError::PathTooShallow {
            path: path.to_string(),
            components,
            prefix_depth,
        });
    }

    // Byte position right after the separator that starts the suffix.
    let cut = path
        .rmatch_indices(separator)
        .nth(prefix_depth.saturating_sub(1))
        .map(|(i, sep)| i + sep.len())
        .unwrap_or(0);

    Ok(SplitPath {
        prefix: path[..cut].to_string(),
        suffix: path[cut..].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_depth_one() {
        let split = split_path("/data/run1/a.root", 1, '/').unwrap();
        assert_eq!(split.prefix, "/data/run1/");
        assert_eq!(split.suffix, "a.root");
    }

    #[test]
    fn deeper_suffix_keeps_inner_separators() {
        let split = split_path("/data/run1/a.root", 2, '/').unwrap();
        assert_eq!(split.prefix, "/data/");
        assert_eq!(split.suffix, "run1/a.root");
    }

    #[test]
    fn exact_depth_leaves_empty_prefix() {
        let split = split_path("a.root", 1, '/').unwrap();
        assert_eq!(split.prefix, "");
        assert_eq!(split.suffix, "a.root");

        let split = split_path("run1/a.root", 2, '/').unwrap();
        assert_eq!(split.prefix, "");
        assert_eq!(split.suffix, "run1/a.root");
    }

    #[test]
    fn split_always_reconstructs_the_path() {
        for path in ["/a/b/c.root", "a/b/c.root", "c.root", "/c.root", "a//b.root"] {
            for depth in 1..=2 {
                if let Ok(split) = split_path(path, depth, '/') {
                    assert_eq!(format!("{}{}", split.prefix, split.suffix), path);
                }
            }
        }
    }

    #[test]
    fn too_few_components_is_an_error() {
        let err = split_path("a.root", 2, '/').unwrap_err();
        assert!(matches!(
            err,
            CollectError::PathTooShallow {
                components: 1,
                prefix_depth: 2,
                ..
            }
        ));
    }
}

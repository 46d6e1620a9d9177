//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a single path segment
    pub fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[a-z][a-z0-9_+-]{0,12}(\\.[a-z0-9]{1,4}){0,2}",
            1 => Just("usr".to_string()),
            1 => Just("local".to_string()),
            1 => Just("lib".to_string()),
            1 => Just("lib64".to_string()),
            1 => Just("bin".to_string()),
            1 => Just("sbin".to_string()),
            1 => Just("locale".to_string()),
            1 => Just(".build-id".to_string()),
        ]
    }

    /// Generate an absolute path such as `/usr/lib64/libfoo.so.1`
    pub fn absolute_path() -> impl Strategy<Value = String> {
        proptest::collection::vec(segment(), 1..7)
            .prop_map(|segments| format!("/{}", segments.join("/")))
    }

    /// Generate a package identifier such as `1:bash-4.4.20-4.el8.x86_64`
    pub fn package_id() -> impl Strategy<Value = String> {
        (
            proptest::option::of(0u32..5),
            "[a-z][a-z0-9-]{0,15}[a-z0-9]",
            1u32..20,
            0u32..20,
            prop_oneof![Just("x86_64"), Just("noarch"), Just("i686")],
        )
            .prop_map(|(epoch, name, major, minor, arch)| {
                let body = format!("{name}-{major}.{minor}-1.el8.{arch}");
                match epoch {
                    Some(epoch) => format!("{epoch}:{body}"),
                    None => body,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_absolute_path_generator(path in absolute_path()) {
            prop_assert!(path.starts_with('/'));
            prop_assert!(!path.contains("//"));
            prop_assert!(!path.ends_with('/'));
        }

        #[test]
        fn test_package_id_generator(id in package_id()) {
            let stripped = crate::core::request::strip_epoch(&id);
            prop_assert!(!stripped.contains(':'));
            prop_assert!(stripped.chars().next().is_some_and(|c| c.is_ascii_lowercase()));
        }
    }
}

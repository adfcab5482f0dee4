use crate::protocol::DEFAULT_DEVICE_NAME_FILTER;

/// Case-insensitive advertised-name filter used while scanning.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceMatcher {
    needle: String,
}

impl DeviceMatcher {
    /// Creates a matcher for a target name substring.
    ///
    /// ```
    /// use jimu_probe::DeviceMatcher;
    ///
    /// let matcher = DeviceMatcher::new("jimu");
    /// assert!(matcher.matches(Some("JIMU-Robot-42")));
    /// assert!(!matcher.matches(None));
    /// ```
    #[must_use]
    pub fn new(target: &str) -> Self {
        Self {
            needle: target.to_lowercase(),
        }
    }

    /// Returns the lowercased target substring.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.needle
    }

    /// Returns whether an advertised name contains the target substring.
    ///
    /// Absent and empty names never match, even for an empty target.
    #[must_use]
    pub fn matches(&self, local_name: Option<&str>) -> bool {
        match local_name {
            Some(name) if !name.is_empty() => name.to_lowercase().contains(&self.needle),
            _ => false,
        }
    }
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_NAME_FILTER)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("jimu", Some("JIMU-Robot-42"), true)]
    #[case("JIMU", Some("my jimu kit"), true)]
    #[case("jimu", Some("Speaker"), false)]
    #[case("jimu", Some(""), false)]
    #[case("jimu", None, false)]
    #[case("", Some(""), false)]
    #[case("", None, false)]
    #[case("", Some("anything"), true)]
    fn matches_case_insensitive_substring(
        #[case] target: &str,
        #[case] local_name: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(expected, DeviceMatcher::new(target).matches(local_name));
    }
}

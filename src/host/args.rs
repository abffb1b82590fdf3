//! Argument builder for the external test host CLI.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

/// Builds `test <project> ...` argument lists for the host.
#[derive(Debug, Clone)]
pub struct HostArgs {
    args: Vec<OsString>,
}

impl HostArgs {
    /// Start an invocation for `project`.
    pub fn new(project: &Path) -> Self {
        Self {
            args: vec!["test".into(), project.as_os_str().to_os_string()],
        }
    }

    /// Suppress the banner.
    pub fn without_logo(mut self) -> Self {
        self.args.push("--nologo".into());
        self
    }

    /// Quiet verbosity.
    pub fn silent(mut self) -> Self {
        self.args.push("--verbosity".into());
        self.args.push("quiet".into());
        self
    }

    /// Per-test hang timeout enforced by the host.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.args.push("--blame-hang-timeout".into());
        self.args.push(format!("{}ms", timeout.as_millis()).into());
        self
    }

    /// Adapter and data collector search path.
    pub fn with_test_adapter(mut self, path: &Path) -> Self {
        self.args.push("--test-adapter-path".into());
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    /// Data collector to load.
    pub fn with_collector(mut self, collector: &str) -> Self {
        self.args.push("--collect".into());
        self.args.push(collector.into());
        self
    }

    /// Restrict the run to exactly `tests`.
    pub fn with_tests<'a, I>(mut self, tests: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let filter = test_filter(tests);
        if !filter.is_empty() {
            self.args.push("--filter".into());
            self.args.push(filter.into());
        }
        self
    }

    /// Finished argument list.
    pub fn build(self) -> Vec<OsString> {
        self.args
    }
}

/// `FullyQualifiedName=<name>` terms joined by `|`.
pub fn test_filter<'a, I>(tests: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    tests
        .into_iter()
        .map(|name| format!("FullyQualifiedName={}", escape_filter_value(name)))
        .collect::<Vec<_>>()
        .join("|")
}

/// Backslash-escape the host filter metacharacters.
fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '(' | ')' | '&' | '|' | '=' | '!' | '~') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn coverage_invocation_has_no_filter() {
        let args = HostArgs::new(Path::new("Calc.Tests.csproj"))
            .silent()
            .without_logo()
            .with_timeout(Duration::from_secs(2))
            .with_test_adapter(Path::new("/opt/adapters"))
            .with_collector("CoverageDataCollector")
            .build();

        assert_eq!(
            as_strings(args),
            [
                "test",
                "Calc.Tests.csproj",
                "--verbosity",
                "quiet",
                "--nologo",
                "--blame-hang-timeout",
                "2000ms",
                "--test-adapter-path",
                "/opt/adapters",
                "--collect",
                "CoverageDataCollector",
            ]
        );
    }

    #[test]
    fn filter_lists_every_test() {
        let args = as_strings(
            HostArgs::new(Path::new("p.csproj"))
                .with_tests(["Calc.Add", "Calc.Sub"])
                .build(),
        );
        assert_eq!(args[2], "--filter");
        assert_eq!(
            args[3],
            "FullyQualifiedName=Calc.Add|FullyQualifiedName=Calc.Sub"
        );
    }

    #[test]
    fn empty_test_list_adds_no_filter() {
        let args = HostArgs::new(Path::new("p.csproj"))
            .with_tests(std::iter::empty())
            .build();
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn filter_metacharacters_are_escaped() {
        assert_eq!(
            test_filter(["Calc.Div(x: 1, y: 0)"]),
            r"FullyQualifiedName=Calc.Div\(x: 1, y: 0\)"
        );
        assert_eq!(test_filter([r"a|b=c!d~e&f\g"]), r"FullyQualifiedName=a\|b\=c\!d\~e\&f\\g");
    }
}

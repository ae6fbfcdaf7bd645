// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Returns the name of the machine tests run on, as reported to IDEs and in
/// NUnit 2 result files.
pub(crate) fn computer_name() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok().filter(|name| !name.is_empty()))
        .unwrap_or_default()
}

/// Removes trailing carriage returns and line feeds.
pub(crate) fn trim_line_endings(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n'])
}

/// Returns the file name component of a slash- or backslash-separated path.
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("message\r\n", "message"; "crlf")]
    #[test_case("message\n\n", "message"; "multiple newlines")]
    #[test_case("a\nb", "a\nb"; "inner newline kept")]
    #[test_case("", ""; "empty")]
    fn trim_line_endings_cases(input: &str, expected: &str) {
        assert_eq!(trim_line_endings(input), expected);
    }

    #[test_case("/tmp/tests/Project.Tests.dll", "Project.Tests.dll"; "unix")]
    #[test_case(r"C:\src\Project.Tests.dll", "Project.Tests.dll"; "windows")]
    #[test_case("Project.Tests", "Project.Tests"; "bare name")]
    fn file_name_cases(input: &str, expected: &str) {
        assert_eq!(file_name(input), expected);
    }
}

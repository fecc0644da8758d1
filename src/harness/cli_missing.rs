static CLI_MISSING_PATTERNS: &[&str] = &[
    "not installed",
    "command not found",
    "no such file or directory",
    "is not recognized as an internal or external command",
];

/// Exit status shells use when the command itself could not be found.
const SHELL_NOT_FOUND_EXIT: i32 = 127;

pub fn is_cli_missing_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    CLI_MISSING_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Describes why a failed run looks like a missing CLI, if it does.
pub fn detect_cli_missing(exit_code: Option<i32>, stderr: &str) -> Option<String> {
    if let Some(line) = stderr.lines().find(|line| is_cli_missing_line(line)) {
        return Some(line.trim().to_string());
    }
    if exit_code == Some(SHELL_NOT_FOUND_EXIT) {
        return Some("exit status 127 (command not found)".to_string());
    }
    None
}

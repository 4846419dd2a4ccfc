use std::sync::OnceLock;

use regex::Regex;

/// Programs the gateway may ever execute. Everything here is
/// inspection-only; nothing mutates the repository or leaves the host.
const ALLOWED_PROGRAMS: &[&str] = &[
    "git", "cat", "head", "tail", "grep", "wc", "find", "ls", "file",
];

/// Read-only git subcommands. Excludes anything that can mutate history
/// or remote state.
const ALLOWED_GIT_SUBCOMMANDS: &[&str] = &[
    "diff",
    "show",
    "log",
    "blame",
    "ls-files",
    "rev-parse",
    "branch",
    "status",
    "fetch",
    "remote",
    "cat-file",
    "rev-list",
    "merge-base",
    "name-rev",
    "describe",
];

/// Patterns rejected before tokenization, scanned over the raw string.
/// Includes shell metacharacters so no operator ever reaches a shell.
const BLOCKED_PATTERNS: &[&str] = &[
    r"\brm\b",
    r"\bmv\b",
    r"\bcp\b.*-r",
    r"\bcurl\b",
    r"\bwget\b",
    r"\bnc\b",
    r"\bssh\b",
    r"\bscp\b",
    r"\brsync\b",
    r"\bchmod\b",
    r"\bchown\b",
    r"\bsudo\b",
    r"\bsu\b",
    r"\beval\b",
    r"\bexec\b",
    r"\bsource\b",
    r"\bpip\b",
    r"\bnpm\b",
    r"\byarn\b",
    r"\bapt\b",
    r"\bbrew\b",
    r"\bpython\b",
    r"\bnode\b",
    r"[|;&`$]",
    r">",
];

fn blocked_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        BLOCKED_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("valid blocked pattern"))
            .collect()
    })
}

/// Validate a command against the allow/deny policy. Fails closed: any
/// ambiguity rejects. Returns a specific, loggable reason on rejection.
pub fn check_command(command: &str) -> Result<(), String> {
    for (pattern, re) in BLOCKED_PATTERNS.iter().zip(blocked_regexes()) {
        if re.is_match(command) {
            return Err(format!("command contains blocked pattern: {pattern}"));
        }
    }

    let parts = shell_words::split(command)
        .map_err(|e| format!("could not parse command: {e}"))?;

    let Some(program) = parts.first() else {
        return Err("empty command".to_string());
    };

    if !ALLOWED_PROGRAMS.contains(&program.as_str()) {
        return Err(format!("command '{program}' is not in the allowlist"));
    }

    if program == "git" && parts.len() > 1 {
        // The token after `git` may itself be a flag; scan forward for the
        // first non-flag token and treat that as the subcommand.
        let subcommand = parts[1..].iter().find(|p| !p.starts_with('-'));
        let Some(subcommand) = subcommand else {
            return Err("no git subcommand found".to_string());
        };
        if !ALLOWED_GIT_SUBCOMMANDS.contains(&subcommand.as_str()) {
            return Err(format!("git subcommand '{subcommand}' is not allowed"));
        }
    }

    Ok(())
}

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::ChangedFile;

/// Paths matching any of these get a single +10 criticality boost.
const CRITICAL_PATTERNS: &[&str] = &[
    // Security
    r"(auth|security|crypto|password|secret|token|key|credential)",
    r"(permission|access|role|policy)",
    // Infrastructure
    r"(dockerfile|docker-compose|\.ya?ml$|terraform|ansible)",
    r"(nginx|apache|caddy|\.conf$)",
    // CI/CD
    r"(\.github/|\.gitlab-ci|jenkinsfile|circleci|\.drone)",
    // Dependencies
    r"(package\.json|package-lock|yarn\.lock|requirements|pipfile|go\.mod|cargo\.toml)",
    r"(pyproject\.toml|setup\.py|setup\.cfg|gemfile)",
    // Database
    r"(migration|schema|\.sql$|alembic)",
    // Build config
    r"(webpack|vite|rollup|babel|tsconfig|makefile|cmake)",
];

const VENDOR_MARKERS: &[(&str, &str)] = &[
    ("vendor/", "vendored dependency"),
    ("node_modules/", "node_modules"),
    ("dist/", "build output"),
    ("build/", "build output"),
    ("__pycache__/", "Python cache"),
];

const GENERATED_MARKERS: &[(&str, &str)] = &[
    (".min.", "minified file"),
    (".bundle.", "bundled file"),
    (".generated.", "generated file"),
    ("package-lock.json", "lock file"),
    ("yarn.lock", "lock file"),
    ("poetry.lock", "lock file"),
    ("cargo.lock", "lock file"),
    ("go.sum", "lock file"),
];

fn critical_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        CRITICAL_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("valid critical pattern"))
            .collect()
    })
}

fn extension_priority(ext: &str) -> f64 {
    match ext {
        "py" | "go" | "rs" | "java" | "ts" | "tsx" | "c" | "cpp" | "h" | "hpp" => 3.0,
        "env" => 3.0, // secrets risk
        "js" | "jsx" | "rb" | "php" | "cs" => 2.0,
        "sql" | "graphql" | "proto" => 2.0,
        "yaml" | "yml" | "toml" => 2.0,
        "json" | "ini" | "css" | "scss" | "less" | "html" => 1.0,
        "md" | "txt" | "svg" => 0.0,
        _ => 1.0,
    }
}

/// Priority score for one changed file. Higher = review sooner. Pure and
/// deterministic; may go negative, and is used for ranking only.
pub fn file_priority(file: &ChangedFile) -> f64 {
    let mut score = 0.0;
    let path_lower = file.path.to_lowercase();

    // Only the first matching critical category counts.
    if critical_regexes().iter().any(|re| re.is_match(&path_lower)) {
        score += 10.0;
    }

    let ext = path_lower.rsplit('.').next().filter(|e| e.len() < path_lower.len());
    score += extension_priority(ext.unwrap_or(""));

    if file.new_file {
        score += 2.0;
    } else if file.deleted_file {
        score += 1.0;
    }

    // Moderate changes are usually the most meaningful ones.
    let changes = file.total_changes();
    if (10..=100).contains(&changes) {
        score += 3.0;
    } else if changes > 100 {
        score += 1.0;
    } else if changes > 0 {
        score += 0.5;
    }

    if VENDOR_MARKERS.iter().any(|(m, _)| path_lower.contains(m)) {
        score -= 20.0;
    }
    if GENERATED_MARKERS.iter().any(|(m, _)| path_lower.contains(m)) {
        score -= 10.0;
    }

    if ["test", "spec", "_test.", ".test."]
        .iter()
        .any(|m| path_lower.contains(m))
    {
        score += 1.5;
    }

    score
}

/// Decide whether a file is excluded from review. First matching rule wins;
/// returns the skip reason, or `None` to keep the file.
pub fn skip_reason(file: &ChangedFile) -> Option<String> {
    if file.is_binary {
        return Some("binary file".to_string());
    }

    let path_lower = file.path.to_lowercase();
    for (marker, reason) in VENDOR_MARKERS.iter().chain(GENERATED_MARKERS) {
        if path_lower.contains(marker) {
            return Some((*reason).to_string());
        }
    }

    if file.total_changes() > 1000 {
        return Some("diff too large (>1000 lines)".to_string());
    }

    if file.diff.trim().is_empty() {
        return Some("empty diff".to_string());
    }

    None
}

/// Budgeted, prioritized selection over a change set.
#[derive(Debug, Default)]
pub struct ReviewPlan {
    pub total_files: usize,
    pub total_chars: usize,
    pub files_to_review: Vec<ChangedFile>,
    pub skipped_files: Vec<String>,
    pub skip_reasons: HashMap<String, String>,
    pub priority_order: Vec<String>,
    pub estimated_tokens: usize,
}

impl ReviewPlan {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Review Plan: {}/{} files",
                self.files_to_review.len(),
                self.total_files
            ),
            format!(
                "Total diff size: ~{} chars ({} est. tokens)",
                self.total_chars, self.estimated_tokens
            ),
        ];

        if !self.skipped_files.is_empty() {
            lines.push(format!("Skipped: {} files", self.skipped_files.len()));
            for path in self.skipped_files.iter().take(5) {
                let reason = self
                    .skip_reasons
                    .get(path)
                    .map(String::as_str)
                    .unwrap_or("unknown");
                lines.push(format!("  - {path}: {reason}"));
            }
            if self.skipped_files.len() > 5 {
                lines.push(format!("  ... and {} more", self.skipped_files.len() - 5));
            }
        }

        lines.join("\n")
    }
}

/// Build a review plan under file-count and character budgets.
///
/// Two passes: skip-filter and score everything, then admit in descending
/// priority while budgets hold. A lone over-budget candidate is still
/// admitted when nothing has been selected yet, so any non-empty candidate
/// set yields a non-empty plan.
pub fn create_review_plan(
    files: Vec<ChangedFile>,
    max_files: usize,
    max_chars: usize,
) -> ReviewPlan {
    let mut plan = ReviewPlan {
        total_files: files.len(),
        ..ReviewPlan::default()
    };

    let mut scored: Vec<(ChangedFile, f64)> = Vec::new();
    for file in files {
        match skip_reason(&file) {
            Some(reason) => {
                plan.skipped_files.push(file.path.clone());
                plan.skip_reasons.insert(file.path, reason);
            }
            None => {
                let priority = file_priority(&file);
                scored.push((file, priority));
            }
        }
    }

    // Stable sort: equal scores keep their input order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut total_chars = 0usize;
    for (file, _priority) in scored {
        let diff_chars = file.diff.len();

        if plan.files_to_review.len() >= max_files {
            plan.skipped_files.push(file.path.clone());
            plan.skip_reasons
                .insert(file.path, "max files limit reached".to_string());
            continue;
        }

        if total_chars + diff_chars > max_chars && !plan.files_to_review.is_empty() {
            plan.skipped_files.push(file.path.clone());
            plan.skip_reasons
                .insert(file.path, "max chars limit reached".to_string());
            continue;
        }

        total_chars += diff_chars;
        plan.priority_order.push(file.path.clone());
        plan.files_to_review.push(file);
    }

    plan.total_chars = total_chars;
    plan.estimated_tokens = total_chars / 4;
    plan
}

/// Heuristic hotspots that warrant a deeper investigation pass.
/// Returns (path, reason) pairs; a file can appear more than once.
pub fn identify_hotspots(files: &[ChangedFile]) -> Vec<(String, String)> {
    let mut hotspots: Vec<(String, String)> = Vec::new();

    for file in files {
        let path_lower = file.path.to_lowercase();

        if ["auth", "security", "crypto", "password", "secret"]
            .iter()
            .any(|m| path_lower.contains(m))
        {
            hotspots.push((file.path.clone(), "security-sensitive file".to_string()));
        }

        if ["api", "interface", "proto", "schema", "graphql"]
            .iter()
            .any(|m| path_lower.contains(m))
        {
            hotspots.push((file.path.clone(), "API/interface change".to_string()));
        }

        if ["migration", "schema", ".sql"]
            .iter()
            .any(|m| path_lower.contains(m))
        {
            hotspots.push((file.path.clone(), "database schema change".to_string()));
        }

        if [".yaml", ".yml", ".json", ".toml", ".env"]
            .iter()
            .any(|ext| file.path.ends_with(ext))
            && (path_lower.contains("config") || path_lower.contains("settings"))
        {
            hotspots.push((file.path.clone(), "configuration change".to_string()));
        }

        let diff_lower = file.diff.to_lowercase();
        if !diff_lower.is_empty() {
            if ["todo", "fixme", "hack"].iter().any(|m| diff_lower.contains(m)) {
                hotspots.push((file.path.clone(), "contains TODO/FIXME/HACK".to_string()));
            }
            if ["password", "secret", "api_key"]
                .iter()
                .any(|m| diff_lower.contains(m))
            {
                hotspots.push((file.path.clone(), "potential secret in diff".to_string()));
            }
        }
    }

    hotspots
}

/// Per-directory markdown summary of the change set, used as initial
/// context for the reasoning engine.
pub fn summarize_changes(files: &[ChangedFile]) -> String {
    let mut by_dir: HashMap<String, Vec<&ChangedFile>> = HashMap::new();
    for f in files {
        let dir = match f.path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        };
        by_dir.entry(dir).or_default().push(f);
    }

    let mut lines = vec!["## Changed Files Summary\n".to_string()];

    let mut dirs: Vec<&String> = by_dir.keys().collect();
    dirs.sort();
    for dir in dirs {
        lines.push(format!("### `{dir}/`"));
        let mut dir_files = by_dir[dir].clone();
        dir_files.sort_by(|a, b| a.path.cmp(&b.path));
        for f in dir_files {
            let name = f.path.rsplit('/').next().unwrap_or(&f.path);
            lines.push(format!(
                "- `{name}` ({}, ~{} lines)",
                f.change_type(),
                f.total_changes()
            ));
        }
        lines.push(String::new());
    }

    let added = files.iter().filter(|f| f.new_file).count();
    let deleted = files.iter().filter(|f| f.deleted_file).count();
    let modified = files.iter().filter(|f| !f.new_file && !f.deleted_file).count();
    let total_changes: usize = files.iter().map(|f| f.total_changes()).sum();

    lines.push("### Statistics".to_string());
    lines.push(format!("- **Total files**: {}", files.len()));
    lines.push(format!("- **Added**: {added}"));
    lines.push(format!("- **Deleted**: {deleted}"));
    lines.push(format!("- **Modified**: {modified}"));
    lines.push(format!("- **Total line changes**: ~{total_changes}"));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(path: &str, diff: &str) -> ChangedFile {
        ChangedFile::new(
            path.to_string(),
            path.to_string(),
            false,
            false,
            false,
            diff.to_string(),
        )
    }

    fn diff_with_changes(n: usize) -> String {
        let mut s = String::from("@@ -1,1 +1,1 @@\n");
        for i in 0..n {
            s.push_str(&format!("+line {i}\n"));
        }
        s
    }

    #[test]
    fn test_priority_critical_path_counts_once() {
        // Matches both the auth and permission patterns; boost applies once.
        let f = make_file("src/auth/policy.rs", &diff_with_changes(20));
        // 10 critical + 3 ext + 3 sweet spot = 16
        assert_eq!(file_priority(&f), 16.0);
    }

    #[test]
    fn test_priority_vendor_is_negative() {
        let f = make_file("vendor/lib/util.js", &diff_with_changes(20));
        assert!(file_priority(&f) < 0.0);
    }

    #[test]
    fn test_priority_generated_penalty() {
        let minified = make_file("app.min.js", &diff_with_changes(20));
        let plain = make_file("app.js", &diff_with_changes(20));
        assert_eq!(file_priority(&minified), file_priority(&plain) - 10.0);
    }

    #[test]
    fn test_priority_new_and_deleted() {
        let mut f = make_file("src/thing.go", &diff_with_changes(5));
        let base = file_priority(&f);
        f.new_file = true;
        assert_eq!(file_priority(&f), base + 2.0);
        f.new_file = false;
        f.deleted_file = true;
        assert_eq!(file_priority(&f), base + 1.0);
    }

    #[test]
    fn test_priority_change_volume_bands() {
        let sweet = make_file("a.md", &diff_with_changes(50));
        let large = make_file("b.md", &diff_with_changes(200));
        let small = make_file("c.md", &diff_with_changes(3));
        let empty = make_file("d.md", "");
        assert_eq!(file_priority(&sweet), 3.0);
        assert_eq!(file_priority(&large), 1.0);
        assert_eq!(file_priority(&small), 0.5);
        assert_eq!(file_priority(&empty), 0.0);
    }

    #[test]
    fn test_priority_test_file_boost() {
        let f = make_file("src/lib_test.md", &diff_with_changes(3));
        assert_eq!(file_priority(&f), 0.5 + 1.5);
    }

    #[test]
    fn test_priority_is_deterministic() {
        let f = make_file("src/auth/handler.py", &diff_with_changes(42));
        assert_eq!(file_priority(&f), file_priority(&f));
    }

    #[test]
    fn test_skip_binary_first() {
        let mut f = make_file("vendor/blob.bin", "Binary files differ");
        f.is_binary = true;
        // Binary wins over the vendor marker.
        assert_eq!(skip_reason(&f).as_deref(), Some("binary file"));
    }

    #[test]
    fn test_skip_vendor_marker_named() {
        let f = make_file("node_modules/x/index.js", &diff_with_changes(2));
        assert_eq!(skip_reason(&f).as_deref(), Some("node_modules"));
    }

    #[test]
    fn test_skip_lock_file() {
        let f = make_file("Cargo.lock", &diff_with_changes(2));
        assert_eq!(skip_reason(&f).as_deref(), Some("lock file"));
    }

    #[test]
    fn test_skip_oversized_diff() {
        let f = make_file("src/gen.rs", &diff_with_changes(1001));
        assert_eq!(
            skip_reason(&f).as_deref(),
            Some("diff too large (>1000 lines)")
        );
    }

    #[test]
    fn test_skip_empty_diff() {
        let f = make_file("src/empty.rs", "   \n  ");
        assert_eq!(skip_reason(&f).as_deref(), Some("empty diff"));
    }

    #[test]
    fn test_no_skip_for_normal_file() {
        let f = make_file("src/ok.rs", &diff_with_changes(10));
        assert!(skip_reason(&f).is_none());
    }

    #[test]
    fn test_plan_empty_input() {
        let plan = create_review_plan(vec![], 10, 1000);
        assert!(plan.files_to_review.is_empty());
        assert!(plan.skipped_files.is_empty());
        assert_eq!(plan.total_files, 0);
        assert_eq!(plan.estimated_tokens, 0);
    }

    #[test]
    fn test_plan_every_path_exactly_once() {
        let files = vec![
            make_file("src/a.rs", &diff_with_changes(20)),
            make_file("vendor/b.js", &diff_with_changes(20)),
            make_file("src/c.rs", &diff_with_changes(20)),
        ];
        let plan = create_review_plan(files, 10, 100_000);
        let mut all: Vec<String> = plan
            .files_to_review
            .iter()
            .map(|f| f.path.clone())
            .chain(plan.skipped_files.iter().cloned())
            .collect();
        all.sort();
        assert_eq!(all, vec!["src/a.rs", "src/c.rs", "vendor/b.js"]);
        for path in &plan.skipped_files {
            assert!(plan.skip_reasons.contains_key(path));
        }
    }

    #[test]
    fn test_plan_max_files_limit() {
        let files = (0..5)
            .map(|i| make_file(&format!("src/f{i}.rs"), &diff_with_changes(20)))
            .collect();
        let plan = create_review_plan(files, 2, 100_000);
        assert_eq!(plan.files_to_review.len(), 2);
        assert_eq!(plan.skipped_files.len(), 3);
        for path in &plan.skipped_files {
            assert_eq!(plan.skip_reasons[path], "max files limit reached");
        }
    }

    #[test]
    fn test_plan_max_chars_limit() {
        let files = vec![
            make_file("a.rs", &diff_with_changes(20)),
            make_file("b.rs", &diff_with_changes(20)),
        ];
        let one_diff_len = files[0].diff.len();
        let plan = create_review_plan(files, 10, one_diff_len + 1);
        assert_eq!(plan.files_to_review.len(), 1);
        assert_eq!(plan.skipped_files.len(), 1);
        assert_eq!(
            plan.skip_reasons[&plan.skipped_files[0]],
            "max chars limit reached"
        );
        assert!(plan.total_chars <= one_diff_len + 1);
    }

    #[test]
    fn test_plan_single_file_overflow_admitted() {
        // A lone candidate bigger than the char budget is still admitted.
        let files = vec![make_file("big.rs", &diff_with_changes(500))];
        let plan = create_review_plan(files, 10, 10);
        assert_eq!(plan.files_to_review.len(), 1);
        assert!(plan.total_chars > 10);
    }

    #[test]
    fn test_plan_priority_order_and_stable_ties() {
        let files = vec![
            make_file("readme.md", &diff_with_changes(50)), // 3.0
            make_file("notes.md", &diff_with_changes(50)),  // 3.0, after readme
            make_file("src/auth.rs", &diff_with_changes(50)), // highest
        ];
        let plan = create_review_plan(files, 10, 1_000_000);
        assert_eq!(
            plan.priority_order,
            vec!["src/auth.rs", "readme.md", "notes.md"]
        );
    }

    #[test]
    fn test_plan_estimated_tokens() {
        let files = vec![make_file("a.rs", &diff_with_changes(20))];
        let diff_len = files[0].diff.len();
        let plan = create_review_plan(files, 10, 100_000);
        assert_eq!(plan.estimated_tokens, diff_len / 4);
    }

    #[test]
    fn test_plan_all_files_skipped_is_not_an_error() {
        let files = vec![
            make_file("vendor/a.js", &diff_with_changes(5)),
            make_file("b.min.js", &diff_with_changes(5)),
        ];
        let plan = create_review_plan(files, 10, 100_000);
        assert!(plan.files_to_review.is_empty());
        assert_eq!(plan.skipped_files.len(), 2);
    }

    #[test]
    fn test_plan_summary_lists_skips() {
        let files = vec![make_file("vendor/a.js", &diff_with_changes(5))];
        let plan = create_review_plan(files, 10, 100_000);
        let summary = plan.summary();
        assert!(summary.contains("0/1 files"));
        assert!(summary.contains("vendor/a.js: vendored dependency"));
    }

    #[test]
    fn test_hotspots_security_and_todo() {
        let files = vec![
            make_file("src/auth.rs", "@@ -1,1 +1,1 @@\n+// TODO revisit\n"),
            make_file("src/plain.rs", &diff_with_changes(2)),
        ];
        let spots = identify_hotspots(&files);
        let reasons: Vec<&str> = spots
            .iter()
            .filter(|(p, _)| p == "src/auth.rs")
            .map(|(_, r)| r.as_str())
            .collect();
        assert!(reasons.contains(&"security-sensitive file"));
        assert!(reasons.contains(&"contains TODO/FIXME/HACK"));
        assert!(!spots.iter().any(|(p, _)| p == "src/plain.rs"));
    }

    #[test]
    fn test_hotspots_config_requires_config_path() {
        let files = vec![
            make_file("config/settings.yaml", &diff_with_changes(2)),
            make_file("data/fixtures.yaml", &diff_with_changes(2)),
        ];
        let spots = identify_hotspots(&files);
        assert!(
            spots
                .iter()
                .any(|(p, r)| p == "config/settings.yaml" && r == "configuration change")
        );
        assert!(
            !spots
                .iter()
                .any(|(p, r)| p == "data/fixtures.yaml" && r == "configuration change")
        );
    }

    #[test]
    fn test_summarize_changes_groups_and_counts() {
        let mut new = make_file("src/new.rs", &diff_with_changes(4));
        new.new_file = true;
        let files = vec![new, make_file("docs/readme.md", &diff_with_changes(2))];
        let summary = summarize_changes(&files);
        assert!(summary.contains("### `src/`"));
        assert!(summary.contains("### `docs/`"));
        assert!(summary.contains("`new.rs` (added"));
        assert!(summary.contains("- **Added**: 1"));
        assert!(summary.contains("- **Total files**: 2"));
    }
}

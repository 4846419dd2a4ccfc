use crate::models::{ChangedFile, Hunk};
use crate::plan::file_priority;

/// A size-bounded, hunk-aligned slice of one file's diff. Hunks across all
/// chunks of a file, taken in `chunk_index` order, reproduce the file's
/// hunk sequence exactly.
#[derive(Debug)]
pub struct Chunk<'a> {
    pub file: &'a ChangedFile,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub content: String,
    pub hunks: Vec<&'a Hunk>,
    pub priority_score: f64,
    pub char_count: usize,
}

// Candidate built during packing; the chunk count is only known once all
// candidates exist, so finalization happens in a second pass.
struct Draft<'a> {
    content: String,
    hunks: Vec<&'a Hunk>,
}

fn format_hunks(hunks: &[&Hunk]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(hunks.len() * 2);
    for hunk in hunks {
        let mut header = format!(
            "@@ -{},{} +{},{} @@",
            hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines
        );
        if !hunk.header.is_empty() {
            header.push(' ');
            header.push_str(&hunk.header);
        }
        parts.push(header);
        parts.push(hunk.content.clone());
    }
    parts.join("\n")
}

/// Split a file's diff into hunk-aligned chunks of at most `max_chunk_chars`
/// each. Files with no parsed hunks, or diffs already within the budget,
/// come back as a single chunk. A hunk that alone exceeds the budget is
/// never split; it becomes a singleton chunk.
pub fn chunk_diff(file: &ChangedFile, max_chunk_chars: usize) -> Vec<Chunk<'_>> {
    let priority = file_priority(file);

    if file.hunks.is_empty() || file.diff.len() <= max_chunk_chars {
        return vec![Chunk {
            file,
            chunk_index: 0,
            total_chunks: 1,
            content: file.diff.clone(),
            hunks: file.hunks.iter().collect(),
            priority_score: priority,
            char_count: file.diff.len(),
        }];
    }

    let mut drafts: Vec<Draft<'_>> = Vec::new();
    let mut current: Vec<&Hunk> = Vec::new();
    let mut current_chars = 0usize;

    for hunk in &file.hunks {
        let hunk_chars = hunk.content.len();

        if !current.is_empty() && current_chars + hunk_chars > max_chunk_chars {
            drafts.push(Draft {
                content: format_hunks(&current),
                hunks: std::mem::take(&mut current),
            });
            current_chars = 0;
        }

        current.push(hunk);
        current_chars += hunk_chars;
    }

    if !current.is_empty() {
        drafts.push(Draft {
            content: format_hunks(&current),
            hunks: current,
        });
    }

    let total = drafts.len();
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            let char_count = draft.content.len();
            Chunk {
                file,
                chunk_index: index,
                total_chunks: total,
                content: draft.content,
                hunks: draft.hunks,
                priority_score: priority,
                char_count,
            }
        })
        .collect()
}

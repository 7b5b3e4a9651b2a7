use std::fmt::Write;

use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};

use crate::client::Twoday;
use crate::skins::SkinOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffTag {
    Added,
    Removed,
    Unchanged,
}

/// A run of consecutive lines sharing one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffChunk {
    pub tag: DiffTag,
    pub value: String,
}

/// Line-based diff of one field value.
#[derive(Clone, Debug)]
pub struct DiffResult {
    pub changed: bool,
    pub header: String,
    /// Color-rendered report, one line per diffed line.
    pub text: String,
    pub chunks: Vec<DiffChunk>,
}

/// Outcome of diffing a whole skin, field by field.
#[derive(Clone, Debug)]
pub struct DiffOutcome {
    pub skin_changed: bool,
    pub results: Vec<DiffResult>,
}

/// Diffs two field values line by line. Deterministic and pure: identical
/// inputs yield an unchanged result with a single equal chunk.
pub fn eval_diff(header: &str, old: &str, new: &str) -> DiffResult {
    let diff = TextDiff::from_lines(old, new);

    let mut chunks: Vec<DiffChunk> = Vec::new();
    let mut text = String::new();

    for change in diff.iter_all_changes() {
        let (tag, marker) = match change.tag() {
            ChangeTag::Insert => (DiffTag::Added, "+"),
            ChangeTag::Delete => (DiffTag::Removed, "-"),
            ChangeTag::Equal => (DiffTag::Unchanged, " "),
        };

        let value = change.value();
        let line = format!("{marker} {}", value.trim_end_matches('\n'));
        match tag {
            DiffTag::Added => writeln!(text, "{}", line.green()),
            DiffTag::Removed => writeln!(text, "{}", line.red()),
            DiffTag::Unchanged => writeln!(text, "{}", line.dimmed()),
        }
        .expect("writing to string");

        match chunks.last_mut() {
            Some(chunk) if chunk.tag == tag => chunk.value.push_str(value),
            _ => chunks.push(DiffChunk {
                tag,
                value: value.to_string(),
            }),
        }
    }

    let changed = chunks.iter().any(|c| c.tag != DiffTag::Unchanged);
    let text = if changed {
        format!("{} changed:\n{text}", format!("[{header}]").cyan())
    } else {
        format!("{}", format!("[{header}] is unchanged.").dimmed())
    };

    DiffResult {
        changed,
        header: header.to_string(),
        text,
        chunks,
    }
}

impl Twoday {
    /// Diffs the content fields of two skin option sets and reports each
    /// field on stdout (unless silent). Missing fields diff as empty.
    pub fn diff_skin(&self, skin_name: &str, old: &SkinOptions, new: &SkinOptions) -> DiffOutcome {
        let fields = [
            ("title", &old.title, &new.title),
            ("description", &old.description, &new.description),
            ("skin", &old.skin, &new.skin),
        ];

        let mut results = Vec::new();
        for (field, old_value, new_value) in fields {
            let header = format!("{field} of {skin_name}");
            let result = eval_diff(
                &header,
                old_value.as_deref().unwrap_or_default(),
                new_value.as_deref().unwrap_or_default(),
            );
            self.log(&result.text);
            results.push(result);
        }

        DiffOutcome {
            skin_changed: results.iter().any(|r| r.changed),
            results,
        }
    }
}

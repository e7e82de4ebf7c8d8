//! Version diffing.
//!
//! Status level first (size + SHA-256), then a unified-format line diff for
//! text content. Binary content is summarized, never line-diffed; the same
//! goes for pathological line counts where the LCS table would not fit.

use crate::store::{BackupEntry, BackupStore};
use crate::utils::errors::Result;
use crate::utils::fsio;
use std::path::PathBuf;

/// How the newer side relates to the older side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Unchanged,
    Modified,
    /// The newer side (usually the working file) no longer exists
    Missing,
}

#[derive(Debug)]
pub struct DiffReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub old_label: String,
    pub new_label: String,
    pub old_size: u64,
    pub new_size: Option<u64>,
    /// Unified line diff; None when unchanged, missing, or not text
    pub unified: Option<String>,
}

/// Diff a stored version against the current working file.
pub async fn diff_against_current(store: &BackupStore, entry: &BackupEntry) -> Result<DiffReport> {
    let path = entry.record.original_path.clone();
    let old_label = format!("{} ({})", path.display(), entry.stem());
    let new_label = format!("{} (current)", path.display());

    let old = store.read_content(entry).await?;

    if !path.exists() {
        return Ok(DiffReport {
            path,
            status: FileStatus::Missing,
            old_label,
            new_label,
            old_size: entry.record.size,
            new_size: None,
            unified: None,
        });
    }

    let deadline = store.io_deadline();
    let new = fsio::read_file(&path, &deadline).await?;
    Ok(build_report(path, old_label, new_label, &old, &new))
}

/// Diff two stored versions of the same file (older first).
pub async fn diff_versions(
    store: &BackupStore,
    old_entry: &BackupEntry,
    new_entry: &BackupEntry,
) -> Result<DiffReport> {
    let path = new_entry.record.original_path.clone();
    let old_label = format!("{} ({})", path.display(), old_entry.stem());
    let new_label = format!("{} ({})", path.display(), new_entry.stem());

    let old = store.read_content(old_entry).await?;
    let new = store.read_content(new_entry).await?;
    Ok(build_report(path, old_label, new_label, &old, &new))
}

fn build_report(
    path: PathBuf,
    old_label: String,
    new_label: String,
    old: &[u8],
    new: &[u8],
) -> DiffReport {
    let status = if old == new {
        FileStatus::Unchanged
    } else {
        FileStatus::Modified
    };

    let unified = if status == FileStatus::Modified && !is_binary(old) && !is_binary(new) {
        match (std::str::from_utf8(old), std::str::from_utf8(new)) {
            (Ok(old_text), Ok(new_text)) => {
                unified_diff(old_text, new_text, &old_label, &new_label, 3)
            }
            _ => None,
        }
    } else {
        None
    };

    DiffReport {
        path,
        status,
        old_label,
        new_label,
        old_size: old.len() as u64,
        new_size: Some(new.len() as u64),
        unified,
    }
}

/// NUL byte in the first 8 KiB marks content as binary.
pub fn is_binary(data: &[u8]) -> bool {
    data.iter().take(8192).any(|&b| b == 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffOp {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// LCS tables above this many cells are not worth building for a
/// human-facing diff.
const MAX_LCS_CELLS: usize = 4_000_000;

/// Render a unified diff with `context` lines around each change.
/// Returns None when the inputs are equal or too large to line-diff.
pub fn unified_diff(
    old_text: &str,
    new_text: &str,
    old_label: &str,
    new_label: &str,
    context: usize,
) -> Option<String> {
    let old: Vec<&str> = old_text.lines().collect();
    let new: Vec<&str> = new_text.lines().collect();
    if old == new {
        return None;
    }

    let ops = diff_ops(&old, &new)?;

    // Positions of non-equal ops, grouped into hunk ranges that merge when
    // their context windows touch
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        if matches!(op, DiffOp::Equal(_, _)) {
            continue;
        }
        match ranges.last_mut() {
            Some((_, end)) if i <= *end + 2 * context + 1 => *end = i,
            _ => ranges.push((i, i)),
        }
    }
    if ranges.is_empty() {
        return None;
    }

    // Running (old, new) line counts before each op
    let mut pos = Vec::with_capacity(ops.len() + 1);
    let mut old_line = 0usize;
    let mut new_line = 0usize;
    for op in &ops {
        pos.push((old_line, new_line));
        match op {
            DiffOp::Equal(_, _) => {
                old_line += 1;
                new_line += 1;
            }
            DiffOp::Delete(_) => old_line += 1,
            DiffOp::Insert(_) => new_line += 1,
        }
    }
    pos.push((old_line, new_line));

    let mut out = String::new();
    out.push_str(&format!("--- {}\n", old_label));
    out.push_str(&format!("+++ {}\n", new_label));

    for (start, end) in ranges {
        let from = start.saturating_sub(context);
        let to = (end + context).min(ops.len() - 1);

        let mut old_count = 0usize;
        let mut new_count = 0usize;
        let mut body = String::new();
        for op in &ops[from..=to] {
            match op {
                DiffOp::Equal(i, _) => {
                    body.push(' ');
                    body.push_str(old[*i]);
                    old_count += 1;
                    new_count += 1;
                }
                DiffOp::Delete(i) => {
                    body.push('-');
                    body.push_str(old[*i]);
                    old_count += 1;
                }
                DiffOp::Insert(j) => {
                    body.push('+');
                    body.push_str(new[*j]);
                    new_count += 1;
                }
            }
            body.push('\n');
        }

        let old_start = if old_count > 0 { pos[from].0 + 1 } else { pos[from].0 };
        let new_start = if new_count > 0 { pos[from].1 + 1 } else { pos[from].1 };
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start, old_count, new_start, new_count
        ));
        out.push_str(&body);
    }

    Some(out)
}

/// Line-level edit script via an LCS length table and backtrack walk.
fn diff_ops(old: &[&str], new: &[&str]) -> Option<Vec<DiffOp>> {
    let m = old.len();
    let n = new.len();
    if m.saturating_mul(n) > MAX_LCS_CELLS {
        return None;
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let width = n + 1;
    let mut lcs = vec![0usize; (m + 1) * width];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            lcs[i * width + j] = if old[i] == new[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(m.max(n));
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if old[i] == new[j] {
            ops.push(DiffOp::Equal(i, j));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            ops.push(DiffOp::Delete(i));
            i += 1;
        } else {
            ops.push(DiffOp::Insert(j));
            j += 1;
        }
    }
    while i < m {
        ops.push(DiffOp::Delete(i));
        i += 1;
    }
    while j < n {
        ops.push(DiffOp::Insert(j));
        j += 1;
    }

    Some(ops)
}

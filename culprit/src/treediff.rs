use std::collections::BTreeMap;

use gix::{
    bstr::{BStr, BString, ByteVec},
    diff::blob::{diff, intern::InternedInput, Algorithm, Sink},
    objs::tree::EntryMode,
    ObjectId, Repository,
};

use crate::error::Result;

/// Renames with at least this share of common lines are considered the same
/// file.
const SIMILARITY_FLOOR: f32 = 0.5;

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TreeDiffOptions {
    pub detect_renames: bool,
    pub detect_copies: bool,
    pub find_copies_harder: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EditKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

/// One file-level edit between two trees. `src` is the old side, `dst` the
/// new side; additions have no `src`, deletions no `dst`.
#[derive(Clone, Debug)]
pub(crate) struct Edit {
    pub kind: EditKind,
    pub src: Option<(BString, ObjectId)>,
    pub dst: Option<(BString, ObjectId)>,
}

/// Diff two trees recursively into a flat list of blob edits, optionally
/// pairing additions with deletions (renames) or with any old-side blob
/// (copies). Identical subtrees are skipped wholesale.
pub(crate) fn tree_diff(
    repo: &Repository,
    old_tree: Option<ObjectId>,
    new_tree: Option<ObjectId>,
    opts: TreeDiffOptions,
) -> Result<Vec<Edit>> {
    let mut edits = Vec::new();
    collect(repo, old_tree, new_tree, BString::default(), &mut edits)?;
    if opts.detect_renames {
        pair_renames(repo, &mut edits)?;
    }
    if opts.detect_copies {
        pair_copies(repo, old_tree, opts.find_copies_harder, &mut edits)?;
    }
    Ok(edits)
}

/// Every blob under `tree`, as `(path, id)` with slash-joined paths.
pub(crate) fn all_blobs(repo: &Repository, tree: ObjectId) -> Result<Vec<(BString, ObjectId)>> {
    let mut out = Vec::new();
    walk_blobs(repo, tree, BString::default(), &mut out)?;
    Ok(out)
}

fn join(prefix: &BStr, name: &BStr) -> BString {
    let mut path = prefix.to_owned();
    if !path.is_empty() {
        path.push_byte(b'/');
    }
    path.push_str(name);
    path
}

fn walk_blobs(
    repo: &Repository,
    tree: ObjectId,
    prefix: BString,
    out: &mut Vec<(BString, ObjectId)>,
) -> Result<()> {
    for (name, (mode, id)) in entries_of(repo, Some(tree))? {
        let path = join(prefix.as_ref(), name.as_ref());
        if mode.is_tree() {
            walk_blobs(repo, id, path, out)?;
        } else if mode.is_blob() {
            out.push((path, id));
        }
    }
    Ok(())
}

type Entries = BTreeMap<BString, (EntryMode, ObjectId)>;

fn entries_of(repo: &Repository, tree: Option<ObjectId>) -> Result<Entries> {
    let mut entries = Entries::new();
    let Some(tree) = tree else {
        return Ok(entries);
    };
    let tree = repo.find_object(tree)?.peel_to_tree()?;
    for entry in tree.iter() {
        let entry = entry?;
        entries.insert(
            entry.filename().to_owned(),
            (entry.mode(), entry.object_id()),
        );
    }
    Ok(entries)
}

fn collect(
    repo: &Repository,
    old_tree: Option<ObjectId>,
    new_tree: Option<ObjectId>,
    prefix: BString,
    edits: &mut Vec<Edit>,
) -> Result<()> {
    let old_entries = entries_of(repo, old_tree)?;
    let mut new_entries = entries_of(repo, new_tree)?;

    for (name, (old_mode, old_id)) in old_entries {
        let path = join(prefix.as_ref(), name.as_ref());
        match new_entries.remove(&name) {
            Some((new_mode, new_id)) => {
                if old_id == new_id && old_mode.is_tree() == new_mode.is_tree() {
                    continue;
                }
                match (old_mode.is_tree(), new_mode.is_tree()) {
                    (true, true) => collect(repo, Some(old_id), Some(new_id), path, edits)?,
                    (false, false) => {
                        if old_mode.is_blob() && new_mode.is_blob() {
                            edits.push(Edit {
                                kind: EditKind::Modified,
                                src: Some((path.clone(), old_id)),
                                dst: Some((path, new_id)),
                            });
                        }
                    }
                    (true, false) => {
                        delete_all(repo, old_id, path.clone(), edits)?;
                        if new_mode.is_blob() {
                            edits.push(Edit {
                                kind: EditKind::Added,
                                src: None,
                                dst: Some((path, new_id)),
                            });
                        }
                    }
                    (false, true) => {
                        if old_mode.is_blob() {
                            edits.push(Edit {
                                kind: EditKind::Deleted,
                                src: Some((path.clone(), old_id)),
                                dst: None,
                            });
                        }
                        add_all(repo, new_id, path, edits)?;
                    }
                }
            }
            None => {
                if old_mode.is_tree() {
                    delete_all(repo, old_id, path, edits)?;
                } else if old_mode.is_blob() {
                    edits.push(Edit {
                        kind: EditKind::Deleted,
                        src: Some((path, old_id)),
                        dst: None,
                    });
                }
            }
        }
    }
    for (name, (mode, id)) in new_entries {
        let path = join(prefix.as_ref(), name.as_ref());
        if mode.is_tree() {
            add_all(repo, id, path, edits)?;
        } else if mode.is_blob() {
            edits.push(Edit {
                kind: EditKind::Added,
                src: None,
                dst: Some((path, id)),
            });
        }
    }
    Ok(())
}

fn delete_all(
    repo: &Repository,
    tree: ObjectId,
    prefix: BString,
    edits: &mut Vec<Edit>,
) -> Result<()> {
    let mut blobs = Vec::new();
    walk_blobs(repo, tree, prefix, &mut blobs)?;
    edits.extend(blobs.into_iter().map(|(path, id)| Edit {
        kind: EditKind::Deleted,
        src: Some((path, id)),
        dst: None,
    }));
    Ok(())
}

fn add_all(
    repo: &Repository,
    tree: ObjectId,
    prefix: BString,
    edits: &mut Vec<Edit>,
) -> Result<()> {
    let mut blobs = Vec::new();
    walk_blobs(repo, tree, prefix, &mut blobs)?;
    edits.extend(blobs.into_iter().map(|(path, id)| Edit {
        kind: EditKind::Added,
        src: None,
        dst: Some((path, id)),
    }));
    Ok(())
}

/// Pair additions with deletions: exact blob matches first, then the most
/// similar deleted blob above the similarity floor. Matched pairs collapse
/// into a single `Renamed` edit.
fn pair_renames(repo: &Repository, edits: &mut Vec<Edit>) -> Result<()> {
    let mut deleted: Vec<usize> = (0..edits.len())
        .filter(|&i| edits[i].kind == EditKind::Deleted)
        .collect();

    for i in 0..edits.len() {
        if edits[i].kind != EditKind::Added || deleted.is_empty() {
            continue;
        }
        let (_, new_id) = edits[i].dst.clone().expect("additions have a new side");

        let exact = deleted
            .iter()
            .position(|&d| edits[d].src.as_ref().expect("deletions have an old side").1 == new_id);
        let matched = match exact {
            Some(pos) => Some(pos),
            None => {
                let mut best: Option<(usize, f32)> = None;
                for (pos, &d) in deleted.iter().enumerate() {
                    let old_id = edits[d].src.as_ref().expect("deletions have an old side").1;
                    let score = similarity(repo, old_id, new_id)?;
                    if score >= SIMILARITY_FLOOR
                        && best.map_or(true, |(_, best_score)| score > best_score)
                    {
                        best = Some((pos, score));
                    }
                }
                best.map(|(pos, _)| pos)
            }
        };

        if let Some(pos) = matched {
            let d = deleted.swap_remove(pos);
            let src = edits[d].src.take();
            edits[i].kind = EditKind::Renamed;
            edits[i].src = src;
        }
    }
    // drop deletions that were absorbed into renames
    edits.retain(|e| !(e.kind == EditKind::Deleted && e.src.is_none()));
    Ok(())
}

/// Pair remaining additions with identical old-side blobs. Without
/// `find_copies_harder` only blobs already part of the change set are
/// candidate sources; with it, every blob in the old tree is.
fn pair_copies(
    repo: &Repository,
    old_tree: Option<ObjectId>,
    find_copies_harder: bool,
    edits: &mut Vec<Edit>,
) -> Result<()> {
    let sources: Vec<(BString, ObjectId)> = if find_copies_harder {
        match old_tree {
            Some(tree) => all_blobs(repo, tree)?,
            None => Vec::new(),
        }
    } else {
        edits
            .iter()
            .filter_map(|e| e.src.clone())
            .collect()
    };

    for edit in edits.iter_mut() {
        if edit.kind != EditKind::Added {
            continue;
        }
        let (_, new_id) = edit.dst.as_ref().expect("additions have a new side");
        if let Some(source) = sources.iter().find(|(_, id)| id == new_id) {
            edit.kind = EditKind::Copied;
            edit.src = Some(source.clone());
        }
    }
    Ok(())
}

/// Share of common lines between two blobs, in `0.0..=1.0`.
fn similarity(repo: &Repository, old_id: ObjectId, new_id: ObjectId) -> Result<f32> {
    let old = repo.find_object(old_id)?.detach().data;
    let new = repo.find_object(new_id)?.detach().data;
    let input = InternedInput::new(old.as_slice(), new.as_slice());
    let (removed, inserted) = diff(Algorithm::Histogram, &input, ChangeCounter::default());
    let before_len = input.before.len() as u32;
    let after_len = input.after.len() as u32;
    let longest = before_len.max(after_len);
    if longest == 0 {
        return Ok(1.0);
    }
    let common = before_len - removed.min(before_len);
    debug_assert_eq!(common, after_len - inserted.min(after_len));
    Ok(common as f32 / longest as f32)
}

#[derive(Default)]
struct ChangeCounter {
    removed: u32,
    inserted: u32,
}

impl Sink for ChangeCounter {
    type Out = (u32, u32);

    fn process_change(&mut self, before: std::ops::Range<u32>, after: std::ops::Range<u32>) {
        self.removed += before.len() as u32;
        self.inserted += after.len() as u32;
    }

    fn finish(self) -> Self::Out {
        (self.removed, self.inserted)
    }
}

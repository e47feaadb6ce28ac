use std::rc::Rc;

use gix::{
    bstr::{BStr, BString},
    ObjectId,
};

use crate::{
    error::Result,
    scoreboard::Scoreboard,
    treediff::{self, EditKind, TreeDiffOptions},
};

/// One blob in one commit's tree.
///
/// Origins are interned per `(commit, path)` in the scoreboard and shared by
/// any number of blame entries, so equality deliberately ignores the blob id.
#[derive(Debug, Eq)]
pub struct Origin {
    pub commit: ObjectId,
    pub path: BString,
    pub blob: ObjectId,
}

impl PartialEq for Origin {
    fn eq(&self, other: &Self) -> bool {
        self.commit == other.commit && self.path == other.path
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.commit.to_hex_with_len(8), self.path)
    }
}

/// Look up the blob for `path` in `commit`'s tree, interning the result.
///
/// Lookup failures degrade to `None`: a parent without the path simply
/// cannot take the blame.
pub(crate) fn find_origin(
    sb: &mut Scoreboard<'_>,
    commit: ObjectId,
    path: &BStr,
) -> Result<Option<Rc<Origin>>> {
    if let Some(origin) = sb.origins.get(&(commit, path.to_owned())) {
        return Ok(Some(origin.clone()));
    }

    let Ok(tree) = sb
        .repo
        .find_object(commit)
        .map_err(crate::Error::from)
        .and_then(|obj| obj.peel_to_tree().map_err(crate::Error::from))
    else {
        return Ok(None);
    };
    let mut lookup_buf = Vec::new();
    let Ok(Some(entry)) = tree.lookup_entry_by_path(gix::path::from_bstr(path), &mut lookup_buf)
    else {
        return Ok(None);
    };
    if !entry.mode().is_blob() {
        return Ok(None);
    }
    let blob = entry.object_id();
    match sb.repo.find_header(blob) {
        Ok(header) if header.kind() == gix::object::Kind::Blob => {}
        _ => return Ok(None),
    }

    let origin = Rc::new(Origin {
        commit,
        path: path.to_owned(),
        blob,
    });
    sb.origins
        .insert((commit, path.to_owned()), origin.clone());
    Ok(Some(origin))
}

/// Follow a rename across one parent: diff the parent's tree against the
/// target's with rename detection and pick the first rename or copy whose
/// destination is the target's path.
pub(crate) fn find_rename(
    sb: &mut Scoreboard<'_>,
    parent: ObjectId,
    target: &Origin,
) -> Result<Option<Rc<Origin>>> {
    let (Ok(parent_tree), Ok(target_tree)) = (sb.tree_of(parent), sb.tree_of(target.commit))
    else {
        return Ok(None);
    };
    let edits = treediff::tree_diff(
        sb.repo,
        Some(parent_tree),
        Some(target_tree),
        TreeDiffOptions {
            detect_renames: true,
            ..Default::default()
        },
    )?;
    for edit in &edits {
        if matches!(edit.kind, EditKind::Renamed | EditKind::Copied)
            && edit.dst.as_ref().is_some_and(|(path, _)| *path == target.path)
        {
            let (src_path, _) = edit.src.as_ref().expect("renames and copies have a source");
            let src_path = src_path.clone();
            tracing::debug!(path = %target, source = %src_path, "followed rename");
            return find_origin(sb, parent, src_path.as_ref());
        }
    }
    Ok(None)
}

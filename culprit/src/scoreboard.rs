use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use gix::{
    bstr::{BStr, BString},
    ObjectId, Repository,
};
use smallvec::SmallVec;

use crate::{
    entry::{BlameEntry, Partitions},
    error::{Error, Result},
    lines::LineIndex,
    origin::{self, Origin},
};

/// The reference machinery never considers more parents than this.
pub(crate) const MAX_PARENTS: usize = 16;

/// Tunables for one blame run.
#[derive(Clone, Debug, Default)]
pub struct BlameOptions {
    /// Detect lines moved within a file; entries score at least this much
    /// before they are handed to a parent. `None` disables the search.
    pub move_score: Option<u32>,
    /// Detect lines copied from other files in a parent's tree.
    pub copy_score: Option<u32>,
    /// Consider every file in the parent tree as a copy source, not just
    /// the ones touched by the commit.
    pub copy_harder: bool,
    /// Do not dig into commits older than this (unix seconds).
    pub max_age: Option<i64>,
    /// Restrict blame to an inclusive 1-based line range.
    pub range: Option<(u32, u32)>,
}

/// All state for one blame run: the final file, its line index, the
/// partition sequence, and the interned origins shared by the entries.
pub struct Scoreboard<'a> {
    pub(crate) repo: &'a Repository,
    pub(crate) final_commit: ObjectId,
    pub(crate) path: BString,
    pub(crate) final_buf: Vec<u8>,
    pub(crate) lines: LineIndex,
    pub(crate) ents: Partitions,
    pub(crate) origins: HashMap<(ObjectId, BString), Rc<Origin>>,
    pub(crate) opts: BlameOptions,
    pub(crate) uninteresting: HashSet<ObjectId>,
    pub(crate) grafts: HashMap<ObjectId, Vec<ObjectId>>,
}

impl<'a> Scoreboard<'a> {
    /// Set up a blame of `path` as of `final_commit`. Fails if the path does
    /// not name a blob in that commit's tree, or if the requested line range
    /// reaches past the end of the file.
    pub fn new(
        repo: &'a Repository,
        final_commit: ObjectId,
        path: &BStr,
        opts: BlameOptions,
    ) -> Result<Self> {
        let mut sb = Scoreboard {
            repo,
            final_commit,
            path: path.to_owned(),
            final_buf: Vec::new(),
            lines: LineIndex::new(b""),
            ents: Partitions::default(),
            origins: HashMap::new(),
            opts,
            uninteresting: HashSet::new(),
            grafts: HashMap::new(),
        };

        let Some(origin) = origin::find_origin(&mut sb, final_commit, path)? else {
            return Err(Error::NoSuchPath {
                path: path.to_owned(),
                commit: final_commit,
            });
        };
        sb.final_buf = sb.read_blob(origin.blob)?;
        sb.lines = LineIndex::new(&sb.final_buf);

        let line_count = sb.lines.line_count();
        let (bottom, top) = match sb.opts.range {
            None => (0, line_count),
            Some((a, b)) => {
                let (bottom, top) = if b < a { (b, a) } else { (a, b) };
                if line_count < top {
                    return Err(Error::FileTooShort {
                        lines: line_count,
                        requested: top,
                    });
                }
                (bottom.max(1) - 1, top)
            }
        };
        if top > bottom {
            sb.ents = Partitions::new(BlameEntry::new(bottom, top - bottom, origin, bottom));
        }
        Ok(sb)
    }

    /// Commits whose ancestry must not be dug into, typically the ancestors
    /// of the negative revisions of a range.
    pub fn set_uninteresting(&mut self, commits: HashSet<ObjectId>) {
        self.uninteresting = commits;
    }

    /// Override commit parentage, as read by [`crate::read_ancestry`].
    pub fn set_grafts(&mut self, grafts: HashMap<ObjectId, Vec<ObjectId>>) {
        self.grafts = grafts;
    }

    pub fn entries(&self) -> &[BlameEntry] {
        self.ents.entries()
    }

    /// The commit the digging started from.
    pub fn final_commit(&self) -> ObjectId {
        self.final_commit
    }

    pub fn path(&self) -> &BStr {
        self.path.as_ref()
    }

    /// The bytes of `num_lines` final-image lines starting at `lno`.
    pub fn line_bytes(&self, lno: u32, num_lines: u32) -> &[u8] {
        &self.final_buf[self.lines.byte_range(lno, num_lines)]
    }

    /// Drive blame to completion: repeatedly pick an unresolved suspect,
    /// pass as much blame as possible to its parents, and settle whatever
    /// remains on the suspect itself.
    pub fn assign_blame(&mut self) -> Result<()> {
        loop {
            let Some(suspect) = self
                .ents
                .iter()
                .find(|e| !e.guilty)
                .map(|e| e.suspect.clone())
            else {
                return Ok(());
            };
            tracing::debug!(suspect = %suspect, "digging");

            let masked = self.uninteresting.contains(&suspect.commit);
            let too_old = match self.opts.max_age {
                Some(age) => self
                    .commit_time(suspect.commit)
                    .map(|time| time < age)
                    .unwrap_or(true),
                None => false,
            };
            if !masked && !too_old {
                self.pass_blame(&suspect)?;
            }

            // take responsibility for whatever was not passed on
            for e in self.ents.iter_mut() {
                if e.suspect == suspect {
                    e.guilty = true;
                }
            }
            self.ents.coalesce();
        }
    }

    pub(crate) fn read_blob(&self, id: ObjectId) -> Result<Vec<u8>> {
        Ok(self.repo.find_object(id)?.detach().data)
    }

    pub(crate) fn tree_of(&self, commit: ObjectId) -> Result<ObjectId> {
        Ok(self
            .repo
            .find_object(commit)?
            .try_into_commit()?
            .tree_id()?
            .detach())
    }

    /// A commit's parents, grafts file first, capped at [`MAX_PARENTS`].
    pub(crate) fn parents_of(&self, commit: ObjectId) -> Result<SmallVec<[ObjectId; 2]>> {
        if let Some(parents) = self.grafts.get(&commit) {
            return Ok(parents.iter().copied().take(MAX_PARENTS).collect());
        }
        let commit = self.repo.find_object(commit)?.try_into_commit()?;
        Ok(commit
            .parent_ids()
            .take(MAX_PARENTS)
            .map(|id| id.detach())
            .collect())
    }

    fn commit_time(&self, commit: ObjectId) -> Result<i64> {
        let commit = self.repo.find_object(commit)?.try_into_commit()?;
        Ok(commit.time()?.seconds)
    }
}

/// Content score of an entry: one more than the number of alphanumeric
/// bytes in its final-image lines. Cached on the entry; splits and
/// coalesces reset the cache.
pub(crate) fn ent_score(final_buf: &[u8], lines: &LineIndex, e: &mut BlameEntry) -> u32 {
    if e.score != 0 {
        return e.score;
    }
    let mut score = 1;
    for byte in &final_buf[lines.byte_range(e.lno, e.num_lines)] {
        if byte.is_ascii_alphanumeric() {
            score += 1;
        }
    }
    e.score = score;
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn score_counts_alphanumerics_plus_one() {
        let buf = b"fn main() {}\n\n   \n";
        let lines = LineIndex::new(buf);
        let origin = Rc::new(Origin {
            commit: ObjectId::from_hex(&[b'a'; 40]).unwrap(),
            path: "f".into(),
            blob: ObjectId::from_hex(&[b'b'; 40]).unwrap(),
        });
        let mut e = BlameEntry::new(0, 3, origin, 0);
        assert_eq!(ent_score(buf, &lines, &mut e), 1 + 6);
        // cached now
        assert_eq!(e.score, 7);
        assert_eq!(ent_score(buf, &lines, &mut e), 7);
    }
}

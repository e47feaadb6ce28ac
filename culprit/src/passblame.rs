use std::rc::Rc;

use gix::ObjectId;
use smallvec::SmallVec;

use crate::{
    entry::{split_overlap, BlameEntry, Split},
    error::Result,
    origin::{find_origin, find_rename, Origin},
    patch::Patch,
    scoreboard::{ent_score, Scoreboard},
    treediff::{self, TreeDiffOptions},
};

impl<'a> Scoreboard<'a> {
    /// Try to pass the blame currently resting on `origin` to each of its
    /// parents: first along the path-aligned diff, then (optionally) by
    /// searching the parents' blobs for moved and copied lines.
    pub(crate) fn pass_blame(&mut self, origin: &Rc<Origin>) -> Result<()> {
        let parents = self.parents_of(origin.commit).unwrap_or_default();
        let mut porigins: SmallVec<[Option<Rc<Origin>>; 2]> =
            std::iter::repeat_with(|| None).take(parents.len()).collect();

        for (i, parent) in parents.iter().enumerate() {
            let porigin = match find_origin(self, *parent, origin.path.as_ref())? {
                Some(found) => Some(found),
                None => find_rename(self, *parent, origin)?,
            };
            let Some(porigin) = porigin else { continue };
            if porigin.blob == origin.blob {
                // the parent has the identical blob: everything still blamed
                // here belongs there, and no other parent needs a look
                for e in self.ents.iter_mut() {
                    if e.accuses(origin) {
                        e.suspect = porigin.clone();
                    }
                }
                return Ok(());
            }
            porigins[i] = Some(porigin);
        }

        for porigin in porigins.iter().flatten() {
            if self.pass_blame_to_parent(origin, porigin)? {
                return Ok(());
            }
        }

        if let Some(move_score) = self.opts.move_score {
            for porigin in porigins.iter().flatten() {
                if self.find_move_in_parent(origin, porigin, move_score)? {
                    return Ok(());
                }
            }
        }

        if let Some(copy_score) = self.opts.copy_score {
            for (i, parent) in parents.iter().enumerate() {
                if self.find_copy_in_parent(origin, *parent, porigins[i].as_ref(), copy_score)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Walk the parent→target diff and reassign every region the diff
    /// declares unchanged to `parent`. Returns true when no unresolved
    /// entry accuses `target` anymore.
    fn pass_blame_to_parent(
        &mut self,
        target: &Rc<Origin>,
        parent: &Rc<Origin>,
    ) -> Result<bool> {
        let Some(last_in_target) = self.ents.find_last_in_target(target) else {
            return Ok(true);
        };

        let file_p = self.read_blob(parent.blob)?;
        let file_t = self.read_blob(target.blob)?;
        let patch = Patch::generate(&file_p, &file_t, 0);

        let (mut plno, mut tlno) = (0, 0);
        for chunk in patch.chunks() {
            self.blame_chunk(tlno, plno, chunk.same, target, parent);
            plno = chunk.p_next;
            tlno = chunk.t_next;
        }
        // the rest, up to the last interesting line, matches the parent
        self.blame_chunk(tlno, plno, last_in_target, target, parent);
        Ok(false)
    }

    /// Lines `tlno..same` of the target's file are known to have come from
    /// the parent, with parent line `plno` corresponding to `tlno`. Split
    /// every overlapping unresolved entry accordingly.
    fn blame_chunk(
        &mut self,
        tlno: u32,
        plno: u32,
        same: u32,
        target: &Rc<Origin>,
        parent: &Rc<Origin>,
    ) {
        let mut i = 0;
        while i < self.ents.len() {
            let e = &self.ents.entries()[i];
            if !e.accuses(target) || same <= e.s_lno {
                i += 1;
                continue;
            }
            if tlno < e.s_lno + e.num_lines {
                let split = split_overlap(e, tlno, plno, same, parent);
                if split.mid.is_some() {
                    i += self.ents.apply_split(i, split);
                    continue;
                }
            }
            i += 1;
        }
    }

    /// Search the parent's version of the same file for each unresolved
    /// entry's text, and hand over entries whose best match scores above
    /// `move_score`. Returns true when nothing accuses `target` anymore.
    fn find_move_in_parent(
        &mut self,
        target: &Rc<Origin>,
        parent: &Rc<Origin>,
        move_score: u32,
    ) -> Result<bool> {
        if self.ents.find_last_in_target(target).is_none() {
            return Ok(true);
        }
        let file_p = self.read_blob(parent.blob)?;

        let mut i = 0;
        while i < self.ents.len() {
            let e = self.ents.entries()[i].clone();
            if e.accuses(target) {
                let mut split = self.best_match_in_blob(&e, parent, &file_p);
                if self.split_scores_over(&mut split, move_score) {
                    tracing::debug!(entry_lno = e.lno, parent = %parent, "found move");
                    self.ents.apply_split(i, split);
                }
            }
            i += 1;
        }
        Ok(false)
    }

    /// Search blobs of the parent's tree (other than the path the move
    /// search already covered) for each unresolved entry's text, keeping
    /// the best match across all candidate blobs.
    fn find_copy_in_parent(
        &mut self,
        target: &Rc<Origin>,
        parent: ObjectId,
        porigin: Option<&Rc<Origin>>,
        copy_score: u32,
    ) -> Result<bool> {
        if self.ents.find_last_in_target(target).is_none() {
            return Ok(true);
        }

        let harder = self.opts.copy_harder
            && porigin.map_or(true, |o| o.path != target.path);
        let (Ok(parent_tree), Ok(target_tree)) =
            (self.tree_of(parent), self.tree_of(target.commit))
        else {
            return Ok(false);
        };
        let sources: Vec<(gix::bstr::BString, ObjectId)> = if harder {
            treediff::all_blobs(self.repo, parent_tree)?
        } else {
            treediff::tree_diff(
                self.repo,
                Some(parent_tree),
                Some(target_tree),
                TreeDiffOptions::default(),
            )?
            .into_iter()
            .filter_map(|edit| edit.src)
            .collect()
        };

        let mut candidates = Vec::with_capacity(sources.len());
        for (path, _) in sources {
            if porigin.is_some_and(|o| o.path == path) {
                // the move search already dealt with this path
                continue;
            }
            let Some(norigin) = find_origin(self, parent, path.as_ref())? else {
                continue;
            };
            let data = self.read_blob(norigin.blob)?;
            candidates.push((norigin, data));
        }

        let mut i = 0;
        while i < self.ents.len() {
            let e = self.ents.entries()[i].clone();
            if e.accuses(target) {
                let mut best = Split::default();
                for (norigin, data) in &candidates {
                    let split = self.best_match_in_blob(&e, norigin, data);
                    best = self.better_split(best, split);
                }
                if self.split_scores_over(&mut best, copy_score) {
                    tracing::debug!(
                        entry_lno = e.lno,
                        source = %best.mid.as_ref().expect("scored splits have a middle").suspect,
                        "found copy"
                    );
                    self.ents.apply_split(i, best);
                }
            }
            i += 1;
        }
        Ok(false)
    }

    /// Compare `e`'s final-image text against one candidate blob and return
    /// the best-scoring split proposal, or an empty one if nothing matches.
    fn best_match_in_blob(&self, e: &BlameEntry, parent: &Rc<Origin>, file_p: &[u8]) -> Split {
        let file_o = &self.final_buf[self.lines.byte_range(e.lno, e.num_lines)];
        let patch = Patch::generate(file_p, file_o, 1);

        let mut best = Split::default();
        let (mut plno, mut tlno) = (0, 0);
        for chunk in patch.chunks() {
            if e.num_lines <= tlno {
                break;
            }
            if tlno < chunk.same {
                // lines tlno..chunk.same of the entry match the blob
                let split =
                    split_overlap(e, tlno + e.s_lno, plno, chunk.same + e.s_lno, parent);
                best = self.better_split(best, split);
            }
            plno = chunk.p_next;
            tlno = chunk.t_next;
        }
        if tlno < e.num_lines {
            // the remainder matches the blob's remainder
            let split = split_overlap(e, tlno + e.s_lno, plno, e.num_lines + e.s_lno, parent);
            best = self.better_split(best, split);
        }
        best
    }

    /// Of two split proposals, keep the one whose middle scores higher;
    /// later proposals win ties.
    fn better_split(&self, mut best: Split, mut this: Split) -> Split {
        let Some(this_mid) = this.mid.as_mut() else {
            return best;
        };
        if let Some(best_mid) = best.mid.as_mut() {
            if ent_score(&self.final_buf, &self.lines, this_mid)
                < ent_score(&self.final_buf, &self.lines, best_mid)
            {
                return best;
            }
        }
        this
    }

    fn split_scores_over(&self, split: &mut Split, threshold: u32) -> bool {
        match split.mid.as_mut() {
            Some(mid) => ent_score(&self.final_buf, &self.lines, mid) > threshold,
            None => false,
        }
    }
}

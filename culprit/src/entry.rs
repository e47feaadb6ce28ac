use std::rc::Rc;

use crate::origin::Origin;

/// A contiguous run of lines in the final image, currently attributed to a
/// single suspect.
#[derive(Clone, Debug)]
pub struct BlameEntry {
    /// First line of this group in the final image, 0-based.
    pub lno: u32,
    /// How many lines this group has, always at least one.
    pub num_lines: u32,
    /// The origin currently accused of introducing this group.
    pub suspect: Rc<Origin>,
    /// First line of this group in the suspect's file, 0-based.
    pub s_lno: u32,
    /// Once true, `suspect` is the definitive attribution.
    pub guilty: bool,
    /// Cached content score; 0 means "not computed yet".
    pub(crate) score: u32,
}

impl BlameEntry {
    pub(crate) fn new(lno: u32, num_lines: u32, suspect: Rc<Origin>, s_lno: u32) -> Self {
        Self {
            lno,
            num_lines,
            suspect,
            s_lno,
            guilty: false,
            score: 0,
        }
    }

    /// Whether this entry still blames `origin` and has not been settled.
    pub(crate) fn accuses(&self, origin: &Origin) -> bool {
        !self.guilty && *self.suspect == *origin
    }
}

/// The up-to-three replacement entries produced by splitting one entry
/// against a matched region: the part before the region, the part handed to
/// the parent, and the part after.
#[derive(Debug, Default)]
pub(crate) struct Split {
    pub pre: Option<BlameEntry>,
    pub mid: Option<BlameEntry>,
    pub post: Option<BlameEntry>,
}

/// Split `e` against the knowledge that suspect-file lines `tlno..same` came
/// from the parent, with parent line `plno` corresponding to line `tlno`.
///
/// `same` must be greater than `e.s_lno` (the caller skips entries entirely
/// above the matched region). The middle part is absent when the overlap is
/// empty.
pub(crate) fn split_overlap(
    e: &BlameEntry,
    tlno: u32,
    plno: u32,
    same: u32,
    parent: &Rc<Origin>,
) -> Split {
    let mut split = Split::default();

    let (mid_lno, mid_s_lno) = if e.s_lno < tlno {
        // a pre-chunk part stays with the current suspect
        split.pre = Some(BlameEntry::new(
            e.lno,
            tlno - e.s_lno,
            e.suspect.clone(),
            e.s_lno,
        ));
        (e.lno + (tlno - e.s_lno), plno)
    } else {
        (e.lno, plno + (e.s_lno - tlno))
    };

    let mid_end = if same < e.s_lno + e.num_lines {
        // a post-chunk part stays with the current suspect
        let post_lno = e.lno + (same - e.s_lno);
        split.post = Some(BlameEntry::new(
            post_lno,
            e.s_lno + e.num_lines - same,
            e.suspect.clone(),
            same,
        ));
        post_lno
    } else {
        e.lno + e.num_lines
    };

    if mid_end > mid_lno {
        split.mid = Some(BlameEntry::new(
            mid_lno,
            mid_end - mid_lno,
            parent.clone(),
            mid_s_lno,
        ));
    }
    split
}

/// The ordered sequence of blame entries covering the blamed line range
/// without gap or overlap.
#[derive(Debug, Default)]
pub(crate) struct Partitions {
    ents: Vec<BlameEntry>,
}

impl Partitions {
    pub(crate) fn new(initial: BlameEntry) -> Self {
        Self {
            ents: vec![initial],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ents.len()
    }

    pub(crate) fn entries(&self) -> &[BlameEntry] {
        &self.ents
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, BlameEntry> {
        self.ents.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, BlameEntry> {
        self.ents.iter_mut()
    }

    pub(crate) fn get_mut(&mut self, at: usize) -> &mut BlameEntry {
        &mut self.ents[at]
    }

    /// Insert by `lno`, keeping the sequence ordered.
    pub(crate) fn insert(&mut self, e: BlameEntry) {
        let at = self.ents.partition_point(|other| other.lno < e.lno);
        self.ents.insert(at, e);
    }

    /// Replace the entry at `at` with the parts of `split`, atomically:
    /// the old entry is unlinked before any part is inserted. Returns how
    /// many parts took its place.
    pub(crate) fn apply_split(&mut self, at: usize, split: Split) -> usize {
        self.ents.remove(at);
        let mut inserted = 0;
        for part in [split.pre, split.mid, split.post].into_iter().flatten() {
            self.insert(part);
            inserted += 1;
        }
        self.check();
        inserted
    }

    /// Fuse adjacent entries that blame the same origin for contiguous
    /// suspect lines with the same verdict. The merged entry's score cache
    /// is invalidated.
    pub(crate) fn coalesce(&mut self) {
        let mut i = 0;
        while i + 1 < self.ents.len() {
            let (a, b) = (&self.ents[i], &self.ents[i + 1]);
            if a.suspect == b.suspect && a.guilty == b.guilty && a.s_lno + a.num_lines == b.s_lno
            {
                let absorbed = b.num_lines;
                self.ents.remove(i + 1);
                let a = &mut self.ents[i];
                a.num_lines += absorbed;
                a.score = 0;
            } else {
                i += 1;
            }
        }
    }

    /// Largest `s_lno + num_lines` over unresolved entries accusing
    /// `target`, or `None` when nothing remains for it.
    pub(crate) fn find_last_in_target(&self, target: &Origin) -> Option<u32> {
        self.ents
            .iter()
            .filter(|e| e.accuses(target))
            .map(|e| e.s_lno + e.num_lines)
            .max()
    }

    /// Verify the no-gap/no-overlap invariant. A violation here is a bug in
    /// the splitting logic, not a user error: dump the sequence and abort.
    fn check(&self) {
        let mut expected = match self.ents.first() {
            Some(first) => first.lno,
            None => return,
        };
        let mut corrupt = false;
        for e in &self.ents {
            if e.lno != expected || e.num_lines < 1 {
                corrupt = true;
            }
            expected = e.lno + e.num_lines;
        }
        if corrupt {
            let mut expected = self.ents[0].lno;
            for e in &self.ents {
                eprintln!(
                    "L {:8} l {:8} n {:8} {}",
                    expected, e.lno, e.num_lines, e.suspect
                );
                expected = e.lno + e.num_lines;
            }
            panic!("blame entries are corrupted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gix::{bstr::BString, ObjectId};
    use pretty_assertions::assert_eq;

    fn origin(byte: u8) -> Rc<Origin> {
        let commit = ObjectId::from_hex(&[b'0' + byte % 10; 40]).unwrap();
        Rc::new(Origin {
            commit,
            path: BString::from("file.txt"),
            blob: commit,
        })
    }

    fn entry(lno: u32, num_lines: u32, suspect: &Rc<Origin>, s_lno: u32) -> BlameEntry {
        BlameEntry::new(lno, num_lines, suspect.clone(), s_lno)
    }

    fn spans(split: &Split) -> Vec<(u32, u32, u32)> {
        [&split.pre, &split.mid, &split.post]
            .into_iter()
            .flatten()
            .map(|e| (e.lno, e.num_lines, e.s_lno))
            .collect()
    }

    #[test]
    fn split_strict_interior() {
        let (o, p) = (origin(1), origin(2));
        let e = entry(10, 10, &o, 10);
        let split = split_overlap(&e, 13, 3, 16, &p);
        assert_eq!(spans(&split), vec![(10, 3, 10), (13, 3, 3), (16, 4, 16)]);
        assert_eq!(split.mid.as_ref().unwrap().suspect, p);
    }

    #[test]
    fn split_exact_cover() {
        let (o, p) = (origin(1), origin(2));
        let e = entry(10, 10, &o, 10);
        let split = split_overlap(&e, 10, 0, 20, &p);
        assert_eq!(spans(&split), vec![(10, 10, 0)]);
    }

    #[test]
    fn split_pre_only_overlap() {
        // matched region starts inside e and runs past its end
        let (o, p) = (origin(1), origin(2));
        let e = entry(10, 10, &o, 10);
        let split = split_overlap(&e, 14, 7, 25, &p);
        assert_eq!(spans(&split), vec![(10, 4, 10), (14, 6, 7)]);
    }

    #[test]
    fn split_post_only_overlap() {
        // matched region starts before e and ends inside it
        let (o, p) = (origin(1), origin(2));
        let e = entry(10, 10, &o, 10);
        let split = split_overlap(&e, 5, 2, 14, &p);
        assert_eq!(spans(&split), vec![(10, 4, 7), (14, 6, 14)]);
    }

    #[test]
    fn split_empty_middle() {
        let (o, p) = (origin(1), origin(2));
        let e = entry(10, 10, &o, 10);
        // region ends exactly where the entry starts being covered
        let split = split_overlap(&e, 12, 0, 12, &p);
        assert!(split.mid.is_none());
    }

    #[test]
    fn split_spans_sum_to_entry() {
        let (o, p) = (origin(1), origin(2));
        let e = entry(4, 8, &o, 4);
        for (tlno, same) in [(4, 12), (6, 9), (4, 6), (9, 12), (5, 11)] {
            let split = split_overlap(&e, tlno, 0, same, &p);
            let total: u32 = spans(&split).iter().map(|(_, n, _)| n).sum();
            assert_eq!(total, e.num_lines, "tlno={tlno} same={same}");
        }
    }

    #[test]
    fn apply_split_keeps_order() {
        let (o, p) = (origin(1), origin(2));
        let mut parts = Partitions::new(entry(0, 10, &o, 0));
        let split = split_overlap(&parts.entries()[0], 3, 0, 7, &p);
        let inserted = parts.apply_split(0, split);
        assert_eq!(inserted, 3);
        let lnos: Vec<_> = parts.iter().map(|e| (e.lno, e.num_lines)).collect();
        assert_eq!(lnos, vec![(0, 3), (3, 4), (7, 3)]);
    }

    #[test]
    fn coalesce_merges_contiguous_suspects() {
        let o = origin(1);
        let mut parts = Partitions::new(entry(0, 3, &o, 0));
        let e = entry(3, 2, &o, 3);
        parts.insert(e);
        parts.coalesce();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts.entries()[0].num_lines, 5);
        assert_eq!(parts.entries()[0].score, 0);
    }

    #[test]
    fn coalesce_respects_guilt_and_source_gaps() {
        let o = origin(1);
        let mut parts = Partitions::new(entry(0, 3, &o, 0));
        // contiguous in the final image but not in the suspect's file
        parts.insert(entry(3, 2, &o, 9));
        parts.coalesce();
        assert_eq!(parts.len(), 2);

        let mut guilty = entry(5, 1, &o, 11);
        guilty.guilty = true;
        parts.insert(guilty);
        parts.coalesce();
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn coalesce_is_idempotent() {
        let (o, p) = (origin(1), origin(2));
        let mut parts = Partitions::new(entry(0, 2, &o, 0));
        parts.insert(entry(2, 1, &o, 2));
        parts.insert(entry(3, 4, &p, 0));
        parts.coalesce();
        let once: Vec<_> = parts.iter().map(|e| (e.lno, e.num_lines)).collect();
        parts.coalesce();
        let twice: Vec<_> = parts.iter().map(|e| (e.lno, e.num_lines)).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn find_last_ignores_guilty_and_other_suspects() {
        let (o, p) = (origin(1), origin(2));
        let mut parts = Partitions::new(entry(0, 2, &o, 5));
        parts.insert(entry(2, 3, &p, 0));
        assert_eq!(parts.find_last_in_target(&o), Some(7));
        assert_eq!(parts.find_last_in_target(&p), Some(3));
        for e in parts.iter_mut() {
            e.guilty = true;
        }
        assert_eq!(parts.find_last_in_target(&o), None);
    }
}

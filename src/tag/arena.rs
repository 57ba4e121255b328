//! Component A — the process-wide union-find arena (spec §4.1).

use crate::error::{DynCompError, InvariantError};
use crate::tag::{Tag, MAX_REAL_TAG, NO_TAG};

const PAGE_BITS: u32 = 16;
const PAGE_SIZE: usize = 1 << PAGE_BITS;
const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UfNode {
    parent: Tag,
    rank: u16,
}

impl UfNode {
    const fn root(tag: Tag) -> Self {
        Self { parent: tag, rank: 0 }
    }
}

/// Two-level sparse array of disjoint-set nodes keyed by tag value.
///
/// A node is a root iff `parent == index`. Secondary pages are allocated
/// lazily on first `make_set`; GC may truncate trailing pages wholesale
/// once every surviving tag has been renumbered below them (spec §4.6
/// step 6), which is why pages -- not a flat growable `Vec` -- are the
/// right shape here.
#[derive(Debug, Default)]
pub struct UfArena {
    pages: Vec<Option<Box<[UfNode; PAGE_SIZE]>>>,
    next_tag: Tag,
}

fn split(tag: Tag) -> (usize, usize) {
    ((tag >> PAGE_BITS) as usize, (tag & PAGE_MASK) as usize)
}

impl UfArena {
    /// A fresh, empty arena. Tag `0` is reserved and never allocated.
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            next_tag: 1,
        }
    }

    /// The next tag value that would be handed out by an allocator on top
    /// of this arena (used by the GC to know the live high-water mark).
    pub const fn next_tag(&self) -> Tag {
        self.next_tag
    }

    fn page_mut(&mut self, page_idx: usize) -> &mut [UfNode; PAGE_SIZE] {
        if page_idx >= self.pages.len() {
            self.pages.resize_with(page_idx + 1, || None);
        }
        self.pages[page_idx].get_or_insert_with(|| Box::new([UfNode::root(0); PAGE_SIZE]))
    }

    fn page(&self, page_idx: usize) -> Option<&[UfNode; PAGE_SIZE]> {
        self.pages.get(page_idx).and_then(|p| p.as_deref())
    }

    /// Allocate a node whose `parent == tag`, `rank == 0`. Callers must not
    /// call this twice for the same live tag (the GC rebuild is the only
    /// caller that ever re-creates a tag number, and it always wipes the
    /// arena first).
    pub fn make_set(&mut self, tag: Tag) -> Result<(), DynCompError> {
        if tag > MAX_REAL_TAG {
            return Err(InvariantError::ArenaOverflow { next: tag }.into());
        }
        let (page_idx, off) = split(tag);
        self.page_mut(page_idx)[off] = UfNode::root(tag);
        if tag >= self.next_tag {
            self.next_tag = tag + 1;
        }
        Ok(())
    }

    /// Reserve and return the next unused tag, calling [`Self::make_set`]
    /// on it.
    pub fn fresh(&mut self) -> Result<Tag, DynCompError> {
        let tag = self.next_tag;
        self.make_set(tag)?;
        Ok(tag)
    }

    /// Resolve `tag` to its equivalence-class root, with full path
    /// compression. Returns `0` if `tag` is `0` or its page was never
    /// touched.
    pub fn find(&mut self, tag: Tag) -> Tag {
        if tag == NO_TAG {
            return NO_TAG;
        }
        let (page_idx, off) = split(tag);
        if self.page(page_idx).is_none() {
            return NO_TAG;
        }

        // Walk to the root.
        let mut root = tag;
        loop {
            let (p_idx, p_off) = split(root);
            let parent = match self.page(p_idx) {
                Some(page) => page[p_off].parent,
                None => return NO_TAG,
            };
            if parent == root {
                break;
            }
            root = parent;
        }

        // Path compression: repoint every visited node directly at root.
        let mut cur = tag;
        while cur != root {
            let (p_idx, p_off) = split(cur);
            let next = self.page(p_idx).expect("visited during walk")[p_off].parent;
            self.page_mut(p_idx)[p_off].parent = root;
            cur = next;
        }

        root
    }

    /// Union the classes of `a` and `b`, returning the new root. `0`
    /// short-circuits to the other operand, matching zero-absorption
    /// (spec §8).
    pub fn union(&mut self, a: Tag, b: Tag) -> Tag {
        if a == NO_TAG {
            return b;
        }
        if b == NO_TAG {
            return a;
        }

        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }

        let (ra_idx, ra_off) = split(ra);
        let (rb_idx, rb_off) = split(rb);
        let rank_a = self.page(ra_idx).expect("root must be backed").rank_of(ra_off);
        let rank_b = self.page(rb_idx).expect("root must be backed").rank_of(rb_off);

        let (small, large, large_rank, small_rank) = if rank_a < rank_b {
            (ra, rb, rank_b, rank_a)
        } else {
            (rb, ra, rank_a, rank_b)
        };

        let (small_idx, small_off) = split(small);
        self.page_mut(small_idx)[small_off].parent = large;

        if large_rank == small_rank {
            let (large_idx, large_off) = split(large);
            self.page_mut(large_idx)[large_off].rank += 1;
        }

        large
    }

    /// Discard every page whose index is at or beyond the page containing
    /// `keep_below` and re-seed the arena to hold exactly `1 ..
    /// keep_below` as singleton roots, per spec §4.6 step 6. Used by the
    /// GC after every live tag has been renumbered.
    pub fn reset_to(&mut self, keep_below: Tag) {
        let keep_pages = if keep_below == 0 {
            0
        } else {
            split(keep_below - 1).0 + 1
        };
        self.pages.truncate(keep_pages);
        for page_idx in 0..keep_pages {
            self.pages[page_idx] = None;
        }
        for tag in 1..keep_below {
            self.make_set(tag).expect("renumbered tags are always in range");
        }
        self.next_tag = keep_below.max(1);
    }
}

trait PageRank {
    fn rank_of(&self, off: usize) -> u16;
}

impl PageRank for [UfNode; PAGE_SIZE] {
    fn rank_of(&self, off: usize) -> u16 {
        self[off].rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_of_unallocated_is_zero() {
        let mut a = UfArena::new();
        assert_eq!(a.find(42), NO_TAG);
    }

    #[test]
    fn union_absorbs_zero() {
        let mut a = UfArena::new();
        let t = a.fresh().unwrap();
        assert_eq!(a.union(NO_TAG, t), t);
        assert_eq!(a.union(t, NO_TAG), t);
    }

    #[test]
    fn union_merges_classes() {
        let mut a = UfArena::new();
        let x = a.fresh().unwrap();
        let y = a.fresh().unwrap();
        let z = a.fresh().unwrap();

        assert_ne!(a.find(x), a.find(y));
        let r1 = a.union(x, y);
        assert_eq!(a.find(x), a.find(y));
        assert_eq!(a.find(x), r1);

        a.union(y, z);
        assert_eq!(a.find(x), a.find(z));
    }

    #[test]
    fn path_compression_keeps_root_stable() {
        let mut a = UfArena::new();
        let tags: Vec<Tag> = (0..16).map(|_| a.fresh().unwrap()).collect();
        for w in tags.windows(2) {
            a.union(w[0], w[1]);
        }
        let root = a.find(tags[0]);
        for &t in &tags {
            assert_eq!(a.find(t), root);
        }
    }

    #[test]
    fn reset_to_preserves_count_and_resets_equivalences() {
        let mut a = UfArena::new();
        let x = a.fresh().unwrap();
        let y = a.fresh().unwrap();
        a.union(x, y);
        a.reset_to(3);
        assert_eq!(a.next_tag(), 3);
        assert_eq!(a.find(1), 1);
        assert_eq!(a.find(2), 2);
    }
}

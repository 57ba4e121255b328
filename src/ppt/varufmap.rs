//! The per-ppt union-find over global leader tags ("M" in spec §3/§4.5).

use std::collections::HashMap;

use crate::tag::{Tag, NO_TAG};

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: Tag,
    rank: u16,
}

/// A union-find keyed by tag value, disjoint from the global arena. Never
/// stores `0`: every caller short-circuits the reserved "no tag" value
/// before touching this structure, matching the global arena's own
/// zero-absorption contract.
#[derive(Debug, Clone, Default)]
pub struct VarUfMap {
    nodes: HashMap<Tag, Node>,
}

impl VarUfMap {
    /// An empty map.
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    /// Whether `tag` is already a key.
    pub fn contains(&self, tag: Tag) -> bool {
        self.nodes.contains_key(&tag)
    }

    /// Insert `tag` as a fresh singleton root. A no-op if already present,
    /// since callers never expect to clobber an existing class.
    pub fn make_set(&mut self, tag: Tag) {
        self.nodes.entry(tag).or_insert(Node { parent: tag, rank: 0 });
    }

    /// Resolve `tag` to its current root within this map, with path
    /// compression. A tag that has never been inserted is treated as an
    /// implicit singleton and returned unchanged (without being
    /// materialized as a key) -- callers insert explicitly via
    /// [`Self::make_set`] when a tag is meant to become tracked.
    pub fn find_leader(&mut self, tag: Tag) -> Tag {
        if tag == NO_TAG || !self.nodes.contains_key(&tag) {
            return tag;
        }

        let mut root = tag;
        loop {
            let parent = self.nodes[&root].parent;
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut cur = tag;
        while cur != root {
            let next = self.nodes[&cur].parent;
            self.nodes.get_mut(&cur).unwrap().parent = root;
            cur = next;
        }

        root
    }

    /// Union `a` and `b`, inserting either as a fresh singleton first if
    /// missing. `0` on either side short-circuits to the other operand
    /// without touching the map, mirroring the global arena.
    pub fn union(&mut self, a: Tag, b: Tag) -> Tag {
        if a == NO_TAG {
            return b;
        }
        if b == NO_TAG {
            return a;
        }

        self.make_set(a);
        self.make_set(b);
        let ra = self.find_leader(a);
        let rb = self.find_leader(b);
        if ra == rb {
            return ra;
        }

        let rank_a = self.nodes[&ra].rank;
        let rank_b = self.nodes[&rb].rank;
        let (small, large) = if rank_a < rank_b { (ra, rb) } else { (rb, ra) };
        self.nodes.get_mut(&small).unwrap().parent = large;
        if rank_a == rank_b {
            self.nodes.get_mut(&large).unwrap().rank += 1;
        }
        large
    }

    /// Every key currently in the map whose root is `class_root` (after
    /// path compression as a side effect of computing each key's root).
    pub fn members_of(&mut self, class_root: Tag) -> Vec<Tag> {
        let keys: Vec<Tag> = self.nodes.keys().copied().collect();
        keys.into_iter().filter(|&k| self.find_leader(k) == class_root).collect()
    }

    /// Rebuild this map from scratch given an `old_tag -> new_tag`
    /// renumbering (spec §4.6 step 4): copy leaders first, then
    /// non-leaders, unioning each with its renumbered parent.
    pub fn rebuild_renumbered(&self, mut renumber: impl FnMut(Tag) -> Tag) -> Self {
        let mut fresh = Self::new();

        let mut entries: Vec<(Tag, Tag)> = self.nodes.iter().map(|(&k, n)| (k, n.parent)).collect();
        entries.sort_by_key(|&(k, parent)| if k == parent { 0 } else { 1 });

        for (old_tag, old_parent) in entries {
            let new_tag = renumber(old_tag);
            if old_tag == old_parent {
                fresh.make_set(new_tag);
            } else {
                let new_parent = renumber(old_parent);
                fresh.union(new_tag, new_parent);
            }
        }

        fresh
    }
}

//! Component G — the tag garbage collector (spec §4.6).
//!
//! Strategy: renumber, never free. The collector compacts the live tag
//! space into `[1, new_tag)` and rewrites every cell that can hold a tag:
//! shadow memory, every per-program-point structure, and (since this
//! crate places the guest register shadow inside the same [`TagShadow`]
//! at the address the host's offset formula computes -- see
//! `ir::register_shadow_offset` -- the register sweep spec §4.6 step 5
//! calls out separately is already covered by the shadow-memory sweep in
//! step 2 here, rather than needing its own pass over a distinct array.

use tracing::debug;

use crate::ppt::ProgramPoint;
use crate::tag::arena::UfArena;
use crate::tag::shadow::TagShadow;
use crate::tag::{Tag, NO_TAG};

/// Summary of one collection pass, useful for `--dyncomp-debug` logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// The live tag high-water mark before collection.
    pub old_next_tag: Tag,
    /// The live tag high-water mark after collection.
    pub new_next_tag: Tag,
}

struct Renumberer {
    old_to_new: Vec<Tag>,
    next: Tag,
}

impl Renumberer {
    fn new(capacity: Tag) -> Self {
        Self {
            old_to_new: vec![NO_TAG; capacity as usize],
            next: 1,
        }
    }

    /// Renumber a tag that is already known to be a global leader.
    fn renumber_leader(&mut self, leader: Tag) -> Tag {
        if leader == NO_TAG {
            return NO_TAG;
        }
        let slot = &mut self.old_to_new[leader as usize];
        if *slot == NO_TAG {
            *slot = self.next;
            self.next += 1;
        }
        *slot
    }

    /// Resolve `tag` to its current global leader, then renumber that
    /// leader.
    fn resolve_and_renumber(&mut self, arena: &mut UfArena, tag: Tag) -> Tag {
        if tag == NO_TAG {
            return NO_TAG;
        }
        let leader = arena.find(tag);
        self.renumber_leader(leader)
    }
}

/// Run one full collection pass. Triggered by the owning engine whenever
/// the cumulative tag-creation count crosses the configured threshold
/// (`create_tag`'s side effect, tracked by
/// [`crate::tag::algebra::TagAlgebra::tags_created`]).
pub fn collect(arena: &mut UfArena, shadow: &mut TagShadow, ppts: &mut [ProgramPoint]) -> GcStats {
    let old_next_tag = arena.next_tag();
    let mut r = Renumberer::new(old_next_tag);

    // Step 2: shadow memory sweep.
    shadow.for_each_tag_mut(|cell| {
        let leader = arena.find(cell);
        r.renumber_leader(leader)
    });

    // Step 3 + 4: per-ppt sweep and M rebuild.
    for ppt in ppts.iter_mut() {
        let mut new_vars = vec![NO_TAG; ppt.num_vars];
        for i in 0..ppt.num_vars {
            let v = ppt.var_tags[i];
            if v == NO_TAG {
                continue;
            }
            let m_root = ppt.var_uf_map.find_leader(v);
            let leader = arena.find(m_root);
            new_vars[i] = r.renumber_leader(leader);
        }

        let rebuilt = ppt.var_uf_map.rebuild_renumbered(|raw| r.resolve_and_renumber(arena, raw));
        ppt.var_uf_map = rebuilt;

        for i in 0..ppt.num_vars {
            if new_vars[i] != NO_TAG {
                new_vars[i] = ppt.var_uf_map.find_leader(new_vars[i]);
            }
        }
        ppt.var_tags = new_vars;
    }

    // Step 5: guest register sweep -- subsumed by step 2, see module doc.

    // Step 6: arena reset.
    let new_next_tag = r.next;
    arena.reset_to(new_next_tag);

    debug!(old_next_tag, new_next_tag, "tag garbage collection complete");

    GcStats {
        old_next_tag,
        new_next_tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_preserves_equivalences_and_compacts() {
        let mut arena = UfArena::new();
        let mut shadow = TagShadow::new();

        let a = arena.fresh().unwrap();
        let b = arena.fresh().unwrap();
        let c = arena.fresh().unwrap();
        let _d = arena.fresh().unwrap(); // allocated, never written to shadow: should vanish.

        shadow.set_tag(0, a).unwrap();
        shadow.set_tag(1, b).unwrap();
        shadow.set_tag(2, c).unwrap();
        arena.union(a, b);

        let mut ppts = Vec::new();
        let before_eq_ab = arena.find(shadow.get_tag(0)) == arena.find(shadow.get_tag(1));
        let before_eq_ac = arena.find(shadow.get_tag(0)) == arena.find(shadow.get_tag(2));
        assert!(before_eq_ab);
        assert!(!before_eq_ac);

        let stats = collect(&mut arena, &mut shadow, &mut ppts);
        assert!(stats.new_next_tag <= stats.old_next_tag);

        let after_eq_ab = arena.find(shadow.get_tag(0)) == arena.find(shadow.get_tag(1));
        let after_eq_ac = arena.find(shadow.get_tag(0)) == arena.find(shadow.get_tag(2));
        assert!(after_eq_ab, "equivalence must survive GC");
        assert!(!after_eq_ac, "non-equivalence must survive GC");
    }

    #[test]
    fn gc_renumbers_per_ppt_state_consistently() {
        let mut arena = UfArena::new();
        let mut shadow = TagShadow::new();
        let mut ppt = ProgramPoint::new(2, false);

        let a = arena.fresh().unwrap();
        let b = arena.fresh().unwrap();
        shadow.set_tag(0, a).unwrap();
        shadow.set_tag(1, b).unwrap();

        crate::ppt::observe::observe(&mut ppt, 0, Some(0), &mut arena, &shadow);
        crate::ppt::observe::observe(&mut ppt, 1, Some(1), &mut arena, &shadow);
        arena.union(a, b);
        crate::ppt::observe::observe(&mut ppt, 0, Some(0), &mut arena, &shadow);
        crate::ppt::observe::observe(&mut ppt, 1, Some(1), &mut arena, &shadow);

        let class_before = ppt.var_uf_map.find_leader(ppt.var_tags[0]) == ppt.var_uf_map.find_leader(ppt.var_tags[1]);
        assert!(class_before);

        let mut ppts = vec![ppt];
        collect(&mut arena, &mut shadow, &mut ppts);
        let ppt = &mut ppts[0];

        let class_after = ppt.var_uf_map.find_leader(ppt.var_tags[0]) == ppt.var_uf_map.find_leader(ppt.var_tags[1]);
        assert!(class_after, "per-ppt comparability class must survive GC");
    }
}

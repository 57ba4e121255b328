//! Component J — the program-end declarations pass (spec §4.6, §4.8).
//!
//! Runs once per registered program point, after the whole run has
//! finished (not once per execution): drives one extra freshness-only
//! round of component F over every tracked variable so `var_tags`
//! reflects every merge observed across the run, then converts each
//! variable's final tag into a small comparability number via a table
//! that starts fresh for this program point.

use std::collections::HashMap;

use crate::ppt::observe::{correct_freshness, detailed_to_classes};
use crate::ppt::ProgramPoint;
use crate::tag::arena::UfArena;
use crate::tag::{Tag, NO_TAG};

/// Maps global leader tags to the small comparability numbers printed in
/// one program point's declarations block. Reset fresh for every program
/// point (spec §5, "shared resources"): numbers are local to one ppt,
/// never stable across ppts.
#[derive(Debug, Default)]
pub struct CompNumTable {
    tag_to_num: HashMap<Tag, u32>,
    next: u32,
}

impl CompNumTable {
    pub fn new() -> Self {
        Self {
            tag_to_num: HashMap::new(),
            next: 1,
        }
    }

    /// Assign (or look up) the comparability number for `leader`.
    /// `NO_TAG` -- an unobserved variable -- always gets a fresh,
    /// never-reused number, since two unobserved variables are never
    /// comparable to each other (spec §4.8).
    fn assign(&mut self, leader: Tag) -> u32 {
        if leader == NO_TAG {
            let n = self.next;
            self.next += 1;
            return n;
        }
        *self.tag_to_num.entry(leader).or_insert_with(|| {
            let n = self.next;
            self.next += 1;
            n
        })
    }
}

/// Run component J for one program point: a correction-only round of F
/// followed by comparability-number assignment, in catalog variable
/// order. Returns one comparability number per tracked variable.
pub fn finalize_ppt(ppt: &mut ProgramPoint, arena: &mut UfArena) -> Vec<u32> {
    if ppt.detailed.is_some() {
        let classes = detailed_to_classes(ppt);
        let mut table: HashMap<usize, u32> = HashMap::new();
        let mut next = 1u32;
        return classes
            .into_iter()
            .map(|root| {
                *table.entry(root).or_insert_with(|| {
                    let n = next;
                    next += 1;
                    n
                })
            })
            .collect();
    }

    for i in 0..ppt.num_vars {
        correct_freshness(ppt, i, arena);
    }

    let mut table = CompNumTable::new();
    ppt.var_tags
        .iter()
        .map(|&v| {
            if v == NO_TAG {
                table.assign(NO_TAG)
            } else {
                let leader = arena.find(ppt.var_uf_map.find_leader(v));
                table.assign(leader)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppt::observe::observe;
    use crate::tag::shadow::TagShadow;

    #[test]
    fn observed_equivalent_vars_get_the_same_comp_num() {
        let mut arena = UfArena::new();
        let mut shadow = TagShadow::new();
        let mut ppt = ProgramPoint::new(2, false);

        let a = arena.fresh().unwrap();
        let b = arena.fresh().unwrap();
        shadow.set_tag(0, a).unwrap();
        shadow.set_tag(4, b).unwrap();

        observe(&mut ppt, 0, Some(0), &mut arena, &shadow);
        observe(&mut ppt, 1, Some(4), &mut arena, &shadow);

        // A later interaction (components C/D) unions the two leaves.
        arena.union(a, b);

        let nums = finalize_ppt(&mut ppt, &mut arena);
        assert_eq!(nums[0], nums[1]);
    }

    #[test]
    fn distinct_unobserved_vars_never_share_a_comp_num() {
        let mut arena = UfArena::new();
        let mut ppt = ProgramPoint::new(2, false);
        let nums = finalize_ppt(&mut ppt, &mut arena);
        assert_ne!(nums[0], nums[1]);
    }

    #[test]
    fn unrelated_observed_vars_get_distinct_comp_nums() {
        let mut arena = UfArena::new();
        let mut shadow = TagShadow::new();
        let mut ppt = ProgramPoint::new(2, false);

        let a = arena.fresh().unwrap();
        let b = arena.fresh().unwrap();
        shadow.set_tag(0, a).unwrap();
        shadow.set_tag(4, b).unwrap();

        observe(&mut ppt, 0, Some(0), &mut arena, &shadow);
        observe(&mut ppt, 1, Some(4), &mut arena, &shadow);

        let nums = finalize_ppt(&mut ppt, &mut arena);
        assert_ne!(nums[0], nums[1]);
    }
}

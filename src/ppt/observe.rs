//! Component F — the per-program-point observation & correction loop
//! (spec §4.5). The hottest per-ppt code path: called once per visited
//! variable at each executed program point.

use crate::ppt::ProgramPoint;
use crate::tag::arena::UfArena;
use crate::tag::shadow::TagShadow;
use crate::tag::{Tag, NO_TAG};

/// Default-mode observation: the two-pass correction-then-merge rule.
///
/// `addr` is the guest address of the variable's current value, or `None`
/// if it isn't addressable (step 1: nothing to do). Returns without
/// modifying state in that case.
pub fn observe(ppt: &mut ProgramPoint, var_idx: usize, addr: Option<u64>, arena: &mut UfArena, shadow: &TagShadow) {
    debug_assert!(ppt.detailed.is_none(), "observe() is the non-detailed-mode path");

    let Some(addr) = addr else { return };

    correct_freshness(ppt, var_idx, arena);

    // New-observation merge.
    let obs = arena.find(shadow.get_tag(addr));
    if obs != NO_TAG && !ppt.var_uf_map.contains(obs) {
        ppt.var_uf_map.make_set(obs);
    }
    ppt.var_tags[var_idx] = ppt.var_uf_map.union(ppt.var_tags[var_idx], obs);
}

/// The freshness-correction half of [`observe`] on its own, with no new
/// observation merged in: folds in every global union that happened to
/// `var_idx`'s class since it was last visited. Component J's program-end
/// declarations pass runs this once per variable, with no matching
/// observation, so that `var_tags` reflects every merge before
/// comparability numbers are read out (spec §4.8).
pub fn correct_freshness(ppt: &mut ProgramPoint, var_idx: usize, arena: &mut UfArena) {
    let old_leader = ppt.var_tags[var_idx];
    if old_leader == NO_TAG {
        return;
    }

    let m_root = ppt.var_uf_map.find_leader(old_leader);
    let g = arena.find(m_root);
    let mut leader = if g != old_leader {
        ppt.var_uf_map.union(g, old_leader)
    } else {
        old_leader
    };

    // Iterate siblings: every member of old_leader's (now possibly
    // merged) M-class whose own global leader has drifted since the
    // last visit gets folded in too.
    let class_root = ppt.var_uf_map.find_leader(old_leader);
    for member in ppt.var_uf_map.members_of(class_root) {
        let t = arena.find(member);
        if t != member {
            leader = ppt.var_uf_map.union(leader, t);
        }
    }

    ppt.var_tags[var_idx] = leader;
}

/// Detailed-mode observation (spec §4.5): records `find(get_tag(addr))`
/// into the scratch array instead of touching a union-find. The
/// cross-variable OR pass runs separately, once per executed ppt, via
/// [`finish_execution`].
pub fn observe_detailed(ppt: &mut ProgramPoint, var_idx: usize, addr: Option<u64>, arena: &mut UfArena, shadow: &TagShadow) {
    let detailed = ppt.detailed.as_mut().expect("observe_detailed requires detailed mode");
    detailed.new_tag_leaders[var_idx] = match addr {
        Some(addr) => arena.find(shadow.get_tag(addr)),
        None => NO_TAG,
    };
}

/// Post-visit phase for detailed mode: for every pair `i < j`, OR in
/// whether both variables' freshly observed leaders are equal and
/// nonzero.
pub fn finish_execution(ppt: &mut ProgramPoint) {
    let detailed = ppt.detailed.as_mut().expect("finish_execution requires detailed mode");
    let leaders = &detailed.new_tag_leaders;
    for i in 0..ppt.num_vars {
        if leaders[i] == NO_TAG {
            continue;
        }
        for j in (i + 1)..ppt.num_vars {
            if leaders[j] != NO_TAG && leaders[i] == leaders[j] {
                detailed.bitmatrix.or_set(i, j, true);
            }
        }
    }
}

/// Convert the detailed-mode bitmatrix into comparability classes at
/// program end: singleton union-find per variable, union every marked
/// pair, read out leaders as (local, per-ppt) variable serial numbers
/// sharing a root.
pub fn detailed_to_classes(ppt: &ProgramPoint) -> Vec<usize> {
    let detailed = ppt.detailed.as_ref().expect("detailed_to_classes requires detailed mode");
    let n = ppt.num_vars;
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if detailed.bitmatrix.get(i, j) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    (0..n).map(|i| find(&mut parent, i)).collect()
}

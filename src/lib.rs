//! Dynamic comparability analysis core.
//!
//! Ties the tag algebra (components A-C), IR instrumentation policy
//! (component D), per-program-point observation and correction
//! (components E-F), garbage collection (component G), variable
//! traversal (component H), and the trace emitter (components I-J) into
//! one engine a dynamic binary instrumentation host drives one
//! instrumented event at a time.

pub mod catalog;
pub mod config;
pub mod consts;
pub mod emit;
pub mod error;
pub mod gc;
pub mod host;
pub mod ir;
pub mod ppt;
#[cfg(feature = "debug-stats")]
pub mod stats;
pub mod tag;
pub mod traversal;

pub mod prelude {
    pub use crate::config::{DynCompConfig, InteractionMode};
    pub use crate::error::DynCompError;
    pub use crate::host::DbiHost;
    pub use crate::tag::Tag;
}

use tracing::{debug, info};

use crate::catalog::{Catalog, FunctionEntry, FunctionId};
use crate::config::DynCompConfig;
use crate::emit::final_pass;
use crate::emit::{build_value_record, ValueRecord};
use crate::error::DynCompError;
use crate::host::DbiHost;
use crate::ppt::observe::{finish_execution, observe, observe_detailed};
use crate::ppt::ProgramPoint;
use crate::tag::algebra::TagAlgebra;
use crate::traversal::traverse;

/// One registered program point: a function's entry or exit, holding the
/// flattened, stable-ordered variable list the traversal produces once
/// up front and re-visits on every execution.
struct PptRecord {
    name: String,
    function: FunctionId,
    is_entry: bool,
    ppt: ProgramPoint,
}

/// Owns every piece of live comparability state for one process: the
/// tag algebra, the catalog of static types/functions, and one
/// [`ProgramPoint`] per registered `(function, entry|exit)` pair.
///
/// Generic over the host so the engine never depends on a concrete DBI
/// framework; `H` is whatever the embedding tool's translator exposes.
pub struct DynCompEngine<H: DbiHost> {
    config: DynCompConfig,
    catalog: Catalog,
    algebra: TagAlgebra,
    ppts: Vec<PptRecord>,
    host: H,
    #[cfg(feature = "debug-stats")]
    stats: stats::EngineStats,
}

impl<H: DbiHost> DynCompEngine<H> {
    /// A fresh engine over an already-populated catalog (spec §3: the
    /// catalog itself is produced by an out-of-scope DWARF consumer).
    pub fn new(config: DynCompConfig, catalog: Catalog, host: H) -> Self {
        Self {
            config,
            catalog,
            algebra: TagAlgebra::new(),
            ppts: Vec::new(),
            host,
            #[cfg(feature = "debug-stats")]
            stats: stats::EngineStats::default(),
        }
    }

    pub fn config(&self) -> &DynCompConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Register one program point for `function`'s entry or exit,
    /// sized for `num_vars` traversal leaves. Returns an opaque index
    /// used by [`Self::run_execution`].
    pub fn register_ppt(&mut self, function: FunctionId, is_entry: bool, num_vars: usize) -> usize {
        let func = self.catalog.function_entry(function);
        let name = format!("{}:::{}", func.name, if is_entry { "ENTER" } else { "EXIT" });
        let idx = self.ppts.len();
        self.ppts.push(PptRecord {
            name,
            function,
            is_entry,
            ppt: ProgramPoint::new(num_vars, self.config.detailed_mode),
        });
        idx
    }

    /// Run one execution of `ppt_idx`: traverse every root variable of
    /// the owning function (formals on entry, formals + return vars on
    /// exit, per spec §4.7), build a value record per leaf, and feed
    /// each into the observation/correction loop. The returned records
    /// are exactly what the values file prints for this execution — no
    /// comparability numbers yet; those are only known once
    /// [`Self::finalize_ppt`] runs at program end (spec §4.8).
    ///
    /// `root_addrs` supplies the guest address of each of the function's
    /// root variables, in catalog order (formals, then return vars on
    /// exit); a missing entry is treated as an unaddressable root.
    pub fn run_execution(&mut self, ppt_idx: usize, root_addrs: &[Option<u64>]) -> Result<Vec<ValueRecord>, DynCompError> {
        let function = self.ppts[ppt_idx].function;
        let is_entry = self.ppts[ppt_idx].is_entry;
        let func: FunctionEntry = self.catalog.function_entry(function).clone();
        let roots = self.roots_for(&func, is_entry);

        let mut leaves = Vec::new();
        for (root, addr) in roots.iter().zip(root_addrs.iter().chain(std::iter::repeat(&None))) {
            let result = traverse(root, *addr, &self.catalog, &self.host, &self.config);
            leaves.extend(result.variables);
        }

        let mut records: Vec<ValueRecord> = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            let kind = self.catalog.type_entry(leaf.type_id).kind;
            records.push(build_value_record(leaf, kind, &self.host, &mut self.algebra)?);
        }

        {
            let (arena, shadow) = self.algebra.arena_and_shadow_mut();
            let ppt = &mut self.ppts[ppt_idx].ppt;
            if ppt.detailed.is_some() {
                for (i, record) in records.iter().enumerate() {
                    observe_detailed(ppt, i, record.observe_addr, arena, shadow);
                }
                finish_execution(ppt);
            } else {
                for (i, record) in records.iter().enumerate() {
                    observe(ppt, i, record.observe_addr, arena, shadow);
                }
            }
        }

        #[cfg(feature = "debug-stats")]
        self.stats.record_execution(&self.ppts[ppt_idx].name, is_entry, records.len());

        if self.config.gc_enabled() && self.algebra.tags_created() >= self.config.gc_threshold as u64 {
            self.collect();
        }

        Ok(records)
    }

    /// Run component J for one registered program point: one
    /// correction-only round of F followed by comparability-number
    /// assignment, in catalog variable order (spec §4.8). Called once
    /// per ppt at program end, after every execution has already fed
    /// [`Self::run_execution`].
    pub fn finalize_ppt(&mut self, ppt_idx: usize) -> Vec<u32> {
        final_pass::finalize_ppt(&mut self.ppts[ppt_idx].ppt, self.algebra.arena_mut())
    }

    /// Run component J for every registered program point, in
    /// registration order — the full program-end declarations pass
    /// (spec §4.8). Returns each ppt's name paired with its variables'
    /// comparability numbers; the embedding host zips these against the
    /// same root traversal [`Self::run_execution`] used, via
    /// [`crate::emit::decl_entry_for`], to build the declarations file.
    ///
    /// By default (`separate_entry_exit: false`), a function's entry and
    /// exit comparability numbers for the same variable are tied
    /// together: each exit ppt is finalized first, and its matching
    /// entry ppt's formals (always its shared prefix, in catalog order --
    /// [`Self::roots_for`] puts the same formals first on both sides)
    /// reuse the exit's numbers instead of getting their own, so a
    /// post-processor can never see the entry and exit versions of one
    /// variable placed in inconsistent classes. `separate_entry_exit:
    /// true` computes every ppt independently instead (spec §4.8).
    pub fn finalize_program(&mut self) -> Vec<(String, Vec<u32>)> {
        if self.config.separate_entry_exit {
            return (0..self.ppts.len()).map(|idx| (self.ppts[idx].name.clone(), self.finalize_ppt(idx))).collect();
        }

        let mut exit_nums: std::collections::HashMap<FunctionId, Vec<u32>> = std::collections::HashMap::new();
        let mut nums: Vec<Vec<u32>> = vec![Vec::new(); self.ppts.len()];

        for idx in 0..self.ppts.len() {
            if !self.ppts[idx].is_entry {
                let computed = self.finalize_ppt(idx);
                exit_nums.insert(self.ppts[idx].function, computed.clone());
                nums[idx] = computed;
            }
        }
        for idx in 0..self.ppts.len() {
            if self.ppts[idx].is_entry {
                nums[idx] = match exit_nums.get(&self.ppts[idx].function) {
                    Some(exit) => exit.iter().take(self.ppts[idx].ppt.num_vars).copied().collect(),
                    None => self.finalize_ppt(idx),
                };
            }
        }

        (0..self.ppts.len()).map(|idx| (self.ppts[idx].name.clone(), std::mem::take(&mut nums[idx]))).collect()
    }

    fn roots_for(&self, func: &FunctionEntry, is_entry: bool) -> Vec<crate::catalog::VariableEntry> {
        let mut roots = func.formals.clone();
        if !is_entry {
            roots.extend(func.return_vars.iter().cloned());
        }
        roots
    }

    /// Force a garbage-collection pass now, regardless of the configured
    /// threshold. The embedding host normally never needs to call this
    /// directly; [`Self::run_execution`] triggers it automatically.
    pub fn collect(&mut self) -> crate::gc::GcStats {
        let mut ppts: Vec<ProgramPoint> = self.ppts.iter().map(|r| r.ppt.clone()).collect();
        let (arena, shadow) = self.algebra.arena_and_shadow_both_mut();
        let stats = crate::gc::collect(arena, shadow, &mut ppts);
        for (record, ppt) in self.ppts.iter_mut().zip(ppts.into_iter()) {
            record.ppt = ppt;
        }
        info!(old = stats.old_next_tag, new = stats.new_next_tag, "tag gc pass");
        #[cfg(feature = "debug-stats")]
        self.stats.record_gc();
        stats
    }

    /// Name of a registered program point, for the emitter's declarations
    /// and values record headers.
    pub fn ppt_name(&self, ppt_idx: usize) -> &str {
        &self.ppts[ppt_idx].name
    }

    #[cfg(feature = "debug-stats")]
    pub fn stats(&self) -> &stats::EngineStats {
        &self.stats
    }
}

impl<H: DbiHost> Drop for DynCompEngine<H> {
    fn drop(&mut self) {
        debug!(ppt_count = self.ppts.len(), "dyncomp engine shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, DisambiguationOverride, TypeEntry, TypeKind, VariableEntry, Visibility};
    use crate::host::test_support::InMemoryHost;

    fn single_int_function(cat: &mut Catalog) -> FunctionId {
        let int_ty = cat.push_type(TypeEntry {
            name: "int".to_string(),
            kind: TypeKind::Int,
            byte_size: 4,
            fields: Vec::new(),
            static_members: Vec::new(),
            member_functions: Vec::new(),
            superclasses: Vec::new(),
        });
        let formal = VariableEntry {
            name: "x".to_string(),
            declared_type: int_ty,
            ptr_levels: 0,
            reference_level: 0,
            array_bounds: Vec::new(),
            is_string: false,
            struct_offset: None,
            parent_type: None,
            visibility: Visibility::Public,
            disambiguation: DisambiguationOverride::None,
            is_static_member: false,
        };
        cat.push_function(FunctionEntry {
            name: "f".to_string(),
            mangled_name: None,
            demangled_name: None,
            start_pc: 0,
            end_pc: 0,
            formals: vec![formal],
            locals: Vec::new(),
            return_vars: Vec::new(),
            parent_class: None,
            access: Visibility::Public,
            selection_filter: None,
        })
    }

    fn two_int_function(cat: &mut Catalog) -> FunctionId {
        let int_ty = cat.push_type(TypeEntry {
            name: "int".to_string(),
            kind: TypeKind::Int,
            byte_size: 4,
            fields: Vec::new(),
            static_members: Vec::new(),
            member_functions: Vec::new(),
            superclasses: Vec::new(),
        });
        let formal = |name: &str| VariableEntry {
            name: name.to_string(),
            declared_type: int_ty,
            ptr_levels: 0,
            reference_level: 0,
            array_bounds: Vec::new(),
            is_string: false,
            struct_offset: None,
            parent_type: None,
            visibility: Visibility::Public,
            disambiguation: DisambiguationOverride::None,
            is_static_member: false,
        };
        cat.push_function(FunctionEntry {
            name: "g".to_string(),
            mangled_name: None,
            demangled_name: None,
            start_pc: 0,
            end_pc: 0,
            formals: vec![formal("x"), formal("y")],
            locals: Vec::new(),
            return_vars: Vec::new(),
            parent_class: None,
            access: Visibility::Public,
            selection_filter: None,
        })
    }

    #[test]
    fn single_execution_produces_one_value_record() {
        let mut cat = Catalog::new();
        let f = single_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &7i32.to_le_bytes());

        let mut engine = DynCompEngine::new(DynCompConfig::default(), cat, host);
        let ppt = engine.register_ppt(f, true, 1);
        let records = engine.run_execution(ppt, &[Some(0)]).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "x");
        assert_eq!(records[0].rendering, crate::emit::Rendering::Value("7".to_string()));
    }

    #[test]
    fn repeated_executions_keep_same_rendering() {
        let mut cat = Catalog::new();
        let f = single_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &7i32.to_le_bytes());

        let mut engine = DynCompEngine::new(DynCompConfig::default(), cat, host);
        let ppt = engine.register_ppt(f, true, 1);
        let first = engine.run_execution(ppt, &[Some(0)]).unwrap();
        let second = engine.run_execution(ppt, &[Some(0)]).unwrap();
        assert_eq!(first[0].rendering, second[0].rendering);
    }

    #[test]
    fn finalize_ppt_shares_comp_num_for_aliased_formals() {
        let mut cat = Catalog::new();
        let f = two_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &1i32.to_le_bytes());

        let mut engine = DynCompEngine::new(DynCompConfig::default(), cat, host);
        let ppt = engine.register_ppt(f, true, 2);
        // Both formals alias the same address, so they share one tag
        // after load_tag_N merges the byte range.
        engine.run_execution(ppt, &[Some(0), Some(0)]).unwrap();

        let comp_nums = engine.finalize_ppt(ppt);
        assert_eq!(comp_nums.len(), 2);
        assert_eq!(comp_nums[0], comp_nums[1]);
    }

    #[test]
    fn finalize_ppt_keeps_unrelated_formals_distinct() {
        let mut cat = Catalog::new();
        let f = two_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &1i32.to_le_bytes());
        host.write(4, &2i32.to_le_bytes());

        let mut engine = DynCompEngine::new(DynCompConfig::default(), cat, host);
        let ppt = engine.register_ppt(f, true, 2);
        engine.run_execution(ppt, &[Some(0), Some(4)]).unwrap();

        let comp_nums = engine.finalize_ppt(ppt);
        assert_ne!(comp_nums[0], comp_nums[1]);
    }

    #[test]
    fn finalize_program_ties_entry_and_exit_comp_nums_by_default() {
        let mut cat = Catalog::new();
        let f = two_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &1i32.to_le_bytes());
        host.write(4, &2i32.to_le_bytes());

        let mut engine = DynCompEngine::new(DynCompConfig::default(), cat, host);
        let entry = engine.register_ppt(f, true, 2);
        let exit = engine.register_ppt(f, false, 2);

        // Entry sees x and y at distinct addresses...
        engine.run_execution(entry, &[Some(0), Some(4)]).unwrap();
        // ...but by exit they alias the same address.
        engine.run_execution(exit, &[Some(0), Some(0)]).unwrap();

        let finals = engine.finalize_program();
        let entry_nums = finals.iter().find(|(name, _)| name.as_str() == engine.ppt_name(entry)).unwrap().1.clone();
        let exit_nums = finals.iter().find(|(name, _)| name.as_str() == engine.ppt_name(exit)).unwrap().1.clone();

        // Default: the entry side is tied to the exit side, not computed
        // from its own (distinct-looking) observations.
        assert_eq!(entry_nums, exit_nums);
        assert_eq!(exit_nums[0], exit_nums[1]);
    }

    #[test]
    fn separate_entry_exit_computes_independent_comp_nums() {
        let mut cat = Catalog::new();
        let f = two_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &1i32.to_le_bytes());
        host.write(4, &2i32.to_le_bytes());

        let mut config = DynCompConfig::default();
        config.separate_entry_exit = true;
        let mut engine = DynCompEngine::new(config, cat, host);
        let entry = engine.register_ppt(f, true, 2);
        let exit = engine.register_ppt(f, false, 2);

        engine.run_execution(entry, &[Some(0), Some(4)]).unwrap();
        engine.run_execution(exit, &[Some(0), Some(0)]).unwrap();

        let finals = engine.finalize_program();
        let entry_nums = finals.iter().find(|(name, _)| name.as_str() == engine.ppt_name(entry)).unwrap().1.clone();
        let exit_nums = finals.iter().find(|(name, _)| name.as_str() == engine.ppt_name(exit)).unwrap().1.clone();

        assert_ne!(entry_nums[0], entry_nums[1]);
        assert_eq!(exit_nums[0], exit_nums[1]);
    }

    #[test]
    fn finalize_program_covers_every_registered_ppt() {
        let mut cat = Catalog::new();
        let f = single_int_function(&mut cat);
        let mut host = InMemoryHost::new();
        host.write(0, &7i32.to_le_bytes());

        let mut engine = DynCompEngine::new(DynCompConfig::default(), cat, host);
        let ppt = engine.register_ppt(f, true, 1);
        engine.run_execution(ppt, &[Some(0)]).unwrap();

        let finals = engine.finalize_program();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].0, engine.ppt_name(ppt));
        assert_eq!(finals[0].1.len(), 1);
    }
}

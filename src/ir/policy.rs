//! Component D, part 1 — the opcode -> interaction-policy decision table
//! (spec §4.4).

use crate::config::InteractionMode;

/// The closed vocabulary of IR-level operations the instrumentation pass
/// classifies. Groups line up with spec §4.4's numbered policy list, not
/// with any particular guest ISA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrOp {
    /// Integer or vector add (scalar or per-lane).
    Add,
    /// Integer or vector sub.
    Sub,
    /// Integer or vector multiply.
    Mul,
    /// Integer or vector divide.
    Div,
    /// Bitwise and/or/xor.
    Bitwise,
    /// Min/max/avg.
    MinMaxAvg,
    /// Saturating arithmetic.
    Saturating,
    /// Narrowing conversion.
    Narrowing,
    /// Lane interleave.
    Interleave,
    /// Widening concatenation.
    WideningConcat,
    /// Floating-point add/sub/mul/div; the rounding-mode operand (if any)
    /// is never passed to [`IrOp::classify`] as one of the merged operands.
    FloatArith,
    /// Integer, float, or vector element-wise comparison.
    Compare,
    /// Shift or rotate by a separate amount operand.
    ShiftRotate,
    /// Permute-by-selector, lane-broadcast-by-scalar-selector, or
    /// lane-insertion.
    PermuteSelect,
    /// Rounding-mode-parameterized float conversion: first operand is the
    /// rounding mode, second is the value converted.
    RoundingConvert,
    /// `fma`-style ternary op whose first argument is a rounding mode;
    /// handled separately by [`crate::ir::instrument_fma`] since it takes
    /// three value operands, not two.
    Fma,
    /// An opcode with no counterpart on the platforms this tool supports.
    /// Reached only by a configuration/decode error.
    Unsupported,
}

/// The policy selected for one IR operation (spec §4.4, "exactly one
/// policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionPolicy {
    /// Result tag is `merge_tags(tag(a), tag(b))`.
    MergeBothPassThrough,
    /// Result tag is `0`; the merge still happens for its side effect.
    MergeBothReturnZero,
    /// Result tag equals the first operand's tag; no merge performed.
    PassThroughFirst,
    /// Result tag equals the second operand's tag; no merge performed.
    PassThroughSecond,
    /// Result tag is the literal `0`.
    ResultZero,
}

impl IrOp {
    /// The every-interactions-on (`InteractionMode::All`) base policy,
    /// before modal overrides are applied.
    const fn base_policy(self) -> InteractionPolicy {
        use InteractionPolicy::*;
        match self {
            IrOp::Add
            | IrOp::Sub
            | IrOp::Mul
            | IrOp::Div
            | IrOp::Bitwise
            | IrOp::MinMaxAvg
            | IrOp::Saturating
            | IrOp::Narrowing
            | IrOp::Interleave
            | IrOp::WideningConcat
            | IrOp::FloatArith => MergeBothPassThrough,

            IrOp::Compare => MergeBothReturnZero,

            IrOp::ShiftRotate | IrOp::PermuteSelect => PassThroughFirst,

            IrOp::RoundingConvert => PassThroughSecond,
            // Fma is dispatched through its own helper; classify() is not
            // called for it, but a policy is still needed for exhaustiveness
            // and callers that fall back to the generic binary path.
            IrOp::Fma => PassThroughSecond,

            IrOp::Unsupported => ResultZero,
        }
    }

    /// Whether this op is addition/subtraction -- the only
    /// `MergeBothPassThrough` ops that `units-only` mode keeps merging
    /// (dimensional analysis: addition preserves units, multiplication
    /// does not).
    const fn is_add_sub(self) -> bool {
        matches!(self, IrOp::Add | IrOp::Sub)
    }

    /// Classify this opcode under the given interaction mode, applying
    /// the four modal overrides of spec §4.4 item 7.
    pub const fn classify(self, mode: InteractionMode) -> InteractionPolicy {
        let base = self.base_policy();
        match (base, mode) {
            (InteractionPolicy::MergeBothPassThrough, InteractionMode::DataflowOnly) => InteractionPolicy::ResultZero,
            (InteractionPolicy::MergeBothPassThrough, InteractionMode::DataflowComparisons) => {
                InteractionPolicy::ResultZero
            }
            (InteractionPolicy::MergeBothPassThrough, InteractionMode::Units) if !self.is_add_sub() => {
                InteractionPolicy::ResultZero
            }
            (InteractionPolicy::MergeBothReturnZero, InteractionMode::DataflowOnly) => InteractionPolicy::ResultZero,
            _ => base,
        }
    }
}

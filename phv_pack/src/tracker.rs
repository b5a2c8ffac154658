//! Per-action write/read/operand bookkeeping.
//!
//! `add_action` ingests one action's structural analysis and grows five
//! indices; after ingestion the tracker is queried read-only by the
//! feasibility engine. `clear()` resets everything for reuse across
//! compilation passes.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use log::warn;
use smallvec::SmallVec;

use phv_model::ids::{ActionId, FieldId, TableId};
use phv_model::slice::{BitRange, FieldSlice};
use phv_util::SmallSet;

use crate::operand::{op_class, ActionOps, OperandFlags, OperandInfo, SourceOperand, SpecialtyKind};

/// Pass-scoped context threading the action counter through ingestion.
/// One `BuildContext` per compilation pass; no cross-pass state leaks.
#[derive(Debug, Default)]
pub struct BuildContext {
    next_action: u32,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> ActionId {
        let id = ActionId(self.next_action);
        self.next_action += 1;
        id
    }
}

/// The queryable write/read indices for one compilation pass.
///
/// Growth is monotonic during ingestion; queries are pure functions of
/// already-ingested state.
#[derive(Debug, Default)]
pub struct ConstraintTracker {
    /// field -> written range -> actions writing that range.
    field_writes_to_actions: BTreeMap<FieldId, BTreeMap<BitRange, SmallSet<ActionId, 4>>>,
    /// action -> one record per destination written by the action.
    action_to_writes: IndexMap<ActionId, Vec<OperandInfo>>,
    /// action -> PHV slices read by the action.
    action_to_reads: IndexMap<ActionId, Vec<FieldSlice>>,
    /// dest field -> action -> dest range -> source operands producing it.
    write_to_reads: BTreeMap<FieldId, BTreeMap<ActionId, BTreeMap<BitRange, Vec<OperandInfo>>>>,
    /// source field -> action -> source range -> destinations it feeds.
    read_to_writes: BTreeMap<FieldId, BTreeMap<ActionId, BTreeMap<BitRange, Vec<FieldSlice>>>>,
    /// fields read as stateful-ALU inputs, and by which actions.
    stateful_reads: BTreeMap<FieldId, SmallSet<ActionId, 4>>,
    /// action -> owning table.
    table_of: HashMap<ActionId, TableId>,
}

impl ConstraintTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one action's structural analysis. Panics if the analysis
    /// claims a write with no source operand: that means the upstream
    /// collaborator produced inconsistent data, which is unrecoverable.
    pub fn add_action(
        &mut self,
        ctx: &mut BuildContext,
        ops: &ActionOps,
        table: TableId,
    ) -> ActionId {
        let action = ctx.next();
        self.table_of.insert(action, table);
        let writes = self.action_to_writes.entry(action).or_default();
        let reads = self.action_to_reads.entry(action).or_default();

        for desc in &ops.writes {
            assert!(
                !desc.sources.is_empty(),
                "action {action} writes {} with no source operand",
                desc.dest
            );
            let mut flags = op_class(&desc.operation);
            if flags == OperandFlags::NONE {
                warn!(
                    "action {action}: unclassified operation `{}` on {}",
                    desc.operation, desc.dest
                );
            }
            if desc.sources.len() > 1 {
                flags |= OperandFlags::ANOTHER_OPERAND;
            }

            // Write-side record: the destination with its operation flags.
            let mut dest_info =
                OperandInfo::from_source(&SourceOperand::phv(desc.dest), &desc.operation, flags);
            // The destination record carries the strongest specialty among
            // the action-data sources feeding it.
            for src in &desc.sources {
                if let SourceOperand::ActionData(kind) = src {
                    if kind.is_special() && !dest_info.specialty().is_special() {
                        dest_info.action_data = Some(*kind);
                    }
                }
            }
            writes.push(dest_info);

            self.field_writes_to_actions
                .entry(desc.dest.field)
                .or_default()
                .entry(desc.dest.range)
                .or_default()
                .insert(action);

            let per_dest = self
                .write_to_reads
                .entry(desc.dest.field)
                .or_default()
                .entry(action)
                .or_default()
                .entry(desc.dest.range)
                .or_default();

            for src in &desc.sources {
                per_dest.push(OperandInfo::from_source(src, &desc.operation, flags));
                if let SourceOperand::Phv { slice, stateful } = src {
                    reads.push(*slice);
                    self.read_to_writes
                        .entry(slice.field)
                        .or_default()
                        .entry(action)
                        .or_default()
                        .entry(slice.range)
                        .or_default()
                        .push(desc.dest);
                    if *stateful {
                        self.stateful_reads
                            .entry(slice.field)
                            .or_default()
                            .insert(action);
                    }
                }
            }
        }
        action
    }

    /// Reset all indices for a fresh pass.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Destination records of `action`, one per written slice.
    pub fn writes(&self, action: ActionId) -> &[OperandInfo] {
        self.action_to_writes
            .get(&action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// PHV slices read by `action`.
    pub fn reads(&self, action: ActionId) -> &[FieldSlice] {
        self.action_to_reads
            .get(&action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Source operands that produce `dst` in `action`. Recorded writes
    /// wider than the queried range are shrunk to the overlap and their
    /// PHV source slices shifted by the same linear offset.
    pub fn sources(&self, dst: &FieldSlice, action: ActionId) -> Vec<OperandInfo> {
        let mut out = Vec::new();
        let Some(per_action) = self
            .write_to_reads
            .get(&dst.field)
            .and_then(|m| m.get(&action))
        else {
            return out;
        };
        for (recorded, ops) in per_action {
            let Some(overlap) = recorded.intersect(&dst.range) else {
                continue;
            };
            let lo_trim = (overlap.lo - recorded.lo) as i32;
            let hi_trim = (recorded.hi - overlap.hi) as i32;
            for op in ops {
                let mut op = op.clone();
                // Shrink the source by the same amount the recorded dest
                // range was shrunk, keeping the linear mapping. Sources
                // narrower than the dest (zero-extending moves) pass
                // through unchanged.
                if let Some(slice) = op.phv {
                    if slice.range.width() == recorded.width() {
                        let src_range = BitRange::new(
                            (slice.range.lo as i32 + lo_trim) as u16,
                            (slice.range.hi as i32 - hi_trim) as u16,
                        );
                        op.phv = Some(FieldSlice::new(slice.field, src_range));
                    }
                }
                out.push(op);
            }
        }
        out
    }

    /// Destination slices fed by `src` in `action`: the mirror image of
    /// [`Self::sources`], with the same shrink-and-shift treatment.
    pub fn destinations(&self, src: &FieldSlice, action: ActionId) -> Vec<FieldSlice> {
        let mut out = Vec::new();
        let Some(per_action) = self
            .read_to_writes
            .get(&src.field)
            .and_then(|m| m.get(&action))
        else {
            return out;
        };
        for (recorded, dests) in per_action {
            let Some(overlap) = recorded.intersect(&src.range) else {
                continue;
            };
            let lo_trim = (overlap.lo - recorded.lo) as i32;
            let hi_trim = (recorded.hi - overlap.hi) as i32;
            for dest in dests {
                if dest.range.width() != recorded.width() {
                    out.push(*dest);
                    continue;
                }
                let range = BitRange::new(
                    (dest.range.lo as i32 + lo_trim) as u16,
                    (dest.range.hi as i32 - hi_trim) as u16,
                );
                out.push(FieldSlice::new(dest.field, range));
            }
        }
        out
    }

    /// Actions writing any bit of `slice`.
    pub fn written_in(&self, slice: &FieldSlice) -> SmallSet<ActionId, 4> {
        let mut actions = SmallSet::new();
        if let Some(ranges) = self.field_writes_to_actions.get(&slice.field) {
            for (range, set) in ranges {
                if range.overlaps(&slice.range) {
                    actions.extend(set.iter().copied());
                }
            }
        }
        actions
    }

    /// Actions reading any bit of `slice`.
    pub fn read_in(&self, slice: &FieldSlice) -> SmallSet<ActionId, 4> {
        let mut actions = SmallSet::new();
        if let Some(per_action) = self.read_to_writes.get(&slice.field) {
            for (&action, ranges) in per_action {
                if ranges.keys().any(|r| r.overlaps(&slice.range)) {
                    actions.insert(action);
                }
            }
        }
        actions
    }

    /// Actions in which `field` feeds a stateful ALU.
    pub fn stateful_read_actions(&self, field: FieldId) -> Option<&SmallSet<ActionId, 4>> {
        self.stateful_reads.get(&field)
    }

    /// The specialty kind `action` writes into `slice`, if any of the
    /// sources is specialty action data.
    pub fn specialty_written(&self, slice: &FieldSlice, action: ActionId) -> SpecialtyKind {
        self.sources(slice, action)
            .iter()
            .map(OperandInfo::specialty)
            .find(|k| k.is_special())
            .unwrap_or(SpecialtyKind::None)
    }

    pub fn table_of(&self, action: ActionId) -> Option<TableId> {
        self.table_of.get(&action).copied()
    }

    /// All actions the tracker has ingested, in ingestion order.
    pub fn actions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.action_to_writes.keys().copied()
    }
}

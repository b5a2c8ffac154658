//! The action-constraint feasibility engine.
//!
//! `can_pack` answers: for this candidate container packing, does a legal
//! sequence of native ALU instructions exist for every action touching the
//! container, and if only conditionally, under which placement constraints
//! for the still-unallocated sources? Each check is an early-exit gate;
//! the first violated gate names the failure.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use smallvec::SmallVec;

use phv_model::alloc_slice::AllocSlice;
use phv_model::container::Container;
use phv_model::device::Device;
use phv_model::ids::{ActionId, FieldId};
use phv_model::slice::FieldSlice;
use phv_util::{SccTopoSorter, SmallSet, UnionFind};

use crate::conditional::{ConditionalConstraint, ConditionalConstraints};
use crate::error::PackError;
use crate::operand::SpecialtyKind;
use crate::property::{ActionContainerProperty, OperationType};
use crate::snapshot::AllocSnapshot;
use crate::solver::{solver_for, MoveAssign, MovePlan, SolverSource, WriteKind};
use crate::tracker::ConstraintTracker;

/// Fields initialized by an overlay decision, and the actions carrying
/// that initialization. Produced by the overlay engine, threaded through
/// so the solver sees initialization writes like any other write.
pub type InitActions = BTreeMap<FieldId, SmallSet<ActionId, 2>>;

/// The feasibility oracle. Holds read-only references for the duration of
/// one allocation round; every query is a pure function of its inputs.
pub struct ActionPhvConstraints<'a> {
    device: &'a Device,
    tracker: &'a ConstraintTracker,
}

impl<'a> ActionPhvConstraints<'a> {
    pub fn new(device: &'a Device, tracker: &'a ConstraintTracker) -> Self {
        Self { device, tracker }
    }

    pub fn device(&self) -> &Device {
        self.device
    }

    /// Decide feasibility of packing `candidate` into its container given
    /// `existing` slices already resident there. On success the returned
    /// constraints pin down still-unallocated sources; on failure the
    /// error names the first hardware reason the packing cannot work.
    pub fn can_pack(
        &self,
        snapshot: &dyn AllocSnapshot,
        candidate: &[AllocSlice],
        existing: &[AllocSlice],
        init_actions: &InitActions,
    ) -> Result<ConditionalConstraints, PackError> {
        let Some(first) = candidate.first() else {
            return Ok(ConditionalConstraints::new());
        };
        let container = first.container;
        debug_assert!(
            candidate.iter().all(|s| s.container == container),
            "candidate slices span more than one container"
        );
        if !container.accepts_alu() {
            trace!("{container} is tagalong, accepting without checks");
            return Ok(ConditionalConstraints::new());
        }

        let mut state: Vec<AllocSlice> = candidate.to_vec();
        state.extend(existing.iter().cloned());

        self.check_pack_constraints(snapshot, candidate, &state)?;
        self.check_stateful_alignment(snapshot, &state)?;

        let actions = self.actions_touching(&state);
        trace!(
            "can_pack {container}: {} state slices, {} actions",
            state.len(),
            actions.len()
        );

        let mut props: Vec<ActionContainerProperty> = Vec::with_capacity(actions.len());
        for &action in &actions {
            let prop =
                ActionContainerProperty::derive(action, container, &state, self.tracker, snapshot);
            if !prop.writes_anything() {
                continue;
            }
            self.check_bitmasked_specialty(&prop)?;
            self.check_specialty_isolation(&prop)?;
            self.check_operation_type(&prop, snapshot)?;
            self.check_action_data_mixing(&prop)?;
            self.check_source_counts(container, &state, &prop, snapshot)?;
            self.check_write_masks(&prop, snapshot)?;
            self.check_rotational_alignment(&prop, snapshot)?;
            props.push(prop);
        }

        let constraints = self.resolve_conditional_constraints(snapshot, &props)?;

        for prop in &props {
            self.check_move_constraints(container, &state, prop, snapshot, init_actions, &constraints)?;
        }

        debug!(
            "can_pack {container}: feasible, {} conditional constraints",
            constraints.slices.len()
        );
        Ok(constraints)
    }

    /// Flattened-slice-set entry point: same gates over one merged view
    /// of the container, no conditional-constraint derivation. Strictly
    /// weaker than [`Self::can_pack`]; the error's `Display` carries the
    /// diagnostic message.
    pub fn can_pack_v2(
        &self,
        snapshot: &dyn AllocSnapshot,
        slices: &[AllocSlice],
        init_actions: &InitActions,
    ) -> Result<(), PackError> {
        self.can_pack(snapshot, slices, &[], init_actions).map(|_| ())
    }

    // -----------------------------------------------------------------
    // Gates
    // -----------------------------------------------------------------

    /// Gate: no-co-pack constraints recorded by table placement. A pair
    /// escapes the constraint only when physical live ranges prove the
    /// two slices never coexist.
    fn check_pack_constraints(
        &self,
        snapshot: &dyn AllocSnapshot,
        candidate: &[AllocSlice],
        state: &[AllocSlice],
    ) -> Result<(), PackError> {
        for a in candidate {
            for b in state {
                if a.field == b.field {
                    continue;
                }
                if !snapshot.no_copack(a.field, b.field) {
                    continue;
                }
                let provably_disjoint =
                    snapshot.uses_physical_liveranges() && a.live.disjoint(&b.live);
                if !provably_disjoint {
                    return Err(PackError::PackConstraintPresent {
                        a: a.field_slice(),
                        b: b.field_slice(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Gate: a field feeding a stateful ALU must present one rotational
    /// alignment. Two slices of such a field placed at different offsets
    /// would require the ALU input crossbar to see two rotations at once.
    fn check_stateful_alignment(
        &self,
        _snapshot: &dyn AllocSnapshot,
        state: &[AllocSlice],
    ) -> Result<(), PackError> {
        let mut offsets: BTreeMap<FieldId, BTreeSet<i32>> = BTreeMap::new();
        for slice in state {
            if self.tracker.stateful_read_actions(slice.field).is_some() {
                offsets
                    .entry(slice.field)
                    .or_default()
                    .insert(slice.container_offset());
            }
        }
        for (field, offs) in offsets {
            if offs.len() > 1 {
                trace!("stateful field {field} placed at offsets {offs:?}");
                return Err(PackError::StatefulDestAlignment { field });
            }
        }
        Ok(())
    }

    /// Gate: a write fed by specialty action data cannot use the
    /// bitmasked-set form, so its write mask must be contiguous.
    fn check_bitmasked_specialty(&self, prop: &ActionContainerProperty) -> Result<(), PackError> {
        let specialty_ad = prop.written.iter().any(|(_, ops)| {
            ops.iter()
                .any(|op| op.action_data.is_some_and(|k| k.is_special()))
        });
        if specialty_ad && !mask_is_contiguous(prop.write_mask) {
            return Err(PackError::BitmaskedSetRequired {
                action: prop.action,
            });
        }
        Ok(())
    }

    /// Gate: destinations of METER_ALU/HASH_DIST/RANDOM/METER_COLOR
    /// writes must be the only field the action writes in the container.
    fn check_specialty_isolation(&self, prop: &ActionContainerProperty) -> Result<(), PackError> {
        for (dest, ops) in &prop.written {
            let special = ops.iter().any(|op| {
                matches!(
                    op.specialty(),
                    SpecialtyKind::MeterAlu
                        | SpecialtyKind::HashDist
                        | SpecialtyKind::Random
                        | SpecialtyKind::MeterColor
                )
            });
            if !special {
                continue;
            }
            let other_field_written = prop.written.iter().any(|(s, _)| s.field != dest.field);
            if other_field_written {
                return Err(PackError::SpecialtyDataIsolation {
                    dest: dest.field_slice(),
                    action: prop.action,
                });
            }
        }
        Ok(())
    }

    /// Gate: classify the operation type; mixed kinds are unconditionally
    /// illegal, whole-container writes of several fields need adjacent
    /// source slices.
    fn check_operation_type(
        &self,
        prop: &ActionContainerProperty,
        snapshot: &dyn AllocSnapshot,
    ) -> Result<(), PackError> {
        match prop.op_type {
            OperationType::Mixed => Err(PackError::MixedOperation {
                action: prop.action,
            }),
            OperationType::WholeContainer => {
                // More than one field is written at once; the PHV source
                // slices must form one adjacent run so a single source
                // operand can supply them.
                let mut sources: Vec<FieldSlice> = prop
                    .written
                    .iter()
                    .flat_map(|(_, ops)| ops.iter().filter_map(|op| op.phv))
                    .collect();
                if sources.len() > 1 {
                    sources.sort();
                    let adjacent = sources
                        .windows(2)
                        .all(|w| w[0].joinable(&w[1]) || same_container_adjacent(&w[0], &w[1], snapshot));
                    if !adjacent {
                        return Err(PackError::NonAdjacentWholeContainer {
                            action: prop.action,
                        });
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Gate: action-data participation. Bitwise operations must source
    /// the whole container from action data or none of it; two distinct
    /// specialty kinds cannot share one action unless one side is
    /// constant-only hash distribution.
    fn check_action_data_mixing(&self, prop: &ActionContainerProperty) -> Result<(), PackError> {
        let mut ad_dests = 0usize;
        let mut phv_dests = 0usize;
        let mut specials: BTreeSet<SpecialtyKind> = BTreeSet::new();
        for (_, ops) in &prop.written {
            let has_ad = ops
                .iter()
                .any(|op| op.action_data.is_some() || op.constant.is_some());
            let has_phv = ops.iter().any(|op| op.phv.is_some());
            if has_ad {
                ad_dests += 1;
            }
            if has_phv {
                phv_dests += 1;
            }
            for op in ops {
                if let Some(kind) = op.action_data {
                    if kind.is_special() {
                        specials.insert(kind);
                    }
                }
            }
        }

        let partial_ad = ad_dests > 0 && phv_dests > 0;
        if partial_ad && prop.op_type == OperationType::Bitwise {
            return Err(PackError::BitwiseMixedActionData {
                action: prop.action,
            });
        }

        if specials.len() > 1 {
            let excusable = specials.len() == 2
                && specials.contains(&SpecialtyKind::HashDist)
                && self.hash_dist_is_constant_only(prop);
            if !excusable {
                return Err(PackError::ComplexActionDataPacking {
                    action: prop.action,
                });
            }
        }
        Ok(())
    }

    /// Whether every write sourced by hash distribution in this action
    /// also sources only constants besides it.
    fn hash_dist_is_constant_only(&self, prop: &ActionContainerProperty) -> bool {
        prop.written.iter().all(|(_, ops)| {
            let uses_hash = ops
                .iter()
                .any(|op| op.action_data == Some(SpecialtyKind::HashDist));
            if !uses_hash {
                return true;
            }
            ops.iter().all(|op| {
                op.constant.is_some() || op.action_data == Some(SpecialtyKind::HashDist)
            })
        })
    }

    /// Gate: device source-count limits. At most two allocated PHV source
    /// containers; action data or a constant costs the second slot;
    /// mocha/dark destinations cap at one PHV source and must have every
    /// resident slice written together.
    fn check_source_counts(
        &self,
        container: Container,
        state: &[AllocSlice],
        prop: &ActionContainerProperty,
        _snapshot: &dyn AllocSnapshot,
    ) -> Result<(), PackError> {
        let allocated = prop.sources.allocated_sources();
        let has_data = prop.sources.has_action_data || prop.sources.has_constant;

        if allocated > 2 {
            return Err(PackError::MoreThanTwoSources {
                action: prop.action,
                count: allocated,
            });
        }
        if allocated == 2 && has_data {
            return Err(PackError::TwoSourcesAndConstant {
                action: prop.action,
            });
        }

        if container.whole_container_writes_only() {
            // Unallocated sources of one action are co-packed into a single
            // prospective container by the conditional constraints, so they
            // jointly cost one source slot.
            let prospective = prop.sources.allocated.len()
                + usize::from(!prop.sources.unallocated.is_empty())
                + prop.sources.double_counted;
            if prospective > 1 {
                return Err(PackError::WholeContainerMultipleSources {
                    action: prop.action,
                    container,
                    count: prospective,
                });
            }
            // Partial writes are impossible: every slice live across this
            // action must be written by it.
            for slice in state {
                let written = prop
                    .written
                    .iter()
                    .any(|(w, _)| w.field_slice() == slice.field_slice());
                if written {
                    continue;
                }
                let concurrent = prop
                    .written
                    .iter()
                    .any(|(w, _)| w.live.overlaps(&slice.live));
                if concurrent {
                    return Err(PackError::WholeContainerPartialWrite {
                        action: prop.action,
                        container,
                    });
                }
            }
        }
        Ok(())
    }

    /// Gate: deposit-field needs a contiguous destination mask per PHV
    /// source operand.
    fn check_write_masks(
        &self,
        prop: &ActionContainerProperty,
        snapshot: &dyn AllocSnapshot,
    ) -> Result<(), PackError> {
        if prop.op_type != OperationType::Move && prop.op_type != OperationType::PartOfContainer {
            return Ok(());
        }
        // Destination mask per source key: allocated sources keyed by
        // container, unallocated by field.
        let mut masks: BTreeMap<SourceKey, u64> = BTreeMap::new();
        for (dest, ops) in &prop.written {
            for op in ops {
                let Some(src) = op.phv else { continue };
                let placed = snapshot.slices_of(&src);
                let key = if placed.is_empty() {
                    SourceKey::Field(src.field)
                } else {
                    SourceKey::Container(placed[0].container)
                };
                *masks.entry(key).or_insert(0) |= dest.container_range.mask();
            }
        }
        for (key, mask) in masks {
            if !mask_is_contiguous(mask) {
                trace!("source {key:?} writes non-contiguous mask {mask:#x}");
                return Err(PackError::InvalidWriteMask {
                    action: prop.action,
                });
            }
        }
        Ok(())
    }

    /// Gate: rotational alignment of allocated sources. Each source
    /// container must present one consistent rotation; with two source
    /// containers at most one may be rotated, and rotations must be
    /// byte-sized for the merge form.
    fn check_rotational_alignment(
        &self,
        prop: &ActionContainerProperty,
        snapshot: &dyn AllocSnapshot,
    ) -> Result<(), PackError> {
        let mut rotations: BTreeMap<Container, BTreeSet<i32>> = BTreeMap::new();
        let mut field_of: BTreeMap<Container, FieldId> = BTreeMap::new();

        for (dest, ops) in &prop.written {
            for op in ops {
                let Some(src) = op.phv else { continue };
                for placed in snapshot.slices_of(&src) {
                    // Destination bits corresponding to this placement.
                    let shift = placed.field_range.lo as i32 - src.range.lo as i32;
                    let dest_lo = dest.container_range.lo as i32 + shift;
                    let rot = dest_lo - placed.container_range.lo as i32;
                    rotations.entry(placed.container).or_default().insert(rot);
                    field_of.entry(placed.container).or_insert(src.field);
                }
            }
        }

        for (container, rots) in &rotations {
            if rots.len() > 1 {
                return Err(PackError::SliceOffsetMismatch {
                    action: prop.action,
                    field: field_of[container],
                });
            }
        }

        if rotations.len() == 2 {
            let rots: SmallVec<[i32; 2]> = rotations
                .values()
                .map(|s| *s.iter().next().expect("rotation set is non-empty"))
                .collect();
            if rots.iter().all(|&r| r != 0) {
                return Err(PackError::BothSourcesRotated {
                    action: prop.action,
                });
            }
            for &rot in &rots {
                if rot % 8 != 0 {
                    return Err(PackError::SliceAlignment {
                        action: prop.action,
                        rotation: rot,
                    });
                }
            }
        }
        Ok(())
    }

    /// Gate: resolve per-slice placement requirements for unallocated
    /// sources and the co-pack grouping between them.
    fn resolve_conditional_constraints(
        &self,
        snapshot: &dyn AllocSnapshot,
        props: &[ActionContainerProperty],
    ) -> Result<ConditionalConstraints, PackError> {
        // Required low-bit positions per unallocated source slice: a move
        // into dest bits [lo..hi] wants the source at the same offset.
        let mut positions: BTreeMap<FieldSlice, BTreeSet<u16>> = BTreeMap::new();
        let mut copack: UnionFind<FieldSlice> = UnionFind::new();

        for prop in props {
            let mut unallocated_here: Vec<FieldSlice> = Vec::new();
            for (dest, ops) in &prop.written {
                for op in ops {
                    let Some(src) = op.phv else { continue };
                    if !snapshot.slices_of(&src).is_empty() {
                        continue;
                    }
                    positions
                        .entry(src)
                        .or_default()
                        .insert(dest.container_range.lo);
                    unallocated_here.push(src);
                }
            }
            // Two unallocated sources feeding one action on one container
            // must land in one source container together.
            if unallocated_here.len() >= 2 {
                for pair in unallocated_here.windows(2) {
                    copack.union(pair[0], pair[1]);
                }
            }
        }

        let mut constraints = ConditionalConstraints::new();
        for (slice, required) in &positions {
            if required.len() > 1 {
                return Err(PackError::MultipleAlignments { slice: *slice });
            }
            let bit_position = *required.iter().next().expect("position set is non-empty");
            constraints
                .slices
                .insert(*slice, ConditionalConstraint {
                    bit_position,
                    container: None,
                });
        }

        // Position collisions between two fields that may be live at once.
        let placed: Vec<(&FieldSlice, u16)> = constraints
            .slices
            .iter()
            .map(|(s, c)| (s, c.bit_position))
            .collect();
        for (i, (a, pa)) in placed.iter().enumerate() {
            for (b, pb) in placed.iter().skip(i + 1) {
                if a.field == b.field || !copack.same_set(*a, *b) {
                    continue;
                }
                let a_range = *pa..(*pa + a.width());
                let b_range = *pb..(*pb + b.width());
                let overlap = a_range.start < b_range.end && b_range.start < a_range.end;
                if overlap && !snapshot.mutually_exclusive(a.field, b.field) {
                    return Err(PackError::OverlappingSlices { a: **a, b: **b });
                }
            }
        }

        // Order each co-pack group source-before-destination, so a caller
        // placing the group allocates feeders ahead of the slices they
        // feed. A dependency cycle collapses to one rank and falls back to
        // the slice order.
        let rank = self.source_precedence(constraints.slices.keys().copied());
        for mut group in copack.groups() {
            if group.len() >= 2 {
                group.sort_by_key(|s| (rank.get(s).copied().unwrap_or(1), *s));
                constraints.pack_together.push(group);
            }
        }
        Ok(constraints)
    }

    /// Rank the given slices by "source before destination": a slice read
    /// by an action that writes another of the slices ranks lower.
    fn source_precedence(
        &self,
        slices: impl Iterator<Item = FieldSlice>,
    ) -> BTreeMap<FieldSlice, u32> {
        let mut sorter = SccTopoSorter::new();
        let nodes: BTreeMap<FieldSlice, u32> =
            slices.map(|s| (s, sorter.new_node())).collect();
        for (a, &na) in &nodes {
            for &action in self.tracker.read_in(a).iter() {
                for dest in self.tracker.destinations(a, action) {
                    for (b, &nb) in &nodes {
                        if na != nb
                            && b.field == dest.field
                            && b.range.intersect(&dest.range).is_some()
                        {
                            sorter.add_dep(na, nb);
                        }
                    }
                }
            }
        }
        let ranks = sorter.scc_topo_sort();
        nodes.into_iter().map(|(s, n)| (s, ranks[&n])).collect()
    }

    /// Final cross-check: hand each action's writes to the ALU solver for
    /// the destination container kind.
    fn check_move_constraints(
        &self,
        container: Container,
        state: &[AllocSlice],
        prop: &ActionContainerProperty,
        snapshot: &dyn AllocSnapshot,
        init_actions: &InitActions,
        constraints: &ConditionalConstraints,
    ) -> Result<(), PackError> {
        let mut assigns: Vec<MoveAssign> = Vec::new();
        for (dest, ops) in &prop.written {
            let kind = if dest.init.is_some() {
                WriteKind::DarkInit
            } else if init_actions
                .get(&dest.field)
                .is_some_and(|acts| acts.contains(&prop.action))
            {
                WriteKind::MetadataInit
            } else {
                WriteKind::Regular
            };
            for op in ops {
                let source = match (&op.phv, &op.action_data, &op.constant) {
                    (Some(src), _, _) => {
                        let placed = snapshot.slices_of(src);
                        if placed.is_empty() {
                            let pinned = constraints
                                .slices
                                .get(src)
                                .map(|c| c.bit_position)
                                .unwrap_or(dest.container_range.lo);
                            SolverSource::Pending {
                                bit_position: pinned,
                            }
                        } else {
                            let p = &placed[0];
                            SolverSource::Phv {
                                container: p.container,
                                range: p.container_range,
                            }
                        }
                    }
                    (None, Some(_), _) => SolverSource::ActionData,
                    (None, None, Some(v)) => SolverSource::Constant(*v),
                    (None, None, None) => continue,
                };
                assigns.push(MoveAssign {
                    dest: dest.container_range,
                    source,
                    kind,
                });
            }
        }

        // Bits that must survive: resident slices the action does not
        // write whose lifetime overlaps a written slice's lifetime.
        let mut preserved = 0u64;
        for slice in state {
            let written = prop
                .written
                .iter()
                .any(|(w, _)| w.field_slice() == slice.field_slice());
            if written {
                continue;
            }
            if prop.written.iter().any(|(w, _)| w.live.overlaps(&slice.live)) {
                preserved |= slice.container_range.mask();
            }
        }

        let plan = MovePlan {
            container,
            assigns,
            preserved,
        };
        solver_for(container).solve(&plan).map_err(|failure| {
            let slices = prop.written.iter().map(|(s, _)| s.clone()).collect();
            PackError::SolverFailed {
                reason: format!("action {}: {failure}", prop.action),
                slices,
            }
        })
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    /// All actions writing any slice of the proposed container-state, in
    /// deterministic order.
    fn actions_touching(&self, state: &[AllocSlice]) -> Vec<ActionId> {
        let mut actions: BTreeSet<ActionId> = BTreeSet::new();
        for slice in state {
            for action in self.tracker.written_in(&slice.field_slice()).iter() {
                actions.insert(*action);
            }
        }
        actions.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SourceKey {
    Container(Container),
    Field(FieldId),
}

fn mask_is_contiguous(mask: u64) -> bool {
    if mask == 0 {
        return true;
    }
    let shifted = mask >> mask.trailing_zeros();
    (shifted & (shifted + 1)) == 0
}

/// Two source slices of different fields still count as adjacent when
/// their current placements sit back to back in one container.
fn same_container_adjacent(a: &FieldSlice, b: &FieldSlice, snapshot: &dyn AllocSnapshot) -> bool {
    let pa = snapshot.slices_of(a);
    let pb = snapshot.slices_of(b);
    match (pa.first(), pb.first()) {
        (Some(x), Some(y)) => {
            x.container == y.container
                && (x.container_range.adjacent_below(&y.container_range)
                    || y.container_range.adjacent_below(&x.container_range))
        }
        _ => false,
    }
}

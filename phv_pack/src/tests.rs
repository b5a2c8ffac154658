//! Unit tests for the tracker, operand model, properties, and solvers.

use phv_model::alloc_slice::AllocSlice;
use phv_model::container::{Container, ContainerKind, ContainerSize};
use phv_model::field::{FieldClass, Gress, PhvInfo};
use phv_model::ids::{FieldId, TableId};
use phv_model::liverange::{LiveRange, StageAndAccess, StageMode};
use phv_model::slice::{BitRange, FieldSlice};

use crate::operand::{op_class, ActionOps, OperandFlags, SourceOperand, SpecialtyKind, WriteDesc};
use crate::property::ActionContainerProperty;
use crate::snapshot::{AllocSnapshot, Allocation};
use crate::solver::{
    InstructionSolver, MoveAssign, MovePlan, NormalSolver, SolverSource, WholeContainerSolver,
    WriteKind,
};
use crate::tracker::{BuildContext, ConstraintTracker};

fn field(phv: &mut PhvInfo, name: &str, size: u16) -> FieldId {
    phv.add(name, size, Gress::Ingress, FieldClass::Metadata)
}

fn live(start: u16, end: u16) -> LiveRange {
    LiveRange::new(
        StageMode::Logical,
        StageAndAccess::write(start),
        StageAndAccess::read(end),
    )
}

fn normal(size: ContainerSize, index: u16) -> Container {
    Container::new(ContainerKind::Normal, size, index)
}

fn placed(field: FieldId, c: Container, field_lo: u16, width: u16, c_lo: u16) -> AllocSlice {
    AllocSlice::new(
        field,
        c,
        BitRange::at(field_lo, width),
        BitRange::at(c_lo, width),
        live(0, 4),
    )
}

// ---------------------------------------------------------------------------
// Operand classification
// ---------------------------------------------------------------------------

#[test]
fn op_class_names() {
    assert_eq!(op_class("set"), OperandFlags::MOVE);
    assert_eq!(op_class("or"), OperandFlags::BITWISE);
    assert_eq!(op_class("andca"), OperandFlags::BITWISE);
    assert_eq!(op_class("saturating-add"), OperandFlags::NONE);
}

#[test]
fn operand_flags_bit_ops() {
    let f = OperandFlags::MOVE | OperandFlags::ANOTHER_OPERAND;
    assert!(f.contains(OperandFlags::MOVE));
    assert!(f.contains(OperandFlags::ANOTHER_OPERAND));
    assert!(!f.contains(OperandFlags::BITWISE));
    assert!(f.intersects(OperandFlags::MOVE | OperandFlags::BITWISE));
}

// ---------------------------------------------------------------------------
// ConstraintTracker
// ---------------------------------------------------------------------------

#[test]
fn tracker_sources_destinations_mirror() {
    let mut phv = PhvInfo::new();
    let dst = field(&mut phv, "dst", 8);
    let src = field(&mut phv, "src", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new().write(WriteDesc::new(
        FieldSlice::whole(dst, 8),
        "set",
        vec![SourceOperand::phv(FieldSlice::whole(src, 8))],
    ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));

    let sources = tracker.sources(&FieldSlice::whole(dst, 8), action);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].phv, Some(FieldSlice::whole(src, 8)));

    // Mirrored index: every source of dst lists dst as a destination.
    let dests = tracker.destinations(&FieldSlice::whole(src, 8), action);
    assert_eq!(dests, vec![FieldSlice::whole(dst, 8)]);
}

#[test]
fn tracker_subrange_queries_shrink_and_shift() {
    let mut phv = PhvInfo::new();
    let dst = field(&mut phv, "dst", 16);
    let src = field(&mut phv, "src", 16);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new().write(WriteDesc::new(
        FieldSlice::whole(dst, 16),
        "set",
        vec![SourceOperand::phv(FieldSlice::whole(src, 16))],
    ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));

    let sub = FieldSlice::new(dst, BitRange::new(8, 11));
    let sources = tracker.sources(&sub, action);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].phv, Some(FieldSlice::new(src, BitRange::new(8, 11))));

    let dests = tracker.destinations(&FieldSlice::new(src, BitRange::new(4, 7)), action);
    assert_eq!(dests, vec![FieldSlice::new(dst, BitRange::new(4, 7))]);
}

#[test]
fn tracker_written_in_and_read_in() {
    let mut phv = PhvInfo::new();
    let a = field(&mut phv, "a", 8);
    let b = field(&mut phv, "b", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new().write(WriteDesc::new(
        FieldSlice::whole(a, 8),
        "set",
        vec![SourceOperand::phv(FieldSlice::whole(b, 8))],
    ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(3));

    assert!(tracker.written_in(&FieldSlice::whole(a, 8)).contains(&action));
    assert!(tracker.written_in(&FieldSlice::whole(b, 8)).is_empty());
    assert!(tracker.read_in(&FieldSlice::whole(b, 8)).contains(&action));
    assert_eq!(tracker.table_of(action), Some(TableId(3)));
    assert_eq!(tracker.writes(action).len(), 1);
    assert_eq!(tracker.reads(action), &[FieldSlice::whole(b, 8)]);
}

#[test]
fn tracker_specialty_and_stateful() {
    let mut phv = PhvInfo::new();
    let a = field(&mut phv, "a", 8);
    let b = field(&mut phv, "b", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new()
        .write(WriteDesc::new(
            FieldSlice::whole(a, 8),
            "set",
            vec![SourceOperand::ActionData(SpecialtyKind::MeterColor)],
        ))
        .write(WriteDesc::new(
            FieldSlice::whole(b, 8),
            "set",
            vec![SourceOperand::Phv {
                slice: FieldSlice::whole(a, 8),
                stateful: true,
            }],
        ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));

    assert_eq!(
        tracker.specialty_written(&FieldSlice::whole(a, 8), action),
        SpecialtyKind::MeterColor
    );
    assert_eq!(
        tracker.specialty_written(&FieldSlice::whole(b, 8), action),
        SpecialtyKind::None
    );
    let stateful = tracker.stateful_read_actions(a).expect("a feeds a stateful ALU");
    assert!(stateful.contains(&action));
    assert!(tracker.stateful_read_actions(b).is_none());
}

#[test]
#[should_panic(expected = "no source operand")]
fn tracker_write_without_source_panics() {
    let mut phv = PhvInfo::new();
    let a = field(&mut phv, "a", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new().write(WriteDesc::new(FieldSlice::whole(a, 8), "set", vec![]));
    tracker.add_action(&mut ctx, &ops, TableId(0));
}

#[test]
fn tracker_clear_resets_indices() {
    let mut phv = PhvInfo::new();
    let a = field(&mut phv, "a", 8);
    let b = field(&mut phv, "b", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new().write(WriteDesc::new(
        FieldSlice::whole(a, 8),
        "set",
        vec![SourceOperand::phv(FieldSlice::whole(b, 8))],
    ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));
    tracker.clear();

    assert!(tracker.writes(action).is_empty());
    assert!(tracker.written_in(&FieldSlice::whole(a, 8)).is_empty());
    assert_eq!(tracker.actions().count(), 0);
}

// ---------------------------------------------------------------------------
// ActionContainerProperty
// ---------------------------------------------------------------------------

#[test]
fn source_count_is_monotonic_in_allocated_sources() {
    let mut phv = PhvInfo::new();
    let d1 = field(&mut phv, "d1", 8);
    let d2 = field(&mut phv, "d2", 8);
    let s1 = field(&mut phv, "s1", 8);
    let s2 = field(&mut phv, "s2", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new()
        .write(WriteDesc::new(
            FieldSlice::whole(d1, 8),
            "set",
            vec![SourceOperand::phv(FieldSlice::whole(s1, 8))],
        ))
        .write(WriteDesc::new(
            FieldSlice::whole(d2, 8),
            "set",
            vec![SourceOperand::phv(FieldSlice::whole(s2, 8))],
        ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));

    let dest = normal(ContainerSize::B16, 0);
    let state = vec![
        placed(d1, dest, 0, 8, 0),
        placed(d2, dest, 0, 8, 8),
    ];

    // Nothing allocated: two unallocated sources, none allocated.
    let empty = Allocation::new();
    let p0 = ActionContainerProperty::derive(action, dest, &state, &tracker, &empty);
    assert_eq!(p0.sources.allocated.len(), 0);
    assert_eq!(p0.sources.unallocated.len(), 2);

    // One source allocated: allocated grows, unallocated shrinks.
    let mut one = Allocation::new();
    one.place(placed(s1, normal(ContainerSize::B8, 1), 0, 8, 0));
    let p1 = ActionContainerProperty::derive(action, dest, &state, &tracker, &one);
    assert_eq!(p1.sources.allocated.len(), 1);
    assert_eq!(p1.sources.unallocated.len(), 1);

    // Both allocated: allocated never decreases, unallocated never
    // exceeds the number of distinct field operands.
    let mut both = Allocation::new();
    both.place(placed(s1, normal(ContainerSize::B8, 1), 0, 8, 0));
    both.place(placed(s2, normal(ContainerSize::B8, 2), 0, 8, 0));
    let p2 = ActionContainerProperty::derive(action, dest, &state, &tracker, &both);
    assert_eq!(p2.sources.allocated.len(), 2);
    assert_eq!(p2.sources.unallocated.len(), 0);
    assert!(p2.sources.allocated.len() >= p1.sources.allocated.len());
    assert!(p1.sources.unallocated.len() <= 2);
}

#[test]
fn distinct_subranges_of_one_source_are_one_operand() {
    let mut phv = PhvInfo::new();
    let d1 = field(&mut phv, "d1", 8);
    let d2 = field(&mut phv, "d2", 8);
    let s = field(&mut phv, "s", 16);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new()
        .write(WriteDesc::new(
            FieldSlice::whole(d1, 8),
            "set",
            vec![SourceOperand::phv(FieldSlice::new(s, BitRange::new(0, 7)))],
        ))
        .write(WriteDesc::new(
            FieldSlice::whole(d2, 8),
            "set",
            vec![SourceOperand::phv(FieldSlice::new(s, BitRange::new(8, 15)))],
        ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));

    let dest = normal(ContainerSize::B16, 0);
    let state = vec![placed(d1, dest, 0, 8, 0), placed(d2, dest, 0, 8, 8)];

    // Both destinations read the same allocated container, but different
    // bits of it: one crossbar operand, no double count.
    let mut alloc = Allocation::new();
    alloc.place(placed(s, normal(ContainerSize::B16, 1), 0, 16, 0));
    let p = ActionContainerProperty::derive(action, dest, &state, &tracker, &alloc);
    assert_eq!(p.sources.allocated.len(), 1);
    assert_eq!(p.sources.double_counted, 0);
    assert_eq!(p.sources.allocated_sources(), 1);
}

#[test]
fn shared_source_bits_double_count_for_concurrent_destinations() {
    let mut phv = PhvInfo::new();
    let d1 = field(&mut phv, "d1", 8);
    let d2 = field(&mut phv, "d2", 8);
    let s = field(&mut phv, "s", 8);

    let mut tracker = ConstraintTracker::new();
    let mut ctx = BuildContext::new();
    let ops = ActionOps::new()
        .write(WriteDesc::new(
            FieldSlice::whole(d1, 8),
            "set",
            vec![SourceOperand::phv(FieldSlice::whole(s, 8))],
        ))
        .write(WriteDesc::new(
            FieldSlice::whole(d2, 8),
            "set",
            vec![SourceOperand::phv(FieldSlice::whole(s, 8))],
        ));
    let action = tracker.add_action(&mut ctx, &ops, TableId(0));

    let dest = normal(ContainerSize::B16, 0);
    // Same placement live range, so the two destinations coexist.
    let state = vec![placed(d1, dest, 0, 8, 0), placed(d2, dest, 0, 8, 8)];

    let mut alloc = Allocation::new();
    alloc.place(placed(s, normal(ContainerSize::B8, 1), 0, 8, 0));
    let p = ActionContainerProperty::derive(action, dest, &state, &tracker, &alloc);
    assert_eq!(p.sources.allocated.len(), 1);
    assert_eq!(p.sources.double_counted, 1);
    assert_eq!(p.sources.allocated_sources(), 2);
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[test]
fn allocation_narrows_placements() {
    let mut phv = PhvInfo::new();
    let f = field(&mut phv, "f", 16);
    let mut alloc = Allocation::new();
    alloc.place(placed(f, normal(ContainerSize::B16, 0), 0, 16, 0));

    let hits = alloc.slices_of(&FieldSlice::new(f, BitRange::new(4, 11)));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].field_range, BitRange::new(4, 11));
    assert_eq!(hits[0].container_range, BitRange::new(4, 11));

    assert!(alloc
        .slices_of(&FieldSlice::new(f, BitRange::new(0, 3)))
        .first()
        .is_some());
    let g = field(&mut phv, "g", 8);
    assert!(alloc.slices_of(&FieldSlice::whole(g, 8)).is_empty());
}

// ---------------------------------------------------------------------------
// Solvers
// ---------------------------------------------------------------------------

fn assign(dest_lo: u16, width: u16, source: SolverSource) -> MoveAssign {
    MoveAssign {
        dest: BitRange::at(dest_lo, width),
        source,
        kind: WriteKind::Regular,
    }
}

fn phv_src(c: Container, lo: u16, width: u16) -> SolverSource {
    SolverSource::Phv {
        container: c,
        range: BitRange::at(lo, width),
    }
}

#[test]
fn normal_solver_accepts_two_byte_aligned_sources() {
    let b8 = |i| normal(ContainerSize::B8, i);
    let plan = MovePlan {
        container: normal(ContainerSize::B16, 0),
        assigns: vec![
            assign(0, 8, phv_src(b8(1), 0, 8)),
            assign(8, 8, phv_src(b8(2), 0, 8)),
        ],
        preserved: 0,
    };
    assert!(NormalSolver.solve(&plan).is_ok());
}

#[test]
fn normal_solver_rejects_two_sources_with_preserved_bits() {
    let b8 = |i| normal(ContainerSize::B8, i);
    let plan = MovePlan {
        container: normal(ContainerSize::B32, 0),
        assigns: vec![
            assign(0, 8, phv_src(b8(1), 0, 8)),
            assign(8, 8, phv_src(b8(2), 0, 8)),
        ],
        preserved: 0xff_0000,
    };
    let err = NormalSolver.solve(&plan).unwrap_err();
    assert!(err.reason.contains("preserved"));
}

#[test]
fn normal_solver_rejects_unaligned_merge() {
    let b16 = |i| normal(ContainerSize::B16, i);
    let plan = MovePlan {
        container: normal(ContainerSize::B16, 0),
        assigns: vec![
            assign(0, 8, phv_src(b16(1), 0, 8)),
            assign(8, 8, phv_src(b16(2), 4, 8)),
        ],
        preserved: 0,
    };
    let err = NormalSolver.solve(&plan).unwrap_err();
    assert!(err.reason.contains("byte-aligned"));
}

#[test]
fn normal_solver_rejects_inconsistent_rotation() {
    let b16 = normal(ContainerSize::B16, 1);
    let plan = MovePlan {
        container: normal(ContainerSize::B16, 0),
        assigns: vec![
            assign(0, 4, phv_src(b16, 0, 4)),
            assign(4, 4, phv_src(b16, 8, 4)),
        ],
        preserved: 0,
    };
    let err = NormalSolver.solve(&plan).unwrap_err();
    assert!(err.reason.contains("rotation"));
}

#[test]
fn normal_solver_accepts_deposit_field_with_background() {
    let b8 = normal(ContainerSize::B8, 1);
    let plan = MovePlan {
        container: normal(ContainerSize::B16, 0),
        assigns: vec![assign(4, 8, phv_src(b8, 0, 8))],
        preserved: 0xf00f,
    };
    assert!(NormalSolver.solve(&plan).is_ok());
}

#[test]
fn whole_container_solver_requires_live_bits_written() {
    let mocha = Container::new(ContainerKind::Mocha, ContainerSize::B16, 0);
    let src = normal(ContainerSize::B16, 1);
    let full = MovePlan {
        container: mocha,
        assigns: vec![assign(0, 16, phv_src(src, 0, 16))],
        preserved: 0,
    };
    assert!(WholeContainerSolver.solve(&full).is_ok());

    // A lone 8-bit resident in a 16-bit mocha container: the unoccupied
    // high byte takes the source's background, so the write is legal.
    let partial = MovePlan {
        container: mocha,
        assigns: vec![assign(0, 8, phv_src(normal(ContainerSize::B8, 2), 0, 8))],
        preserved: 0,
    };
    assert!(WholeContainerSolver.solve(&partial).is_ok());

    // Live resident bits outside the write mask cannot survive.
    let clobbered = MovePlan {
        container: mocha,
        assigns: vec![assign(0, 8, phv_src(normal(ContainerSize::B8, 2), 0, 8))],
        preserved: 0xff00,
    };
    let err = WholeContainerSolver.solve(&clobbered).unwrap_err();
    assert!(err.reason.contains("not written"));
}

#[test]
fn whole_container_solver_rejects_rotation_and_second_source() {
    let mocha = Container::new(ContainerKind::Mocha, ContainerSize::B16, 0);
    let src = normal(ContainerSize::B16, 1);
    let rotated = MovePlan {
        container: mocha,
        assigns: vec![
            assign(0, 8, phv_src(src, 8, 8)),
            assign(8, 8, phv_src(src, 0, 8)),
        ],
        preserved: 0,
    };
    let err = WholeContainerSolver.solve(&rotated).unwrap_err();
    assert!(err.reason.contains("rotate"));

    let two_sources = MovePlan {
        container: mocha,
        assigns: vec![
            assign(0, 8, phv_src(normal(ContainerSize::B8, 1), 0, 8)),
            assign(8, 8, phv_src(normal(ContainerSize::B8, 2), 0, 8)),
        ],
        preserved: 0,
    };
    let err = WholeContainerSolver.solve(&two_sources).unwrap_err();
    assert!(err.reason.contains("single PHV source"));
}

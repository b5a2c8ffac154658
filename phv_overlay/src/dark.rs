//! Overlay feasibility and initialization-point placement.
//!
//! Given the slices competing for one container, decide whether the
//! sharing is legal and emit the ordered `DarkInitEntry` sequence making
//! it so: park the earlier resident in a spare dark container, zero-fill
//! a later field that is read before written, and move the parked value
//! back once the later field dies. Infeasibility at any step returns
//! `None`; this is a heuristic search, not an error path.

use std::collections::BTreeMap;

use log::{debug, trace};

use phv_model::alloc_slice::AllocSlice;
use phv_model::container::Container;
use phv_model::dark::{DarkInitEntry, DarkInitPrimitive, InitSource};
use phv_model::device::Device;
use phv_model::ids::{FieldId, TableId};
use phv_model::liverange::{Access, LiveRange, StageAndAccess};
use phv_model::slice::BitRange;

use crate::flow::TableFlowGraph;
use crate::model::PipelineModel;
use crate::usedef::UseDefMatrix;

/// Where an initialization can be carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPoint {
    Table(TableId),
    AlwaysRun,
}

/// The overlay engine. Holds read-only references for the duration of
/// one allocation round.
pub struct DarkLiveRange<'a> {
    device: &'a Device,
    model: &'a dyn PipelineModel,
    usedef: &'a UseDefMatrix,
    flow: &'a TableFlowGraph,
}

impl<'a> DarkLiveRange<'a> {
    pub fn new(
        device: &'a Device,
        model: &'a dyn PipelineModel,
        usedef: &'a UseDefMatrix,
        flow: &'a TableFlowGraph,
    ) -> Self {
        Self {
            device,
            model,
            usedef,
            flow,
        }
    }

    /// Whether two slices' non-dark use/def footprints intersect. Empty
    /// intersection means the overlay is legal as-is, no initialization
    /// required.
    pub fn overlaps(&self, a: &AllocSlice, b: &AllocSlice) -> bool {
        self.footprint(a) & self.footprint(b) != 0
    }

    /// Units touched by a slice: recorded non-dark uses of its field
    /// plus every stage its live range spans.
    fn footprint(&self, slice: &AllocSlice) -> u64 {
        let stages = self.usedef.stages();
        let mut mask = self.usedef.use_mask(slice.field);
        let hi = slice.live.end.stage.min(stages.saturating_sub(1));
        for s in slice.live.start.stage..=hi {
            mask |= 1 << (1 + s);
        }
        mask
    }

    /// Decide overlay legality for the slices competing for one
    /// container and produce the initialization sequence. `spare_dark`
    /// is a dark container free across the contested window, if the
    /// allocator has one to offer.
    pub fn find_initialization_nodes(
        &self,
        spare_dark: Option<Container>,
        slices: &[AllocSlice],
    ) -> Option<Vec<DarkInitEntry>> {
        if slices.len() < 2 {
            return Some(Vec::new());
        }
        let any_overlap = slices
            .iter()
            .enumerate()
            .any(|(i, a)| slices[i + 1..].iter().any(|b| self.overlaps(a, b)));
        if !any_overlap {
            trace!("overlay: all footprints disjoint, no init needed");
            return Some(Vec::new());
        }

        let order = self.fields_in_order(slices)?;
        let mut entries: Vec<DarkInitEntry> = Vec::new();

        for pair in order.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            if !self.overlaps(prev, cur) {
                continue;
            }
            trace!(
                "overlay: {} {} and {} {} contend",
                prev.field,
                prev.live,
                cur.field,
                cur.live
            );

            let cur_table = self.usedef.first_use(cur.field).and_then(|u| u.table);

            if self.must_move_to_dark(prev, cur) {
                let dark = self.dark_home(spare_dark, prev)?;
                let point = self.find_init_point(cur_table, prev, cur, false)?;
                entries.push(self.move_entry(dark, prev.clone(), point));

                if self.must_initialize_from_dark(prev, cur) {
                    let back_table = self
                        .usedef
                        .table_reading_after(prev.field, cur.live.end.stage);
                    let point = self.find_init_point(back_table, prev, cur, false)?;
                    let revived = self.revived(prev, cur);
                    let parked = entries
                        .last()
                        .map(|e| e.dest.clone())
                        .unwrap_or_else(|| prev.clone());
                    entries.push(self.move_entry(revived, parked, point));
                }
            }

            if self.must_initialize_current(cur) {
                let point = self.find_init_point(cur_table, prev, cur, true)?;
                entries.push(self.zero_entry(cur.clone(), point));
            }
        }

        link_sequence(&mut entries);
        debug!(
            "overlay feasible with {} initialization(s)",
            entries.len()
        );
        Some(entries)
    }

    /// Merge the contenders into one liveness-ordered sequence. Two
    /// different fields claiming the same (stage, access) point make the
    /// ordering ambiguous.
    fn fields_in_order(&self, slices: &[AllocSlice]) -> Option<Vec<AllocSlice>> {
        let mut claims: BTreeMap<(u16, Access), FieldId> = BTreeMap::new();
        for slice in slices {
            for point in [slice.live.start, slice.live.end] {
                let key = (point.stage, point.access);
                if let Some(&owner) = claims.get(&key) {
                    if owner != slice.field {
                        trace!(
                            "overlay: {} and {} both claim {}{:?}, ambiguous order",
                            owner,
                            slice.field,
                            point.stage,
                            point.access
                        );
                        return None;
                    }
                } else {
                    claims.insert(key, slice.field);
                }
            }
        }
        let mut order = slices.to_vec();
        order.sort_by_key(|s| (s.live.start, s.live.end));
        Some(order)
    }

    /// The earlier resident's value is still read after the later field
    /// takes the container, so it must be parked in a dark container. A
    /// read at the later field's start stage is safe: the input crossbar
    /// reads before the write lands.
    fn must_move_to_dark(&self, earlier: &AllocSlice, later: &AllocSlice) -> bool {
        !self
            .usedef
            .reads_after(earlier.field, later.live.start.stage)
            .is_empty()
    }

    /// The later field is read before its first write, so the container
    /// must be zero-filled ahead of that read.
    fn must_initialize_current(&self, later: &AllocSlice) -> bool {
        later.live.start.access.is_read()
    }

    /// The earlier field outlives the later one and must come back from
    /// its dark parking spot.
    fn must_initialize_from_dark(&self, earlier: &AllocSlice, later: &AllocSlice) -> bool {
        !self
            .usedef
            .reads_after(earlier.field, later.live.end.stage)
            .is_empty()
    }

    /// The parked copy of `earlier` for the duration of `later`'s window.
    fn dark_home(&self, spare: Option<Container>, earlier: &AllocSlice) -> Option<AllocSlice> {
        if !self.device.has_dark_containers {
            trace!("overlay: device has no dark containers");
            return None;
        }
        let spare = spare.or_else(|| {
            trace!("overlay: no spare dark container offered");
            None
        })?;
        if !spare.is_dark() || spare.bits() < earlier.width() {
            trace!("overlay: {spare} cannot hold {} bits", earlier.width());
            return None;
        }
        Some(AllocSlice::new(
            earlier.field,
            spare,
            earlier.field_range,
            BitRange::at(0, earlier.width()),
            earlier.live,
        ))
    }

    /// The earlier slice back in its original container once the later
    /// field has died.
    fn revived(&self, earlier: &AllocSlice, later: &AllocSlice) -> AllocSlice {
        AllocSlice::new(
            earlier.field,
            earlier.container,
            earlier.field_range,
            earlier.container_range,
            LiveRange::new(
                earlier.live.mode,
                StageAndAccess::write(later.live.end.stage),
                earlier.live.end,
            ),
        )
    }

    /// Walk the dominator chain from `start` looking for a table that can
    /// carry the initialization. `guard_earlier` additionally requires the
    /// chosen table not to clobber the earlier resident's value while it
    /// is still live and not provably exclusive.
    fn find_init_point(
        &self,
        start: Option<TableId>,
        earlier: &AllocSlice,
        later: &AllocSlice,
        guard_earlier: bool,
    ) -> Option<InitPoint> {
        let mut cand = start;
        while let Some(t) = cand {
            let ok = !self.model.do_not_init(t)
                && !self.increases_dependence_critical_path(t)
                && (!guard_earlier || !self.clobbers_earlier(t, earlier));
            if ok {
                trace!("overlay: init for {} lands at {t}", later.field);
                return Some(InitPoint::Table(t));
            }
            let dom = self.model.dominator(t);
            if dom == Some(t) {
                break;
            }
            cand = dom;
        }

        if self.device.has_always_run_action {
            let from = self.usedef.use_tables(earlier.field).last().copied();
            let to = self.usedef.first_use(later.field).and_then(|u| u.table);
            let cyclic = match (from, to) {
                (Some(f), Some(t)) => self.flow.creates_cycle(f, t),
                _ => false,
            };
            if !cyclic {
                trace!("overlay: init for {} as always-run action", later.field);
                return Some(InitPoint::AlwaysRun);
            }
            trace!("overlay: always-run edge would close a dependency cycle");
        }
        trace!("overlay: no legal init point for {}", later.field);
        None
    }

    /// Placing an instruction at `table` must not stretch the pipeline: a
    /// table at stage `s` with dependence tail `t` needs `s + t + 1`
    /// stages downstream of it.
    fn increases_dependence_critical_path(&self, table: TableId) -> bool {
        // After placement the last physical stage is authoritative;
        // before it, the dependency-rank lower bound must do.
        let stage = self
            .model
            .physical_stages(table)
            .into_iter()
            .max()
            .unwrap_or_else(|| self.model.min_stage(table));
        let tail = self.model.dependence_tail_size(table);
        stage + tail + 1 > self.device.stages
    }

    /// Whether zero-filling the container at `table` would destroy the
    /// earlier resident's value while it may still be read.
    fn clobbers_earlier(&self, table: TableId, earlier: &AllocSlice) -> bool {
        if !earlier.live.covers_stage(self.model.min_stage(table)) {
            return false;
        }
        self.usedef
            .use_tables(earlier.field)
            .iter()
            .any(|&u| !self.model.mutually_exclusive(table, u))
    }

    fn move_entry(&self, dest: AllocSlice, source: AllocSlice, point: InitPoint) -> DarkInitEntry {
        let prim = match point {
            InitPoint::Table(t) => DarkInitPrimitive::move_from(source, t),
            InitPoint::AlwaysRun => DarkInitPrimitive::always_run(InitSource::Slice(source)),
        };
        DarkInitEntry::new(dest, prim)
    }

    fn zero_entry(&self, dest: AllocSlice, point: InitPoint) -> DarkInitEntry {
        let prim = match point {
            InitPoint::Table(t) => DarkInitPrimitive::zero_at(t),
            InitPoint::AlwaysRun => DarkInitPrimitive::always_run(InitSource::Zero),
        };
        DarkInitEntry::new(dest, prim)
    }
}

/// Chain the entries in emission order: each must execute after the one
/// before it.
fn link_sequence(entries: &mut [DarkInitEntry]) {
    for i in 1..entries.len() {
        entries[i].prior.push(i - 1);
        entries[i - 1].post.push(i);
    }
}

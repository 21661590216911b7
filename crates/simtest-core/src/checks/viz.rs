//! Layout checks for the DREAMM v3 visualization output.
//!
//! Per-iteration output lives in `<viz>/frame_data/iteration_<n>/`. An item
//! written at iteration `n` is a regular file; an item carried over from an
//! earlier iteration `m` is a symlink to `../iteration_<m>/<file>`; an item
//! that has never been written is absent.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::descriptor::{FrameIters, GroupedSpec, IntList, MolIters};
use crate::error::CheckError;
use crate::paths::{expand_int_list, output_dir};

type Outcome = Result<(), CheckError>;
type IterSet = BTreeSet<i64>;

/// Expanded iteration lists of one molecule or mesh output.
struct IterSets {
    all: Vec<i64>,
    pos: IterSet,
    others: IterSet,
    states: IterSet,
    /// `others ∪ states`
    combined: IterSet,
    /// `combined ∪ pos`
    all_combined: IterSet,
}

impl IterSets {
    /// Position and orientation/region lists default to every iteration.
    fn new(all: &IntList, pos: &IntList, others: &IntList, states: &IntList) -> Result<Self, CheckError> {
        let all = expand_int_list(all)?;
        let or_all = |list: &IntList| -> Result<IterSet, CheckError> {
            let values = expand_int_list(list)?;
            Ok(if values.is_empty() {
                all.iter().copied().collect()
            } else {
                values.into_iter().collect()
            })
        };
        let pos = or_all(pos)?;
        let others = or_all(others)?;
        let states: IterSet = expand_int_list(states)?.into_iter().collect();
        let combined: IterSet = others.union(&states).copied().collect();
        let all_combined: IterSet = combined.union(&pos).copied().collect();
        Ok(Self {
            all,
            pos,
            others,
            states,
            combined,
            all_combined,
        })
    }
}

/// Iteration at which each item kind was last written. Positions, the
/// orientation/region item and states.
#[derive(Debug, Default)]
struct Trackers {
    pos: Option<i64>,
    other: Option<i64>,
    state: Option<i64>,
}

impl Trackers {
    /// Forget every tracker not written at `iter`.
    fn retain_only(&mut self, iter: i64) {
        for t in [&mut self.pos, &mut self.other, &mut self.state] {
            if *t != Some(iter) {
                *t = None;
            }
        }
    }

    /// The iteration a carried-over `.dx` header points at.
    fn dx_source(&self) -> Option<i64> {
        self.pos.or(self.other).or(self.state)
    }
}

fn iteration_dir(viz_dir: &Path, iter: i64) -> PathBuf {
    viz_dir.join("frame_data").join(format!("iteration_{iter}"))
}

fn link_target(file: &Path, iter: i64) -> PathBuf {
    let base = file.file_name().unwrap_or_default();
    Path::new("..").join(format!("iteration_{iter}")).join(base)
}

fn check_symlink(file: &Path, source_iter: i64) -> Outcome {
    let expected = link_target(file, source_iter);
    let target = std::fs::read_link(file).map_err(|e| {
        CheckError::failed(format!("file {} is not a symlink: {e}", file.display()))
    })?;
    if target != expected {
        return Err(CheckError::failed(format!(
            "file {} is not properly symlinked to {}",
            file.display(),
            expected.display()
        )));
    }
    Ok(())
}

fn check_absent(file: &Path) -> Outcome {
    if std::fs::symlink_metadata(file).is_ok() {
        return Err(CheckError::failed(format!(
            "file {} exists but shouldn't",
            file.display()
        )));
    }
    Ok(())
}

fn check_nonempty(file: &Path) -> Outcome {
    let meta = std::fs::metadata(file)
        .map_err(|e| CheckError::failed(format!("failed to stat file {}: {e}", file.display())))?;
    if meta.len() == 0 {
        return Err(CheckError::failed(format!(
            "file {} is not non-empty as expected",
            file.display()
        )));
    }
    Ok(())
}

/// One data item at iteration `iter`.
///
/// Written iterations need the file (non-empty unless `may_be_empty`).
/// Iterations where nothing in `written_elsewhere` was output carry the last
/// written file forward as a symlink. Otherwise the file must be absent.
fn check_iter_item(
    written: &IterSet,
    written_elsewhere: &IterSet,
    iter: i64,
    last: Option<i64>,
    may_be_empty: bool,
    file: &Path,
) -> Outcome {
    if written.contains(&iter) {
        if may_be_empty {
            if !file.exists() {
                return Err(CheckError::failed(format!(
                    "file {} does not exist",
                    file.display()
                )));
            }
            return Ok(());
        }
        return check_nonempty(file);
    }
    match last {
        Some(source) if !written_elsewhere.contains(&iter) => check_symlink(file, source),
        _ => check_absent(file),
    }
}

/// The `.dx` header at iteration `iter`.
fn check_dx_item(iter_had_frame: bool, trackers: &Trackers, file: &Path) -> Outcome {
    if iter_had_frame {
        return check_nonempty(file);
    }
    match trackers.dx_source() {
        Some(source) => check_symlink(file, source),
        None => check_absent(file),
    }
}

/// Binary molecule output with separate surface and volume trackers.
pub(super) fn check_mols_bin(
    test_dir: &Path,
    viz_path: &str,
    all: &IntList,
    surf: &MolIters,
    vol: &MolIters,
) -> Outcome {
    let s = IterSets::new(all, &surf.pos, &surf.orient, &surf.state)?;
    let v = IterSets::new(all, &vol.pos, &vol.orient, &vol.state)?;
    let mol_iters: IterSet = s.all_combined.union(&v.all_combined).copied().collect();

    let viz_dir = output_dir(test_dir).join(viz_path);
    let mut st = Trackers::default();
    let mut vt = Trackers::default();

    for &i in &s.all {
        let dir = iteration_dir(&viz_dir, i);

        let mut had_frame = false;
        for (set, last, name) in [
            (&s.pos, &mut st.pos, "surface_molecules_positions.bin"),
            (&s.others, &mut st.other, "surface_molecules_orientations.bin"),
            (&s.states, &mut st.state, "surface_molecules_states.bin"),
        ] {
            check_iter_item(set, &mol_iters, i, *last, surf.empty, &dir.join(name))?;
            if set.contains(&i) {
                *last = Some(i);
                had_frame = true;
            }
        }
        check_dx_item(had_frame, &st, &dir.join("surface_molecules.dx"))?;

        let mut had_frame = false;
        for (set, last, name) in [
            (&v.pos, &mut vt.pos, "volume_molecules_positions.bin"),
            (&v.others, &mut vt.other, "volume_molecules_orientations.bin"),
            (&v.states, &mut vt.state, "volume_molecules_states.bin"),
        ] {
            check_iter_item(set, &mol_iters, i, *last, vol.empty, &dir.join(name))?;
            if set.contains(&i) {
                *last = Some(i);
                had_frame = true;
            }
        }
        check_dx_item(had_frame, &vt, &dir.join("volume_molecules.dx"))?;
    }
    Ok(())
}

/// One tracked item kind of an ASCII or mesh layout: the files written per
/// name, when they are written and which tracker slot follows them.
struct TrackedItem<'a> {
    names: &'a [String],
    suffixes: &'a [&'a str],
    written: &'a IterSet,
    written_elsewhere: &'a IterSet,
    slot: fn(&mut Trackers) -> &mut Option<i64>,
}

impl TrackedItem<'_> {
    /// Check every file of this item at `iter` and advance `trackers`.
    /// Returns whether the item was written at `iter`.
    fn check(
        &self,
        dir: &Path,
        iter: i64,
        may_be_empty: bool,
        trackers: &mut Trackers,
    ) -> Result<bool, CheckError> {
        let last = *(self.slot)(trackers);
        for name in self.names {
            for suffix in self.suffixes {
                let file = dir.join(format!("{name}{suffix}"));
                check_iter_item(
                    self.written,
                    self.written_elsewhere,
                    iter,
                    last,
                    may_be_empty,
                    &file,
                )?;
            }
        }
        if !self.written.contains(&iter) {
            return Ok(false);
        }
        *(self.slot)(trackers) = Some(iter);
        trackers.retain_only(iter);
        Ok(true)
    }
}

fn pos_slot(t: &mut Trackers) -> &mut Option<i64> {
    &mut t.pos
}

fn other_slot(t: &mut Trackers) -> &mut Option<i64> {
    &mut t.other
}

fn state_slot(t: &mut Trackers) -> &mut Option<i64> {
    &mut t.state
}

/// Walk every iteration, checking `items` in order followed by the `.dx`
/// headers.
fn check_tracked_frames(
    viz_dir: &Path,
    iters: &[i64],
    items: &[TrackedItem<'_>],
    may_be_empty: bool,
    dx_files: &[&str],
) -> Outcome {
    let mut trackers = Trackers::default();
    for &i in iters {
        let dir = iteration_dir(viz_dir, i);
        let mut had_frame = false;
        for item in items {
            had_frame |= item.check(&dir, i, may_be_empty, &mut trackers)?;
        }
        for dx in dx_files {
            check_dx_item(had_frame, &trackers, &dir.join(dx))?;
        }
    }
    Ok(())
}

/// ASCII molecule output, one file set per molecule name.
pub(super) fn check_mols_ascii(
    test_dir: &Path,
    frames: &FrameIters,
    mol_names: &[String],
) -> Outcome {
    let m = IterSets::new(&frames.all, &frames.pos, &frames.other, &frames.state)?;
    let items = [
        TrackedItem {
            names: mol_names,
            suffixes: &[".positions.dat"],
            written: &m.pos,
            written_elsewhere: &m.combined,
            slot: pos_slot,
        },
        TrackedItem {
            names: mol_names,
            suffixes: &[".orientations.dat"],
            written: &m.others,
            written_elsewhere: &m.combined,
            slot: other_slot,
        },
        TrackedItem {
            names: mol_names,
            suffixes: &[".states.dat"],
            written: &m.states,
            written_elsewhere: &m.combined,
            slot: state_slot,
        },
    ];
    check_tracked_frames(
        &output_dir(test_dir).join(&frames.viz_path),
        &m.all,
        &items,
        true,
        &["volume_molecules.dx", "surface_molecules.dx"],
    )
}

/// Binary mesh output.
pub(super) fn check_mesh_bin(test_dir: &Path, frames: &FrameIters, mesh_empty: bool) -> Outcome {
    let m = IterSets::new(&frames.all, &frames.pos, &frames.other, &frames.state)?;
    let no_iters = IterSet::new();
    let positions = ["mesh_positions".to_string()];
    let regions = ["region_indices".to_string()];
    let states = ["mesh_states".to_string()];
    let items = [
        TrackedItem {
            names: &positions,
            suffixes: &[".bin"],
            written: &m.pos,
            written_elsewhere: &m.combined,
            slot: pos_slot,
        },
        TrackedItem {
            names: &regions,
            suffixes: &[".bin"],
            written: &m.others,
            written_elsewhere: &m.states,
            slot: other_slot,
        },
        TrackedItem {
            names: &states,
            suffixes: &[".bin"],
            written: &m.states,
            written_elsewhere: &no_iters,
            slot: state_slot,
        },
    ];
    check_tracked_frames(
        &output_dir(test_dir).join(&frames.viz_path),
        &m.all,
        &items,
        mesh_empty,
        &["meshes.dx"],
    )
}

/// ASCII mesh output, one file set per object. Region files default to the
/// object list.
pub(super) fn check_mesh_ascii(
    test_dir: &Path,
    frames: &FrameIters,
    mesh_empty: bool,
    objects: &[String],
    object_regions: &[String],
) -> Outcome {
    let m = IterSets::new(&frames.all, &frames.pos, &frames.other, &frames.state)?;
    let regions = if object_regions.is_empty() {
        objects
    } else {
        object_regions
    };
    let no_iters = IterSet::new();
    let items = [
        TrackedItem {
            names: objects,
            suffixes: &[".positions.dat", ".connections.dat"],
            written: &m.pos,
            written_elsewhere: &m.combined,
            slot: pos_slot,
        },
        TrackedItem {
            names: regions,
            suffixes: &[".region_indices.dat"],
            written: &m.others,
            written_elsewhere: &m.states,
            slot: other_slot,
        },
        TrackedItem {
            names: objects,
            suffixes: &[".states.bin"],
            written: &m.states,
            written_elsewhere: &no_iters,
            slot: state_slot,
        },
    ];
    check_tracked_frames(
        &output_dir(test_dir).join(&frames.viz_path),
        &m.all,
        &items,
        mesh_empty,
        &["meshes.dx"],
    )
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn check_grouped_item(file: &Path, have_property: bool, no_item: bool) -> Outcome {
    if !have_property {
        return Ok(());
    }
    let meta = std::fs::metadata(file)
        .map_err(|e| CheckError::failed(format!("failed to stat file {}: {e}", file.display())))?;
    let empty = meta.len() == 0;
    if no_item && !empty {
        return Err(CheckError::failed(format!(
            "file {} does not exist or is not empty",
            file.display()
        )));
    }
    if !no_item && empty {
        return Err(CheckError::failed(format!(
            "file {} is not non-empty",
            file.display()
        )));
    }
    Ok(())
}

fn check_sized(file: &Path, count: u64, record_size: u64) -> Outcome {
    if count == 0 {
        return check_nonempty(file);
    }
    let meta = std::fs::metadata(file)
        .map_err(|e| CheckError::failed(format!("failed to stat file {}: {e}", file.display())))?;
    if count.checked_mul(record_size) != Some(meta.len()) {
        return Err(CheckError::failed(format!(
            "file {} has incorrect file size",
            file.display()
        )));
    }
    Ok(())
}

/// Grouped output: one file per item kind next to `<viz_path>`.
pub(super) fn check_grouped(test_dir: &Path, spec: &GroupedSpec) -> Outcome {
    let base = output_dir(test_dir).join(&spec.viz_path);

    for (suffix, have, none) in [
        (".mesh_positions.1.bin", spec.have_mesh_pos, spec.no_meshes),
        (".region_indices.1.bin", spec.have_rgn_idx, spec.no_meshes),
        (".mesh_states.1.bin", spec.have_mesh_state, spec.no_meshes),
        (".molecule_positions.1.bin", spec.have_mol_pos, spec.no_mols),
        (".molecule_orientations.1.bin", spec.have_mol_orient, spec.no_mols),
        (".molecule_states.1.bin", spec.have_mol_state, spec.no_mols),
    ] {
        check_grouped_item(&with_suffix(&base, suffix), have, none)?;
    }

    check_sized(&with_suffix(&base, ".iteration_numbers.1.bin"), spec.num_iters, 12)?;
    check_sized(&with_suffix(&base, ".time_values.1.bin"), spec.num_times, 8)
}

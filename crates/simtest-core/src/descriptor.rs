//! Test descriptions.
//!
//! A test directory holds a `test_description.json` (or `.toml`) naming the
//! simulator input files, how many seeds to run and an ordered list of
//! checks. Descriptions may pull in additional checks from named fragments
//! in the include directory.
//!
//! Parsing goes through a flat [`RawCheck`] record first (every field of every
//! check kind, all optional) and is then narrowed into the closed
//! [`CheckSpec`] sum type, so each variant carries only its own fields.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DescriptorError, DescriptorResult};

/// File name of a JSON test description inside a test directory.
pub const DESCRIPTION_JSON: &str = "test_description.json";
/// File name of a TOML test description inside a test directory.
pub const DESCRIPTION_TOML: &str = "test_description.toml";
/// Maximum nesting of include fragments.
pub const MAX_INCLUDE_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Run identity and results
// ---------------------------------------------------------------------------

/// Groups every per-seed job spawned from one test description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimResult {
    pub success: bool,
    pub exit_message: String,
    pub stderr_content: String,
    /// Only meaningful when the process actually ran; -1 otherwise.
    pub exit_code: i32,
}

impl SimResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            exit_message: String::new(),
            stderr_content: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(exit_message: impl Into<String>, stderr_content: String, exit_code: i32) -> Self {
        Self {
            success: false,
            exit_message: exit_message.into(),
            stderr_content,
            exit_code,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Simulation runs to conduct for one test.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    /// Simulator input files, relative to the test directory, run in order.
    pub input_files: Vec<String>,
    /// Requested seed count; 0 means unset.
    pub num_seeds: usize,
    /// Extra arguments placed before the generated ones.
    pub commandline_opts: Vec<String>,
    /// Seed assigned by the scheduler.
    pub seed: u64,
    /// Group key assigned by the scheduler.
    pub run_id: RunId,
}

impl RunSpec {
    /// Seed count with the unset value normalised to a single seed.
    pub fn seed_count(&self) -> usize {
        self.num_seeds.max(1)
    }
}

/// One loaded test description.
#[derive(Debug, Clone)]
pub struct TestDescriptor {
    /// The test directory.
    pub path: PathBuf,
    pub description: String,
    pub keywords: Vec<String>,
    pub includes: Vec<String>,
    pub run: RunSpec,
    /// Checks in declaration order, included fragments appended depth-first.
    pub checks: Arc<[CheckSpec]>,
}

impl TestDescriptor {
    /// Directory name of the test, used in reports.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Copy of this descriptor scheduled under `seed`.
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut copy = self.clone();
        copy.run.seed = seed;
        copy
    }
}

/// A descriptor together with the results of every seed that was run.
/// Ready for checking once it holds `run.seed_count()` results' worth of
/// seeds.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub descriptor: TestDescriptor,
    pub sim_results: Vec<SimResult>,
}

impl TestRecord {
    pub fn new(descriptor: TestDescriptor) -> Self {
        Self {
            descriptor,
            sim_results: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Check specifications
// ---------------------------------------------------------------------------

/// Item of an integer list: either a literal integer or a string holding an
/// integer or a `start:end[:step]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntListItem {
    Int(i64),
    Text(String),
}

/// Parse-time integer list such as `[1, 2, "3:100:5"]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntList(pub Vec<IntListItem>);

impl IntList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Output file a check reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSource {
    /// File name relative to the sandbox; may hold one `%d` seed placeholder
    /// and `*` globs.
    pub data_file: String,
    pub have_header: bool,
    /// Average all per-seed files into one dataset.
    pub average_data: bool,
}

/// Rows outside the window are ignored. Zero bounds are unset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub min_time: f64,
    pub max_time: f64,
}

impl TimeWindow {
    pub fn contains(&self, time: f64) -> bool {
        !((self.min_time > 0.0 && time < self.min_time)
            || (self.max_time > 0.0 && time > self.max_time))
    }
}

/// `sum(query[c] * count[c]) == target` for every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CountConstraint {
    pub target: i64,
    pub query: Vec<i64>,
}

/// Files expanded from format strings over an id range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSizeSpec {
    pub file_names: Vec<String>,
    pub id_range: IntList,
    /// Exact expected size for non-empty files; 0 means any non-zero size.
    pub file_size: u64,
}

/// Per-column targets for averaged checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeanSpec {
    pub means: Vec<f64>,
    pub tolerances: Vec<f64>,
}

/// What the trigger output records.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    Reaction,
    Hits,
    MolCounts,
    Unknown(String),
}

impl TriggerKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "reaction" => TriggerKind::Reaction,
            "hits" => TriggerKind::Hits,
            "molCounts" => TriggerKind::MolCounts,
            other => TriggerKind::Unknown(other.to_string()),
        }
    }
}

/// Trigger output validation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSpec {
    pub kind: TriggerKind,
    pub have_exact_time: bool,
    pub output_time: f64,
    pub xrange: Option<(f64, f64)>,
    pub yrange: Option<(f64, f64)>,
    pub zrange: Option<(f64, f64)>,
}

/// Iteration layout of a per-iteration visualization output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameIters {
    pub viz_path: String,
    /// Every iteration with a frame directory.
    pub all: IntList,
    /// Iterations with positions; defaults to `all`.
    pub pos: IntList,
    /// Orientations for molecules, region indices for meshes; defaults to `all`.
    pub other: IntList,
    pub state: IntList,
}

/// Surface or volume molecule iterations in the binary molecule layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MolIters {
    pub pos: IntList,
    pub orient: IntList,
    pub state: IntList,
    pub empty: bool,
}

/// Expectations for the grouped visualization layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedSpec {
    pub viz_path: String,
    pub num_iters: u64,
    pub num_times: u64,
    pub have_mesh_pos: bool,
    pub have_rgn_idx: bool,
    pub have_mesh_state: bool,
    pub no_meshes: bool,
    pub have_mol_pos: bool,
    pub have_mol_orient: bool,
    pub have_mol_state: bool,
    pub no_mols: bool,
}

/// One declarative check, narrowed to the fields its kind uses.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckSpec {
    SimSuccess,
    ExitCode {
        expected: i32,
    },
    NonEmptyFiles(FileSizeSpec),
    EmptyFiles(FileSizeSpec),
    Checkpoint {
        base_name: String,
        delay: f64,
        margin: f64,
    },
    LegacyVolOutput {
        data: DataSource,
        xdim: u64,
        ydim: u64,
        zdim: u64,
    },
    AsciiVizOutput {
        data: DataSource,
    },
    VizMolsBin {
        viz_path: String,
        all: IntList,
        surf: MolIters,
        vol: MolIters,
    },
    VizMolsAscii {
        frames: FrameIters,
        mol_names: Vec<String>,
    },
    VizMeshBin {
        frames: FrameIters,
        mesh_empty: bool,
    },
    VizMeshAscii {
        frames: FrameIters,
        mesh_empty: bool,
        objects: Vec<String>,
        object_regions: Vec<String>,
    },
    VizGrouped(GroupedSpec),
    DiffFileContent {
        data: DataSource,
        template_file: String,
        template_parameters: Vec<String>,
    },
    CountConstraints {
        data: DataSource,
        window: TimeWindow,
        constraints: Vec<CountConstraint>,
    },
    CountMinMax {
        data: DataSource,
        window: TimeWindow,
        maximum: Option<Vec<i64>>,
        minimum: Option<Vec<i64>>,
    },
    FileMatchPattern {
        data: DataSource,
        pattern: String,
        num_matches: usize,
    },
    CheckExpressions {
        data: DataSource,
    },
    CompareCounts {
        data: DataSource,
        window: TimeWindow,
        reference_file: String,
        abs_deviation: Vec<i64>,
        rel_deviation: Vec<f64>,
    },
    CountEquilibrium {
        data: DataSource,
        window: TimeWindow,
        targets: MeanSpec,
    },
    CountRates {
        data: DataSource,
        window: TimeWindow,
        base_time: f64,
        targets: MeanSpec,
    },
    PositiveCounts {
        data: DataSource,
        window: TimeWindow,
    },
    PositiveOrZeroCounts {
        data: DataSource,
        window: TimeWindow,
    },
    ZeroCounts {
        data: DataSource,
        window: TimeWindow,
    },
    Triggers {
        data: DataSource,
        window: TimeWindow,
        trigger: TriggerSpec,
    },
    /// A `TestType` no variant matches. Reported as a failure, never a panic.
    Unknown {
        test_type: String,
    },
}

impl CheckSpec {
    /// The `TestType` tag this check was declared with.
    pub fn kind(&self) -> &str {
        match self {
            CheckSpec::SimSuccess => "CHECK_SUCCESS",
            CheckSpec::ExitCode { .. } => "CHECK_EXIT_CODE",
            CheckSpec::NonEmptyFiles(_) => "CHECK_NONEMPTY_FILES",
            CheckSpec::EmptyFiles(_) => "CHECK_EMPTY_FILES",
            CheckSpec::Checkpoint { .. } => "CHECK_CHECKPOINT",
            CheckSpec::LegacyVolOutput { .. } => "CHECK_LEGACY_VOL_OUTPUT",
            CheckSpec::AsciiVizOutput { .. } => "CHECK_ASCII_VIZ_OUTPUT",
            CheckSpec::VizMolsBin { .. } => "CHECK_DREAMM_V3_MOLS_BIN",
            CheckSpec::VizMolsAscii { .. } => "CHECK_DREAMM_V3_MOLS_ASCII",
            CheckSpec::VizMeshBin { .. } => "CHECK_DREAMM_V3_MESH_BIN",
            CheckSpec::VizMeshAscii { .. } => "CHECK_DREAMM_V3_MESH_ASCII",
            CheckSpec::VizGrouped(_) => "CHECK_DREAMM_V3_GROUPED",
            CheckSpec::DiffFileContent { .. } => "DIFF_FILE_CONTENT",
            CheckSpec::CountConstraints { .. } => "COUNT_CONSTRAINTS",
            CheckSpec::CountMinMax { .. } => "COUNT_MINMAX",
            CheckSpec::FileMatchPattern { .. } => "FILE_MATCH_PATTERN",
            CheckSpec::CheckExpressions { .. } => "CHECK_EXPRESSIONS",
            CheckSpec::CompareCounts { .. } => "COMPARE_COUNTS",
            CheckSpec::CountEquilibrium { .. } => "COUNT_EQUILIBRIUM",
            CheckSpec::CountRates { .. } => "COUNT_RATES",
            CheckSpec::PositiveCounts { .. } => "POSITIVE_COUNTS",
            CheckSpec::PositiveOrZeroCounts { .. } => "POSITIVE_OR_ZERO_COUNTS",
            CheckSpec::ZeroCounts { .. } => "ZERO_COUNTS",
            CheckSpec::Triggers { .. } => "CHECK_TRIGGERS",
            CheckSpec::Unknown { test_type } => test_type,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw (on-disk) representation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawRun {
    mdl_files: Vec<String>,
    num_seeds: usize,
    commandline_opts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawDescriptor {
    description: String,
    #[serde(alias = "Keywords")]
    key_words: Vec<String>,
    includes: Vec<String>,
    run: RawRun,
    checks: Vec<RawCheck>,
}

/// Every field any check kind may carry.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawCheck {
    test_type: String,
    description: String,
    have_header: bool,
    average_data: bool,
    data_file: String,
    min_time: f64,
    max_time: f64,
    base_time: f64,
    exit_code: i32,
    count_maximum: Option<Vec<i64>>,
    count_minimum: Option<Vec<i64>>,
    count_constraints: Vec<CountConstraint>,
    match_pattern: String,
    num_matches: usize,
    reference_file: String,
    abs_deviation: Vec<i64>,
    rel_deviation: Vec<f64>,
    means: Vec<f64>,
    tolerances: Vec<f64>,
    trigger_type: String,
    have_exact_time: bool,
    output_time: f64,
    #[serde(rename = "Xrange")]
    xrange: Vec<f64>,
    #[serde(rename = "Yrange")]
    yrange: Vec<f64>,
    #[serde(rename = "Zrange")]
    zrange: Vec<f64>,
    file_names: Vec<String>,
    #[serde(rename = "IDRange")]
    id_range: IntList,
    file_size: u64,
    template_file: String,
    template_parameters: Vec<String>,
    #[serde(rename = "Xdim")]
    xdim: u64,
    #[serde(rename = "Ydim")]
    ydim: u64,
    #[serde(rename = "Zdim")]
    zdim: u64,
    base_name: String,
    delay: f64,
    margin: f64,
    all_iters: IntList,
    pos_iters: IntList,
    orient_iters: IntList,
    region_iters: IntList,
    state_iters: IntList,
    viz_path: String,
    mesh_empty: bool,
    objects: Vec<String>,
    object_regions: Vec<String>,
    surf_pos_iters: IntList,
    surf_orient_iters: IntList,
    surf_state_iters: IntList,
    surf_empty: bool,
    vol_pos_iters: IntList,
    vol_orient_iters: IntList,
    vol_state_iters: IntList,
    vol_empty: bool,
    mol_names: Vec<String>,
    num_iters: u64,
    num_times: u64,
    have_mesh_pos: bool,
    have_rgn_idx: bool,
    have_mesh_state: bool,
    no_meshes: bool,
    have_mol_pos: bool,
    have_mol_orient: bool,
    have_mol_state: bool,
    no_mols: bool,
}

fn range_pair(values: &[f64]) -> Option<(f64, f64)> {
    match values {
        [lo, hi, ..] => Some((*lo, *hi)),
        _ => None,
    }
}

impl From<RawCheck> for CheckSpec {
    fn from(raw: RawCheck) -> Self {
        let data = DataSource {
            data_file: raw.data_file.clone(),
            have_header: raw.have_header,
            average_data: raw.average_data,
        };
        let window = TimeWindow {
            min_time: raw.min_time,
            max_time: raw.max_time,
        };
        let file_sizes = || FileSizeSpec {
            file_names: raw.file_names.clone(),
            id_range: raw.id_range.clone(),
            file_size: raw.file_size,
        };
        let targets = || MeanSpec {
            means: raw.means.clone(),
            tolerances: raw.tolerances.clone(),
        };

        match raw.test_type.as_str() {
            "CHECK_SUCCESS" => CheckSpec::SimSuccess,
            "CHECK_EXIT_CODE" => CheckSpec::ExitCode {
                expected: raw.exit_code,
            },
            "CHECK_NONEMPTY_FILES" => CheckSpec::NonEmptyFiles(file_sizes()),
            "CHECK_EMPTY_FILES" => CheckSpec::EmptyFiles(file_sizes()),
            "CHECK_CHECKPOINT" => CheckSpec::Checkpoint {
                base_name: raw.base_name,
                delay: raw.delay,
                margin: raw.margin,
            },
            "CHECK_LEGACY_VOL_OUTPUT" => CheckSpec::LegacyVolOutput {
                data,
                xdim: raw.xdim,
                ydim: raw.ydim,
                zdim: raw.zdim,
            },
            "CHECK_ASCII_VIZ_OUTPUT" => CheckSpec::AsciiVizOutput { data },
            "CHECK_DREAMM_V3_MOLS_BIN" => CheckSpec::VizMolsBin {
                viz_path: raw.viz_path,
                all: raw.all_iters,
                surf: MolIters {
                    pos: raw.surf_pos_iters,
                    orient: raw.surf_orient_iters,
                    state: raw.surf_state_iters,
                    empty: raw.surf_empty,
                },
                vol: MolIters {
                    pos: raw.vol_pos_iters,
                    orient: raw.vol_orient_iters,
                    state: raw.vol_state_iters,
                    empty: raw.vol_empty,
                },
            },
            "CHECK_DREAMM_V3_MOLS_ASCII" => CheckSpec::VizMolsAscii {
                frames: FrameIters {
                    viz_path: raw.viz_path,
                    all: raw.all_iters,
                    pos: raw.pos_iters,
                    other: raw.orient_iters,
                    state: raw.state_iters,
                },
                mol_names: raw.mol_names,
            },
            "CHECK_DREAMM_V3_MESH_BIN" => CheckSpec::VizMeshBin {
                frames: FrameIters {
                    viz_path: raw.viz_path,
                    all: raw.all_iters,
                    pos: raw.pos_iters,
                    other: raw.region_iters,
                    state: raw.state_iters,
                },
                mesh_empty: raw.mesh_empty,
            },
            "CHECK_DREAMM_V3_MESH_ASCII" => CheckSpec::VizMeshAscii {
                frames: FrameIters {
                    viz_path: raw.viz_path,
                    all: raw.all_iters,
                    pos: raw.pos_iters,
                    other: raw.region_iters,
                    state: raw.state_iters,
                },
                mesh_empty: raw.mesh_empty,
                objects: raw.objects,
                object_regions: raw.object_regions,
            },
            "CHECK_DREAMM_V3_GROUPED" => CheckSpec::VizGrouped(GroupedSpec {
                viz_path: raw.viz_path,
                num_iters: raw.num_iters,
                num_times: raw.num_times,
                have_mesh_pos: raw.have_mesh_pos,
                have_rgn_idx: raw.have_rgn_idx,
                have_mesh_state: raw.have_mesh_state,
                no_meshes: raw.no_meshes,
                have_mol_pos: raw.have_mol_pos,
                have_mol_orient: raw.have_mol_orient,
                have_mol_state: raw.have_mol_state,
                no_mols: raw.no_mols,
            }),
            "DIFF_FILE_CONTENT" => CheckSpec::DiffFileContent {
                data,
                template_file: raw.template_file,
                template_parameters: raw.template_parameters,
            },
            "COUNT_CONSTRAINTS" => CheckSpec::CountConstraints {
                data,
                window,
                constraints: raw.count_constraints,
            },
            "COUNT_MINMAX" => CheckSpec::CountMinMax {
                data,
                window,
                maximum: raw.count_maximum,
                minimum: raw.count_minimum,
            },
            "FILE_MATCH_PATTERN" => CheckSpec::FileMatchPattern {
                data,
                pattern: raw.match_pattern,
                num_matches: raw.num_matches,
            },
            "CHECK_EXPRESSIONS" => CheckSpec::CheckExpressions { data },
            "COMPARE_COUNTS" => CheckSpec::CompareCounts {
                data,
                window,
                reference_file: raw.reference_file,
                abs_deviation: raw.abs_deviation,
                rel_deviation: raw.rel_deviation,
            },
            "COUNT_EQUILIBRIUM" => CheckSpec::CountEquilibrium {
                data,
                window,
                targets: targets(),
            },
            "COUNT_RATES" => CheckSpec::CountRates {
                data,
                window,
                base_time: raw.base_time,
                targets: targets(),
            },
            "POSITIVE_COUNTS" => CheckSpec::PositiveCounts { data, window },
            "POSITIVE_OR_ZERO_COUNTS" => CheckSpec::PositiveOrZeroCounts { data, window },
            "ZERO_COUNTS" => CheckSpec::ZeroCounts { data, window },
            "CHECK_TRIGGERS" => CheckSpec::Triggers {
                data,
                window,
                trigger: TriggerSpec {
                    kind: TriggerKind::parse(&raw.trigger_type),
                    have_exact_time: raw.have_exact_time,
                    output_time: raw.output_time,
                    xrange: range_pair(&raw.xrange),
                    yrange: range_pair(&raw.yrange),
                    zrange: range_pair(&raw.zrange),
                },
            },
            _ => CheckSpec::Unknown {
                test_type: raw.test_type,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Locate the description file of a test directory. JSON wins over TOML.
pub fn description_file(test_dir: &Path) -> DescriptorResult<PathBuf> {
    let json = test_dir.join(DESCRIPTION_JSON);
    if json.is_file() {
        return Ok(json);
    }
    let toml = test_dir.join(DESCRIPTION_TOML);
    if toml.is_file() {
        return Ok(toml);
    }
    Err(DescriptorError::Missing(test_dir.to_path_buf()))
}

fn parse_file(path: &Path) -> DescriptorResult<RawDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
    if is_toml {
        toml::from_str(&content).map_err(|source| DescriptorError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&content).map_err(|source| DescriptorError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn include_file(include_dir: &Path, name: &str) -> DescriptorResult<PathBuf> {
    ["json", "toml"]
        .iter()
        .map(|ext| include_dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
        .ok_or_else(|| DescriptorError::IncludeNotFound {
            name: name.to_string(),
            dir: include_dir.to_path_buf(),
        })
}

/// Append the checks of `includes` to `checks`, depth-first in list order.
/// `chain` holds the include names currently being expanded.
fn resolve_includes(
    includes: &[String],
    include_dir: &Path,
    chain: &mut Vec<String>,
    checks: &mut Vec<CheckSpec>,
) -> DescriptorResult<()> {
    for name in includes {
        if chain.iter().any(|n| n == name) {
            let mut cycle = chain.clone();
            cycle.push(name.clone());
            return Err(DescriptorError::IncludeCycle { chain: cycle });
        }
        if chain.len() >= MAX_INCLUDE_DEPTH {
            return Err(DescriptorError::IncludeDepth {
                name: name.clone(),
                limit: MAX_INCLUDE_DEPTH,
            });
        }

        let path = include_file(include_dir, name)?;
        debug!(include = %name, path = %path.display(), "Resolving include");
        let raw = parse_file(&path)?;

        checks.extend(raw.checks.into_iter().map(CheckSpec::from));
        chain.push(name.clone());
        resolve_includes(&raw.includes, include_dir, chain, checks)?;
        chain.pop();
    }
    Ok(())
}

/// Load the description of the test in `test_dir`, resolving includes from
/// `include_dir`.
pub fn load_descriptor(test_dir: &Path, include_dir: &Path) -> DescriptorResult<TestDescriptor> {
    let file = description_file(test_dir)?;
    let raw = parse_file(&file)?;

    let mut checks: Vec<CheckSpec> = raw.checks.into_iter().map(CheckSpec::from).collect();
    resolve_includes(&raw.includes, include_dir, &mut Vec::new(), &mut checks)?;

    Ok(TestDescriptor {
        path: test_dir.to_path_buf(),
        description: raw.description,
        keywords: raw.key_words,
        includes: raw.includes,
        run: RunSpec {
            input_files: raw.run.mdl_files,
            num_seeds: raw.run.num_seeds,
            commandline_opts: raw.run.commandline_opts,
            seed: 0,
            run_id: RunId::new(),
        },
        checks: checks.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_minimal_json() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("rx_flip");
        write(
            &test.join(DESCRIPTION_JSON),
            r#"{
                "Description": "flip flip reaction",
                "KeyWords": ["reactions", "surface"],
                "Run": {"MdlFiles": ["Scene.main.mdl"], "CommandlineOpts": ["-quiet"]},
                "Checks": [
                    {"TestType": "CHECK_SUCCESS"},
                    {"TestType": "ZERO_COUNTS", "DataFile": "counts.dat", "HaveHeader": true, "MinTime": 1e-5}
                ],
                "Unrelated": 42
            }"#,
        );

        let desc = load_descriptor(&test, dir.path()).unwrap();
        assert_eq!(desc.name(), "rx_flip");
        assert_eq!(desc.description, "flip flip reaction");
        assert_eq!(desc.keywords, vec!["reactions", "surface"]);
        assert_eq!(desc.run.input_files, vec!["Scene.main.mdl"]);
        assert_eq!(desc.run.num_seeds, 0);
        assert_eq!(desc.run.seed_count(), 1);
        assert_eq!(desc.checks.len(), 2);
        assert_eq!(desc.checks[0], CheckSpec::SimSuccess);
        match &desc.checks[1] {
            CheckSpec::ZeroCounts { data, window } => {
                assert_eq!(data.data_file, "counts.dat");
                assert!(data.have_header);
                assert_eq!(window.min_time, 1e-5);
                assert_eq!(window.max_time, 0.0);
            }
            other => panic!("unexpected check {other:?}"),
        }
    }

    #[test]
    fn test_load_toml_description() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("volvol");
        write(
            &test.join(DESCRIPTION_TOML),
            r#"
Description = "volume-volume crash"
KeyWords = ["crash"]

[Run]
MdlFiles = ["Scene.main.mdl"]
NumSeeds = 3

[[Checks]]
TestType = "CHECK_SUCCESS"

[[Checks]]
TestType = "COUNT_MINMAX"
DataFile = "counts.%d.dat"
CountMaximum = [5, 10]
"#,
        );

        let desc = load_descriptor(&test, dir.path()).unwrap();
        assert_eq!(desc.run.num_seeds, 3);
        assert_eq!(desc.checks.len(), 2);
        assert!(matches!(
            &desc.checks[1],
            CheckSpec::CountMinMax { maximum: Some(m), minimum: None, .. } if m == &vec![5, 10]
        ));
    }

    #[test]
    fn test_includes_append_depth_first_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let includes = dir.path().join("includes");
        write(
            &includes.join("a.json"),
            r#"{"Includes": ["c"], "Checks": [{"TestType": "POSITIVE_COUNTS"}]}"#,
        );
        write(
            &includes.join("b.json"),
            r#"{"Checks": [{"TestType": "ZERO_COUNTS"}]}"#,
        );
        write(
            &includes.join("c.toml"),
            "[[Checks]]\nTestType = \"CHECK_EXPRESSIONS\"\n",
        );
        let test = dir.path().join("t");
        write(
            &test.join(DESCRIPTION_JSON),
            r#"{"Includes": ["a", "b"], "Checks": [{"TestType": "CHECK_SUCCESS"}]}"#,
        );

        let desc = load_descriptor(&test, &includes).unwrap();
        let kinds: Vec<&str> = desc.checks.iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "CHECK_SUCCESS",
                "POSITIVE_COUNTS",
                "CHECK_EXPRESSIONS",
                "ZERO_COUNTS"
            ]
        );
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let includes = dir.path().join("includes");
        write(&includes.join("a.json"), r#"{"Includes": ["b"]}"#);
        write(&includes.join("b.json"), r#"{"Includes": ["a"]}"#);
        let test = dir.path().join("t");
        write(&test.join(DESCRIPTION_JSON), r#"{"Includes": ["a"]}"#);

        let err = load_descriptor(&test, &includes).unwrap_err();
        match err {
            DescriptorError::IncludeCycle { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected include cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_diamond_include_is_not_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let includes = dir.path().join("includes");
        write(&includes.join("a.json"), r#"{"Includes": ["shared"]}"#);
        write(&includes.join("b.json"), r#"{"Includes": ["shared"]}"#);
        write(
            &includes.join("shared.json"),
            r#"{"Checks": [{"TestType": "CHECK_SUCCESS"}]}"#,
        );
        let test = dir.path().join("t");
        write(&test.join(DESCRIPTION_JSON), r#"{"Includes": ["a", "b"]}"#);

        let desc = load_descriptor(&test, &includes).unwrap();
        assert_eq!(desc.checks.len(), 2);
    }

    #[test]
    fn test_missing_include_and_description() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        write(&test.join(DESCRIPTION_JSON), r#"{"Includes": ["nope"]}"#);
        assert!(matches!(
            load_descriptor(&test, dir.path()),
            Err(DescriptorError::IncludeNotFound { .. })
        ));

        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(matches!(
            load_descriptor(&empty, dir.path()),
            Err(DescriptorError::Missing(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        write(&test.join(DESCRIPTION_JSON), r#"{"Checks": [ }"#);
        assert!(matches!(
            load_descriptor(&test, dir.path()),
            Err(DescriptorError::Json { .. })
        ));
    }

    #[test]
    fn test_unknown_test_type_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        write(
            &test.join(DESCRIPTION_JSON),
            r#"{"Checks": [{"TestType": "CHECK_EVERYTHING"}]}"#,
        );
        let desc = load_descriptor(&test, dir.path()).unwrap();
        assert_eq!(
            desc.checks[0],
            CheckSpec::Unknown {
                test_type: "CHECK_EVERYTHING".to_string()
            }
        );
        assert_eq!(desc.checks[0].kind(), "CHECK_EVERYTHING");
    }

    #[test]
    fn test_trigger_and_int_list_fields() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("t");
        write(
            &test.join(DESCRIPTION_JSON),
            r#"{"Checks": [
                {"TestType": "CHECK_TRIGGERS", "DataFile": "hits.dat", "TriggerType": "hits",
                 "HaveExactTime": true, "OutputTime": 1e-6, "Xrange": [-1.0, 1.0]},
                {"TestType": "CHECK_NONEMPTY_FILES", "FileNames": ["viz.%d.dat"],
                 "IDRange": [1, "5:20:5"], "FileSize": 64}
            ]}"#,
        );
        let desc = load_descriptor(&test, dir.path()).unwrap();
        match &desc.checks[0] {
            CheckSpec::Triggers { trigger, .. } => {
                assert_eq!(trigger.kind, TriggerKind::Hits);
                assert!(trigger.have_exact_time);
                assert_eq!(trigger.xrange, Some((-1.0, 1.0)));
                assert_eq!(trigger.yrange, None);
            }
            other => panic!("unexpected check {other:?}"),
        }
        match &desc.checks[1] {
            CheckSpec::NonEmptyFiles(spec) => {
                assert_eq!(spec.file_size, 64);
                assert_eq!(
                    spec.id_range,
                    IntList(vec![
                        IntListItem::Int(1),
                        IntListItem::Text("5:20:5".to_string())
                    ])
                );
            }
            other => panic!("unexpected check {other:?}"),
        }
    }

    #[test]
    fn test_time_window() {
        let unset = TimeWindow::default();
        assert!(unset.contains(0.0));
        assert!(unset.contains(1e9));

        let window = TimeWindow {
            min_time: 1.0,
            max_time: 2.0,
        };
        assert!(!window.contains(0.5));
        assert!(window.contains(1.0));
        assert!(window.contains(2.0));
        assert!(!window.contains(2.5));
    }

    #[test]
    fn test_with_seed_shares_checks() {
        let desc = TestDescriptor {
            path: PathBuf::from("/tests/t"),
            description: String::new(),
            keywords: vec![],
            includes: vec![],
            run: RunSpec {
                input_files: vec!["a.mdl".to_string()],
                num_seeds: 3,
                commandline_opts: vec![],
                seed: 0,
                run_id: RunId::new(),
            },
            checks: vec![CheckSpec::SimSuccess].into(),
        };
        let copy = desc.with_seed(2);
        assert_eq!(copy.run.seed, 2);
        assert_eq!(copy.run.run_id, desc.run.run_id);
        assert!(Arc::ptr_eq(&copy.checks, &desc.checks));
    }
}

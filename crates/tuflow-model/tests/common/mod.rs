//! Shared fixtures for model integration tests.
#![allow(dead_code, unused_imports)]

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use smol_str::SmolStr;

pub use tuflow_model::{
    ControlFileId, FileGis, FileSystem, GisService, InputKind, InputQuery, MemoryFileSystem,
    Model, ModelError, Position, RunContext, WritePolicy,
};
pub use tuflow_syntax::{FileRef, Scope, ScopeKind};

pub const ROOT: &str = "/m/model.tcf";

pub const TCF: &str = "! Sample model\n\
Spatial Database == gis\\model.gpkg\n\
Set Variable CELL == 5\n\
If Scenario == D01\n\
    Set Variable CELL == 2\n\
End If\n\
\n\
Geometry Control File == model.tgc\n\
BC Control File == model.tbc\n\
Event File == events.tef\n\
BC Database == bc_dbase.csv\n\
Read File == outputs.trd\n\
Timestep == 1  ! seconds\n";

pub const TGC: &str = "Cell Size == <<CELL>>\n\
Read GRID Zpts == grid\\dem.tif\n\
If Scenario == D01\n\
    Read GIS Z Shape == 2d_zsh_D01\n\
Else\n\
    Read GIS Z Shape == 2d_zsh_EXG\n\
End If\n";

pub const TBC: &str = "Read GIS BC == gis\\2d_bc_L.shp\n";

pub const TEF: &str = "Define Event == Q100\n\
    BC Event Source == ~ARI~ | 100y\n\
End Define\n\
Define Event == Q010\n\
    BC Event Source == ~ARI~ | 10y\n\
End Define\n";

pub const TRD: &str = "Map Output Format == XMDF\nMap Output Interval == 300\n";

pub const BC_DBASE: &str = "Name,Source,Time,Value\n\
FC01,flow_~ARI~.csv,Time,Q\n\
DS,\"1,0.02,2,0.04\",,\n";

/// GIS service that knows a fixed set of layers in every database.
#[derive(Debug, Clone, Default)]
pub struct StaticGis {
    pub layers: Vec<SmolStr>,
}

impl StaticGis {
    pub fn new(layers: &[&str]) -> Self {
        Self {
            layers: layers.iter().map(|l| SmolStr::new(l)).collect(),
        }
    }
}

impl GisService for StaticGis {
    fn list_layers(&self, _database: &Path) -> Option<Vec<SmolStr>> {
        Some(self.layers.clone())
    }
}

/// The sample model's files.
pub fn sample_fs() -> MemoryFileSystem {
    MemoryFileSystem::new()
        .with_file(ROOT, TCF)
        .with_file("/m/model.tgc", TGC)
        .with_file("/m/model.tbc", TBC)
        .with_file("/m/events.tef", TEF)
        .with_file("/m/outputs.trd", TRD)
        .with_file("/m/bc_dbase.csv", BC_DBASE)
        .with_file("/m/flow_100y.csv", "Time,Q\n0,0\n")
        .with_file("/m/flow_10y.csv", "Time,Q\n0,0\n")
        .with_file("/m/grid/dem.tif", "")
        .with_file("/m/gis/model.gpkg", "")
        .with_file("/m/gis/2d_bc_L.shp", "")
}

/// Loads the sample model; the returned file system shares storage with it.
pub fn sample_model() -> (MemoryFileSystem, Model) {
    let fs = sample_fs();
    let gis = StaticGis::new(&["2d_zsh_D01", "2d_zsh_EXG"]);
    let model = Model::load(ROOT, fs.clone(), gis).unwrap();
    (fs, model)
}

/// Control file path, command, value and scope of every input.
pub fn structure(model: &Model) -> Vec<(PathBuf, String, String, String)> {
    let mut out = Vec::new();
    for cf in model.control_files() {
        let path = model.control_file(cf).unwrap().path().to_path_buf();
        for input in model.inputs(cf).unwrap() {
            out.push((
                path.clone(),
                input.lhs().to_string(),
                input.rhs().to_string(),
                input.scope().to_string(),
            ));
        }
    }
    out
}

/// Condition codes in the order they were recorded.
pub fn codes(model: &Model) -> Vec<&'static str> {
    model.conditions().iter().map(|c| c.code.code()).collect()
}

/// Finds the first input whose command contains `lhs`.
pub fn find(model: &Model, lhs: &str) -> tuflow_model::InputId {
    model
        .find_input(&InputQuery::new().lhs(lhs))
        .unwrap_or_else(|| panic!("no input matching '{lhs}'"))
}

/// A fresh directory under the system temp dir.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "tuflow-model-{prefix}-{}-{nanos}",
        std::process::id()
    ))
}

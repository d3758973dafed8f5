#![no_main]

use libfuzzer_sys::fuzz_target;
use tuflow_model::{ControlFileId, FileGis, MemoryFileSystem, Model, RunContext};

const MAX_SOURCE_BYTES: usize = 4096;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let split = usize::from(data[0]) % data.len();
    let (tcf, tgc) = data[1..].split_at(split.min(data.len() - 1));
    let tcf = String::from_utf8_lossy(&tcf[..tcf.len().min(MAX_SOURCE_BYTES)]);
    let tgc = String::from_utf8_lossy(&tgc[..tgc.len().min(MAX_SOURCE_BYTES)]);

    let fs = MemoryFileSystem::new()
        .with_file("/m/model.tcf", format!("Geometry Control File == model.tgc\n{tcf}"))
        .with_file("/m/model.tgc", tgc.into_owned());
    let Ok(mut model) = Model::load("/m/model.tcf", fs, FileGis) else {
        return;
    };
    for cf in model.control_files() {
        let _ = model.preview(cf);
    }
    let _ = model.context(RunContext::new().scenario("A").event("Q100"));
    let before = model.preview(ControlFileId::ROOT).ok();
    if model.append_input(ControlFileId::ROOT, "Timestep == 1").is_ok() {
        let _ = model.undo();
        assert_eq!(model.preview(ControlFileId::ROOT).ok(), before);
    }
});

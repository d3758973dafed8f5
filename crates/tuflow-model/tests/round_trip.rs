mod common;
use common::*;

use std::fs;

#[test]
fn test_sample_model_loads_cleanly() {
    let (_, model) = sample_model();
    assert!(codes(&model).is_empty(), "{:?}", model.conditions());
    let paths: Vec<String> = model
        .control_files()
        .into_iter()
        .map(|cf| model.control_file(cf).unwrap().path().display().to_string())
        .collect();
    assert_eq!(
        paths,
        ["/m/model.tcf", "/m/model.tgc", "/m/model.tbc", "/m/events.tef"]
    );
    assert_eq!(model.databases().len(), 1);
    assert!(!model.is_dirty());
}

#[test]
fn test_preview_reproduces_unedited_files() {
    let (fs, model) = sample_model();
    for cf in model.control_files() {
        let path = model.control_file(cf).unwrap().path().to_path_buf();
        assert_eq!(
            model.preview(cf).unwrap(),
            fs.contents(&path).unwrap(),
            "{}",
            path.display()
        );
    }
}

#[test]
fn test_write_then_reparse_keeps_input_sequence() {
    let (fs, mut model) = sample_model();
    let before = structure(&model);
    let summary = model.write(&WritePolicy::NoRename).unwrap();
    assert!(summary.written.len() >= 4);
    assert_eq!(fs.contents(ROOT).unwrap(), TCF);

    let reloaded = Model::load(ROOT, fs.clone(), StaticGis::new(&["2d_zsh_D01", "2d_zsh_EXG"]))
        .unwrap();
    assert_eq!(structure(&reloaded), before);
}

#[test]
fn test_crlf_line_endings_survive_edits() {
    let text = "Cell Size == 5\r\nTimestep == 1\r\n";
    let fs = MemoryFileSystem::new().with_file(ROOT, text);
    let mut model = Model::load(ROOT, fs.clone(), FileGis).unwrap();
    let timestep = find(&model, "timestep");
    model.set_rhs(timestep, "2").unwrap();
    model.write(&WritePolicy::InPlace).unwrap();
    assert_eq!(
        fs.contents(ROOT).unwrap(),
        "Cell Size == 5\r\nTimestep == 2\r\n"
    );
}

#[test]
fn test_std_file_system_round_trip() {
    let dir = unique_temp_dir("round-trip");
    fs::create_dir_all(&dir).unwrap();
    let root = dir.join("model.tcf");
    fs::write(&root, "Geometry Control File == model.tgc\n").unwrap();
    fs::write(dir.join("model.tgc"), "Cell Size == 5\n").unwrap();

    let mut model = Model::open(&root).unwrap();
    let tgc = model.control_files()[1];
    model.append_input(tgc, "Read GRID Zpts == dem.tif").unwrap();
    assert!(codes(&model).contains(&"C001"));
    let summary = model.write(&WritePolicy::InPlace).unwrap();
    // The edited file and its parent; the parent's text is unchanged.
    assert_eq!(summary.written.len(), 2);

    let written = fs::read_to_string(dir.join("model.tgc")).unwrap();
    assert_eq!(written, "Cell Size == 5\nRead GRID Zpts == dem.tif\n");
    assert_eq!(
        fs::read_to_string(&root).unwrap(),
        "Geometry Control File == model.tgc\n"
    );
    let _ = fs::remove_dir_all(&dir);
}

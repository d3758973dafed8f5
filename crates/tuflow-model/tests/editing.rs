mod common;
use common::*;

type Edit = fn(&mut Model);

fn edits() -> [(&'static str, Edit); 11] {
    [
        ("set_rhs", |m| {
            let id = find(m, "Timestep");
            m.set_rhs(id, "0.5").unwrap();
        }),
        ("set_command", |m| {
            let id = find(m, "Timestep");
            m.set_command(id, "Map Output Interval").unwrap();
        }),
        ("append", |m| {
            m.append_input(ControlFileId::ROOT, "SGS == On").unwrap();
        }),
        ("insert with gap", |m| {
            let id = find(m, "Cell Size");
            m.insert_input(id, "Read GIS Code == gis\\2d_code_R.shp", Position::After, 1)
                .unwrap();
        }),
        ("remove", |m| {
            let id = find(m, "BC Control File");
            m.remove_input(id).unwrap();
        }),
        ("remove fragment line", |m| {
            let id = find(m, "Map Output Format");
            m.remove_input(id).unwrap();
        }),
        ("comment out", |m| {
            let id = find(m, "Read GRID");
            m.comment_out(id).unwrap();
        }),
        ("set scope", |m| {
            let id = find(m, "Cell Size");
            m.set_scope(id, &Scope::parse(ScopeKind::Scenario, "D01 | D02"))
                .unwrap();
        }),
        ("add variable", |m| {
            m.add_variable("CELL", "10").unwrap();
        }),
        ("remove variable", |m| {
            m.remove_variable("CELL").unwrap();
        }),
        // Last: the geometry file's inputs are unreachable afterwards.
        ("retarget child", |m| {
            let id = find(m, "Geometry Control File");
            m.set_rhs(id, "other.tgc").unwrap();
        }),
    ]
}

#[test]
fn test_undo_restores_structure_for_every_edit() {
    for (name, edit) in edits() {
        let (_, mut model) = sample_model();
        let before = structure(&model);
        let conditions = model.conditions().len();
        edit(&mut model);
        assert_ne!(structure(&model), before, "{name} changed nothing");
        model.undo().unwrap();
        assert_eq!(structure(&model), before, "{name}");
        assert_eq!(model.conditions().len(), conditions, "{name}");
        assert!(matches!(model.undo(), Err(ModelError::NothingToUndo)), "{name}");
    }
}

#[test]
fn test_reset_restores_after_many_edits() {
    let (_, mut model) = sample_model();
    let before = structure(&model);
    let mut count = 0;
    for (_, edit) in edits() {
        edit(&mut model);
        count += 1;
    }
    assert_eq!(model.reset().unwrap(), count);
    assert_eq!(structure(&model), before);
}

#[test]
fn test_comment_toggle_is_idempotent() {
    let (_, mut model) = sample_model();
    let id = find(&model, "Read GRID");
    let original = model.input(id).unwrap().clone();
    model.comment_out(id).unwrap();
    assert_eq!(model.input(id).unwrap().kind(), InputKind::Comment);
    assert!(model.input(id).unwrap().files().is_empty());
    model.uncomment(id).unwrap();
    let input = model.input(id).unwrap();
    assert_eq!(input.id(), original.id());
    assert_eq!(input.lhs(), original.lhs());
    assert_eq!(input.rhs(), original.rhs());
    assert_eq!(input.files(), original.files());
}

#[test]
fn test_append_write_reparse_and_undo_before_write() {
    let (fs, mut model) = sample_model();
    let original = model.preview(ControlFileId::ROOT).unwrap();

    let sgs = model.append_input(ControlFileId::ROOT, "SGS == On").unwrap();
    model.undo().unwrap();
    assert_eq!(model.preview(ControlFileId::ROOT).unwrap(), original);
    assert!(model.find_input(&InputQuery::new().lhs("SGS")).is_none());
    assert!(!model.control_file(ControlFileId::ROOT).unwrap().inputs().contains(&sgs));

    model.append_input(ControlFileId::ROOT, "SGS == On").unwrap();
    model.write(&WritePolicy::InPlace).unwrap();
    let reloaded = Model::load(ROOT, fs.clone(), StaticGis::default()).unwrap();
    let lines: Vec<String> = reloaded
        .inputs(ControlFileId::ROOT)
        .unwrap()
        .iter()
        .map(|i| i.lhs().to_string())
        .collect();
    assert_eq!(lines.last().map(String::as_str), Some("SGS"));
    assert_eq!(lines.len(), TCF.lines().count() + TRD.lines().count() + 1);
    assert_eq!(fs.contents(ROOT).unwrap(), format!("{TCF}SGS == On\n"));
}

#[test]
fn test_auto_increment_renames_edited_files_and_parents() {
    let (fs, mut model) = sample_model();
    let cell = find(&model, "Cell Size");
    model.set_rhs(cell, "10").unwrap();
    let summary = model.write(&WritePolicy::AutoIncrement).unwrap();
    let written: Vec<String> = summary
        .written
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    assert_eq!(written, ["/m/model_001.tgc", "/m/model_001.tcf"]);
    let tcf = fs.contents("/m/model_001.tcf").unwrap();
    assert!(tcf.contains("Geometry Control File == model_001.tgc\n"));
    assert_eq!(fs.contents("/m/model.tgc").unwrap(), TGC);
    assert_eq!(model.root().path().display().to_string(), "/m/model_001.tcf");
    assert!(!model.is_dirty());
}

#[test]
fn test_database_entries_edit_and_undo() {
    let (fs, mut model) = sample_model();
    let db = model.databases()[0];
    model
        .set_database_entry(db, "FC02", &["flow_~ARI~.csv", "Time", "Q"])
        .unwrap();
    let entry = model.database(db).unwrap().entry("fc02").unwrap();
    assert_eq!(entry.files().len(), 2);
    model.remove_database_entry(db, "DS").unwrap();
    assert!(matches!(
        model.remove_database_entry(db, "DS"),
        Err(ModelError::UnknownEntry { .. })
    ));
    model.write(&WritePolicy::InPlace).unwrap();
    let csv = fs.contents("/m/bc_dbase.csv").unwrap();
    assert!(csv.contains("FC02,flow_~ARI~.csv,Time,Q\n"));
    assert!(!csv.contains("DS,"));

    model.undo().unwrap();
    model.undo().unwrap();
    let db = model.database(db).unwrap();
    assert!(db.entry("FC02").is_none());
    assert!(db.entry("DS").unwrap().is_list());
}

fn sorted_codes(model: &Model) -> Vec<&'static str> {
    let mut out = codes(model);
    out.sort_unstable();
    out
}

#[test]
fn test_retargeted_child_drops_its_conditions() {
    let fs = MemoryFileSystem::new()
        .with_file(ROOT, "Geometry Control File == bad.tgc\n")
        .with_file("/m/bad.tgc", "Read GIS Z Shape == missing_R.shp\nEnd If\n")
        .with_file("/m/good.tgc", "Cell Size == 5\n");
    let mut model = Model::load(ROOT, fs, FileGis).unwrap();
    assert_eq!(sorted_codes(&model), ["C001", "W002"]);

    let id = find(&model, "Geometry Control File");
    model.set_rhs(id, "good.tgc").unwrap();
    assert!(codes(&model).is_empty(), "{:?}", model.conditions());
    assert_eq!(model.control_files().len(), 2);

    model.undo().unwrap();
    assert_eq!(sorted_codes(&model), ["C001", "W002"]);

    model.remove_input(id).unwrap();
    assert!(codes(&model).is_empty(), "{:?}", model.conditions());
}

#[test]
fn test_replaced_entry_drops_its_conditions() {
    let fs = MemoryFileSystem::new()
        .with_file(ROOT, "BC Database == bc.csv\n")
        .with_file("/m/bc.csv", "Name,Source\nFC01,missing.csv\nFC02,2.5\n");
    let mut model = Model::load(ROOT, fs, FileGis).unwrap();
    assert_eq!(codes(&model), ["C001"]);
    let db = model.databases()[0];

    model.set_database_entry(db, "FC01", &["1.5"]).unwrap();
    assert!(codes(&model).is_empty(), "{:?}", model.conditions());
    model.undo().unwrap();
    assert_eq!(codes(&model), ["C001"]);

    model.set_database_entry(db, "FC02", &["gone.csv"]).unwrap();
    assert_eq!(codes(&model), ["C001", "C001"]);
    model.remove_database_entry(db, "FC01").unwrap();
    assert_eq!(codes(&model), ["C001"]);
    assert!(model.conditions()[0].message.contains("gone.csv"));

    model.undo().unwrap();
    model.undo().unwrap();
    assert_eq!(codes(&model), ["C001"]);
    assert!(model.conditions()[0].message.contains("missing.csv"));
}

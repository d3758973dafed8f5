use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "tuflow-inspect-{prefix}-{}-{nanos}",
        std::process::id()
    ))
}

fn write_model(prefix: &str) -> PathBuf {
    let dir = unique_temp_dir(prefix);
    std::fs::create_dir_all(&dir).expect("create model dir");
    std::fs::write(
        dir.join("model.tcf"),
        "Set Variable CELL == 5\n\
         If Scenario == fine\n\
         Set Variable CELL == 2\n\
         End If\n\
         Geometry Control File == model.tgc\n",
    )
    .expect("write tcf");
    std::fs::write(
        dir.join("model.tgc"),
        "Cell Size == <<CELL>>\nRead GRID Zpts == dem.tif\n",
    )
    .expect("write tgc");
    dir
}

#[test]
fn inputs_with_scenario_substitutes_variables() {
    let dir = write_model("inputs");
    let output = Command::new(env!("CARGO_BIN_EXE_tuflow-inspect"))
        .arg("inputs")
        .arg(dir.join("model.tcf"))
        .args(["-s", "fine"])
        .output()
        .expect("run tuflow-inspect");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cell Size == 2"), "{stdout}");
    assert!(!stdout.contains("Cell Size == 5"), "{stdout}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn conditions_fail_on_missing_files() {
    let dir = write_model("conditions");
    let output = Command::new(env!("CARGO_BIN_EXE_tuflow-inspect"))
        .arg("conditions")
        .arg(dir.join("model.tcf"))
        .output()
        .expect("run tuflow-inspect");
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("C001"), "{stdout}");
    assert!(stdout.contains("dem.tif"), "{stdout}");
    let _ = std::fs::remove_dir_all(&dir);
}

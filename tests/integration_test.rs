use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn batchmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_batchmd"))
}

#[test]
fn test_cli_help() {
    let output = batchmd()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("convert"));
}

#[test]
fn test_cli_scan_lists_tree() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/notes.txt"), "hi").unwrap();
    fs::write(dir.path().join("photo.png"), "x").unwrap();

    let output = batchmd()
        .arg("--settings")
        .arg(dir.path().join("settings.ini"))
        .arg("scan")
        .arg(dir.path())
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sub/"));
    assert!(stdout.contains("notes.txt"));
    assert!(!stdout.contains("photo.png"));
    assert!(stdout.contains("1 convertible file(s)"));
}

#[test]
fn test_cli_convert_with_output_dir_and_saved_settings() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let out = dir.path().join("out");
    let settings = dir.path().join("conf/settings.ini");
    fs::create_dir_all(input.join("a")).unwrap();
    fs::write(input.join("a/report.txt"), "Quarterly numbers").unwrap();

    let output = batchmd()
        .arg("--settings")
        .arg(&settings)
        .args(["convert", "--policy", "skip", "--save-settings", "-o"])
        .arg(&out)
        .arg(&input)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(out.join("a/report.md")).unwrap(),
        "Quarterly numbers\n\n"
    );
    let saved = fs::read_to_string(&settings).unwrap();
    assert!(saved.contains("default_policy=skip"));
}

#[test]
fn test_cli_rejects_bad_pattern() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "x").unwrap();

    let output = batchmd()
        .arg("--settings")
        .arg(dir.path().join("settings.ini"))
        .args(["convert", "--pattern", "{name}{ext}"])
        .arg(dir.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(!dir.path().join("a.md").exists());
}

//! End-to-end tests for the `c3pm` binary.

use git2::{IndexAddOption, Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn c3pm_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_c3pm"))
}

fn run_c3pm(project_dir: &Path, args: &[&str]) -> Output {
    Command::new(c3pm_binary())
        .arg("-C")
        .arg(project_dir)
        .args(args)
        .env("C3PM_LOG", "off")
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .output()
        .expect("Failed to execute c3pm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn init_demo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create project dir");
    let output = run_c3pm(dir.path(), &["init", "--name", "demo"]);
    assert!(output.status.success(), "init failed: {}", stderr(&output));
    dir
}

fn manifest_bytes(dir: &Path) -> Vec<u8> {
    fs::read(dir.join("c3pm.json")).expect("Failed to read c3pm.json")
}

#[test]
fn test_init_creates_project() {
    let dir = init_demo();
    let out = fs::read_to_string(dir.path().join("c3pm.json")).unwrap();
    assert!(out.contains("\"name\": \"demo\""));
    assert!(dir.path().join("src/exports").is_dir());
    let ignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(ignore.contains("/imports/"));
    assert!(ignore.contains("/.c3pm/"));
}

#[test]
fn test_init_twice_fails() {
    let dir = init_demo();
    let output = run_c3pm(dir.path(), &["init", "--name", "demo"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("bad project"));
}

#[test]
fn test_add_list_remove() {
    let dir = init_demo();

    let output = run_c3pm(
        dir.path(),
        &["add", "git-c3pm", "foo", "https://example.com/foo.git", "master"],
    );
    assert!(output.status.success(), "add failed: {}", stderr(&output));
    assert!(stdout(&output).contains("successfully added"));

    let output = run_c3pm(dir.path(), &["list"]);
    let listing = stdout(&output);
    assert!(listing.contains("Dependencies for demo:"));
    assert!(listing.contains("foo (git-c3pm: https://example.com/foo.git, master)"));

    let output = run_c3pm(dir.path(), &["remove", "foo"]);
    assert!(output.status.success(), "remove failed: {}", stderr(&output));

    let output = run_c3pm(dir.path(), &["list"]);
    assert!(stdout(&output).contains("doesn't have any dependencies"));
}

#[test]
fn test_remove_with_wrong_reference_leaves_manifest() {
    let dir = init_demo();
    run_c3pm(
        dir.path(),
        &["add", "git-c3pm", "foo", "https://example.com/foo.git"],
    );
    let before = manifest_bytes(dir.path());

    let output = run_c3pm(dir.path(), &["remove", "foo", "develop"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("bad argument"));
    assert_eq!(manifest_bytes(dir.path()), before);
}

#[test]
fn test_duplicate_add_and_bad_reference_rejected() {
    let dir = init_demo();
    let url = "https://example.com/foo.git";
    assert!(run_c3pm(dir.path(), &["add", "git-c3pm", "foo", url]).status.success());
    let before = manifest_bytes(dir.path());

    let dup = run_c3pm(dir.path(), &["add", "git-c3pm", "foo", url]);
    assert!(!dup.status.success());
    let pinned = run_c3pm(dir.path(), &["add", "git-c3pm", "bar", url, "v1.0"]);
    assert!(!pinned.status.success());

    assert_eq!(manifest_bytes(dir.path()), before);
}

#[test]
fn test_commands_outside_project_fail() {
    let dir = tempfile::tempdir().unwrap();
    for args in [&["list"][..], &["update"][..], &["remove", "foo"][..]] {
        let output = run_c3pm(dir.path(), args);
        assert!(!output.status.success(), "{args:?} should fail");
        assert!(stderr(&output).contains("bad project"), "{args:?}");
    }
}

#[test]
fn test_update_reports_failures_with_exit_code() {
    let dir = init_demo();
    let repos = tempfile::tempdir().unwrap();

    let good = repos.path().join("good");
    fs::create_dir_all(good.join("src/exports")).unwrap();
    fs::write(good.join("src/exports/good.h"), "int good();\n").unwrap();
    let repo = Repository::init(&good).unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("c3pm tests", "tests@c3pm.invalid").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();

    let good_url = format!("file://{}", good.display());
    let missing_url = format!("file://{}", repos.path().join("missing").display());
    run_c3pm(dir.path(), &["add", "git-c3pm", "good", good_url.as_str()]);
    run_c3pm(dir.path(), &["add", "git-c3pm", "missing", missing_url.as_str()]);

    let output = run_c3pm(dir.path(), &["update", "--jobs", "2"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("1 of 2 dependencies failed"));
    assert!(dir.path().join("imports/good/good.h").is_file());
}

#[test]
fn test_completion_generates_script() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_c3pm(dir.path(), &["completion", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("c3pm"));
}

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn project(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("runnel.toml"), config).unwrap();
    dir
}

fn runnel(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("runnel").unwrap();
    cmd.current_dir(dir)
        .env_remove("RUNNEL_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--no-color");
    cmd
}

#[test]
fn no_arguments_prints_help() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("runnel")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Usage"));

    runnel(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();

    runnel(dir.path()).arg("explode").assert().failure();
}

#[test]
fn list_shows_tasks_with_descriptions() {
    let dir = project(
        r#"
        [tasks.build]
        description = "Build the project"
        command = "echo build"

        [tasks.deploy]
        sequence = ["build"]
    "#,
    );

    runnel(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build the project"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("No description"));
}

#[test]
fn ls_plain_keeps_declaration_order() {
    let dir = project(
        r#"
        [tasks.zeta]
        command = "true"

        [tasks.alpha]
        command = "true"
    "#,
    );

    runnel(dir.path())
        .args(["ls", "--format", "plain"])
        .assert()
        .success()
        .stdout("zeta\nalpha\n");
}

#[test]
fn rust_log_sets_the_log_level() {
    let dir = project(
        r#"
        [tasks.build]
        command = "true"
    "#,
    );

    runnel(dir.path())
        .args(["run", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("configuration loaded").not());

    runnel(dir.path())
        .env("RUST_LOG", "debug")
        .args(["run", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("configuration loaded"));
}

#[test]
fn list_without_config_suggests_init() {
    let dir = TempDir::new().unwrap();

    runnel(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks configured"));
}

#[test]
fn sequence_runs_repeated_member_twice() {
    let dir = project(
        r#"
        [tasks.build]
        command = "echo build >> log.txt"

        [tasks.deploy]
        sequence = ["build", "build"]
    "#,
    );

    runnel(dir.path()).args(["run", "deploy"]).assert().success();

    let log = fs::read_to_string(dir.path().join("log.txt")).unwrap();
    assert_eq!(log, "build\nbuild\n");
}

#[test]
fn sequence_stops_at_first_failure() {
    let dir = project(
        r#"
        [tasks.fail]
        command = "exit 4"

        [tasks.after]
        command = "touch after.txt"

        [tasks.release]
        sequence = ["fail", "after"]
    "#,
    );

    runnel(dir.path())
        .args(["run", "release"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exit code 4"));

    assert!(!dir.path().join("after.txt").exists());
}

#[test]
fn parallel_failure_lets_siblings_finish() {
    let dir = project(
        r#"
        [tasks.a]
        command = "exit 1"

        [tasks.b]
        command = "sleep 0.2 && echo done > b.txt"

        [tasks.ab]
        parallel = ["a", "b"]
    "#,
    );

    runnel(dir.path()).args(["run", "ab"]).assert().failure();

    let b = fs::read_to_string(dir.path().join("b.txt")).unwrap();
    assert_eq!(b.trim(), "done");
}

#[test]
fn verbose_run_streams_output() {
    let dir = project(
        r#"
        [env]
        GREETING = "hello"

        [tasks.greet]
        command = "echo $GREETING $NAME"
        env = { NAME = "runnel" }
    "#,
    );

    runnel(dir.path())
        .args(["run", "greet", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello runnel"))
        .stdout(predicate::str::contains("Running task: greet"));
}

#[test]
fn unknown_task_fails() {
    let dir = project(
        r#"
        [tasks.build]
        command = "true"
    "#,
    );

    runnel(dir.path())
        .args(["run", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'nope' not found"));
}

#[test]
fn cycle_fails_at_run_time() {
    let dir = project(
        r#"
        [tasks.a]
        sequence = ["b"]

        [tasks.b]
        sequence = ["a"]
    "#,
    );

    runnel(dir.path())
        .args(["run", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("a -> b -> a"));
}

#[test]
fn function_task_runs_rhai_script() {
    let dir = project(
        r#"
        [tasks.stamp]
        function = '''
            write_file("stamp.txt", "stamped");
            true
        '''
    "#,
    );

    runnel(dir.path()).args(["run", "stamp"]).assert().success();

    let stamp = fs::read_to_string(dir.path().join("stamp.txt")).unwrap();
    assert_eq!(stamp, "stamped");
}

#[test]
fn function_task_returning_false_fails() {
    let dir = project(
        r#"
        [tasks.guard]
        function = "false"
    "#,
    );

    runnel(dir.path()).args(["run", "guard"]).assert().failure();
}

#[test]
fn files_task_deletes_then_copies() {
    let dir = project(
        r#"
        [tasks.dist]
        files = { delete = ["dist/*.old"], copy = { "static/index.html" = "dist/index.html" } }
    "#,
    );
    fs::create_dir_all(dir.path().join("dist")).unwrap();
    fs::create_dir_all(dir.path().join("static")).unwrap();
    fs::write(dir.path().join("dist/stale.old"), "x").unwrap();
    fs::write(dir.path().join("static/index.html"), "<html>").unwrap();

    runnel(dir.path()).args(["run", "dist"]).assert().success();

    assert!(!dir.path().join("dist/stale.old").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("dist/index.html")).unwrap(),
        "<html>"
    );
}

#[test]
fn explicit_config_path_is_used() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ci.toml"),
        r#"
        [tasks.ci]
        command = "true"
    "#,
    )
    .unwrap();

    runnel(dir.path())
        .args(["ls", "--format", "plain", "--config", "ci.toml"])
        .assert()
        .success()
        .stdout("ci\n");
}

#[test]
fn init_creates_config_once() {
    let dir = TempDir::new().unwrap();

    runnel(dir.path()).arg("init").assert().success();
    assert!(dir.path().join("runnel.toml").exists());

    runnel(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    runnel(dir.path()).args(["init", "--force"]).assert().success();

    runnel(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn check_reports_cycles() {
    let dir = project(
        r#"
        [tasks.a]
        sequence = ["b"]

        [tasks.b]
        parallel = ["a"]
    "#,
    );

    runnel(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("a -> b -> a"));
}

#[test]
fn check_reports_missing_references() {
    let dir = project(
        r#"
        [tasks.deploy]
        sequence = ["build", "upload"]

        [tasks.build]
        command = "true"
    "#,
    );

    runnel(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("undefined task 'upload'"));
}

#[test]
fn graph_dot_lists_edges() {
    let dir = project(
        r#"
        [tasks.a]
        command = "true"

        [tasks.b]
        command = "true"

        [tasks.all]
        parallel = ["a", "b"]
    "#,
    );

    runnel(dir.path())
        .args(["graph", "all", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"all\" -> \"a\" [style=dashed];"))
        .stdout(predicate::str::contains("\"all\" -> \"b\" [style=dashed];"));
}

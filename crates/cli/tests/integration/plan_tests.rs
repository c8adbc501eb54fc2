use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_lists_tasks_in_run_order() {
  let env = TestEnv::from_fixture("builds.yaml");

  let output = env
    .artifactor_cmd()
    .args(["build", "plan"])
    .assert()
    .success()
    .stdout(predicate::str::contains("3 build task(s)"))
    .get_output()
    .stdout
    .clone();

  let stdout = String::from_utf8(output).unwrap();
  let bundle = stdout.find("function bundle 1").unwrap();
  let image = stdout.find("container image 0").unwrap();
  assert!(bundle < image, "bundles must be listed before images:\n{stdout}");
  assert!(stdout.contains("nodejs14.x: npm run build"));
  assert!(stdout.contains("docker/Dockerfile in app"));
}

#[test]
fn plan_accepts_directory_argument() {
  let env = TestEnv::from_fixture("builds.yaml");

  TestEnv::empty()
    .artifactor_cmd()
    .args(["build", "plan"])
    .arg(env.dir())
    .assert()
    .success()
    .stdout(predicate::str::contains("go1.x: make build, archive dist"));
}

#[test]
fn plan_json_output_is_valid() {
  let env = TestEnv::from_fixture("builds.yaml");

  let output = env
    .artifactor_cmd()
    .args(["build", "plan", "-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();

  let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
  let tasks = json.as_array().unwrap();
  assert_eq!(tasks.len(), 3);
  assert_eq!(tasks[0]["kind"], "function-bundle");
  assert_eq!(tasks[0]["archive_root"], "dist");
  assert_eq!(tasks[1]["includes"], serde_json::json!(["src", "package.json", "node_modules"]));
  assert_eq!(tasks[2]["kind"], "container-image");
  assert_eq!(tasks[2]["index"], 0);
}

#[test]
fn plan_with_empty_config_reports_no_tasks() {
  let env = TestEnv::empty();
  env.write_file("builds.yaml", "");

  env
    .artifactor_cmd()
    .args(["build", "plan"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No build tasks configured"));
}

#[test]
fn plan_rejects_unknown_runtime() {
  let env = TestEnv::from_fixture("unknown_runtime.yaml");

  env
    .artifactor_cmd()
    .args(["build", "plan"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Invalid function bundle 1"))
    .stderr(predicate::str::contains("unknown runtime \"ruby2.7\""));
}

#[test]
fn plan_reports_malformed_config() {
  let env = TestEnv::from_fixture("malformed.yaml");

  env
    .artifactor_cmd()
    .args(["build", "plan"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn plan_reports_missing_config() {
  let env = TestEnv::empty();

  env
    .artifactor_cmd()
    .args(["build", "plan"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("no builds.yaml found"));
}

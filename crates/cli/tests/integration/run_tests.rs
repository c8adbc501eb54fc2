use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn run_rejects_malformed_repository() {
  let env = TestEnv::empty();

  env
    .artifactor_cmd()
    .args(["build", "run", "not-a-repository", "deadbeef"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("invalid repository \"not-a-repository\""));
}

#[test]
fn run_rejects_invalid_timeout_setting() {
  let env = TestEnv::empty();

  env
    .artifactor_cmd()
    .args(["build", "run", "org/app", "deadbeef"])
    .env("ARTIFACTOR_TIMEOUT", "soon")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("ARTIFACTOR_TIMEOUT"));
}

#[test]
fn run_rejects_invalid_timeout_flag() {
  let env = TestEnv::empty();

  env
    .artifactor_cmd()
    .args(["build", "run", "org/app", "deadbeef", "--timeout", "soon"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--timeout"));
}

#[test]
fn run_rejects_path_like_commit() {
  let env = TestEnv::empty();

  env
    .artifactor_cmd()
    .args(["build", "run", "org/app", "../../x"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("invalid commit \"../../x\""));
}

#[test]
fn run_rejects_option_like_commit() {
  let env = TestEnv::empty();

  env
    .artifactor_cmd()
    .args(["build", "run", "--", "org/app", "--upload-pack=touch pwned"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("invalid commit"));

  assert!(!env.dir().join("pwned").exists());
}

//! `stagehand plan` output.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_lists_waves_in_build_order() {
  let env = TestEnv::from_fixture("hello.toml");

  env
    .cmd()
    .arg("plan")
    .arg(&env.manifest_path)
    .args(["--arch", "amd64"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Plan for hello (x86_64)"))
    .stdout(predicate::str::contains("Wave 1: libgreet"))
    .stdout(predicate::str::contains("Wave 2: hello"));

  // Planning touches nothing on disk.
  assert!(!env.work_path().exists());
  assert!(!env.path("cache").exists());
}

#[test]
fn plan_json_selects_arch_variant() {
  let env = TestEnv::from_fixture("arch_only.toml");

  let output = env
    .cmd()
    .arg("plan")
    .arg(&env.manifest_path)
    .args(["--arch", "arm64", "--output-format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(plan["project"], "armonly");
  assert_eq!(plan["waves"], serde_json::json!([["blob"]]));
  assert!(plan["components"][0]["source"].as_str().unwrap().ends_with("vendor/blob-arm64"));
}

#[test]
fn plan_rejects_unknown_arch() {
  let env = TestEnv::from_fixture("hello.toml");

  env
    .cmd()
    .arg("plan")
    .arg(&env.manifest_path)
    .args(["--arch", "sparc"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown architecture"));
}

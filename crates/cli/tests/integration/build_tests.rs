//! `stagehand build` end to end.

use predicates::prelude::*;

use super::common::{TestEnv, read, write_hello_sources};

#[test]
fn build_writes_package_and_metadata() {
  let env = TestEnv::from_fixture("hello.toml");
  write_hello_sources(&env);

  env
    .build_cmd("amd64")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built hello 1.2.0 for amd64"))
    .stdout(predicate::str::contains("libgreet, hello"));

  assert_eq!(
    env.artifacts(),
    vec![
      "hello-1.2.0-1.amd64.tar.gz".to_string(),
      "hello-1.2.0-1.amd64.tar.gz.metadata.json".to_string(),
    ]
  );

  let metadata: serde_json::Value =
    serde_json::from_str(&read(&env.output_path().join("hello-1.2.0-1.amd64.tar.gz.metadata.json"))).unwrap();
  assert_eq!(metadata["name"], "hello");
  assert_eq!(metadata["components"].as_array().unwrap().len(), 2);
}

#[test]
fn build_keeps_package_root_but_removes_staging() {
  let env = TestEnv::from_fixture("hello.toml");
  write_hello_sources(&env);

  env.build_cmd("amd64").assert().success();

  let install = env.work_path().join("package-root/opt/hello");
  assert_eq!(
    read(&install.join("etc/hello.conf")),
    "greeting = \"hi from hello local_source\"\n"
  );
  assert!(install.join("embedded/lib/libgreet.so").is_file());
  assert!(install.join("bin/hello").is_file());
  assert!(!env.work_path().join("staging").exists());
}

#[test]
fn keep_work_dir_leaves_staging_roots() {
  let env = TestEnv::from_fixture("hello.toml");
  write_hello_sources(&env);

  env.build_cmd("amd64").arg("--keep-work-dir").assert().success();

  assert!(env.work_path().join("staging/hello").is_dir());
  assert!(env.work_path().join("staging/libgreet").is_dir());
}

#[test]
fn json_output_reports_states() {
  let env = TestEnv::from_fixture("hello.toml");
  write_hello_sources(&env);

  let output = env
    .build_cmd("arm64")
    .args(["--output-format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["state"], "done");
  assert_eq!(report["arch"], "aarch64");
  assert!(report["error"].is_null());
  let states: Vec<&str> = report["transitions"]
    .as_array()
    .unwrap()
    .iter()
    .map(|t| t["state"].as_str().unwrap())
    .collect();
  assert_eq!(states, vec!["resolving", "fetching", "building", "assembling", "done"]);
}

#[cfg(unix)]
#[test]
fn failing_command_exits_nonzero_with_details() {
  let env = TestEnv::from_fixture("failing.toml");
  env.write_file("src/.keep", "");

  env
    .build_cmd("amd64")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build failed: broken 0.0.1"))
    .stderr(predicate::str::contains("execution"))
    .stderr(predicate::str::contains("building"))
    .stderr(predicate::str::contains("app"))
    .stderr(predicate::str::contains("exit code"));

  assert!(env.artifacts().is_empty());
}

#[cfg(unix)]
#[test]
fn failing_command_json_names_component() {
  let env = TestEnv::from_fixture("failing.toml");
  env.write_file("src/.keep", "");

  let output = env
    .build_cmd("amd64")
    .args(["--output-format", "json"])
    .output()
    .unwrap();
  assert!(!output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["state"], "failed");
  assert_eq!(report["error"]["class"], "execution");
  assert_eq!(report["error"]["phase"], "building");
  assert_eq!(report["error"]["component"], "app");
}

#[test]
fn missing_variant_for_arch_fails_before_fetching() {
  let env = TestEnv::from_fixture("arch_only.toml");

  env
    .build_cmd("amd64")
    .assert()
    .failure()
    .stderr(predicate::str::contains("no source variant for x86_64"))
    .stderr(predicate::str::contains("configuration"));

  assert!(!env.work_path().join("src").exists());
}

#[test]
fn missing_manifest_fails() {
  let env = TestEnv::from_fixture("hello.toml");

  env
    .cmd()
    .args(["build", "does-not-exist.toml"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Manifest not found"));
}

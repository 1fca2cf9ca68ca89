//! Building projects loaded from TOML manifests.

use std::fs;
use std::sync::Arc;

use stagehand_lib::build::{ErrorClass, ProjectBuilder, ProjectState};
use stagehand_lib::manifest::Manifest;
use stagehand_lib::platform::Arch;
use stagehand_lib::util::hash::{HashAlgorithm, hash_bytes};

use walkdir::WalkDir;

use super::common::{RecordingPackager, TestEnv};

const MANIFEST: &str = r#"
[project]
name = "gemfast"
version = "1.0.0"
maintainer = "Gemfast Maintainers <gemfast@example.com>"
license = "Apache-2.0"
components = ["gemfast"]
runtime_requirements = ["libc6"]

[[component]]
name = "caddy"
version = "2.6.2"
license = "Apache-2.0"
license_file = "LICENSE"

[[component.source]]
arch = { one_of = ["amd64"] }
path = "vendor/caddy-amd64"

[[component.source]]
arch = { one_of = ["arm64"] }
path = "vendor/caddy-arm64"

[[component.action]]
type = "copy_file"
source = "caddy"
dest = "embedded/bin/caddy"

[[component]]
name = "gemfast"
version = "local_source"
depends_on = ["caddy"]

[[component.source]]
path = "server"

[[component.action]]
type = "run_command"
command = "mkdir -p \"$STAGING_DIR/bin\" && cp gemfast-server \"$STAGING_DIR/bin/\" && echo \"$GREETING\" > \"$STAGING_DIR/greeting\""
env = { GREETING = "built $${name} $${version}" }
"#;

fn write_project(env: &TestEnv) -> std::path::PathBuf {
  env.write_file("project/vendor/caddy-amd64/caddy", "caddy amd64");
  env.write_file("project/vendor/caddy-arm64/caddy", "caddy arm64");
  env.write_file("project/server/gemfast-server", "#!/bin/sh\n");
  env.write_file("project/stagehand.toml", MANIFEST)
}

#[cfg(unix)]
#[tokio::test]
async fn manifest_project_builds_for_each_arch() {
  let env = TestEnv::new();
  let manifest = Manifest::from_path(&write_project(&env)).unwrap();

  for (arch, expected) in [(Arch::X86_64, "caddy amd64"), (Arch::Aarch64, "caddy arm64")] {
    let packager = Arc::new(RecordingPackager::default());
    let mut config = env.config(&format!("work-{arch}"));
    config.arch = arch;

    let report = env
      .build(config, packager.clone(), &manifest.project, &manifest.registry)
      .await;

    assert!(report.is_success(), "{arch}: {:?}", report.error());
    assert_eq!(report.build_order, vec!["caddy", "gemfast"]);
    let install = report.package_root.clone().unwrap().join("opt/gemfast");
    assert_eq!(fs::read_to_string(install.join("embedded/bin/caddy")).unwrap(), expected);
    assert!(install.join("bin/gemfast-server").is_file());
    assert_eq!(
      fs::read_to_string(install.join("greeting")).unwrap(),
      "built gemfast local_source\n"
    );

    let calls = packager.calls();
    let metadata = &calls[0].1;
    assert_eq!(metadata.arch, arch);
    assert_eq!(metadata.runtime_requirements, vec!["libc6"]);
    assert_eq!(metadata.components[0].license_file.as_deref(), Some("LICENSE"));
  }
}

#[test]
fn plan_reports_selected_sources_without_io() {
  let env = TestEnv::new();
  let manifest = Manifest::from_path(&write_project(&env)).unwrap();

  let plan = ProjectBuilder::plan(&manifest.project, &manifest.registry, Arch::Aarch64).unwrap();

  assert_eq!(plan.components.len(), 2);
  assert!(plan.components[0].source.ends_with("vendor/caddy-arm64"));
  assert_eq!(plan.waves, vec![vec!["caddy".to_string()], vec!["gemfast".to_string()]]);
}

#[tokio::test]
async fn remote_source_with_wrong_checksum_fails_integrity() {
  let mut server = mockito::Server::new_async().await;
  server
    .mock("GET", "/runit.tar.gz")
    .with_body("not what was promised")
    .create_async()
    .await;

  let env = TestEnv::new();
  let manifest = format!(
    r#"
[project]
name = "runit"
version = "2.1.2"
components = ["runit"]

[[component]]
name = "runit"
version = "2.1.2"

[[component.source]]
url = "{}/runit.tar.gz"
sha256 = "{}"
"#,
    server.url(),
    hash_bytes(b"the real tarball", HashAlgorithm::Sha256)
  );
  let manifest = Manifest::from_str_with_base(&manifest, env.temp.path()).unwrap();

  let report = env
    .build(
      env.config("work"),
      Arc::new(RecordingPackager::default()),
      &manifest.project,
      &manifest.registry,
    )
    .await;

  let err = report.error().unwrap();
  assert_eq!(err.phase, ProjectState::Fetching);
  assert_eq!(err.class(), ErrorClass::Integrity);
  // Nothing unverified is left in the cache.
  let cached: Vec<_> = WalkDir::new(env.path("cache"))
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .map(|e| e.into_path())
    .collect();
  assert!(cached.is_empty(), "{cached:?}");
}

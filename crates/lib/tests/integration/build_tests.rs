//! ProjectBuilder runs over local sources.

use std::fs;
use std::sync::Arc;

use stagehand_lib::action::ActionList;
use stagehand_lib::build::{AssembleError, ErrorClass, ErrorKind, ProjectState};
use stagehand_lib::component::{ComponentRegistry, ComponentSpec, SourceVariant};
use stagehand_lib::execute::ActionError;
use stagehand_lib::package::TarPackager;
use stagehand_lib::project::{CompressionType, ProjectSpec};

use super::common::{RecordingPackager, TestEnv};

fn project(components: &[&str]) -> ProjectSpec {
  let mut project = ProjectSpec::new("gemfast", "1.0.0").with_install_dir("/opt/gemfast");
  for name in components {
    project = project.with_component(*name);
  }
  project
}

fn local(env: &TestEnv, name: &str, actions: ActionList) -> ComponentSpec {
  let dir = env.path(&format!("sources/{name}"));
  fs::create_dir_all(&dir).unwrap();
  ComponentSpec::new(name, "local_source")
    .with_source(SourceVariant::path(dir))
    .with_actions(actions.into_actions())
}

fn sleeper(file: &str) -> ActionList {
  let mut actions = ActionList::new();
  actions
    .command("sleep 0.3")
    .command(&format!("mkdir -p \"$STAGING_DIR/lib\" && touch \"$STAGING_DIR/lib/{file}\""));
  actions
}

#[cfg(unix)]
#[tokio::test]
async fn diamond_builds_in_waves() {
  let env = TestEnv::new();
  let registry: ComponentRegistry = [
    local(&env, "libc", sleeper("libc")),
    local(&env, "openssl", sleeper("openssl")).depends_on("libc"),
    local(&env, "zlib", sleeper("zlib")).depends_on("libc"),
    local(&env, "ruby", sleeper("ruby")).depends_on("openssl").depends_on("zlib"),
  ]
  .into_iter()
  .collect();
  let packager = Arc::new(RecordingPackager::default());

  let report = env
    .build(env.config("work"), packager.clone(), &project(&["ruby"]), &registry)
    .await;

  assert!(report.is_success(), "{:?}", report.error());
  assert_eq!(report.build_order, vec!["libc", "openssl", "zlib", "ruby"]);

  let record = |name: &str| report.component(name).unwrap().clone();
  let (libc, openssl, zlib, ruby) = (record("libc"), record("openssl"), record("zlib"), record("ruby"));
  assert!(openssl.started_at > libc.finished_at);
  assert!(zlib.started_at > libc.finished_at);
  assert!(ruby.started_at > openssl.finished_at);
  assert!(ruby.started_at > zlib.finished_at);
  // The middle wave runs concurrently.
  assert!(openssl.started_at < zlib.finished_at && zlib.started_at < openssl.finished_at);

  let install = report.package_root.clone().unwrap().join("opt/gemfast/lib");
  for lib in ["libc", "openssl", "zlib", "ruby"] {
    assert!(install.join(lib).is_file(), "missing {lib}");
  }
  assert_eq!(packager.calls().len(), 1);
}

#[tokio::test]
async fn declared_collision_fails_assembly_without_packaging() {
  let env = TestEnv::new();
  env.write_file("sources/a/config", "from a");
  env.write_file("sources/b/config", "from b");

  let mut copy = ActionList::new();
  copy.copy("config", "etc/config");
  let mut copy_b = ActionList::new();
  copy_b.copy("config", "$${install_dir}/etc/config");

  let registry: ComponentRegistry = [local(&env, "a", copy), local(&env, "b", copy_b)].into_iter().collect();
  let packager = Arc::new(RecordingPackager::default());

  let report = env
    .build(env.config("work"), packager.clone(), &project(&["a", "b"]), &registry)
    .await;

  assert_eq!(report.state, ProjectState::Failed);
  let err = report.error().unwrap();
  assert_eq!(err.phase, ProjectState::Assembling);
  assert_eq!(err.class(), ErrorClass::Execution);
  assert_eq!(
    err.kind,
    ErrorKind::Assemble(AssembleError::DestinationCollision {
      path: "etc/config".to_string(),
      first: "a".to_string(),
      second: "b".to_string(),
    })
  );
  assert!(packager.calls().is_empty());
  assert!(report.artifact.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn undeclared_overlap_keeps_the_later_component() {
  let env = TestEnv::new();
  let write = |content: &str| {
    let mut actions = ActionList::new();
    actions.command(&format!(
      "mkdir -p \"$STAGING_DIR/etc\" && printf {content} > \"$STAGING_DIR/etc/shared\""
    ));
    actions
  };
  let registry: ComponentRegistry = [
    local(&env, "first", write("one")),
    local(&env, "second", write("two")).depends_on("first"),
  ]
  .into_iter()
  .collect();

  let report = env
    .build(
      env.config("work"),
      Arc::new(RecordingPackager::default()),
      &project(&["second"]),
      &registry,
    )
    .await;

  assert!(report.is_success(), "{:?}", report.error());
  let shared = report.package_root.clone().unwrap().join("opt/gemfast/etc/shared");
  assert_eq!(fs::read_to_string(shared).unwrap(), "two");
}

#[tokio::test]
async fn escaping_destination_fails_the_component() {
  let env = TestEnv::new();
  env.write_file("sources/sneaky/payload", "x");
  let mut actions = ActionList::new();
  actions.copy("payload", "../../outside");
  let registry: ComponentRegistry = [local(&env, "sneaky", actions)].into_iter().collect();

  let report = env
    .build(
      env.config("work"),
      Arc::new(RecordingPackager::default()),
      &project(&["sneaky"]),
      &registry,
    )
    .await;

  let err = report.error().unwrap();
  assert_eq!(err.phase, ProjectState::Building);
  assert_eq!(err.component.as_deref(), Some("sneaky"));
  match &err.kind {
    ErrorKind::Action(failure) => assert!(matches!(failure.error, ActionError::PathEscape { .. })),
    other => panic!("unexpected error: {other:?}"),
  }
  assert!(!env.path("work/outside").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn identical_builds_produce_identical_packages() {
  let env = TestEnv::new();
  env.write_file("sources/gemfast/gemfast.toml.tpl", "listen = \"$${port}\"\nroot = \"$${root}\"\n");
  env.write_file("sources/gemfast/gemfast", "#!/bin/sh\n");

  let mut actions = ActionList::new();
  actions
    .mkdir("bin")
    .copy("gemfast", "embedded/bin/gemfast")
    .link("../embedded/bin/gemfast", "bin/gemfast")
    .template(
      "gemfast.toml.tpl",
      "$${install_dir}/etc/gemfast.toml",
      Some(0o600),
      &[("port", "2020"), ("root", "$${install_dir}")],
    )
    .touch("var/log/.keep");
  let registry: ComponentRegistry = [local(&env, "gemfast", actions)].into_iter().collect();

  let mut project = project(&["gemfast"]);
  project.package_options.compression_type = CompressionType::Gzip;

  let mut artifacts = Vec::new();
  let mut digests = Vec::new();
  for run in ["one", "two"] {
    let packager = Arc::new(TarPackager::new(env.path(&format!("out-{run}"))));
    let report = env.build(env.config(&format!("work-{run}")), packager, &project, &registry).await;
    assert!(report.is_success(), "{:?}", report.error());

    let install = report.package_root.clone().unwrap().join("opt/gemfast");
    assert_eq!(
      fs::read_to_string(install.join("etc/gemfast.toml")).unwrap(),
      "listen = \"2020\"\nroot = \"/opt/gemfast\"\n"
    );
    assert_eq!(
      fs::read_link(install.join("bin/gemfast")).unwrap(),
      std::path::PathBuf::from("../embedded/bin/gemfast")
    );
    assert!(install.join("var/log/.keep").is_file());

    let artifact = report.artifact.clone().unwrap();
    assert_eq!(artifact.file_name().unwrap(), "gemfast-1.0.0-1.amd64.tar.gz");
    artifacts.push(fs::read(artifact).unwrap());
    digests.push(report.tree_digest.clone().unwrap());
  }

  assert_eq!(digests[0], digests[1]);
  assert_eq!(artifacts[0], artifacts[1]);
}

#[tokio::test]
async fn unknown_dependency_is_a_configuration_error() {
  let env = TestEnv::new();
  let registry: ComponentRegistry = [local(&env, "app", ActionList::new()).depends_on("ghost")]
    .into_iter()
    .collect();

  let report = env
    .build(
      env.config("work"),
      Arc::new(RecordingPackager::default()),
      &project(&["app"]),
      &registry,
    )
    .await;

  let err = report.error().unwrap();
  assert_eq!(err.phase, ProjectState::Resolving);
  assert_eq!(err.class(), ErrorClass::Configuration);
  assert_eq!(err.to_string(), "resolving failed: unknown component 'ghost' (required by 'app')");
}

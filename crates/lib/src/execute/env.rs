//! The standard build environment shared by every shell command.
//!
//! Constructed once per run from the install directory and the host's `PATH`
//! and `HOME`, then shared read-only. Commands see the standard variables,
//! then the component's workspace variables, then the action's own map, each
//! layer overriding the previous one.

use std::collections::BTreeMap;
use std::path::Path;

use crate::consts::SOURCE_DATE_EPOCH;

/// Fallback search path when the host has no `PATH`.
const DEFAULT_HOST_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
  vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
  /// Build the standard environment using the current process's `PATH` and `HOME`.
  pub fn standard(install_dir: &Path) -> Self {
    let host_path = std::env::var("PATH").ok();
    let home = std::env::var("HOME").ok();
    Self::with_host(install_dir, host_path.as_deref(), home.as_deref())
  }

  /// Build the standard environment from explicit host values.
  pub fn with_host(install_dir: &Path, host_path: Option<&str>, home: Option<&str>) -> Self {
    let install = install_dir.display().to_string();
    let embedded_lib = format!("{install}/embedded/lib");
    let include_flags = format!("-I{install}/embedded/include -O2");

    let mut vars = BTreeMap::new();
    let mut set = |key: &str, value: String| {
      vars.insert(key.to_string(), value);
    };

    set("LDFLAGS", format!("-Wl,-rpath,{embedded_lib} -L{embedded_lib}"));
    set("CFLAGS", include_flags.clone());
    set("CXXFLAGS", include_flags.clone());
    set("CPPFLAGS", include_flags);
    set("LD_RUN_PATH", embedded_lib.clone());
    set("PKG_CONFIG_PATH", format!("{embedded_lib}/pkgconfig"));
    set(
      "PATH",
      format!(
        "{install}/bin:{install}/embedded/bin:{}",
        host_path.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_HOST_PATH)
      ),
    );
    set("HOME", home.unwrap_or("/tmp").to_string());
    set("LANG", "C".to_string());
    set("LC_ALL", "C".to_string());
    set("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH.to_string());
    set("INSTALL_DIR", install);

    Self { vars }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn vars(&self) -> &BTreeMap<String, String> {
    &self.vars
  }

  /// Layer `workspace` and then `action` variables over the standard set.
  pub fn merged(
    &self,
    workspace: &BTreeMap<String, String>,
    action: &BTreeMap<String, String>,
  ) -> BTreeMap<String, String> {
    let mut env = self.vars.clone();
    env.extend(workspace.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.extend(action.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
  }
}

use std::collections::BTreeMap;

use super::{ActionContext, BuildAction, Callback};

/// Records build actions in the order they are declared.
///
/// Each method appends one action. Placeholder helpers such as
/// [`install_dir`](Self::install_dir) return the `$${...}` string to embed in
/// later arguments.
///
/// # Example
///
/// ```
/// use stagehand_lib::action::ActionList;
///
/// let mut ctx = ActionList::new();
/// let bin = format!("{}/embedded/bin", ctx.install_dir());
/// ctx.mkdir("embedded/bin");
/// ctx.command(&format!("make install PREFIX={bin}"));
/// assert_eq!(ctx.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ActionList {
  actions: Vec<BuildAction>,
}

impl ActionList {
  pub fn new() -> Self {
    Self { actions: Vec::new() }
  }

  pub fn install_dir(&self) -> &'static str {
    "$${install_dir}"
  }

  pub fn project_dir(&self) -> &'static str {
    "$${project_dir}"
  }

  pub fn staging_dir(&self) -> &'static str {
    "$${staging_dir}"
  }

  pub fn mkdir(&mut self, path: &str) -> &mut Self {
    self.push(BuildAction::MakeDirectory { path: path.to_string() })
  }

  pub fn copy(&mut self, source: &str, dest: &str) -> &mut Self {
    self.push(BuildAction::CopyFile {
      source: source.to_string(),
      dest: dest.to_string(),
    })
  }

  pub fn link(&mut self, target: &str, link: &str) -> &mut Self {
    self.push(BuildAction::CreateSymlink {
      target: target.to_string(),
      link: link.to_string(),
    })
  }

  pub fn template(&mut self, source: &str, dest: &str, mode: Option<u32>, variables: &[(&str, &str)]) -> &mut Self {
    self.push(BuildAction::RenderTemplate {
      source: source.to_string(),
      dest: dest.to_string(),
      mode,
      variables: to_map(variables),
    })
  }

  pub fn command(&mut self, command: &str) -> &mut Self {
    self.command_with_env(command, &[])
  }

  pub fn command_with_env(&mut self, command: &str, env: &[(&str, &str)]) -> &mut Self {
    self.push(BuildAction::RunCommand {
      command: command.to_string(),
      env: to_map(env),
    })
  }

  pub fn block(
    &mut self,
    label: &str,
    func: impl Fn(&ActionContext) -> std::io::Result<()> + Send + Sync + 'static,
  ) -> &mut Self {
    self.push(BuildAction::RunCallback(Callback::new(label, func)))
  }

  pub fn touch(&mut self, path: &str) -> &mut Self {
    self.push(BuildAction::Touch { path: path.to_string() })
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }

  pub fn into_actions(self) -> Vec<BuildAction> {
    self.actions
  }

  fn push(&mut self, action: BuildAction) -> &mut Self {
    self.actions.push(action);
    self
  }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
  pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

//! Dependency resolution for a project's components.
//!
//! The requested names are expanded to their transitive closure over
//! `depends_on`, then ordered topologically. Components with no ordering
//! constraint between them keep their discovery order: requested names in
//! declaration order, each followed by its dependencies in declared order.
//! The result never depends on hash iteration order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::debug;

use crate::component::{ComponentRegistry, ComponentSpec, is_path_safe_name};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// A requested or depended-on component is not in the registry.
  #[error("unknown component '{name}'{}", required_by_suffix(.required_by))]
  UnknownDependency { name: String, required_by: Option<String> },

  /// A component name that cannot be used as a directory name.
  #[error("invalid component name '{name}'{}", required_by_suffix(.required_by))]
  InvalidName { name: String, required_by: Option<String> },

  /// The dependency relation contains a cycle. The first name is repeated at the end.
  #[error("dependency cycle: {}", .cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
  required_by
    .as_ref()
    .map(|r| format!(" (required by '{r}')"))
    .unwrap_or_default()
}

/// Components of a project in build order, with their dependency edges.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
  components: Vec<ComponentSpec>,
  /// For each position in `components`, the positions it depends on.
  dependencies: Vec<Vec<usize>>,
}

impl ResolvedGraph {
  /// Components in build order.
  pub fn components(&self) -> &[ComponentSpec] {
    &self.components
  }

  pub fn into_components(self) -> Vec<ComponentSpec> {
    self.components
  }

  pub fn names(&self) -> Vec<&str> {
    self.components.iter().map(|c| c.name.as_str()).collect()
  }

  /// Positions (in build order) of the direct dependencies of the component at `index`.
  pub fn dependencies(&self, index: usize) -> &[usize] {
    &self.dependencies[index]
  }

  /// Group components into waves that can build in parallel.
  ///
  /// A component lands in the wave after the latest wave holding one of its
  /// dependencies. Within a wave, build order is preserved.
  pub fn waves(&self) -> Vec<Vec<usize>> {
    let mut level = vec![0usize; self.components.len()];
    let mut waves: Vec<Vec<usize>> = Vec::new();

    // Build order guarantees dependencies are levelled first.
    for index in 0..self.components.len() {
      level[index] = self.dependencies[index]
        .iter()
        .map(|&dep| level[dep] + 1)
        .max()
        .unwrap_or(0);
      if waves.len() <= level[index] {
        waves.resize_with(level[index] + 1, Vec::new);
      }
      waves[level[index]].push(index);
    }

    waves
  }
}

/// Orders requested components so every component follows its dependencies.
pub struct DependencyResolver<'a> {
  registry: &'a ComponentRegistry,
}

impl<'a> DependencyResolver<'a> {
  pub fn new(registry: &'a ComponentRegistry) -> Self {
    Self { registry }
  }

  /// Resolve `names` and return the components in build order.
  pub fn order(&self, names: &[String]) -> Result<Vec<ComponentSpec>, ResolveError> {
    Ok(self.resolve(names)?.into_components())
  }

  /// Resolve `names` into a [`ResolvedGraph`].
  ///
  /// # Errors
  ///
  /// `InvalidName` if a name is not a plain path component,
  /// `UnknownDependency` if a name is missing from the registry,
  /// `CyclicDependency` if the closure contains a cycle. No partial ordering
  /// is returned in either case.
  pub fn resolve(&self, names: &[String]) -> Result<ResolvedGraph, ResolveError> {
    let closure = self.closure(names)?;

    // Node indices follow discovery order.
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(closure.len(), 0);
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for (position, spec) in closure.iter().enumerate() {
      nodes.insert(spec.name.as_str(), graph.add_node(position));
    }

    // Edge from dependency to dependent
    for spec in &closure {
      let dependent = nodes[spec.name.as_str()];
      for dep in &spec.depends_on {
        graph.add_edge(nodes[dep.as_str()], dependent, ());
      }
    }

    if let Some(cycle) = find_cycle(&graph, &closure) {
      return Err(ResolveError::CyclicDependency { cycle });
    }

    let order = stable_toposort(&graph);

    let mut position_of = vec![0usize; closure.len()];
    for (position, node) in order.iter().enumerate() {
      position_of[node.index()] = position;
    }

    let dependencies = order
      .iter()
      .map(|&node| {
        let mut deps: Vec<usize> = graph
          .neighbors_directed(node, Direction::Incoming)
          .map(|dep| position_of[dep.index()])
          .collect();
        deps.sort_unstable();
        deps
      })
      .collect();

    let mut slots: Vec<Option<ComponentSpec>> = closure.into_iter().map(Some).collect();
    let components: Vec<ComponentSpec> = order.iter().filter_map(|node| slots[node.index()].take()).collect();

    debug!(order = ?components.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), "resolved build order");

    Ok(ResolvedGraph { components, dependencies })
  }

  /// Collect the transitive closure of `names` in discovery order.
  fn closure(&self, names: &[String]) -> Result<Vec<ComponentSpec>, ResolveError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, Option<&str>)> = names.iter().map(|n| (n.as_str(), None)).collect();
    let mut closure = Vec::new();

    while let Some((name, required_by)) = queue.pop_front() {
      if seen.contains(name) {
        continue;
      }
      if !is_path_safe_name(name) {
        return Err(ResolveError::InvalidName {
          name: name.to_string(),
          required_by: required_by.map(str::to_string),
        });
      }
      let spec = self.registry.get(name).ok_or_else(|| ResolveError::UnknownDependency {
        name: name.to_string(),
        required_by: required_by.map(str::to_string),
      })?;
      seen.insert(name);
      closure.push(spec.clone());
      for dep in &spec.depends_on {
        queue.push_back((dep.as_str(), Some(spec.name.as_str())));
      }
    }

    Ok(closure)
  }
}

/// Kahn's algorithm, always taking the ready node discovered first.
fn stable_toposort(graph: &DiGraph<usize, ()>) -> Vec<NodeIndex> {
  let mut in_degree: Vec<usize> = graph
    .node_indices()
    .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
    .collect();

  let mut ready: BinaryHeap<Reverse<usize>> = graph
    .node_indices()
    .filter(|n| in_degree[n.index()] == 0)
    .map(|n| Reverse(n.index()))
    .collect();

  let mut order = Vec::with_capacity(graph.node_count());
  while let Some(Reverse(index)) = ready.pop() {
    let node = NodeIndex::new(index);
    order.push(node);
    for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
      in_degree[dependent.index()] -= 1;
      if in_degree[dependent.index()] == 0 {
        ready.push(Reverse(dependent.index()));
      }
    }
  }

  order
}

/// Find one concrete cycle, expressed as `a -> b -> ... -> a` in dependency direction.
fn find_cycle(graph: &DiGraph<usize, ()>, closure: &[ComponentSpec]) -> Option<Vec<String>> {
  let name = |n: NodeIndex| closure[n.index()].name.clone();

  let mut cyclic: Vec<Vec<NodeIndex>> = tarjan_scc(graph)
    .into_iter()
    .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
    .collect();
  if cyclic.is_empty() {
    return None;
  }

  // Report the component containing the earliest-discovered node.
  cyclic.sort_by_key(|scc| scc.iter().map(|n| n.index()).min());
  let scc = &cyclic[0];
  let start = scc.iter().copied().min_by_key(|n| n.index())?;

  // Walk from `start` to one of its dependencies inside the component, lowest first,
  // until a node repeats.
  let mut path = vec![start];
  let mut current = start;
  loop {
    let next = graph
      .neighbors_directed(current, Direction::Incoming)
      .filter(|n| scc.contains(n))
      .min_by_key(|n| n.index())?;
    if let Some(pos) = path.iter().position(|&n| n == next) {
      let mut cycle: Vec<String> = path[pos..].iter().map(|&n| name(n)).collect();
      cycle.push(name(next));
      return Some(cycle);
    }
    path.push(next);
    current = next;
  }
}

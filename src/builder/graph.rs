//! Dependency graph - validation and ordering of the target registry.
//!
//! Finalizing turns a fully declared, source-resolved registry into a
//! [`BuildPlan`]. An edge runs from a target to every target it links
//! against internally. All configuration errors about the graph surface here,
//! before anything is compiled.

use std::collections::HashSet;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::builder::link::LinkResolver;
use crate::builder::plan::{BuildPlan, PlannedTarget};
use crate::core::error::ConfigError;
use crate::core::registry::TargetRegistry;
use crate::core::target::TargetId;

/// Options that change how a registry is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeOptions {
    /// Compile each target with the defines of its transitive internal
    /// dependencies too (own defines first)
    pub transitive_defines: bool,
}

/// DFS colour of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// A node on the DFS path and the dependencies still to visit.
struct Frame {
    node: NodeIndex,
    dependencies: std::vec::IntoIter<NodeIndex>,
}

impl Frame {
    fn new(node: NodeIndex, dependencies: Vec<NodeIndex>) -> Self {
        Frame {
            node,
            dependencies: dependencies.into_iter(),
        }
    }

    fn next_dependency(&mut self) -> Option<NodeIndex> {
        self.dependencies.next()
    }
}

/// Target graph built from a registry.
///
/// Node `i` is the target with `TargetId(i)`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<TargetId, ()>,
}

impl DependencyGraph {
    /// Build the graph, failing on internal references to undeclared targets.
    pub fn build(registry: &TargetRegistry) -> Result<Self, ConfigError> {
        let mut graph = DiGraph::with_capacity(registry.len(), 0);
        for id in registry.ids() {
            graph.add_node(id);
        }

        for (id, target) in registry.iter() {
            for dep in target.internal_dependencies() {
                let dep_id = registry
                    .id_of(dep)
                    .ok_or_else(|| ConfigError::UnresolvedDependency {
                        target: target.name.clone(),
                        missing: dep.to_string(),
                    })?;

                let (from, to) = (node(id), node(dep_id));
                if !graph.contains_edge(from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Ok(DependencyGraph { graph })
    }

    /// Validate the registry and produce its build plan.
    pub fn finalize(
        registry: &TargetRegistry,
        options: FinalizeOptions,
    ) -> Result<BuildPlan, ConfigError> {
        let graph = Self::build(registry)?;
        let order = graph.topological_order(registry)?;

        let mut position_of = vec![0usize; registry.len()];
        for (position, id) in order.iter().enumerate() {
            position_of[id.index()] = position;
        }

        let mut targets = Vec::with_capacity(order.len());
        for &id in &order {
            let target = registry.get(id);
            let sources = target
                .resolved_sources()
                .ok_or_else(|| ConfigError::UnresolvedSources {
                    target: target.name.clone(),
                })?
                .to_vec();

            let link_positions = target
                .link_dependencies
                .iter()
                .map(|dep| {
                    (!dep.is_external)
                        .then(|| registry.id_of(&dep.library_name))
                        .flatten()
                        .map(|dep_id| position_of[dep_id.index()])
                })
                .collect();

            let mut dependencies = Vec::new();
            let mut dependency_positions = Vec::new();
            for dep in target.internal_dependencies() {
                if dependencies.iter().any(|d| d == dep) {
                    continue;
                }
                if let Some(dep_id) = registry.id_of(dep) {
                    dependencies.push(dep.to_string());
                    dependency_positions.push(position_of[dep_id.index()]);
                }
            }

            let mut dependent_positions: Vec<usize> = graph
                .graph
                .neighbors_directed(node(id), Direction::Incoming)
                .map(|n| position_of[graph.graph[n].index()])
                .collect();
            dependent_positions.sort_unstable();

            let defines = if options.transitive_defines {
                inherited_defines(&targets, &target.defines, &dependency_positions)
            } else {
                target.defines.clone()
            };

            targets.push(PlannedTarget {
                id,
                name: target.name.clone(),
                kind: target.kind,
                root: target.root.clone(),
                sources,
                defines,
                link_dependencies: target.link_dependencies.clone(),
                dependencies,
                link_line: Vec::new(),
                link_positions,
                dependency_positions,
                dependent_positions,
            });
        }

        for position in 0..targets.len() {
            if targets[position].kind.performs_link() {
                targets[position].link_line = LinkResolver::link_line(&targets, position);
            }
        }

        tracing::debug!(
            order = ?targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "finalized build plan"
        );

        Ok(BuildPlan {
            targets,
            transitive_defines: options.transitive_defines,
        })
    }

    /// Targets in an order where each follows all of its dependencies.
    ///
    /// Depth-first, post-order. Roots are taken in declaration order and the
    /// dependencies of a node in ascending declaration order, so the result
    /// only depends on the registry contents.
    pub fn topological_order(
        &self,
        registry: &TargetRegistry,
    ) -> Result<Vec<TargetId>, ConfigError> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut order = Vec::with_capacity(self.graph.node_count());

        for root in self.graph.node_indices() {
            if marks[root.index()] == Mark::Unvisited {
                self.visit(root, &mut marks, &mut order)
                    .map_err(|cycle| ConfigError::CyclicDependency {
                        cycle: cycle
                            .into_iter()
                            .map(|id| registry.get(id).name.clone())
                            .collect(),
                    })?;
            }
        }

        Ok(order)
    }

    /// Post-order walk from `root` with an explicit stack of frames; the
    /// frames are the current path, used to report a cycle.
    fn visit(
        &self,
        root: NodeIndex,
        marks: &mut [Mark],
        order: &mut Vec<TargetId>,
    ) -> Result<(), Vec<TargetId>> {
        marks[root.index()] = Mark::InProgress;
        let mut path = vec![Frame::new(root, self.sorted_dependencies(root))];

        while let Some(frame) = path.last_mut() {
            let Some(dep) = frame.next_dependency() else {
                let current = frame.node;
                path.pop();
                marks[current.index()] = Mark::Done;
                order.push(self.graph[current]);
                continue;
            };

            match marks[dep.index()] {
                Mark::Done => {}
                Mark::InProgress => {
                    let start = path.iter().position(|f| f.node == dep).unwrap_or(0);
                    let mut cycle: Vec<TargetId> =
                        path[start..].iter().map(|f| self.graph[f.node]).collect();
                    cycle.push(self.graph[dep]);
                    return Err(cycle);
                }
                Mark::Unvisited => {
                    marks[dep.index()] = Mark::InProgress;
                    path.push(Frame::new(dep, self.sorted_dependencies(dep)));
                }
            }
        }

        Ok(())
    }

    fn sorted_dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        deps.sort_unstable();
        deps
    }

    /// Direct internal dependencies of a target, in declaration order of the
    /// dependency targets.
    pub fn dependencies(&self, id: TargetId) -> Vec<TargetId> {
        self.sorted_dependencies(node(id))
            .into_iter()
            .map(|n| self.graph[n])
            .collect()
    }

    /// Targets that link against `id` internally.
    pub fn dependents(&self, id: TargetId) -> Vec<TargetId> {
        let mut dependents: Vec<TargetId> = self
            .graph
            .neighbors_directed(node(id), Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        dependents.sort_unstable();
        dependents
    }

    /// Every target reachable from `id` through internal link dependencies.
    pub fn transitive_dependencies(&self, id: TargetId) -> HashSet<TargetId> {
        let mut visited = HashSet::new();
        let mut pending = vec![node(id)];

        while let Some(current) = pending.pop() {
            for dep in self.graph.neighbors(current) {
                if visited.insert(self.graph[dep]) {
                    pending.push(dep);
                }
            }
        }

        visited
    }
}

fn node(id: TargetId) -> NodeIndex {
    NodeIndex::new(id.index())
}

/// Own defines followed by the (already effective) defines of each
/// dependency, first occurrence wins.
fn inherited_defines(
    planned: &[PlannedTarget],
    own: &[String],
    dependency_positions: &[usize],
) -> Vec<String> {
    let mut defines: Vec<String> = own.to_vec();
    for &position in dependency_positions {
        for define in &planned[position].defines {
            if !defines.contains(define) {
                defines.push(define.clone());
            }
        }
    }
    defines
}

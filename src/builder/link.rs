//! Link resolution - how each library reaches the final link.
//!
//! Link dependencies come in two flavours. External ones are opaque names
//! handed to the toolchain as `-l<name>` and found through the platform's
//! library search path; nothing here checks that they exist. Internal ones
//! name other targets of the graph; their existence is checked when the
//! graph is finalized, and their artifacts are fed to the linker by path.

use std::collections::HashSet;

use serde::Serialize;

use crate::builder::plan::PlannedTarget;
use crate::core::registry::TargetRegistry;
use crate::core::target::{LinkDependency, TargetId, TargetKind};

/// One input of a final link, in link order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkRef {
    /// Artifact of another target, by position in the build order
    Target { name: String, position: usize },

    /// Library resolved by the platform linker
    External { name: String },
}

/// Records and expands link dependencies.
pub struct LinkResolver;

impl LinkResolver {
    /// Attach a link dependency to `target`, preserving declaration order.
    ///
    /// Re-adding an identical dependency keeps the first occurrence.
    pub fn add_link_dependency(
        registry: &mut TargetRegistry,
        target: TargetId,
        library_name: &str,
        is_external: bool,
    ) {
        let dep = LinkDependency {
            library_name: library_name.to_string(),
            is_external,
        };

        let target = registry.get_mut(target);
        if target.link_dependencies.contains(&dep) {
            tracing::debug!(
                target = %target.name,
                library = library_name,
                "link dependency already declared"
            );
            return;
        }

        tracing::debug!(
            target = %target.name,
            library = library_name,
            external = is_external,
            "added link dependency"
        );
        target.link_dependencies.push(dep);
    }

    /// Compute the ordered link inputs for the target at `position`.
    ///
    /// Static libraries are followed transitively since their archives carry
    /// no link information of their own; shared libraries and executables
    /// stop the walk. Executables contribute ordering only, never an input.
    /// Duplicates keep their last occurrence so a static linker sees every
    /// archive after all of its users.
    ///
    /// The walk runs back to front keeping first occurrences, which is the
    /// same line. Each static archive is expanded once: a second visit only
    /// repeats inputs that are already on the line.
    ///
    /// `targets` must be in build order and `position` must index into it.
    pub fn link_line(targets: &[PlannedTarget], position: usize) -> Vec<LinkRef> {
        let mut line = Vec::new();
        let mut seen = HashSet::new();
        let mut expanded = HashSet::new();
        let mut stack = vec![Walk::Expand(position)];

        while let Some(step) = stack.pop() {
            match step {
                Walk::Emit(item) => {
                    if seen.insert(item.clone()) {
                        line.push(item);
                    }
                }
                Walk::Expand(current) => {
                    if !expanded.insert(current) {
                        continue;
                    }
                    let target = &targets[current];
                    for (dep, dep_position) in
                        target.link_dependencies.iter().zip(&target.link_positions)
                    {
                        let Some(dep_position) = *dep_position else {
                            stack.push(Walk::Emit(LinkRef::External {
                                name: dep.library_name.clone(),
                            }));
                            continue;
                        };
                        let dep_target = &targets[dep_position];
                        let item = LinkRef::Target {
                            name: dep_target.name.clone(),
                            position: dep_position,
                        };
                        match dep_target.kind {
                            TargetKind::Executable => {}
                            TargetKind::SharedLibrary => stack.push(Walk::Emit(item)),
                            TargetKind::StaticLibrary => {
                                stack.push(Walk::Emit(item));
                                stack.push(Walk::Expand(dep_position));
                            }
                        }
                    }
                }
            }
        }

        line.reverse();
        line
    }
}

enum Walk {
    Expand(usize),
    Emit(LinkRef),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::graph::{DependencyGraph, FinalizeOptions};
    use crate::test_support::registry_with;

    fn names(line: &[LinkRef]) -> Vec<String> {
        line.iter()
            .map(|item| match item {
                LinkRef::Target { name, .. } => name.clone(),
                LinkRef::External { name } => format!("-l{}", name),
            })
            .collect()
    }

    #[test]
    fn test_add_link_dependency_preserves_order() {
        let mut registry = registry_with(&[("mongocpp", TargetKind::StaticLibrary, &[])]);
        let id = registry.id_of("mongocpp").unwrap();

        LinkResolver::add_link_dependency(&mut registry, id, "mongoc", true);
        LinkResolver::add_link_dependency(&mut registry, id, "bson", true);
        LinkResolver::add_link_dependency(&mut registry, id, "mongoc", true);

        assert_eq!(
            registry.get(id).link_dependencies,
            vec![
                LinkDependency::external("mongoc"),
                LinkDependency::external("bson"),
            ]
        );
    }

    #[test]
    fn test_external_names_are_not_checked() {
        let mut registry = registry_with(&[("mongocpp", TargetKind::StaticLibrary, &[])]);
        let id = registry.id_of("mongocpp").unwrap();

        LinkResolver::add_link_dependency(&mut registry, id, "definitely-not-installed", true);

        let plan = DependencyGraph::finalize(&registry, FinalizeOptions::default()).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_link_line_follows_static_archives() {
        // app -> mongocpp -> (mongoc, bson), app -> util -> bson
        let registry = registry_with(&[
            ("mongocpp", TargetKind::StaticLibrary, &[("mongoc", true), ("bson", true)]),
            ("util", TargetKind::StaticLibrary, &[("bson", true)]),
            ("app", TargetKind::Executable, &[("mongocpp", false), ("util", false)]),
        ]);
        let plan = DependencyGraph::finalize(&registry, FinalizeOptions::default()).unwrap();
        let app = plan.position("app").unwrap();

        assert_eq!(
            names(&LinkResolver::link_line(plan.targets(), app)),
            vec!["mongocpp", "-lmongoc", "util", "-lbson"]
        );
    }

    #[test]
    fn test_link_line_archive_after_every_user() {
        // app -> (a, b), a -> c, b -> c, c -> -lz
        let registry = registry_with(&[
            ("c", TargetKind::StaticLibrary, &[("z", true)]),
            ("a", TargetKind::StaticLibrary, &[("c", false)]),
            ("b", TargetKind::StaticLibrary, &[("c", false)]),
            ("app", TargetKind::Executable, &[("a", false), ("b", false)]),
        ]);
        let plan = DependencyGraph::finalize(&registry, FinalizeOptions::default()).unwrap();
        let app = plan.position("app").unwrap();

        assert_eq!(
            names(&LinkResolver::link_line(plan.targets(), app)),
            vec!["a", "b", "c", "-lz"]
        );
    }

    #[test]
    fn test_link_line_dense_static_chain() {
        // lib<i> links every lib<j> with j < i; expanding each path separately
        // would visit 2^30 archives.
        let libs: Vec<String> = (0..30).map(|i| format!("lib{}", i)).collect();
        let links: Vec<Vec<(&str, bool)>> = (0..=libs.len())
            .map(|i| libs[..i].iter().map(|name| (name.as_str(), false)).collect())
            .collect();

        let mut rows: Vec<(&str, TargetKind, &[(&str, bool)])> = libs
            .iter()
            .zip(&links)
            .map(|(name, deps)| (name.as_str(), TargetKind::StaticLibrary, deps.as_slice()))
            .collect();
        rows.push(("app", TargetKind::Executable, links[libs.len()].as_slice()));

        let registry = registry_with(&rows);
        let plan = DependencyGraph::finalize(&registry, FinalizeOptions::default()).unwrap();
        let app = plan.position("app").unwrap();

        let expected: Vec<String> = libs.iter().rev().cloned().collect();
        assert_eq!(names(&plan.targets()[app].link_line), expected);
    }

    #[test]
    fn test_link_line_stops_at_shared_libraries() {
        let registry = registry_with(&[
            ("core", TargetKind::StaticLibrary, &[("z", true)]),
            ("driver", TargetKind::SharedLibrary, &[("core", false)]),
            ("app", TargetKind::Executable, &[("driver", false), ("m", true)]),
        ]);
        let plan = DependencyGraph::finalize(&registry, FinalizeOptions::default()).unwrap();
        let app = plan.position("app").unwrap();

        assert_eq!(
            names(&LinkResolver::link_line(plan.targets(), app)),
            vec!["driver", "-lm"]
        );

        let driver = plan.position("driver").unwrap();
        assert_eq!(
            names(&LinkResolver::link_line(plan.targets(), driver)),
            vec!["core", "-lz"]
        );
    }
}

//! Dependency resolution.
//!
//! Given the manifest's root source references, the resolver walks the
//! transitive dependency graph and produces an `InstallPlan`: a
//! topologically ordered, deduplicated sequence of module descriptors in
//! which every dependency precedes its dependents.
//!
//! The walk is iterative with an explicit stack and three-state bookkeeping
//! (queued / in-progress / resolved), so deep chains cannot overflow the
//! call stack. A module reachable via several paths is metadata-fetched
//! exactly once. Cycles and same-name/different-source conflicts are
//! terminal errors; no valid plan exists in either case.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{ModmanError, Result};
use crate::fetch::ModuleFetcher;
use crate::module::ModuleDescriptor;
use crate::source::ModuleSource;

/// Topologically ordered, deduplicated install order.
#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
    modules: Vec<ModuleDescriptor>,
}

impl InstallPlan {
    /// Descriptors in install order: every dependency before its dependents.
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Number of modules in the plan.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Position of a module in the install order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }
}

/// Per-name resolution state during the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    /// Currently being expanded; seen on the walk path.
    InProgress,
    /// Finalized and appended to the output order.
    Resolved,
}

/// Work items on the explicit walk stack.
enum Frame {
    /// Expand a source reference: fetch metadata, queue its dependencies.
    Visit(ModuleSource),
    /// All dependencies of this module are resolved; finalize it.
    Finish(String),
}

/// Recursively discovers and orders all transitive dependencies of a set of
/// root source references.
pub struct DependencyResolver<'a, F: ModuleFetcher + ?Sized> {
    fetcher: &'a F,
}

impl<'a, F: ModuleFetcher + ?Sized> DependencyResolver<'a, F> {
    /// Create a resolver reading module metadata through `fetcher`.
    pub fn new(fetcher: &'a F) -> Self {
        Self { fetcher }
    }

    /// Resolve root references into a complete, immutable install plan.
    ///
    /// Only lightweight metadata reads touch the filesystem; no module is
    /// installed during resolution.
    ///
    /// # Errors
    /// - `ModmanError::CyclicDependency` naming the cycle in discovery order
    /// - `ModmanError::VersionConflict` when two distinct sources claim the
    ///   same module name
    /// - `ModmanError::CloneFailure` when a metadata read fails; resolution
    ///   cannot produce a valid plan with an unreadable module
    pub async fn resolve(&self, roots: &[ModuleSource]) -> Result<InstallPlan> {
        let mut stack: Vec<Frame> = roots.iter().rev().cloned().map(Frame::Visit).collect();
        let mut states: HashMap<String, NodeState> = HashMap::new();
        let mut sources: HashMap<String, ModuleSource> = HashMap::new();
        // Descriptors fetched but not yet finalized.
        let mut pending: HashMap<String, ModuleDescriptor> = HashMap::new();
        // In-progress names in discovery order, for cycle reporting.
        let mut path: Vec<String> = Vec::new();
        let mut order: Vec<ModuleDescriptor> = Vec::new();

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit(source) => {
                    let name = source.name().to_string();

                    if let Some(known) = sources.get(&name) {
                        if known != &source {
                            return Err(ModmanError::VersionConflict {
                                name,
                                existing: known.to_string(),
                                requested: source.to_string(),
                            });
                        }
                        match states.get(&name) {
                            // Reachable via a second path: already fetched,
                            // already placed. Nothing to do.
                            Some(NodeState::Resolved) => continue,
                            Some(NodeState::InProgress) => {
                                let start =
                                    path.iter().position(|n| n == &name).unwrap_or(0);
                                let mut cycle: Vec<String> = path[start..].to_vec();
                                cycle.push(name);
                                return Err(ModmanError::CyclicDependency { cycle });
                            }
                            None => continue,
                        }
                    }

                    debug!(module = %name, source = %source, "Reading module metadata");
                    let descriptor = self.fetcher.read_metadata(&source).await?;

                    sources.insert(name.clone(), source);
                    states.insert(name.clone(), NodeState::InProgress);
                    path.push(name.clone());

                    stack.push(Frame::Finish(name.clone()));
                    for dep in descriptor.dependencies.iter().rev() {
                        stack.push(Frame::Visit(dep.clone()));
                    }
                    pending.insert(name, descriptor);
                }
                Frame::Finish(name) => {
                    states.insert(name.clone(), NodeState::Resolved);
                    path.pop();
                    if let Some(descriptor) = pending.remove(&name) {
                        debug!(module = %name, position = order.len(), "Resolved module");
                        order.push(descriptor);
                    }
                }
            }
        }

        info!(modules = order.len(), "Resolution complete");
        Ok(InstallPlan { modules: order })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleType, RefreshSpec};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    /// In-memory fetcher serving canned descriptors and counting metadata
    /// reads per module.
    struct FakeFetcher {
        descriptors: HashMap<String, ModuleDescriptor>,
        reads: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                descriptors: HashMap::new(),
                reads: Mutex::new(Vec::new()),
            }
        }

        fn add(&mut self, name: &str, deps: &[&str]) {
            self.descriptors
                .insert(name.to_string(), make_descriptor(name, deps));
        }

        fn read_count(&self, name: &str) -> usize {
            self.reads
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.as_str() == name)
                .count()
        }
    }

    #[async_trait]
    impl ModuleFetcher for FakeFetcher {
        async fn read_metadata(&self, source: &ModuleSource) -> Result<ModuleDescriptor> {
            self.reads.lock().unwrap().push(source.name().to_string());
            self.descriptors
                .get(source.name())
                .cloned()
                .map(|mut d| {
                    d.source = source.clone();
                    d
                })
                .ok_or_else(|| ModmanError::CloneFailure {
                    module: source.name().to_string(),
                    reason: "unknown module".into(),
                })
        }

        async fn fetch(&self, _source: &ModuleSource, _dest: &Path) -> Result<()> {
            unimplemented!("resolution never performs full fetches")
        }
    }

    fn src(name: &str) -> ModuleSource {
        ModuleSource::parse(&format!("https://github.com/acme/{}.git", name)).unwrap()
    }

    fn make_descriptor(name: &str, deps: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.to_string(),
            module_type: ModuleType::Plugin,
            source: src(name),
            version: "1.0.0".to_string(),
            description: None,
            dependencies: deps.iter().map(|d| src(d)).collect(),
            requirements: vec![],
            config_template: None,
            refresh: None,
        }
    }

    async fn resolve(fetcher: &FakeFetcher, roots: &[&str]) -> Result<InstallPlan> {
        let roots: Vec<ModuleSource> = roots.iter().map(|r| src(r)).collect();
        DependencyResolver::new(fetcher).resolve(&roots).await
    }

    /// Every dependency must precede its dependents in the plan.
    fn assert_topological(plan: &InstallPlan) {
        for (i, module) in plan.modules().iter().enumerate() {
            for dep in &module.dependencies {
                let dep_pos = plan
                    .position(dep.name())
                    .unwrap_or_else(|| panic!("dependency {} missing from plan", dep.name()));
                assert!(
                    dep_pos < i,
                    "{} (index {}) must precede {} (index {})",
                    dep.name(),
                    dep_pos,
                    module.name,
                    i
                );
            }
        }
    }

    #[tokio::test]
    async fn test_single_module_no_deps() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &[]);
        let plan = resolve(&fetcher, &["a"]).await.unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.modules()[0].name, "a");
    }

    #[tokio::test]
    async fn test_dependency_precedes_dependent() {
        // Manifest [a, b], b depends on c: any valid order has c before b.
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &[]);
        fetcher.add("b", &["c"]);
        fetcher.add("c", &[]);
        let plan = resolve(&fetcher, &["a", "b"]).await.unwrap();

        assert_eq!(plan.len(), 3);
        assert_topological(&plan);
        assert!(plan.position("c").unwrap() < plan.position("b").unwrap());
    }

    #[tokio::test]
    async fn test_chain_is_reverse_ordered() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &["b"]);
        fetcher.add("b", &["c"]);
        fetcher.add("c", &[]);
        let plan = resolve(&fetcher, &["a"]).await.unwrap();

        let names: Vec<&str> = plan.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_diamond_dedup_fetches_once() {
        // x and y both depend on d: d appears once and is read once.
        let mut fetcher = FakeFetcher::new();
        fetcher.add("x", &["d"]);
        fetcher.add("y", &["d"]);
        fetcher.add("d", &[]);
        let plan = resolve(&fetcher, &["x", "y"]).await.unwrap();

        assert_eq!(plan.len(), 3);
        assert_topological(&plan);
        assert_eq!(fetcher.read_count("d"), 1);
    }

    #[tokio::test]
    async fn test_two_cycle_rejected() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("m1", &["m2"]);
        fetcher.add("m2", &["m1"]);
        let result = resolve(&fetcher, &["m1"]).await;

        match result {
            Err(ModmanError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["m1", "m2", "m1"]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_self_cycle_rejected() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("loop", &["loop"]);
        let result = resolve(&fetcher, &["loop"]).await;
        match result {
            Err(ModmanError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["loop", "loop"]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inner_cycle_names_only_cycle_members() {
        // a -> b -> c -> b: the reported cycle starts at b, not a.
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &["b"]);
        fetcher.add("b", &["c"]);
        fetcher.add("c", &["b"]);
        let result = resolve(&fetcher, &["a"]).await;
        match result {
            Err(ModmanError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["b", "c", "b"]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_conflict_rejected() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("app", &[]);
        fetcher.add("lib", &[]);
        let roots = vec![
            ModuleSource::parse("https://github.com/acme/app.git@v1").unwrap(),
            ModuleSource::parse("https://github.com/acme/app.git@v2").unwrap(),
        ];
        let result = DependencyResolver::new(&fetcher).resolve(&roots).await;

        match result {
            Err(ModmanError::VersionConflict {
                name,
                existing,
                requested,
            }) => {
                assert_eq!(name, "app");
                assert!(existing.ends_with("@v1"));
                assert!(requested.ends_with("@v2"));
            }
            other => panic!("expected VersionConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conflict_between_dependency_and_root() {
        // Root wants app from acme, dep pulls app from a fork.
        let mut fetcher = FakeFetcher::new();
        fetcher.add("app", &[]);
        let mut tool = make_descriptor("tool", &[]);
        tool.dependencies =
            vec![ModuleSource::parse("https://github.com/fork/app.git").unwrap()];
        fetcher.descriptors.insert("tool".to_string(), tool);

        let result = resolve(&fetcher, &["app", "tool"]).await;
        assert!(matches!(result, Err(ModmanError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_root_reference_is_not_conflict() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &[]);
        let plan = resolve(&fetcher, &["a", "a"]).await.unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(fetcher.read_count("a"), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_aborts_resolution() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &["ghost"]);
        let result = resolve(&fetcher, &["a"]).await;
        assert!(matches!(result, Err(ModmanError::CloneFailure { .. })));
    }

    #[tokio::test]
    async fn test_deep_chain_does_not_overflow() {
        // 500-deep chain: m0 -> m1 -> ... -> m499.
        let mut fetcher = FakeFetcher::new();
        for i in 0..500 {
            let name = format!("m{}", i);
            if i < 499 {
                let dep = format!("m{}", i + 1);
                fetcher.add(&name, &[dep.as_str()]);
            } else {
                fetcher.add(&name, &[]);
            }
        }

        let plan = resolve(&fetcher, &["m0"]).await.unwrap();
        assert_eq!(plan.len(), 500);
        assert_eq!(plan.modules()[0].name, "m499");
        assert_eq!(plan.modules()[499].name, "m0");
        assert_topological(&plan);
    }

    #[tokio::test]
    async fn test_plan_names_are_unique() {
        let mut fetcher = FakeFetcher::new();
        fetcher.add("a", &["shared"]);
        fetcher.add("b", &["shared"]);
        fetcher.add("c", &["a", "b"]);
        fetcher.add("shared", &[]);
        let plan = resolve(&fetcher, &["c"]).await.unwrap();

        let mut names: Vec<&str> = plan.modules().iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), plan.len());
        assert_topological(&plan);
    }

    #[tokio::test]
    async fn test_empty_roots_empty_plan() {
        let fetcher = FakeFetcher::new();
        let plan = DependencyResolver::new(&fetcher).resolve(&[]).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_descriptor_fields_survive_resolution() {
        let mut fetcher = FakeFetcher::new();
        let mut desc = make_descriptor("sync", &[]);
        desc.module_type = ModuleType::Mcp;
        desc.requirements = vec!["git>=2.30".to_string()];
        desc.refresh = Some(RefreshSpec {
            command: "./sync.sh".into(),
            timeout_secs: 30,
        });
        fetcher.descriptors.insert("sync".to_string(), desc);

        let plan = resolve(&fetcher, &["sync"]).await.unwrap();
        let resolved = &plan.modules()[0];
        assert_eq!(resolved.module_type, ModuleType::Mcp);
        assert_eq!(resolved.requirements, vec!["git>=2.30"]);
        assert!(resolved.has_refresh());
    }
}

//! Architecture analyzer
//!
//! Builds the module dependency graph from resolved imports and measures
//! its shape: circular dependencies (Tarjan SCCs via petgraph), coupling,
//! package cohesion and overall modularity.

mod resolve;

use crate::parsers::StructuralSummary;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use resolve::{package_of, ModuleIndex};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Edge density above which modularity starts losing points
pub const DENSITY_THRESHOLD: f64 = 0.3;
/// Modularity points lost per unit of density over the threshold
pub const DENSITY_PENALTY_SCALE: f64 = 100.0;
pub const CYCLE_MODULARITY_PENALTY: f64 = 10.0;
pub const MAX_CYCLE_MODULARITY_PENALTY: f64 = 40.0;
pub const HUB_MODULARITY_PENALTY: f64 = 5.0;
pub const MAX_HUB_MODULARITY_PENALTY: f64 = 20.0;

/// A hub's degree must reach this multiple of the average degree...
pub const HUB_DEGREE_FACTOR: f64 = 2.0;
/// ...and exceed this absolute degree
pub const HUB_MIN_DEGREE: usize = 3;

pub const GOD_MODULE_LINES: usize = 1000;
pub const GOD_MODULE_CLASSES: usize = 10;
pub const GOD_MODULE_FUNCTIONS: usize = 50;

const TOP_DEPENDED: usize = 5;

/// A resolved module-to-module import
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
}

/// A module and how many modules import it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependents {
    pub module: String,
    pub dependents: usize,
}

/// Graph-level architecture metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureMetrics {
    pub module_count: usize,
    pub edge_count: usize,
    /// Import targets that named no analyzed module
    pub unresolved_imports: usize,
    /// Each cycle's members, sorted; cycles sorted by first member
    pub cycles: Vec<Vec<String>>,
    /// Average out-degree
    pub avg_coupling: f64,
    /// Share of edges that stay within their package
    pub avg_cohesion: f64,
    /// 0-100
    pub modularity: f64,
    pub density: f64,
    pub hub_modules: Vec<String>,
    pub god_modules: Vec<String>,
    pub most_depended: Vec<ModuleDependents>,
    pub edges: Vec<DependencyEdge>,
    /// Set when this is a stand-in for a failed analysis
    #[serde(default)]
    pub degraded: bool,
}

impl Default for ArchitectureMetrics {
    fn default() -> Self {
        Self {
            module_count: 0,
            edge_count: 0,
            unresolved_imports: 0,
            cycles: Vec::new(),
            avg_coupling: 0.0,
            avg_cohesion: 1.0,
            modularity: 100.0,
            density: 0.0,
            hub_modules: Vec::new(),
            god_modules: Vec::new(),
            most_depended: Vec::new(),
            edges: Vec::new(),
            degraded: false,
        }
    }
}

impl ArchitectureMetrics {
    /// Neutral metrics standing in for a failed analysis
    pub fn neutral() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }

    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }

    pub fn issue_count(&self) -> usize {
        self.hub_modules.len() + self.god_modules.len()
    }
}

/// Resolved module dependency graph
pub struct ModuleGraph {
    graph: DiGraph<String, ()>,
    unresolved: usize,
}

impl ModuleGraph {
    /// Build the graph from parsed summaries. Unparsed and timed-out files
    /// contribute no node.
    pub fn build(summaries: &[StructuralSummary]) -> Self {
        let mut parsed: Vec<(&StructuralSummary, String)> = summaries
            .iter()
            .filter(|s| s.is_parsed())
            .map(|s| (s, s.module_id()))
            .collect();
        parsed.sort_by(|a, b| a.1.cmp(&b.1));
        parsed.dedup_by(|a, b| a.1 == b.1);

        let index = ModuleIndex::new(parsed.iter().map(|(_, id)| id.as_str()));

        let mut graph: DiGraph<String, ()> = DiGraph::with_capacity(parsed.len(), 0);
        let mut nodes: FxHashMap<&str, NodeIndex> = FxHashMap::default();
        for (_, id) in &parsed {
            nodes.insert(id.as_str(), graph.add_node(id.clone()));
        }

        let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut unresolved = 0;
        for (summary, id) in &parsed {
            let from = nodes[id.as_str()];
            for import in &summary.imports {
                let targets = index.resolve_all(summary.language, id, &import.target);
                if targets.is_empty() {
                    unresolved += 1;
                }
                for target in targets {
                    if let Some(&to) = nodes.get(target.as_str()) {
                        if to != from {
                            edges.insert((from.index(), to.index()));
                        }
                    }
                }
            }
        }
        for (from, to) in edges {
            graph.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
        }

        debug!(
            "Module graph: {} nodes, {} edges, {} unresolved imports",
            graph.node_count(),
            graph.edge_count(),
            unresolved
        );
        Self { graph, unresolved }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges, sorted by source then target
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| DependencyEdge {
                source: self.graph[a].clone(),
                target: self.graph[b].clone(),
            })
            .collect();
        edges.sort();
        edges
    }

    /// Strongly connected components with more than one module
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<String> =
                    scc.into_iter().map(|idx| self.graph[idx].clone()).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }

    fn in_degree(&self, node: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .count()
    }

    fn out_degree(&self, node: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Outgoing)
            .count()
    }
}

fn modularity(density: f64, cycles: usize, hubs: usize) -> f64 {
    let density_penalty = if density > DENSITY_THRESHOLD {
        (density - DENSITY_THRESHOLD) * DENSITY_PENALTY_SCALE
    } else {
        0.0
    };
    let cycle_penalty =
        (cycles as f64 * CYCLE_MODULARITY_PENALTY).min(MAX_CYCLE_MODULARITY_PENALTY);
    let hub_penalty = (hubs as f64 * HUB_MODULARITY_PENALTY).min(MAX_HUB_MODULARITY_PENALTY);
    (100.0 - density_penalty - cycle_penalty - hub_penalty).clamp(0.0, 100.0)
}

fn is_god_module(summary: &StructuralSummary) -> bool {
    summary.lines.total > GOD_MODULE_LINES
        || summary.classes.len() > GOD_MODULE_CLASSES
        || summary.functions.len() > GOD_MODULE_FUNCTIONS
}

/// Analyze the module graph of a set of summaries
pub fn analyze(summaries: &[StructuralSummary]) -> ArchitectureMetrics {
    let graph = ModuleGraph::build(summaries);

    let mut god_modules: Vec<String> = summaries
        .iter()
        .filter(|s| s.is_parsed() && is_god_module(s))
        .map(|s| s.module_id())
        .collect();
    god_modules.sort();
    god_modules.dedup();

    let n = graph.node_count();
    if n < 2 {
        return ArchitectureMetrics {
            module_count: n,
            unresolved_imports: graph.unresolved,
            god_modules,
            ..Default::default()
        };
    }

    let edges = graph.edges();
    let m = edges.len();
    let intra = edges
        .iter()
        .filter(|e| package_of(&e.source) == package_of(&e.target))
        .count();
    let cohesion = if m == 0 { 1.0 } else { intra as f64 / m as f64 };
    let avg_coupling = m as f64 / n as f64;
    let density = m as f64 / (n as f64 * (n as f64 - 1.0));
    let cycles = graph.cycles();

    // total degree averages 2m/n
    let avg_degree = 2.0 * avg_coupling;
    let mut hub_modules = Vec::new();
    let mut depended: Vec<ModuleDependents> = Vec::new();
    for node in graph.graph.node_indices() {
        let incoming = graph.in_degree(node);
        let degree = incoming + graph.out_degree(node);
        if degree > HUB_MIN_DEGREE && degree as f64 >= HUB_DEGREE_FACTOR * avg_degree {
            hub_modules.push(graph.graph[node].clone());
        }
        if incoming > 0 {
            depended.push(ModuleDependents {
                module: graph.graph[node].clone(),
                dependents: incoming,
            });
        }
    }
    hub_modules.sort();
    depended.sort_by(|a, b| {
        b.dependents
            .cmp(&a.dependents)
            .then_with(|| a.module.cmp(&b.module))
    });
    depended.truncate(TOP_DEPENDED);

    let metrics = ArchitectureMetrics {
        module_count: n,
        edge_count: m,
        unresolved_imports: graph.unresolved,
        modularity: modularity(density, cycles.len(), hub_modules.len()),
        cycles,
        avg_coupling,
        avg_cohesion: cohesion,
        density,
        hub_modules,
        god_modules,
        most_depended: depended,
        edges,
        degraded: false,
    };
    info!(
        "Architecture: {} modules, {} edges, {} cycles, coupling {:.2}",
        metrics.module_count,
        metrics.edge_count,
        metrics.cycles.len(),
        metrics.avg_coupling
    );
    metrics
}

//! The build graph: nodes are files, edges are the build steps that produce
//! them.  One `Graph` holds one generation of the manifest; everything in it
//! is indexed by ids that are only meaningful against that generation.

use crate::densemap::{self, DenseMap};
use crate::env::{Pool, Rule, Scope};
use crate::escape;
use crate::fs::{self, MTime};
use crate::hash::Hash;
use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use std::time::SystemTime;

/// Id for a Node in the Graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NodeId(usize);
impl densemap::Index for NodeId {
    fn index(&self) -> usize {
        self.0
    }
}
impl From<usize> for NodeId {
    fn from(u: usize) -> NodeId {
        NodeId(u)
    }
}

/// Id for an Edge in the Graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EdgeId(usize);
impl densemap::Index for EdgeId {
    fn index(&self) -> usize {
        self.0
    }
}
impl From<usize> for EdgeId {
    fn from(u: usize) -> EdgeId {
        EdgeId(u)
    }
}

/// Status bits on an edge.  HASH is written by the hashing pass; the dirty,
/// work, and cycle bits belong to the scheduler driving the graph and are
/// only initialized here.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct EdgeFlags(u8);

impl EdgeFlags {
    /// Queued for execution.
    pub const WORK: EdgeFlags = EdgeFlags(1 << 0);
    /// Recipe hash computed and stored.
    pub const HASH: EdgeFlags = EdgeFlags(1 << 1);
    /// Some input is out of date.
    pub const DIRTY_IN: EdgeFlags = EdgeFlags(1 << 2);
    /// Some output is missing or out of date.
    pub const DIRTY_OUT: EdgeFlags = EdgeFlags(1 << 3);
    /// Out of date for either reason.
    pub const DIRTY: EdgeFlags = EdgeFlags(1 << 2 | 1 << 3);
    /// Visit marker for cycle detection.
    pub const CYCLE: EdgeFlags = EdgeFlags(1 << 4);

    pub fn contains(self, other: EdgeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: EdgeFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: EdgeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EdgeFlags) {
        self.0 &= !other.0;
    }
}

/// Cached shell rendering of a node's path.
#[derive(Debug)]
enum ShellPath {
    /// No quoting needed; the path itself serves.
    Plain,
    Quoted(String),
}

/// A file participating in the build.
///
/// `path`, `producer`, and the consumer list are filled in while the graph is
/// linked; `mtime` by restat; `log_mtime`, `hash`, and `id` by the persisted
/// log readers.  `dirty` is scheduler state, initialized false here.
#[derive(Debug)]
pub struct Node {
    /// Path as interned.  The registry keys on it; never rewrite it.
    pub path: String,
    shell_path: Option<ShellPath>,
    /// Last stat result; None until the first restat.
    pub mtime: Option<MTime>,
    /// Output mtime recorded in the build log.
    pub log_mtime: Option<SystemTime>,
    /// Recipe hash that last produced this output, from the build log.
    /// Hash(0) for nodes with no log entry.
    pub hash: Hash,
    /// Position in the dependency log; None if the node has no entry yet.
    pub id: Option<u32>,
    /// The edge whose output this is.  None for source files.
    pub producer: Option<EdgeId>,
    consumers: Vec<EdgeId>,
    /// Needs rebuilding.  Scheduler state.
    pub dirty: bool,
}

impl Node {
    fn new(path: String) -> Node {
        Node {
            path,
            shell_path: None,
            mtime: None,
            log_mtime: None,
            hash: Hash(0),
            id: None,
            producer: None,
            consumers: Vec::new(),
            dirty: false,
        }
    }

    /// Edges that read this node, in link order.  An edge shows up once per
    /// input slot it occupies.
    pub fn consumers(&self) -> &[EdgeId] {
        &self.consumers
    }

    fn record_use(&mut self, edge: EdgeId) {
        self.consumers.push(edge);
    }

    /// The path quoted for a POSIX shell command line, computed on first use
    /// and cached.  When no quoting is needed this returns the path itself
    /// rather than a copy.
    pub fn shell_path(&mut self) -> &str {
        if self.shell_path.is_none() {
            self.shell_path = Some(match escape::escape(&self.path) {
                Some(quoted) => ShellPath::Quoted(quoted),
                None => ShellPath::Plain,
            });
        }
        match &self.shell_path {
            Some(ShellPath::Quoted(quoted)) => quoted,
            _ => &self.path,
        }
    }
}

/// Inputs for an edge under construction: `ids` holds the explicit inputs,
/// then the implicit ones, then order-only; the counts mark the splits.
#[derive(Debug, Default)]
pub struct EdgeIns {
    pub ids: Vec<NodeId>,
    pub explicit: usize,
    pub implicit: usize,
}

/// Outputs for an edge under construction; ids past `explicit` are implicit
/// outputs.
#[derive(Debug, Default)]
pub struct EdgeOuts {
    pub ids: Vec<NodeId>,
    pub explicit: usize,
}

/// A build step: one rule invocation reading some nodes and producing others.
///
/// The rule, env, and node lists are fixed once the edge is registered,
/// except that `add_deps` may extend the implicit inputs.  `hash` is memoized
/// by the hashing pass.  `flags` (beyond HASH), `nblock`, and `nprune` are
/// scheduler state, only initialized here.
#[derive(Debug)]
pub struct Edge {
    pub rule: Rc<Rule>,
    pub pool: Option<Rc<Pool>>,
    /// Edge-local bindings, chained under the scope the edge was declared in.
    pub env: Scope,
    ins: Vec<NodeId>,
    explicit_ins: usize,
    implicit_ins: usize,
    outs: Vec<NodeId>,
    explicit_outs: usize,
    /// Memoized recipe hash; meaningful once `flags` contains HASH.
    pub hash: Hash,
    pub flags: EdgeFlags,
    /// Inputs still to finish before this edge may run.  Scheduler state.
    pub nblock: usize,
    /// Inputs still to prune before this edge's outputs can be pruned.
    /// Scheduler state.
    pub nprune: usize,
}

impl Edge {
    /// Make an edge from its rule, variable frame, and node lists.  The
    /// region counts must fit within the id lists.
    pub fn new(rule: Rc<Rule>, env: Scope, ins: EdgeIns, outs: EdgeOuts) -> Edge {
        assert!(ins.explicit + ins.implicit <= ins.ids.len());
        assert!(outs.explicit <= outs.ids.len());
        Edge {
            rule,
            pool: None,
            env,
            ins: ins.ids,
            explicit_ins: ins.explicit,
            implicit_ins: ins.implicit,
            outs: outs.ids,
            explicit_outs: outs.explicit,
            hash: Hash(0),
            flags: EdgeFlags::default(),
            nblock: 0,
            nprune: 0,
        }
    }

    pub fn is_phony(&self) -> bool {
        self.rule.name == "phony"
    }

    /// Look up a variable as this edge sees it: edge-local bindings shadow
    /// the rule's, which shadow the enclosing scopes.
    pub fn var(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.env.get_local(name) {
            return Some(value);
        }
        if let Some(value) = self.rule.vars.get(name) {
            return Some(value.as_str());
        }
        self.env.parent().and_then(|parent| parent.get(name))
    }

    /// All inputs: explicit, then implicit, then order-only.
    pub fn ins(&self) -> &[NodeId] {
        &self.ins
    }

    /// Inputs that appear in `$in`.
    pub fn explicit_ins(&self) -> &[NodeId] {
        &self.ins[0..self.explicit_ins]
    }

    /// Inputs that don't appear on the command line but invalidate the
    /// outputs when they change, discovered deps included.
    pub fn implicit_ins(&self) -> &[NodeId] {
        &self.ins[self.explicit_ins..self.explicit_ins + self.implicit_ins]
    }

    /// Inputs that must exist before the edge runs but never make its
    /// outputs stale.
    pub fn order_only_ins(&self) -> &[NodeId] {
        &self.ins[self.explicit_ins + self.implicit_ins..]
    }

    /// Inputs that, if changed, invalidate the outputs.
    pub fn dirtying_ins(&self) -> &[NodeId] {
        &self.ins[0..self.explicit_ins + self.implicit_ins]
    }

    /// All outputs: explicit, then implicit.
    pub fn outs(&self) -> &[NodeId] {
        &self.outs
    }

    /// Outputs that appear in `$out`.
    pub fn explicit_outs(&self) -> &[NodeId] {
        &self.outs[0..self.explicit_outs]
    }

    pub fn implicit_outs(&self) -> &[NodeId] {
        &self.outs[self.explicit_outs..]
    }
}

/// One generation of the build graph: the node and edge arenas plus the
/// path registry that makes node ids stand in for path equality.  A
/// regenerated manifest is loaded into a fresh generation; see `clear`.
pub struct Graph {
    nodes: DenseMap<NodeId, Node>,
    edges: DenseMap<EdgeId, Edge>,
    by_path: FxHashMap<String, NodeId>,
    phony: Rc<Rule>,
}

impl Default for Graph {
    fn default() -> Graph {
        Graph::new()
    }
}

impl Graph {
    pub fn new() -> Graph {
        Graph {
            nodes: DenseMap::default(),
            edges: DenseMap::default(),
            by_path: FxHashMap::default(),
            phony: Rc::new(Rule::new("phony")),
        }
    }

    /// The built-in no-op rule backing phony edges.
    pub fn phony_rule(&self) -> &Rc<Rule> {
        &self.phony
    }

    /// Intern a path: the id of its node, creating the node the first time
    /// the path is seen.  Within a generation, id equality is path equality.
    pub fn node_id(&mut self, path: &str) -> NodeId {
        match self.by_path.get(path) {
            Some(&id) => id,
            None => {
                let id = self.nodes.push(Node::new(path.to_owned()));
                self.by_path.insert(path.to_owned(), id);
                id
            }
        }
    }

    /// Look up an already-interned path without creating a node.
    pub fn get_node_id(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id]
    }

    /// Every edge in this generation, in registration order.  Phony edges
    /// synthesized for discovered deps are included.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
        self.edges.all_ids()
    }

    /// Register an edge: claim the producer slot of each output and record
    /// one consumer entry per input slot.  The graph is unchanged when an
    /// output already has a producer.
    pub fn add_edge(&mut self, edge: Edge) -> anyhow::Result<EdgeId> {
        for (i, &out) in edge.outs.iter().enumerate() {
            if self.nodes[out].producer.is_some() || edge.outs[..i].contains(&out) {
                bail!("multiple rules generate {}", self.nodes[out].path);
            }
        }
        let id = self.edges.next_id();
        for &out in &edge.outs {
            self.nodes[out].producer = Some(id);
        }
        for &input in &edge.ins {
            self.nodes[input].record_use(id);
        }
        Ok(self.edges.push(edge))
    }

    /// Splice dependencies discovered after parsing (depfiles, the
    /// dependency log) into an edge as implicit inputs, in front of the
    /// order-only region.  Deps with no producer get a synthesized phony
    /// producer.  A dep that is an output of the edge, or that appears twice
    /// in one call, is a caller bug reported as an error; the graph is
    /// unchanged in that case.
    pub fn add_deps(&mut self, id: EdgeId, deps: &[NodeId]) -> anyhow::Result<()> {
        for (i, &dep) in deps.iter().enumerate() {
            if self.edges[id].outs.contains(&dep) {
                bail!(
                    "dependency {} is an output of the same edge",
                    self.nodes[dep].path
                );
            }
            if deps[..i].contains(&dep) {
                bail!("duplicate dependency {}", self.nodes[dep].path);
            }
        }
        for &dep in deps {
            if self.nodes[dep].producer.is_none() {
                self.phony_producer(dep);
            }
            self.nodes[dep].record_use(id);
        }
        let edge = &mut self.edges[id];
        let order_only_at = edge.explicit_ins + edge.implicit_ins;
        edge.ins.splice(order_only_at..order_only_at, deps.iter().copied());
        edge.implicit_ins += deps.len();
        Ok(())
    }

    /// Give a producerless node a zero-input phony edge as its producer.
    /// Inputs linked from the manifest never get one; a missing producer
    /// there means the node is a source file.
    fn phony_producer(&mut self, node: NodeId) -> EdgeId {
        let edge = Edge::new(
            self.phony.clone(),
            Scope::root(),
            EdgeIns::default(),
            EdgeOuts {
                ids: vec![node],
                explicit: 1,
            },
        );
        let id = self.edges.push(edge);
        self.nodes[node].producer = Some(id);
        id
    }

    /// Stat the node's path and record the result as its mtime.
    pub fn restat(&mut self, id: NodeId) -> anyhow::Result<MTime> {
        let node = &mut self.nodes[id];
        let mtime =
            fs::stat(&node.path).map_err(|err| anyhow!("stat {}: {}", node.path, err))?;
        node.mtime = Some(mtime);
        Ok(mtime)
    }

    /// Outputs no edge consumes, in registration order: what a driver builds
    /// when no targets are named on the command line.
    pub fn root_outputs(&self) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for id in self.edges.all_ids() {
            for &out in &self.edges[id].outs {
                if self.nodes[out].consumers.is_empty() {
                    roots.push(out);
                }
            }
        }
        roots
    }

    /// Drop every node and edge and empty the path registry, starting a new
    /// generation.  Ids from before the clear must not be used again.  Safe
    /// on a graph with nothing in it.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.by_path.clear();
    }
}

//! Region networks with virtual input/output nodes.
//!
//! A network is a directed graph over one contiguous index space:
//!
//! ```text
//! 0 .. R          real regions, in declaration order
//! R .. R+I        virtual inputs  (no inbound edges)
//! R+I .. R+I+O    virtual outputs (no outbound edges)
//! ```
//!
//! Signals travel one edge per tick. Every region is stepped on the value that
//! was pending for it when the tick began, so reciprocal edges (A→B, B→A) see
//! each other's *previous* output and the order in which regions are visited
//! inside a tick cannot change the result.

use tracing::{debug, trace};

use crate::activation::Activation;
use crate::error::NetworkError;
use crate::region::{checked_step, Region, RegionOutput};

/// Square boolean adjacency relation; `has_edge(from, to)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacency {
    size: usize,
    edges: Vec<bool>,
}

impl Adjacency {
    /// Adjacency over `size` nodes with no edges.
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            edges: vec![false; size * size],
        }
    }

    pub fn from_bool_matrix(rows: &[Vec<bool>]) -> Result<Self, NetworkError> {
        let size = rows.len();
        let mut adj = Self::empty(size);
        for (from, row) in rows.iter().enumerate() {
            if row.len() != size {
                return Err(NetworkError::DimensionMismatch {
                    expected: size,
                    rows: size,
                    cols: row.len(),
                });
            }
            for (to, &edge) in row.iter().enumerate() {
                adj.edges[from * size + to] = edge;
            }
        }
        Ok(adj)
    }

    /// Any non-zero weight is an edge.
    pub fn from_weighted_matrix(rows: &[Vec<f32>]) -> Result<Self, NetworkError> {
        let bools: Vec<Vec<bool>> = rows
            .iter()
            .map(|row| row.iter().map(|&w| w != 0.0).collect())
            .collect();
        Self::from_bool_matrix(&bools)
    }

    pub fn from_edges(size: usize, edges: &[(usize, usize)]) -> Result<Self, NetworkError> {
        let mut adj = Self::empty(size);
        for &(from, to) in edges {
            adj.connect(from, to)?;
        }
        Ok(adj)
    }

    pub fn connect(&mut self, from: usize, to: usize) -> Result<(), NetworkError> {
        if from >= self.size || to >= self.size {
            return Err(NetworkError::DanglingEdge {
                from,
                to,
                size: self.size,
            });
        }
        self.edges[from * self.size + to] = true;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        from < self.size && to < self.size && self.edges[from * self.size + to]
    }

    pub fn predecessors(&self, to: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&from| self.has_edge(from, to))
    }

    pub fn successors(&self, from: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&to| self.has_edge(from, to))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| **e).count()
    }
}

/// A graph node: a real region, or a stateless virtual endpoint.
#[derive(Clone, Debug)]
pub enum Node {
    Region(Box<dyn Region>),
    Input,
    Output,
}

/// Everything a single tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkTick {
    /// Tick number, starting at 0 for the first call to `step`.
    pub tick: u64,
    /// Per real region, in declaration order.
    pub regions: Vec<RegionOutput>,
    /// Per virtual output: union of this tick's predecessor outputs.
    pub outputs: Vec<Activation>,
}

#[derive(Clone, Debug)]
pub struct Network {
    nodes: Vec<Node>,
    adjacency: Adjacency,
    region_count: usize,
    input_count: usize,
    output_count: usize,
    /// Signal delivered to each region on the next tick.
    pending: Vec<Activation>,
    input_widths: Vec<Option<usize>>,
    output_widths: Vec<Option<usize>>,
    tick: u64,
}

impl Network {
    /// Network with one virtual input (index `R`) and one virtual output
    /// (index `R + 1`).
    pub fn new(regions: Vec<Box<dyn Region>>, adjacency: Adjacency) -> Result<Self, NetworkError> {
        Self::with_virtual_nodes(regions, 1, 1, adjacency)
    }

    pub fn with_virtual_nodes(
        regions: Vec<Box<dyn Region>>,
        inputs: usize,
        outputs: usize,
        adjacency: Adjacency,
    ) -> Result<Self, NetworkError> {
        let region_count = regions.len();
        let size = region_count + inputs + outputs;
        if adjacency.size() != size {
            return Err(NetworkError::DimensionMismatch {
                expected: size,
                rows: adjacency.size(),
                cols: adjacency.size(),
            });
        }

        let mut nodes: Vec<Node> = regions.into_iter().map(Node::Region).collect();
        nodes.extend((0..inputs).map(|_| Node::Input));
        nodes.extend((0..outputs).map(|_| Node::Output));

        for (idx, node) in nodes.iter().enumerate() {
            match node {
                Node::Input => {
                    if let Some(from) = adjacency.predecessors(idx).next() {
                        return Err(NetworkError::InputHasInbound {
                            input: idx - region_count,
                            from,
                        });
                    }
                }
                Node::Output => {
                    if let Some(to) = adjacency.successors(idx).next() {
                        return Err(NetworkError::OutputHasOutbound {
                            output: idx - region_count - inputs,
                            to,
                        });
                    }
                }
                Node::Region(_) => {
                    if adjacency.predecessors(idx).next().is_none() {
                        return Err(NetworkError::UnreachableRegion { region: idx });
                    }
                }
            }
        }

        let mut network = Self {
            pending: Vec::with_capacity(region_count),
            nodes,
            adjacency,
            region_count,
            input_count: inputs,
            output_count: outputs,
            input_widths: vec![None; inputs],
            output_widths: vec![None; outputs],
            tick: 0,
        };
        network.resolve_widths()?;
        network.pending = (0..region_count)
            .map(|i| Activation::silent(network.region_input_width(i)))
            .collect();

        debug!(
            regions = region_count,
            inputs,
            outputs,
            edges = network.adjacency.edge_count(),
            "network built"
        );
        Ok(network)
    }

    /// Check that every edge joins nodes of equal width and record the widths
    /// of the virtual endpoints.
    fn resolve_widths(&mut self) -> Result<(), NetworkError> {
        for to in 0..self.region_count {
            let expected = self.region_input_width(to);
            for from in self.adjacency.predecessors(to) {
                if from < self.region_count {
                    let found = self.region_output_width(from);
                    if found != expected {
                        return Err(NetworkError::WidthMismatch {
                            from,
                            to,
                            expected,
                            found,
                        });
                    }
                }
            }
        }

        // A virtual input takes the width its region successors expect.
        for k in 0..self.input_count {
            let node = self.region_count + k;
            let mut width: Option<usize> = None;
            for to in self.adjacency.successors(node) {
                if to >= self.region_count {
                    continue;
                }
                let w = self.region_input_width(to);
                match width {
                    None => width = Some(w),
                    Some(expected) if expected != w => {
                        return Err(NetworkError::WidthMismatch {
                            from: node,
                            to,
                            expected,
                            found: w,
                        })
                    }
                    Some(_) => {}
                }
            }
            self.input_widths[k] = width;
        }

        // A virtual output takes the width of its predecessors. An output fed
        // only by unconstrained inputs is sized from the stimuli at tick time.
        for k in 0..self.output_count {
            let node = self.region_count + self.input_count + k;
            let mut width: Option<usize> = None;
            for from in self.adjacency.predecessors(node) {
                let w = if from < self.region_count {
                    Some(self.region_output_width(from))
                } else {
                    self.input_widths[from - self.region_count]
                };
                match (width, w) {
                    (_, None) => {}
                    (None, Some(w)) => width = Some(w),
                    (Some(expected), Some(w)) if expected != w => {
                        return Err(NetworkError::WidthMismatch {
                            from,
                            to: node,
                            expected,
                            found: w,
                        })
                    }
                    _ => {}
                }
            }
            self.output_widths[k] = width;
        }
        Ok(())
    }

    fn region_ref(&self, index: usize) -> Option<&dyn Region> {
        match self.nodes.get(index) {
            Some(Node::Region(r)) => Some(r.as_ref()),
            _ => None,
        }
    }

    fn region_input_width(&self, index: usize) -> usize {
        self.region_ref(index).map_or(0, |r| r.input_width())
    }

    fn region_output_width(&self, index: usize) -> usize {
        self.region_ref(index).map_or(0, |r| r.width())
    }

    /// One synchronous tick driven by one stimulus per virtual input.
    ///
    /// A region contract violation aborts the tick: the pending buffers are
    /// restored and `tick` does not advance, but regions stepped before the
    /// failing one keep their update. Treat the network as unusable after
    /// such an error; `reset` it or discard it.
    pub fn step(&mut self, stimuli: &[Activation]) -> Result<NetworkTick, NetworkError> {
        let order: Vec<usize> = (0..self.region_count).collect();
        self.tick_in_order(stimuli, &order)
    }

    /// Convenience for single-input networks.
    pub fn step_single(&mut self, stimulus: &Activation) -> Result<NetworkTick, NetworkError> {
        self.step(core::slice::from_ref(stimulus))
    }

    /// Tick with regions visited in `order`. Every region reads only the
    /// snapshot taken at the start of the tick, so any permutation gives the
    /// same result.
    pub(crate) fn tick_in_order(
        &mut self,
        stimuli: &[Activation],
        order: &[usize],
    ) -> Result<NetworkTick, NetworkError> {
        if stimuli.len() != self.input_count {
            return Err(NetworkError::StimulusCount {
                expected: self.input_count,
                found: stimuli.len(),
            });
        }
        for (input, (stimulus, expected)) in stimuli.iter().zip(&self.input_widths).enumerate() {
            if let Some(expected) = *expected {
                if stimulus.len() != expected {
                    return Err(NetworkError::StimulusWidth {
                        input,
                        expected,
                        found: stimulus.len(),
                    });
                }
            }
        }

        // 1. External stimuli join whatever is already pending.
        for (k, stimulus) in stimuli.iter().enumerate() {
            let node = self.region_count + k;
            for to in self.adjacency.successors(node) {
                if to < self.region_count {
                    self.pending[to].or_assign(stimulus);
                }
            }
        }

        // 2. Consume the snapshot; buffers are cleared only now.
        let consumed: Vec<Activation> = self
            .pending
            .iter_mut()
            .map(|p| {
                let width = p.len();
                core::mem::replace(p, Activation::silent(width))
            })
            .collect();

        let mut produced: Vec<Option<RegionOutput>> = vec![None; self.region_count];
        for &idx in order {
            if let Some(Node::Region(region)) = self.nodes.get_mut(idx) {
                match checked_step(region.as_mut(), &consumed[idx], true) {
                    Ok(out) => produced[idx] = Some(out),
                    Err(source) => {
                        self.pending = consumed;
                        return Err(NetworkError::Region { node: idx, source });
                    }
                }
            }
        }
        let regions: Vec<RegionOutput> = produced
            .into_iter()
            .enumerate()
            .map(|(idx, out)| {
                out.unwrap_or_else(|| RegionOutput::silent(self.region_output_width(idx)))
            })
            .collect();

        // 3. Propagate this tick's outputs one edge, ready for the next tick.
        for to in 0..self.region_count {
            for from in self.adjacency.predecessors(to) {
                if from < self.region_count {
                    self.pending[to].or_assign(&regions[from].active);
                }
            }
        }

        let outputs: Vec<Activation> = (0..self.output_count)
            .map(|k| {
                let node = self.region_count + self.input_count + k;
                let width = self.output_widths[k].unwrap_or_else(|| {
                    self.adjacency
                        .predecessors(node)
                        .filter(|&from| from >= self.region_count)
                        .map(|from| stimuli[from - self.region_count].len())
                        .max()
                        .unwrap_or(0)
                });
                let mut acc = Activation::silent(width);
                for from in self.adjacency.predecessors(node) {
                    if from < self.region_count {
                        acc.or_assign(&regions[from].active);
                    } else {
                        acc.or_assign(&stimuli[from - self.region_count]);
                    }
                }
                acc
            })
            .collect();

        let tick = self.tick;
        self.tick += 1;
        trace!(
            tick,
            active = regions.iter().map(|r| r.active.count()).sum::<usize>(),
            "network tick"
        );

        Ok(NetworkTick {
            tick,
            regions,
            outputs,
        })
    }

    /// Reset every region's transient context and clear pending inputs. The
    /// graph and learned synapses are kept.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            if let Node::Region(region) = node {
                region.reset();
            }
        }
        for p in &mut self.pending {
            *p = Activation::silent(p.len());
        }
        self.tick = 0;
    }

    /// Number of ticks since construction or the last reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn region(&self, index: usize) -> Option<&dyn Region> {
        self.region_ref(index)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    /// Signal waiting for region `index` on the next tick.
    pub fn pending(&self, index: usize) -> Option<&Activation> {
        self.pending.get(index)
    }

    pub fn region_count(&self) -> usize {
        self.region_count
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Width expected for stimulus `k`; `None` if input `k` feeds nothing.
    pub fn input_width(&self, k: usize) -> Option<usize> {
        self.input_widths.get(k).copied().flatten()
    }

    /// Width of output `k`; `None` if it is fed only by unconstrained inputs.
    pub fn output_width(&self, k: usize) -> Option<usize> {
        self.output_widths.get(k).copied().flatten()
    }
}

/// Symbolic node handle used while declaring a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Region(usize),
    Input(usize),
    Output(usize),
}

/// Declarative construction: add nodes, connect them, then `build`.
///
/// ```
/// use assemblies::kcap::{KCapConfig, KCapRegion};
/// use assemblies::network::NetworkBuilder;
///
/// let region = |seed| KCapRegion::new(KCapConfig::with_size(64, 64, 4).with_seed(seed));
/// let mut b = NetworkBuilder::new();
/// let a = b.add_region(Box::new(region(1).unwrap()));
/// let c = b.add_region(Box::new(region(2).unwrap()));
/// let input = b.add_input();
/// let output = b.add_output();
/// b.connect(input, a);
/// b.connect(a, c);
/// b.connect(c, a);
/// b.connect(c, output);
/// let network = b.build().unwrap();
/// assert_eq!(network.region_count(), 2);
/// ```
#[derive(Default)]
pub struct NetworkBuilder {
    regions: Vec<Box<dyn Region>>,
    inputs: usize,
    outputs: usize,
    edges: Vec<(NodeRef, NodeRef)>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, region: Box<dyn Region>) -> NodeRef {
        self.regions.push(region);
        NodeRef::Region(self.regions.len() - 1)
    }

    pub fn add_input(&mut self) -> NodeRef {
        self.inputs += 1;
        NodeRef::Input(self.inputs - 1)
    }

    pub fn add_output(&mut self) -> NodeRef {
        self.outputs += 1;
        NodeRef::Output(self.outputs - 1)
    }

    pub fn connect(&mut self, from: NodeRef, to: NodeRef) -> &mut Self {
        self.edges.push((from, to));
        self
    }

    fn index_of(&self, node: NodeRef) -> usize {
        let r = self.regions.len();
        match node {
            NodeRef::Region(i) => i,
            NodeRef::Input(i) => r + i,
            NodeRef::Output(i) => r + self.inputs + i,
        }
    }

    pub fn build(self) -> Result<Network, NetworkError> {
        let size = self.regions.len() + self.inputs + self.outputs;
        let edges: Vec<(usize, usize)> = self
            .edges
            .iter()
            .map(|&(from, to)| (self.index_of(from), self.index_of(to)))
            .collect();
        let adjacency = Adjacency::from_edges(size, &edges)?;
        Network::with_virtual_nodes(self.regions, self.inputs, self.outputs, adjacency)
    }
}

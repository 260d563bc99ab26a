use crate::network::{Network, Node};

/// Read-only view of one real region inside a network.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSnapshot {
    pub index: usize,
    pub input_width: usize,
    pub width: usize,
    pub column_width: usize,
    /// Cardinality of the signal waiting for the next tick.
    pub pending: usize,
    pub distal_synapses: usize,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// A read-only snapshot of a network's structure and transient state.
///
/// Design intent:
/// - Observers cannot mutate or steer the network.
/// - Snapshotting is *on-demand* and can allocate; `Network::step` stays unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSnapshot {
    pub tick: u64,
    pub regions: Vec<RegionSnapshot>,
    pub inputs: Vec<Option<usize>>,
    pub outputs: Vec<Option<usize>>,
    pub edges: usize,
}

pub struct NetworkAdapter<'a> {
    network: &'a Network,
}

impl<'a> NetworkAdapter<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let net = self.network;
        let adj = net.adjacency();

        let regions = net
            .nodes()
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                Node::Region(region) => Some(RegionSnapshot {
                    index,
                    input_width: region.input_width(),
                    width: region.width(),
                    column_width: region.column_width(),
                    pending: net.pending(index).map_or(0, |p| p.count()),
                    distal_synapses: region.distal_weights().synapse_count(),
                    in_degree: adj.predecessors(index).count(),
                    out_degree: adj.successors(index).count(),
                }),
                Node::Input | Node::Output => None,
            })
            .collect();

        NetworkSnapshot {
            tick: net.tick(),
            regions,
            inputs: (0..net.input_count()).map(|k| net.input_width(k)).collect(),
            outputs: (0..net.output_count()).map(|k| net.output_width(k)).collect(),
            edges: adj.edge_count(),
        }
    }
}

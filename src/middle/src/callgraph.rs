use {
    crate::{
        check::{Callee, FuncId, FuncInfo, FuncTable},
        types::Color,
    },
    std::collections::{BTreeMap, BTreeSet},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Func(FuncId),
    // one node per distinct `coroutine.Yield[Y, R]` instantiation
    Yield(Color),
}

/// Index of a node in the [`CallGraph`]. Function nodes share their index
/// with their [`FuncId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub usize);

impl From<FuncId> for NodeIndex {
    fn from(id: FuncId) -> Self {
        NodeIndex(id.0)
    }
}

/// Whole-program call graph. Calls through function values are over-approximated
/// by edges to every function whose address is taken and whose signature matches.
#[derive(Debug)]
pub struct CallGraph {
    nodes: Vec<Node>,
    callers: Vec<BTreeSet<NodeIndex>>,
}

impl CallGraph {
    pub fn build(table: &FuncTable, infos: &BTreeMap<FuncId, FuncInfo>) -> Self {
        let mut nodes: Vec<Node> = table.iter().map(|(id, _)| Node::Func(id)).collect();
        let mut yields = BTreeMap::new();
        let mut yield_node = |color: &Color, nodes: &mut Vec<Node>| {
            *yields.entry(color.clone()).or_insert_with(|| {
                nodes.push(Node::Yield(color.clone()));
                NodeIndex(nodes.len() - 1)
            })
        };

        let address_taken: BTreeSet<FuncId> = infos
            .values()
            .flat_map(|info| info.address_taken.iter().copied())
            .collect();

        let mut edges = vec![];
        for (&caller, info) in infos {
            for callee in info.calls.values() {
                match *callee {
                    Callee::Func(id) => edges.push((caller.into(), id.into())),
                    Callee::Yield(ref color) => {
                        edges.push((caller.into(), yield_node(color, &mut nodes)))
                    }
                    Callee::Dynamic(ref signature) => edges.extend(
                        address_taken
                            .iter()
                            .filter(|&&id| table.get(id).signature == *signature)
                            .map(|&id| (NodeIndex::from(caller), NodeIndex::from(id))),
                    ),
                    Callee::External { .. } | Callee::Builtin(_) | Callee::Conversion(_) => {}
                }
            }
        }

        let mut callers = vec![BTreeSet::new(); nodes.len()];
        for (from, to) in edges {
            callers[to.0].insert(from);
        }
        Self {
            nodes,
            callers,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    pub fn callers(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.callers[index.0].iter().copied()
    }

    /// The suspension points of the program, with their colors.
    pub fn yields(&self) -> impl Iterator<Item = (NodeIndex, &Color)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| match *node {
                Node::Yield(ref color) => Some((NodeIndex(i), color)),
                Node::Func(_) => None,
            })
    }
}

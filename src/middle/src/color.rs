use {
    crate::{
        callgraph::{CallGraph, Node, NodeIndex},
        check::{FuncId, FuncTable},
        types::Color,
    },
    derive_more::Display,
    std::collections::{BTreeMap, VecDeque},
};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ColorError {
    #[display("{func}: ambiguous coroutine color: {first} and {second}")]
    Ambiguous {
        func: String,
        first: Color,
        second: Color,
    },
    #[display("{func}: unsupported yield function")]
    NoBody { func: String },
}

impl std::error::Error for ColorError {}

/// Propagates suspension colors from each `Yield` instantiation back to every
/// function that can reach it.
pub fn color(graph: &CallGraph, table: &FuncTable) -> Result<BTreeMap<FuncId, Color>, ColorError> {
    let mut colors: Vec<Option<Color>> = vec![None; graph.len()];
    let mut worklist = VecDeque::new();
    for (index, color) in graph.yields() {
        colors[index.0] = Some(color.clone());
        worklist.push_back(index);
    }

    while let Some(index) = worklist.pop_front() {
        let Some(color) = colors[index.0].clone() else {
            continue;
        };
        for caller in graph.callers(index) {
            match colors[caller.0] {
                None => {
                    colors[caller.0] = Some(color.clone());
                    worklist.push_back(caller);
                }
                Some(ref existing) if *existing != color => {
                    let Node::Func(func) = *graph.node(caller) else {
                        unreachable!("yield nodes call nothing");
                    };
                    return Err(ColorError::Ambiguous {
                        func: table.qualified_name(func),
                        first: existing.clone(),
                        second: color,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let mut colored = BTreeMap::new();
    for (id, entry) in table.iter() {
        if let Some(color) = colors[NodeIndex::from(id).0].take() {
            if !entry.has_body {
                return Err(ColorError::NoBody {
                    func: table.qualified_name(id),
                });
            }
            colored.insert(id, color);
        }
    }
    Ok(colored)
}

//! Tarjan's strongly connected components over an index-based adjacency list.

/// Returns every strongly connected component, members sorted ascending.
/// Components are emitted in reverse topological order.
pub fn strongly_connected_components(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State<'a> {
        adj: &'a [Vec<usize>],
        index: usize,
        indices: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        stack: Vec<usize>,
        on_stack: Vec<bool>,
        components: Vec<Vec<usize>>,
    }

    fn strongconnect(v: usize, s: &mut State<'_>) {
        s.indices[v] = Some(s.index);
        s.lowlink[v] = s.index;
        s.index += 1;
        s.stack.push(v);
        s.on_stack[v] = true;

        let adj = s.adj;
        for &w in &adj[v] {
            match s.indices[w] {
                None => {
                    strongconnect(w, s);
                    s.lowlink[v] = s.lowlink[v].min(s.lowlink[w]);
                }
                Some(iw) if s.on_stack[w] => {
                    s.lowlink[v] = s.lowlink[v].min(iw);
                }
                Some(_) => {}
            }
        }

        if s.indices[v] == Some(s.lowlink[v]) {
            let mut scc = Vec::new();
            while let Some(w) = s.stack.pop() {
                s.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            scc.sort_unstable();
            s.components.push(scc);
        }
    }

    let n = adj.len();
    let mut state = State {
        adj,
        index: 0,
        indices: vec![None; n],
        lowlink: vec![0; n],
        stack: Vec::new(),
        on_stack: vec![false; n],
        components: Vec::new(),
    };

    for v in 0..n {
        if state.indices[v].is_none() {
            strongconnect(v, &mut state);
        }
    }

    state.components
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_two_node_component() {
        // 0 <-> 1, 2 -> 0
        let adj = vec![vec![1], vec![0], vec![0]];
        let mut comps = strongly_connected_components(&adj);
        comps.sort();
        assert_eq!(comps, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn acyclic_graph_has_only_singletons() {
        let adj = vec![vec![1, 2], vec![2], vec![]];
        let comps = strongly_connected_components(&adj);
        assert_eq!(comps.len(), 3);
        assert!(comps.iter().all(|c| c.len() == 1));
    }
}

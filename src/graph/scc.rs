//! Strongly connected components (Tarjan's algorithm).
//!
//! Iterative so that deep foreign-key chains cannot exhaust the stack.

/// Tarjan SCC over a graph given as adjacency lists of node indices.
struct TarjanSCC<'a> {
    adjacency: &'a [Vec<usize>],
    index_counter: usize,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    sccs: Vec<Vec<usize>>,
}

impl<'a> TarjanSCC<'a> {
    fn new(adjacency: &'a [Vec<usize>]) -> Self {
        let n = adjacency.len();
        Self {
            adjacency,
            index_counter: 0,
            stack: Vec::new(),
            on_stack: vec![false; n],
            indices: vec![None; n],
            lowlinks: vec![0; n],
            sccs: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize) {
        self.indices[v] = Some(self.index_counter);
        self.lowlinks[v] = self.index_counter;
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    fn find_sccs(mut self) -> Vec<Vec<usize>> {
        for root in 0..self.adjacency.len() {
            if self.indices[root].is_some() {
                continue;
            }

            // (node, next successor position)
            let mut call_stack: Vec<(usize, usize)> = vec![(root, 0)];
            self.visit(root);

            while let Some(&mut (v, ref mut next)) = call_stack.last_mut() {
                if let Some(&w) = self.adjacency[v].get(*next) {
                    *next += 1;
                    match self.indices[w] {
                        None => {
                            self.visit(w);
                            call_stack.push((w, 0));
                        }
                        Some(w_index) if self.on_stack[w] => {
                            self.lowlinks[v] = self.lowlinks[v].min(w_index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                // All successors done
                call_stack.pop();
                if let Some(&(parent, _)) = call_stack.last() {
                    self.lowlinks[parent] = self.lowlinks[parent].min(self.lowlinks[v]);
                }

                if Some(self.lowlinks[v]) == self.indices[v] {
                    let mut scc = Vec::new();
                    while let Some(w) = self.stack.pop() {
                        self.on_stack[w] = false;
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    self.sccs.push(scc);
                }
            }
        }
        self.sccs
    }
}

/// Strongly connected components of the graph. Every node appears in
/// exactly one component; components come out in reverse topological
/// order of the condensation (a component is emitted after every
/// component reachable from it).
pub fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    TarjanSCC::new(adjacency).find_sccs()
}

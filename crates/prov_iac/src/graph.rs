//! Dependency graph extraction from `terraform graph` output.
//!
//! Terraform renders its internal graph as GraphViz DOT. The provisioner
//! only needs one thing from it: for every labelled node, the labels of the
//! nodes exactly one edge away in either direction. The DOT text is parsed
//! with `graphviz-rust`, indexed into a [`DotGraph`] and folded into a
//! [`DependencyGraph`].
//!
//! ```text
//! digraph {
//!     subgraph "root" {
//!         "[root] coder_agent.dev (expand)" [label = "coder_agent.dev", shape = "box"]
//!         "[root] null_resource.dev (expand)" [label = "null_resource.dev", shape = "box"]
//!         "[root] null_resource.dev (expand)" -> "[root] coder_agent.dev (expand)"
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use dot_structures::{EdgeTy, Graph, Id, Stmt, Vertex};

use crate::error::{IacError, IacResult};

/// A labelled node and its direct dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub label: String,
    /// Labels one edge away: outbound first, then inbound. Each direction
    /// is distinct and in first-seen order; a node linked both ways
    /// appears twice.
    pub neighbors: Vec<String>,
}

/// Adjacency map keyed by resource label (e.g. `coder_agent.dev`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record neighbors for `label`, merging with an existing entry.
    pub fn insert(&mut self, label: impl Into<String>, neighbors: Vec<String>) {
        let label = label.into();
        self.nodes
            .entry(label.clone())
            .or_insert_with(|| GraphNode {
                label,
                neighbors: Vec::new(),
            })
            .neighbors
            .extend(neighbors);
    }

    pub fn get(&self, label: &str) -> Option<&GraphNode> {
        self.nodes.get(label)
    }

    /// Direct-dependency set of `label`, `None` when it is not in the graph.
    pub fn dependencies(&self, label: &str) -> Option<&[String]> {
        self.nodes.get(label).map(|n| n.neighbors.as_slice())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Plain `label -> neighbors` map, sorted by label.
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .map(|(k, v)| (k.clone(), v.neighbors.clone()))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<String>)> for DependencyGraph {
    fn from_iter<I: IntoIterator<Item = (S, Vec<String>)>>(iter: I) -> Self {
        let mut graph = Self::new();
        for (label, neighbors) in iter {
            graph.insert(label, neighbors);
        }
        graph
    }
}

/// Parse Terraform's DOT output into direct-dependency sets.
pub fn find_direct_dependencies(dot: &str) -> IacResult<DependencyGraph> {
    let parsed = parse_dot(dot)?;
    Ok(parsed.direct_dependencies())
}

/// A node as declared in DOT, with its merged attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub id: String,
    pub attrs: HashMap<String, String>,
}

impl DotNode {
    /// The `label` attribute with surrounding quotes stripped.
    pub fn label(&self) -> Option<&str> {
        self.attrs.get("label").map(|l| l.trim_matches('"'))
    }
}

/// Parsed DOT document: nodes in declaration order and edges in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotGraph {
    pub strict: bool,
    pub directed: bool,
    pub id: Option<String>,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl DotGraph {
    pub fn node(&self, id: &str) -> Option<&DotNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    fn touch(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) {
            return i;
        }
        self.nodes.push(DotNode {
            id: id.to_string(),
            attrs: HashMap::new(),
        });
        self.index.insert(id.to_string(), self.nodes.len() - 1);
        self.nodes.len() - 1
    }

    fn set_attrs(&mut self, id: &str, attrs: Vec<(String, String)>) {
        let i = self.touch(id);
        self.nodes[i].attrs.extend(attrs);
    }

    /// Index a statement list, returning the node ids it mentions.
    fn fold_stmts(&mut self, stmts: &[Stmt]) -> Vec<String> {
        let mut mentioned = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Node(node) => {
                    let id = id_text(&node.id.0);
                    let attrs = node
                        .attributes
                        .iter()
                        .map(|attr| (id_text(&attr.0), id_text(&attr.1)))
                        .collect();
                    self.set_attrs(&id, attrs);
                    mentioned.push(id);
                }
                Stmt::Edge(edge) => {
                    let vertices: Vec<&Vertex> = match &edge.ty {
                        EdgeTy::Pair(from, to) => vec![from, to],
                        EdgeTy::Chain(chain) => chain.iter().collect(),
                    };
                    let mut previous: Vec<String> = Vec::new();
                    for vertex in vertices {
                        let current = self.fold_vertex(vertex);
                        for src in &previous {
                            for dst in &current {
                                self.edges.push((src.clone(), dst.clone()));
                            }
                        }
                        mentioned.extend(current.iter().cloned());
                        previous = current;
                    }
                }
                Stmt::Subgraph(subgraph) => mentioned.extend(self.fold_stmts(&subgraph.stmts)),
                // Graph, node and edge defaults carry no labels.
                _ => {}
            }
        }
        mentioned
    }

    fn fold_vertex(&mut self, vertex: &Vertex) -> Vec<String> {
        match vertex {
            Vertex::N(node_id) => {
                let id = id_text(&node_id.0);
                self.touch(&id);
                vec![id]
            }
            Vertex::S(subgraph) => self.fold_stmts(&subgraph.stmts),
        }
    }

    /// Fold edges into per-label neighbor lists.
    pub fn direct_dependencies(&self) -> DependencyGraph {
        let mut outbound: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut inbound: HashMap<&str, Vec<&str>> = HashMap::new();
        for (src, dst) in &self.edges {
            push_distinct(outbound.entry(src.as_str()).or_default(), dst);
            push_distinct(inbound.entry(dst.as_str()).or_default(), src);
        }

        let mut graph = DependencyGraph::new();
        for node in &self.nodes {
            let Some(label) = node.label() else {
                continue;
            };
            let neighbors = [outbound.get(node.id.as_str()), inbound.get(node.id.as_str())]
                .into_iter()
                .flatten()
                .flatten()
                .filter_map(|id| self.node(id).and_then(DotNode::label))
                .map(str::to_string)
                .collect();
            graph.insert(label, neighbors);
        }
        graph
    }
}

fn push_distinct<'a>(list: &mut Vec<&'a str>, item: &'a str) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Parse a single DOT graph.
pub fn parse_dot(text: &str) -> IacResult<DotGraph> {
    let parsed = graphviz_rust::parse(text).map_err(parse_error)?;
    let (strict, directed, id, stmts) = match parsed {
        Graph::Graph { id, strict, stmts } => (strict, false, id, stmts),
        Graph::DiGraph { id, strict, stmts } => (strict, true, id, stmts),
    };

    let mut graph = DotGraph {
        strict,
        directed,
        id: match &id {
            Id::Anonymous(_) => None,
            named => Some(id_text(named)),
        },
        ..DotGraph::default()
    };
    graph.fold_stmts(&stmts);
    Ok(graph)
}

/// Identifier text as DOT means it: quoted strings unescaped, HTML
/// strings without their outer brackets.
fn id_text(id: &Id) -> String {
    match id {
        Id::Escaped(quoted) => quoted
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(quoted.as_str())
            .replace("\\\r\n", "")
            .replace("\\\n", "")
            .replace("\\\"", "\""),
        Id::Html(html) => html
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(html.as_str())
            .to_string(),
        Id::Plain(text) | Id::Anonymous(text) => text.clone(),
    }
}

fn parse_error(message: String) -> IacError {
    let (line, column) = error_position(&message).unwrap_or((0, 0));
    IacError::GraphParse {
        line,
        column,
        message,
    }
}

/// `line:column` from the ` --> 2:8` marker of a parser error.
fn error_position(message: &str) -> Option<(usize, usize)> {
    let rest = &message[message.find("-->")? + 3..];
    let (line, rest) = rest.trim_start().split_once(':')?;
    let column: String = rest.chars().take_while(char::is_ascii_digit).collect();
    Some((line.trim().parse().ok()?, column.parse().ok()?))
}

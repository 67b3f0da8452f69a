use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::config::{MAX_GRAPH_VERTICES, READ_BUFFER_SIZE};
use crate::errors::{SamplerError, SamplerResult};
use crate::types::graph_query::GraphQuery;
use crate::types::graph_serialize::{ByteCursor, ByteEncodable, TopologyDecode, TopologyEncode};

pub mod graph_query;
pub mod graph_serialize;

/// A CSR (Compressed Sparse Row) graph, the unit of the corpus.
///
/// Vertex ids are continuous integers in `[0, vertex_count)`. A graph is built once
/// (from a `.graph` file, an edge list or the corpus payload) and is never mutated
/// afterwards; every worker owns the graphs of its shard exclusively.
#[derive(Debug, Clone, PartialEq)]
pub struct CSRGraph {
    /// Total number of vertices in the graph
    pub vertex_count: u64,

    /// Offset array of length `vertex_count + 1`.
    /// For each vertex i, its neighbors are stored in neighbor_list[offsets[i]..offsets[i+1]]
    pub offsets: Vec<u64>,

    /// Flattened adjacency list containing all neighbors of all vertices
    pub neighbor_list: Vec<u64>,

    /// Optional class label per vertex, used by the node-level labeled sampler
    pub vertex_labels: Option<Vec<u32>>,
}

impl GraphQuery for CSRGraph {
    fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    fn read_neighbor(&self, vertex_id: u64) -> &[u64] {
        if vertex_id >= self.vertex_count {
            return &[];
        }
        let start = self.offsets[vertex_id as usize] as usize;
        let end = self.offsets[vertex_id as usize + 1] as usize;
        &self.neighbor_list[start..end]
    }
}

impl CSRGraph {
    /// Builds a CSR graph from a directed edge list.
    ///
    /// Neighbors of each vertex keep the order in which their edges appear in `edges`.
    ///
    /// # Arguments
    /// * `vertex_count` - Number of vertices; every endpoint must be below it
    /// * `edges` - Directed `(src, dst)` pairs
    ///
    /// # Returns
    /// * `SamplerError::Configuration` if an endpoint is out of range or the graph
    ///   exceeds `MAX_GRAPH_VERTICES`
    pub fn from_edges(vertex_count: u64, edges: &[(u64, u64)]) -> SamplerResult<Self> {
        if vertex_count > MAX_GRAPH_VERTICES {
            return Err(SamplerError::Configuration(format!(
                "{vertex_count} vertices exceed the limit of {MAX_GRAPH_VERTICES}"
            )));
        }
        let vertex_count_usize = vertex_count as usize;
        let mut degrees = vec![0u64; vertex_count_usize];
        for &(src, dst) in edges {
            if src >= vertex_count || dst >= vertex_count {
                return Err(SamplerError::Configuration(format!(
                    "edge ({src}, {dst}) references a vertex outside [0, {vertex_count})"
                )));
            }
            degrees[src as usize] += 1;
        }

        // Prefix sums give where each adjacency list begins.
        let mut offsets = vec![0u64; vertex_count_usize + 1];
        for v in 0..vertex_count_usize {
            offsets[v + 1] = offsets[v] + degrees[v];
        }

        // Counting-sort placement keeps per-source edge order stable.
        let mut cursor = offsets.clone();
        let mut neighbor_list = vec![0u64; edges.len()];
        for &(src, dst) in edges {
            let slot = &mut cursor[src as usize];
            neighbor_list[*slot as usize] = dst;
            *slot += 1;
        }

        Ok(Self {
            vertex_count,
            offsets,
            neighbor_list,
            vertex_labels: None,
        })
    }

    /// Returns the undirected version of this graph: every edge is present in both
    /// directions, each neighbor list sorted and free of duplicates.
    pub fn symmetrized(&self) -> Self {
        let mut adjacency = vec![Vec::<u64>::new(); self.vertex_count as usize];
        for src in 0..self.vertex_count {
            for &dst in self.read_neighbor(src) {
                adjacency[src as usize].push(dst);
                adjacency[dst as usize].push(src);
            }
        }

        let mut offsets = Vec::with_capacity(adjacency.len() + 1);
        let mut neighbor_list = Vec::new();
        offsets.push(0u64);
        for mut neighbors in adjacency {
            neighbors.sort_unstable();
            neighbors.dedup();
            neighbor_list.extend(neighbors);
            offsets.push(neighbor_list.len() as u64);
        }

        Self {
            vertex_count: self.vertex_count,
            offsets,
            neighbor_list,
            vertex_labels: self.vertex_labels.clone(),
        }
    }

    /// Attaches one class label per vertex.
    pub fn with_vertex_labels(mut self, labels: Vec<u32>) -> SamplerResult<Self> {
        if labels.len() as u64 != self.vertex_count {
            return Err(SamplerError::Configuration(format!(
                "{} labels given for a graph with {} vertices",
                labels.len(),
                self.vertex_count
            )));
        }
        self.vertex_labels = Some(labels);
        Ok(self)
    }

    /// Number of directed edges stored in the graph.
    pub fn edge_count(&self) -> u64 {
        self.neighbor_list.len() as u64
    }

    /// Label of a vertex, if the graph is labeled.
    pub fn vertex_label(&self, vertex_id: u64) -> Option<u32> {
        self.vertex_labels
            .as_ref()
            .and_then(|labels| labels.get(vertex_id as usize).copied())
    }

    /// Returns the vertex with the largest out-degree, the first one on ties.
    /// `None` for an empty graph.
    pub fn max_out_degree_vertex(&self) -> Option<u64> {
        let mut best: Option<(u64, usize)> = None;
        for vertex_id in 0..self.vertex_count {
            let degree = self.out_degree(vertex_id);
            match best {
                Some((_, best_degree)) if best_degree >= degree => {}
                _ => best = Some((vertex_id, degree)),
            }
        }
        best.map(|(vertex_id, _)| vertex_id)
    }

    /// Loads a graph from a graph file in the text format shared by the corpus tools.
    ///
    /// # Format
    /// - First line: metadata with format "t [vertex_count] [edge_count]"
    /// - Vertex lines: "v [vertex_id] [label]", the label being optional
    /// - Edge lines: "e [source_id] [destination_id]"
    ///
    /// Either every vertex line carries a label or none does.
    ///
    /// # Returns
    /// * `SamplerError::CorpusLoad` if the file cannot be read or is malformed
    pub fn from_graph_file<P: AsRef<Path>>(file_path: P) -> SamplerResult<Self> {
        let file_path = file_path.as_ref();
        let format_error = |line_no: usize, reason: &str| {
            SamplerError::CorpusLoad(format!(
                "{}:{}: {}",
                file_path.display(),
                line_no + 1,
                reason
            ))
        };

        let graph_file = File::open(file_path).map_err(|e| {
            SamplerError::CorpusLoad(format!("cannot open {}: {e}", file_path.display()))
        })?;
        let mut graph_reader = BufReader::with_capacity(READ_BUFFER_SIZE, graph_file);

        // Parse the first line to extract vertex and edge counts
        let mut first_line = String::new();
        graph_reader
            .read_line(&mut first_line)
            .map_err(|e| format_error(0, &e.to_string()))?;
        let first_line_tokens: Vec<&str> = first_line.split_whitespace().collect();
        if first_line_tokens.len() != 3 {
            return Err(format_error(0, "header must be 't <vertex_count> <edge_count>'"));
        }
        let vertex_count = first_line_tokens[1]
            .parse::<u64>()
            .ok()
            .filter(|&n| n <= MAX_GRAPH_VERTICES)
            .ok_or_else(|| format_error(0, "bad vertex count"))?;
        let edge_count = first_line_tokens[2]
            .parse::<usize>()
            .map_err(|_| format_error(0, "bad edge count"))?;

        // Capacity is capped; the declared count is checked once the lines are read.
        let mut edges = Vec::with_capacity(edge_count.min(READ_BUFFER_SIZE));
        let mut labels: FxHashMap<u64, u32> = FxHashMap::default();

        for (line_no, line) in graph_reader.lines().enumerate() {
            let line_no = line_no + 1;
            let line = line.map_err(|e| format_error(line_no, &e.to_string()))?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.first() {
                None => continue,
                Some(&"v") => {
                    let vertex_id = tokens
                        .get(1)
                        .and_then(|t| t.parse::<u64>().ok())
                        .filter(|&v| v < vertex_count)
                        .ok_or_else(|| format_error(line_no, "bad vertex line"))?;
                    if let Some(token) = tokens.get(2) {
                        let label = token
                            .parse::<u32>()
                            .map_err(|_| format_error(line_no, "bad vertex label"))?;
                        labels.insert(vertex_id, label);
                    }
                }
                Some(&"e") => {
                    let src = tokens.get(1).and_then(|t| t.parse::<u64>().ok());
                    let dst = tokens.get(2).and_then(|t| t.parse::<u64>().ok());
                    match (src, dst) {
                        (Some(src), Some(dst)) => edges.push((src, dst)),
                        _ => return Err(format_error(line_no, "bad edge line")),
                    }
                }
                Some(_) => return Err(format_error(line_no, "unknown line kind")),
            }
        }

        if edges.len() != edge_count {
            return Err(format_error(
                0,
                &format!("header declares {edge_count} edges, file has {}", edges.len()),
            ));
        }
        let graph = Self::from_edges(vertex_count, &edges)
            .map_err(|e| SamplerError::CorpusLoad(format!("{}: {e}", file_path.display())))?;
        if labels.is_empty() {
            return Ok(graph);
        }
        let labels = (0..vertex_count)
            .map(|vertex_id| labels.get(&vertex_id).copied())
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| {
                SamplerError::CorpusLoad(format!(
                    "{}: only part of the vertices carry labels",
                    file_path.display()
                ))
            })?;
        graph.with_vertex_labels(labels)
    }
}

impl TopologyEncode for CSRGraph {
    /// Layout: vertex_count, edge_count, label flag, offsets, neighbors, labels.
    fn encode_topology(&self) -> Vec<u8> {
        let mut encoded_bytes = Vec::<u8>::with_capacity(
            17 + 8 * (self.offsets.len() + self.neighbor_list.len()),
        );
        encoded_bytes.extend_from_slice(&self.vertex_count.to_bytes());
        encoded_bytes.extend_from_slice(&self.edge_count().to_bytes());
        encoded_bytes.push(self.vertex_labels.is_some() as u8);
        for offset in &self.offsets {
            encoded_bytes.extend_from_slice(&offset.to_bytes());
        }
        for neighbor in &self.neighbor_list {
            encoded_bytes.extend_from_slice(&neighbor.to_bytes());
        }
        if let Some(labels) = &self.vertex_labels {
            for label in labels {
                encoded_bytes.extend_from_slice(&label.to_bytes());
            }
        }
        encoded_bytes
    }
}

impl TopologyDecode for CSRGraph {
    fn from_bytes_topology(bytes: &[u8]) -> Option<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let vertex_count = cursor.read::<u64>()?;
        let edge_count = cursor.read::<u64>()?;
        let has_labels = cursor.read::<u8>()? != 0;

        // Reject counts the payload cannot possibly hold before allocating.
        let declared = vertex_count.checked_add(1)?.checked_add(edge_count)?.checked_mul(8)?;
        if declared > bytes.len() as u64 {
            return None;
        }

        let mut offsets = Vec::with_capacity(vertex_count as usize + 1);
        for _ in 0..=vertex_count {
            offsets.push(cursor.read::<u64>()?);
        }
        if offsets[0] != 0
            || offsets.windows(2).any(|w| w[0] > w[1])
            || *offsets.last()? != edge_count
        {
            return None;
        }

        let mut neighbor_list = Vec::with_capacity(edge_count as usize);
        for _ in 0..edge_count {
            let neighbor = cursor.read::<u64>()?;
            if neighbor >= vertex_count {
                return None;
            }
            neighbor_list.push(neighbor);
        }

        let vertex_labels = if has_labels {
            let mut labels = Vec::with_capacity(vertex_count as usize);
            for _ in 0..vertex_count {
                labels.push(cursor.read::<u32>()?);
            }
            Some(labels)
        } else {
            None
        };

        if !cursor.is_exhausted() {
            return None;
        }
        Some(Self {
            vertex_count,
            offsets,
            neighbor_list,
            vertex_labels,
        })
    }
}

/// An induced subgraph around a seed vertex, annotated for a downstream encoder.
///
/// Local vertex 0 is always the seed. `vertex_mapper` translates local ids back to
/// the parent graph, `vertex_mapper_reverse` goes the other way.
#[derive(Debug, Clone)]
pub struct AnnotatedSubgraph {
    pub vertex_mapper: Vec<u64>,
    pub vertex_mapper_reverse: FxHashMap<u64, u64>,
    pub offset_list: Vec<u64>,
    pub edge_list: Vec<u64>,
    /// One row per local vertex, `positional_embedding_size` columns.
    pub positional_embedding: Vec<Vec<f32>>,
}

impl AnnotatedSubgraph {
    /// Induces the subgraph of `graph` over `vertices`, in the given order.
    ///
    /// `vertices` must be distinct; the first one becomes the seed. Positional
    /// features are left empty for the builder to fill in.
    pub fn induced<G: GraphQuery>(graph: &G, vertices: Vec<u64>) -> Self {
        let mut vertex_mapper_reverse = FxHashMap::default();
        for (local_id, &parent_id) in vertices.iter().enumerate() {
            vertex_mapper_reverse.insert(parent_id, local_id as u64);
        }

        let mut offset_list = Vec::with_capacity(vertices.len() + 1);
        let mut edge_list = Vec::new();
        offset_list.push(0u64);
        for &parent_id in &vertices {
            for neighbor in graph.read_neighbor(parent_id) {
                if let Some(&local_neighbor) = vertex_mapper_reverse.get(neighbor) {
                    edge_list.push(local_neighbor);
                }
            }
            offset_list.push(edge_list.len() as u64);
        }

        Self {
            vertex_mapper: vertices,
            vertex_mapper_reverse,
            offset_list,
            edge_list,
            positional_embedding: Vec::new(),
        }
    }

    /// The seed vertex, in parent-graph ids.
    pub fn seed_vertex(&self) -> u64 {
        self.vertex_mapper[0]
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_list.len() as u64
    }
}

impl GraphQuery for AnnotatedSubgraph {
    fn vertex_count(&self) -> u64 {
        self.vertex_mapper.len() as u64
    }

    fn read_neighbor(&self, vertex_id: u64) -> &[u64] {
        if vertex_id >= self.vertex_count() {
            return &[];
        }
        let start = self.offset_list[vertex_id as usize] as usize;
        let end = self.offset_list[vertex_id as usize + 1] as usize;
        &self.edge_list[start..end]
    }
}

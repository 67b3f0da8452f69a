use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info};

use crate::corpus_io::corpus_idx::{CorpusIndex, CorpusIndexItem, GraphDescriptor};
use crate::errors::{SamplerError, SamplerResult};
use crate::types::graph_serialize::{TopologyDecode, TopologyEncode};
use crate::types::CSRGraph;

pub mod corpus_idx;

/// Where graphs and their size metadata come from.
///
/// The metadata is read once, before partitioning. Each worker then materializes
/// exactly the graphs of its job list, in job-list order.
pub trait CorpusSource {
    /// Reads `(graph_id, node_count)` for the whole corpus without loading graphs.
    fn load_corpus_metadata(&self) -> SamplerResult<Vec<GraphDescriptor>>;

    /// Materializes the requested graphs, in the requested order.
    ///
    /// # Returns
    /// * `SamplerError::CorpusLoad` if the storage is unreachable, an id is unknown
    ///   or a payload is corrupt
    fn load_graph_shard(&self, ids: &[u64]) -> SamplerResult<Vec<CSRGraph>>;

    /// Graph-level labels of the requested graphs, `None` for unlabeled graphs.
    fn graph_labels(&self, ids: &[u64]) -> SamplerResult<Vec<Option<u32>>>;

    /// Number of graph classes, when every graph is labeled.
    fn num_classes(&self) -> Option<u32>;
}

/// A corpus persisted in a workspace directory.
///
/// # Fields
/// * `corpus_name` - Prefix of the index and storage files
/// * `workspace` - Directory holding both files
/// * `corpus_index` - The metadata record, read eagerly on open
///
/// The storage file is only memory-mapped inside [`CorpusSource::load_graph_shard`],
/// so opening a corpus to partition it never touches graph payloads.
#[derive(Debug, Clone)]
pub struct CorpusStorage {
    pub corpus_name: String,
    pub workspace: PathBuf,
    pub corpus_index: CorpusIndex,
}

impl CorpusStorage {
    fn index_path(workspace: &Path, corpus_name: &str) -> PathBuf {
        workspace.join(format!("{corpus_name}_corpus_index.bin"))
    }

    fn storage_path(workspace: &Path, corpus_name: &str) -> PathBuf {
        workspace.join(format!("{corpus_name}_corpus_storage.bin"))
    }

    /// Opens an existing corpus by reading its index file.
    ///
    /// # Returns
    /// * `SamplerError::CorpusLoad` if either file is missing or the index is unreadable
    pub fn open<P: AsRef<Path>>(workspace: P, corpus_name: &str) -> SamplerResult<Self> {
        let workspace = workspace.as_ref().to_path_buf();
        let index_path = Self::index_path(&workspace, corpus_name);
        let storage_path = Self::storage_path(&workspace, corpus_name);

        // Verify that required files exist
        for path in [&index_path, &storage_path] {
            if !path.exists() {
                return Err(SamplerError::CorpusLoad(format!(
                    "missing corpus file {}",
                    path.display()
                )));
            }
        }

        let mut index_bytes = Vec::new();
        fs::File::open(&index_path)
            .and_then(|mut file| file.read_to_end(&mut index_bytes))
            .map_err(|e| {
                SamplerError::CorpusLoad(format!("cannot read {}: {e}", index_path.display()))
            })?;
        let corpus_index: CorpusIndex = bincode::deserialize(&index_bytes).map_err(|e| {
            SamplerError::CorpusLoad(format!("corrupt index {}: {e}", index_path.display()))
        })?;

        info!(
            corpus = corpus_name,
            graphs = corpus_index.graph_count(),
            nodes = corpus_index.total_nodes(),
            "Corpus index loaded."
        );
        Ok(Self {
            corpus_name: corpus_name.to_owned(),
            workspace,
            corpus_index,
        })
    }

    /// Writes `graphs` as a new corpus, replacing any corpus of the same name.
    ///
    /// # Arguments
    /// * `workspace` - Directory to write into, created when missing
    /// * `corpus_name` - Prefix of the written files
    /// * `graphs` - The graphs; their position becomes their id
    /// * `labels` - Optional graph-level label per graph
    pub fn build_from_graphs<P: AsRef<Path>>(
        workspace: P,
        corpus_name: &str,
        graphs: &[CSRGraph],
        labels: Option<&[u32]>,
    ) -> SamplerResult<Self> {
        if let Some(labels) = labels {
            if labels.len() != graphs.len() {
                return Err(SamplerError::Configuration(format!(
                    "{} graph labels given for {} graphs",
                    labels.len(),
                    graphs.len()
                )));
            }
        }
        let workspace = workspace.as_ref().to_path_buf();
        fs::create_dir_all(&workspace)?;

        let pb = ProgressBar::new(graphs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message("Corpus Writing.");

        // Serialize each graph topology back to back and remember where it landed.
        let storage_file = fs::File::create(Self::storage_path(&workspace, corpus_name))?;
        let mut storage_writer = BufWriter::new(storage_file);
        let mut items = Vec::with_capacity(graphs.len());
        let mut offset = 0u64;
        for (graph_id, graph) in graphs.iter().enumerate() {
            let encoded = graph.encode_topology();
            storage_writer.write_all(&encoded)?;
            let label = labels.map(|labels| labels[graph_id]);
            items.push(CorpusIndexItem::new(
                offset,
                encoded.len() as u64,
                graph.vertex_count,
                label,
            ));
            offset += encoded.len() as u64;
            pb.inc(1);
        }
        storage_writer.flush()?;

        // Serialize and save the corpus index
        let corpus_index = CorpusIndex { items };
        let index_bytes = bincode::serialize(&corpus_index)?;
        fs::write(Self::index_path(&workspace, corpus_name), index_bytes)?;
        pb.finish_with_message("Corpus Written.");

        info!(
            corpus = corpus_name,
            graphs = corpus_index.graph_count(),
            bytes = offset,
            "Corpus built."
        );
        Ok(Self {
            corpus_name: corpus_name.to_owned(),
            workspace,
            corpus_index,
        })
    }

    /// Parses `.graph` files in parallel and writes them as a new corpus.
    ///
    /// When `symmetrize` is set every edge is stored in both directions, the usual
    /// preparation for restart walks on undirected data.
    pub fn build_from_graph_files<P, Q>(
        workspace: P,
        corpus_name: &str,
        graph_files: &[Q],
        labels: Option<&[u32]>,
        symmetrize: bool,
    ) -> SamplerResult<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path> + Sync,
    {
        let graphs = graph_files
            .par_iter()
            .map(|path| {
                let graph = CSRGraph::from_graph_file(path)?;
                debug!(
                    path = %path.as_ref().display(),
                    vertices = graph.vertex_count,
                    edges = graph.edge_count(),
                    "Graph file parsed."
                );
                Ok(if symmetrize { graph.symmetrized() } else { graph })
            })
            .collect::<SamplerResult<Vec<CSRGraph>>>()?;
        Self::build_from_graphs(workspace, corpus_name, &graphs, labels)
    }

    pub fn total_nodes(&self) -> u64 {
        self.corpus_index.total_nodes()
    }

    fn index_item(&self, graph_id: u64) -> SamplerResult<&CorpusIndexItem> {
        self.corpus_index.items.get(graph_id as usize).ok_or_else(|| {
            SamplerError::CorpusLoad(format!(
                "graph {graph_id} is not in corpus {} ({} graphs)",
                self.corpus_name,
                self.corpus_index.graph_count()
            ))
        })
    }
}

impl CorpusSource for CorpusStorage {
    fn load_corpus_metadata(&self) -> SamplerResult<Vec<GraphDescriptor>> {
        Ok(self.corpus_index.descriptors())
    }

    fn load_graph_shard(&self, ids: &[u64]) -> SamplerResult<Vec<CSRGraph>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let storage_path = Self::storage_path(&self.workspace, &self.corpus_name);
        let storage_file = fs::File::open(&storage_path).map_err(|e| {
            SamplerError::CorpusLoad(format!("cannot open {}: {e}", storage_path.display()))
        })?;
        // The storage file is written once by the builder and never modified afterwards.
        let mem_map = unsafe { Mmap::map(&storage_file) }.map_err(|e| {
            SamplerError::CorpusLoad(format!("cannot map {}: {e}", storage_path.display()))
        })?;

        let mut graphs = Vec::with_capacity(ids.len());
        for &graph_id in ids {
            let item = self.index_item(graph_id)?;
            let range = item.byte_range();
            if range.end > mem_map.len() {
                return Err(SamplerError::CorpusLoad(format!(
                    "graph {graph_id} extends past the end of {}",
                    storage_path.display()
                )));
            }
            let graph = CSRGraph::from_bytes_topology(&mem_map[range])
                .filter(|graph| graph.vertex_count == item.node_count)
                .ok_or_else(|| {
                    SamplerError::CorpusLoad(format!("graph {graph_id} has a corrupt payload"))
                })?;
            graphs.push(graph);
        }
        debug!(corpus = %self.corpus_name, graphs = graphs.len(), "Shard materialized.");
        Ok(graphs)
    }

    fn graph_labels(&self, ids: &[u64]) -> SamplerResult<Vec<Option<u32>>> {
        ids.iter()
            .map(|&graph_id| self.index_item(graph_id).map(|item| item.label))
            .collect()
    }

    fn num_classes(&self) -> Option<u32> {
        self.corpus_index.num_classes()
    }
}

/// A corpus held in memory, for single-process use and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    graphs: Vec<CSRGraph>,
    labels: Option<Vec<u32>>,
}

impl InMemoryCorpus {
    pub fn new(graphs: Vec<CSRGraph>) -> Self {
        Self { graphs, labels: None }
    }

    pub fn with_labels(graphs: Vec<CSRGraph>, labels: Vec<u32>) -> SamplerResult<Self> {
        if labels.len() != graphs.len() {
            return Err(SamplerError::Configuration(format!(
                "{} graph labels given for {} graphs",
                labels.len(),
                graphs.len()
            )));
        }
        Ok(Self {
            graphs,
            labels: Some(labels),
        })
    }

    fn graph(&self, graph_id: u64) -> SamplerResult<&CSRGraph> {
        self.graphs.get(graph_id as usize).ok_or_else(|| {
            SamplerError::CorpusLoad(format!(
                "graph {graph_id} is not in an in-memory corpus of {} graphs",
                self.graphs.len()
            ))
        })
    }
}

impl CorpusSource for InMemoryCorpus {
    fn load_corpus_metadata(&self) -> SamplerResult<Vec<GraphDescriptor>> {
        Ok(self
            .graphs
            .iter()
            .enumerate()
            .map(|(id, graph)| GraphDescriptor {
                id: id as u64,
                node_count: graph.vertex_count,
            })
            .collect())
    }

    fn load_graph_shard(&self, ids: &[u64]) -> SamplerResult<Vec<CSRGraph>> {
        ids.iter().map(|&id| self.graph(id).cloned()).collect()
    }

    fn graph_labels(&self, ids: &[u64]) -> SamplerResult<Vec<Option<u32>>> {
        ids.iter()
            .map(|&id| {
                self.graph(id)?;
                Ok(self.labels.as_ref().map(|labels| labels[id as usize]))
            })
            .collect()
    }

    fn num_classes(&self) -> Option<u32> {
        self.labels
            .as_ref()
            .and_then(|labels| labels.iter().max().map(|max| max + 1))
    }
}

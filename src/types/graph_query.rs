/// A trait that defines the read-only queries traversals need from a graph.
///
/// Vertices are dense local identifiers in `[0, vertex_count)`. Neighbor lists
/// are returned as borrowed slices so a random walk never allocates per step.
pub trait GraphQuery {
    /// Returns the number of vertices in the graph.
    fn vertex_count(&self) -> u64;

    /// Retrieves the out-neighbors of a given vertex.
    ///
    /// # Parameters
    ///
    /// * `vertex_id` - The local identifier of the vertex whose neighbors are queried.
    ///
    /// # Returns
    ///
    /// The neighbor slice, empty if the vertex has no out-edges or does not exist.
    fn read_neighbor(&self, vertex_id: u64) -> &[u64];

    /// Returns the number of out-edges of a vertex.
    fn out_degree(&self, vertex_id: u64) -> usize {
        self.read_neighbor(vertex_id).len()
    }

    /// Checks if a specific vertex exists in the graph.
    fn has_vertex(&self, vertex_id: u64) -> bool {
        vertex_id < self.vertex_count()
    }

    /// Determines if an edge exists from `src_id` to `dst_id`.
    fn has_edge(&self, src_id: u64, dst_id: u64) -> bool {
        self.read_neighbor(src_id).contains(&dst_id)
    }
}

use serde::{Deserialize, Serialize};

/// Size metadata of one corpus graph, all the load balancer needs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphDescriptor {
    pub id: u64,
    pub node_count: u64,
}

/// Location and size of one graph inside the corpus storage file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusIndexItem {
    offset: u64, // Starting byte of the encoded topology in the storage file
    length: u64, // Number of encoded bytes
    pub node_count: u64,
    /// Graph-level class label, if the corpus is a graph classification set.
    pub label: Option<u32>,
}

impl CorpusIndexItem {
    pub fn new(offset: u64, length: u64, node_count: u64, label: Option<u32>) -> Self {
        Self {
            offset,
            length,
            node_count,
            label,
        }
    }

    /// Byte range of the graph in the storage file.
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.length) as usize
    }
}

/// The metadata record of a corpus: one entry per graph, indexed by graph id.
///
/// It is written next to the storage file and is the only thing read before
/// the graphs are partitioned, so partitioning never touches graph payloads.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CorpusIndex {
    pub items: Vec<CorpusIndexItem>,
}

impl CorpusIndex {
    pub fn graph_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_nodes(&self) -> u64 {
        self.items.iter().map(|item| item.node_count).sum()
    }

    /// `(id, node_count)` for every graph, ids being positions in the index.
    pub fn descriptors(&self) -> Vec<GraphDescriptor> {
        self.items
            .iter()
            .enumerate()
            .map(|(id, item)| GraphDescriptor {
                id: id as u64,
                node_count: item.node_count,
            })
            .collect()
    }

    /// Number of graph classes, when every graph carries a label.
    pub fn num_classes(&self) -> Option<u32> {
        let labels = self
            .items
            .iter()
            .map(|item| item.label)
            .collect::<Option<Vec<u32>>>()?;
        labels.into_iter().max().map(|max| max + 1)
    }
}

#[cfg(test)]
mod test_corpus_idx {
    use super::*;

    #[test]
    fn test_descriptors_and_totals() {
        let index = CorpusIndex {
            items: vec![
                CorpusIndexItem::new(0, 40, 3, Some(1)),
                CorpusIndexItem::new(40, 80, 7, Some(0)),
            ],
        };
        assert_eq!(index.total_nodes(), 10);
        assert_eq!(
            index.descriptors(),
            vec![
                GraphDescriptor { id: 0, node_count: 3 },
                GraphDescriptor { id: 1, node_count: 7 }
            ]
        );
        assert_eq!(index.items[1].byte_range(), 40..120);
        assert_eq!(index.num_classes(), Some(2));
    }

    #[test]
    fn test_num_classes_requires_all_labels() {
        let index = CorpusIndex {
            items: vec![
                CorpusIndexItem::new(0, 1, 1, Some(4)),
                CorpusIndexItem::new(1, 1, 1, None),
            ],
        };
        assert_eq!(index.num_classes(), None);
    }

    #[test]
    fn test_bincode_roundtrip() {
        let index = CorpusIndex {
            items: vec![CorpusIndexItem::new(0, 17, 1, None)],
        };
        let bytes = bincode::serialize(&index).unwrap();
        let decoded: CorpusIndex = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, index);
    }
}

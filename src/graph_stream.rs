use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{prelude::*, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{PageRankError, Result};
use crate::records::{Edge, Node, NodeId, WireNode};

/// Parses one edge line. Blank lines and `#` comments yield `None`.
pub fn parse_edge(line: &str, line_number: usize) -> Result<Option<Edge>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let malformed = |reason: String| PageRankError::MalformedRecord {
        line: line_number,
        record: line.to_string(),
        reason,
    };

    let fields = trimmed.split_whitespace().collect::<Vec<&str>>();
    if fields.len() != 2 {
        return Err(malformed(format!("expected 2 fields, found {}", fields.len())));
    }

    let parse_id = |field: &str| {
        field
            .parse::<NodeId>()
            .map_err(|err| malformed(format!("bad node id {:?}: {}", field, err)))
    };
    Ok(Some((parse_id(fields[0])?, parse_id(fields[1])?)))
}

pub fn read_edges<R: BufRead>(reader: R) -> Result<Vec<Edge>> {
    let mut edges = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if let Some(edge) = parse_edge(&line?, index + 1)? {
            edges.push(edge);
        }
    }
    Ok(edges)
}

pub fn from_edge_list_file(path: impl AsRef<Path>) -> Result<Vec<Edge>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| PageRankError::io(err, path))?;
    let edges = read_edges(BufReader::new(file))?;
    log::info!("read {} edges from {}", edges.len(), path.display());
    Ok(edges)
}

/// Node count and id bounds of an edge list, as the rank job expects them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphStats {
    pub n_nodes: u64,
    pub n_edges: usize,
    pub min_node_id: NodeId,
    pub max_node_id: NodeId,
    /// Ids that never occur as a source.
    pub n_sinks: u64,
}

impl GraphStats {
    /// One pass over the edges. `None` for an empty list.
    pub fn scan(edges: &[Edge]) -> Option<GraphStats> {
        let mut nodes = HashSet::new();
        let mut sources = HashSet::new();
        for &(src_id, dst_id) in edges {
            nodes.insert(src_id);
            nodes.insert(dst_id);
            sources.insert(src_id);
        }

        Some(GraphStats {
            n_nodes: nodes.len() as u64,
            n_edges: edges.len(),
            min_node_id: *nodes.iter().min()?,
            max_node_id: *nodes.iter().max()?,
            n_sinks: (nodes.len() - sources.len()) as u64,
        })
    }

    /// Ids in `[min_node_id, max_node_id]` that no edge mentions.
    pub fn id_gaps(&self) -> u64 {
        // `max - min + 1` overflows when the ids span all of u64.
        (self.max_node_id - self.min_node_id).saturating_sub(self.n_nodes.saturating_sub(1))
    }
}

/// Uniform random multigraph over ids `0..nodes`.
pub fn random_edges(nodes: u64, edges: usize, seed: u64) -> Vec<Edge> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..edges)
        .map(|_| (rng.gen_range(0..nodes), rng.gen_range(0..nodes)))
        .collect()
}

/// Writes nodes as `id<TAB>{"out_links":[..],"page_rank":..}` lines.
pub fn write_generation<W: Write>(mut writer: W, nodes: &[Node]) -> Result<()> {
    for node in nodes {
        let value = serde_json::to_string(&WireNode::from(node))?;
        writeln!(writer, "{}\t{}", node.id, value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one worker's share of a generation as a part file under `dir`.
pub fn dump_generation(
    dir: impl AsRef<Path>,
    generation: usize,
    worker_index: usize,
    nodes: &[Node],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|err| PageRankError::io(err, dir))?;
    let path = dir.join(format!(
        "generation-{:04}-part-{:05}.tsv",
        generation, worker_index
    ));
    let file = File::create(&path).map_err(|err| PageRankError::io(err, &path))?;
    write_generation(BufWriter::new(file), nodes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_and_space_delimited_edges() {
        let input = "# Directed graph\n1\t2\n\n2 3\n  3\t1  \n";
        let edges = read_edges(input.as_bytes()).unwrap();
        assert_eq!(edges, vec![(1, 2), (2, 3), (3, 1)]);
    }

    #[test]
    fn malformed_line_fails_with_its_number() {
        let input = "1\t2\n2\tthree\n";
        match read_edges(input.as_bytes()) {
            Err(PageRankError::MalformedRecord { line, record, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(record, "2\tthree");
            }
            other => panic!("expected a malformed record, got {:?}", other),
        }
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert!(parse_edge("1", 1).is_err());
        assert!(parse_edge("1 2 3", 1).is_err());
        assert!(parse_edge("-1 2", 1).is_err());
    }

    #[test]
    fn scan_counts_nodes_bounds_and_sinks() {
        let stats = GraphStats::scan(&[(3, 5), (5, 3), (3, 9)]).unwrap();
        assert_eq!(stats.n_nodes, 3);
        assert_eq!(stats.n_edges, 3);
        assert_eq!((stats.min_node_id, stats.max_node_id), (3, 9));
        assert_eq!(stats.n_sinks, 1);
        assert_eq!(stats.id_gaps(), 4);
        assert!(GraphStats::scan(&[]).is_none());
    }

    #[test]
    fn gaps_cover_the_full_id_space() {
        let stats = GraphStats::scan(&[(0, u64::MAX)]).unwrap();
        assert_eq!(stats.id_gaps(), u64::MAX - 1);
        let stats = GraphStats::scan(&[(7, 7)]).unwrap();
        assert_eq!(stats.id_gaps(), 0);
    }

    #[test]
    fn random_edges_are_seeded() {
        let edges = random_edges(50, 200, 7);
        assert_eq!(edges.len(), 200);
        assert!(edges.iter().all(|&(src, dst)| src < 50 && dst < 50));
        assert_eq!(edges, random_edges(50, 200, 7));
    }

    #[test]
    fn generation_lines_use_the_job_wire_format() {
        let mut buffer = Vec::new();
        let nodes = vec![Node::new(4, vec![1, 2], 0.25), Node::dangling(2, 0.5)];
        write_generation(&mut buffer, &nodes).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let (key, value) = lines[0].split_once('\t').unwrap();
        assert_eq!(key, "4");
        let value: serde_json::Value = serde_json::from_str(value).unwrap();
        assert_eq!(value["out_links"], serde_json::json!([1, 2]));
        assert_eq!(value["page_rank"], serde_json::json!(0.25));
        assert_eq!(lines[1], "2\t{\"out_links\":[],\"page_rank\":0.5}");
    }

    #[test]
    fn dump_names_part_files_by_generation_and_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dump_generation(dir.path(), 3, 1, &[Node::dangling(1, 1.0)]).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "generation-0003-part-00001.tsv"
        );
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "1\t{\"out_links\":[],\"page_rank\":1.0}\n");
    }
}

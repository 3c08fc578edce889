//! CSV input: road graph (nodes + edges) and shelter tables
//!
//! `nodes.csv`: `id,lat,lon`
//! `edges.csv`: `u,v,length` (metres, stored in both directions)
//! shelters: `name,lat,lon` plus one boolean column per category, with
//! optional `id` (defaults to the 0-based row number) and `node` (skips snapping)

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use refuge_common::{normalize_category, Error, FacilityId, NodeId, Result};
use serde::Deserialize;

use crate::facility::{Facility, FacilitySet};
use crate::graph::{GraphBuilder, WeightedGraph};

#[derive(Debug, Deserialize)]
struct NodeRecord {
    id: NodeId,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    u: NodeId,
    v: NodeId,
    length: f64,
}

/// Load a graph from a node table and an edge table
pub fn load_graph_csv<P: AsRef<Path>, Q: AsRef<Path>>(nodes: P, edges: Q) -> Result<WeightedGraph> {
    let graph = read_graph(open(nodes.as_ref())?, open(edges.as_ref())?)?;
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        fingerprint = format_args!("{:016x}", graph.fingerprint()),
        "graph loaded"
    );
    Ok(graph)
}

/// Parse a graph from CSV readers
pub fn read_graph<N: Read, E: Read>(nodes: N, edges: E) -> Result<WeightedGraph> {
    let mut builder = GraphBuilder::new();

    let mut rdr = csv_reader(nodes);
    for record in rdr.deserialize::<NodeRecord>() {
        let n = record.map_err(|e| csv_error("nodes", e))?;
        builder.add_node(n.id, n.lat, n.lon);
    }

    let mut rdr = csv_reader(edges);
    for record in rdr.deserialize::<EdgeRecord>() {
        let e = record.map_err(|e| csv_error("edges", e))?;
        builder.add_edge(e.u, e.v, e.length);
    }

    builder.build()
}

/// Load shelters and snap them onto `graph`
///
/// `categories` names the boolean columns to read; every one must be present.
pub fn load_facilities_csv<P: AsRef<Path>>(
    path: P,
    graph: &WeightedGraph,
    categories: &[String],
) -> Result<FacilitySet> {
    let set = read_facilities(open(path.as_ref())?, graph, categories)?;
    tracing::info!(
        facilities = set.len(),
        categories = set.categories().len(),
        "shelters loaded"
    );
    Ok(set)
}

/// Parse shelters from a CSV reader
pub fn read_facilities<R: Read>(
    reader: R,
    graph: &WeightedGraph,
    categories: &[String],
) -> Result<FacilitySet> {
    let mut rdr = csv_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error("shelters", e))?
        .iter()
        .map(normalize_category)
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let required = |name: &str| {
        column(name)
            .ok_or_else(|| Error::InvalidInput(format!("shelters: missing column '{name}'")))
    };

    let name_col = required("name")?;
    let lat_col = required("lat")?;
    let lon_col = required("lon")?;
    let id_col = column("id");
    let node_col = column("node");

    let categories: Vec<String> = categories.iter().map(|c| normalize_category(c)).collect();
    let category_cols = categories
        .iter()
        .map(|c| required(c).map(|col| (c.clone(), col)))
        .collect::<Result<Vec<_>>>()?;

    let mut facilities = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_error("shelters", e))?;
        let line = row + 2;
        let field = |col: usize| record.get(col).unwrap_or("");

        let id = match id_col.map(field).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                Error::InvalidInput(format!("shelters line {line}: bad id '{raw}'"))
            })?,
            None => u32::try_from(row).map_err(|_| {
                Error::InvalidInput(format!("shelters line {line}: too many rows"))
            })?,
        };
        let lat = parse_coord(field(lat_col), "lat", line)?;
        let lon = parse_coord(field(lon_col), "lon", line)?;

        let node = match node_col.map(field).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let node = raw.parse::<NodeId>().map_err(|_| {
                    Error::InvalidInput(format!("shelters line {line}: bad node '{raw}'"))
                })?;
                if !graph.contains(node) {
                    return Err(Error::UnknownNode(node));
                }
                node
            }
            None => graph.nearest_node(lat, lon).ok_or_else(|| {
                Error::InvalidInput("cannot snap shelters onto an empty graph".to_string())
            })?,
        };

        let mut tags = std::collections::BTreeSet::new();
        for (category, col) in &category_cols {
            if parse_flag(field(*col), line)? {
                tags.insert(category.clone());
            }
        }

        facilities.push(Facility {
            id: FacilityId(id),
            name: field(name_col).to_string(),
            node,
            lat,
            lon,
            categories: tags,
        });
    }

    FacilitySet::new(facilities, categories)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

fn parse_coord(raw: &str, what: &str, line: usize) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::InvalidInput(format!(
            "shelters line {line}: bad {what} '{raw}'"
        ))),
    }
}

fn parse_flag(raw: &str, line: usize) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "n" | "f" => Ok(false),
        "true" | "1" | "yes" | "y" | "t" => Ok(true),
        other => Err(Error::InvalidInput(format!(
            "shelters line {line}: bad flag '{other}'"
        ))),
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader)
}

fn csv_error(table: &str, e: csv::Error) -> Error {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(io) = e.into_kind() {
            return Error::Io(io);
        }
        return Error::InvalidInput(format!("{table}: unreadable"));
    }
    Error::InvalidInput(format!("{table}: {e}"))
}

//! Connectivity Compactor
//!
//! Builds the electrical nodes ("centres") implied by the drawing's geometry,
//! erases wires by merging every point they touch, then groups named
//! connection points that share a centre so the document part can store a
//! short symbolic cross-reference instead of junction coordinates.
//!
//! Both stages are union-find passes over indexed endpoints.

pub mod groups;

pub use groups::{
    CompactedConnections, ConnectionCompactor, ConnectionGroup, ConnectionReference,
    UniqueConnectionDescription,
};

use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{Element, PointKey};

/// What an endpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    WireStart,
    WireEnd,
    /// Index into the component's connection list
    Connection(usize),
}

/// A connection endpoint of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Index of the element in the document
    pub element: usize,
    pub kind: EndpointKind,
    pub key: PointKey,
}

/// Endpoints of a document and the centres they belong to.
///
/// Scratch state for one packaging run; the document itself is never touched.
pub struct ConnectivityGraph {
    endpoints: Vec<Endpoint>,
    centres: UnionFind<usize>,
    /// One representative endpoint per distinct point, keyed (y, x)
    rows: BTreeMap<(i64, i64), usize>,
    /// One representative endpoint per distinct point, keyed (x, y)
    columns: BTreeMap<(i64, i64), usize>,
}

impl ConnectivityGraph {
    /// Index every endpoint and join coincident ones.
    pub fn build(elements: &[Element]) -> Self {
        let mut endpoints = Vec::new();
        for (i, element) in elements.iter().enumerate() {
            match element {
                Element::Wire(w) => {
                    endpoints.push(Endpoint {
                        element: i,
                        kind: EndpointKind::WireStart,
                        key: w.location.key(),
                    });
                    endpoints.push(Endpoint {
                        element: i,
                        kind: EndpointKind::WireEnd,
                        key: w.end().key(),
                    });
                }
                Element::Component(c) => {
                    for (j, cp) in c.connections.iter().enumerate() {
                        endpoints.push(Endpoint {
                            element: i,
                            kind: EndpointKind::Connection(j),
                            key: cp.location.key(),
                        });
                    }
                }
            }
        }

        let mut centres = UnionFind::new(endpoints.len());
        let mut first_at: HashMap<PointKey, usize> = HashMap::new();
        let mut rows = BTreeMap::new();
        let mut columns = BTreeMap::new();

        for (idx, ep) in endpoints.iter().enumerate() {
            match first_at.get(&ep.key) {
                Some(&rep) => {
                    centres.union(rep, idx);
                }
                None => {
                    first_at.insert(ep.key, idx);
                    rows.insert((ep.key.1, ep.key.0), idx);
                    columns.insert((ep.key.0, ep.key.1), idx);
                }
            }
        }

        Self {
            endpoints,
            centres,
            rows,
            columns,
        }
    }

    /// Merge the centres of every point each wire touches.
    ///
    /// A wire touching a single distinct point (zero length, or a dangling
    /// wire) merges nothing.
    pub fn erase_wires(&mut self, elements: &[Element]) {
        for (i, element) in elements.iter().enumerate() {
            let Some(wire) = element.as_wire() else {
                continue;
            };
            let start = wire.location.key();
            let end = wire.end().key();

            let touched: Vec<usize> = if start.1 == end.1 {
                let (lo, hi) = (start.0.min(end.0), start.0.max(end.0));
                self.rows
                    .range((start.1, lo)..=(start.1, hi))
                    .map(|(_, &idx)| idx)
                    .collect()
            } else {
                let (lo, hi) = (start.1.min(end.1), start.1.max(end.1));
                self.columns
                    .range((start.0, lo)..=(start.0, hi))
                    .map(|(_, &idx)| idx)
                    .collect()
            };

            if touched.len() < 2 {
                tracing::debug!(
                    "Wire #{} touches {} point(s); nothing to merge",
                    i,
                    touched.len()
                );
                continue;
            }
            let destination = touched[0];
            for &other in &touched[1..] {
                self.centres.union(destination, other);
            }
        }
    }

    /// Build the graph and erase wires in one step.
    pub fn from_elements(elements: &[Element]) -> Self {
        let mut graph = Self::build(elements);
        graph.erase_wires(elements);
        graph
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Centre id of an endpoint (stable until the next merge).
    pub fn centre_of(&mut self, endpoint: usize) -> usize {
        self.centres.find_mut(endpoint)
    }

    pub fn connected(&self, a: usize, b: usize) -> bool {
        self.centres.equiv(a, b)
    }

    /// Number of distinct electrical nodes.
    pub fn centre_count(&self) -> usize {
        (0..self.endpoints.len())
            .map(|i| self.centres.find(i))
            .collect::<HashSet<_>>()
            .len()
    }
}

//! Named-group discovery and cross-reference emission.

use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, HashMap};

use super::{ConnectivityGraph, EndpointKind};
use crate::model::{Document, Element};

/// One distinct connection name on one component, with every endpoint of that
/// component carrying the name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConnectionDescription {
    pub element: usize,
    pub name: String,
    pub endpoints: Vec<usize>,
}

/// Equivalence class of named connections that are electrically joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionGroup {
    pub id: usize,
    /// (element index, connection name), in discovery order
    pub members: Vec<(usize, String)>,
}

/// Cross-reference written on a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReference {
    pub group_id: String,
    pub name: String,
}

/// Result of compaction: every group, and the references for each element
#[derive(Debug, Clone, Default)]
pub struct CompactedConnections {
    pub groups: Vec<ConnectionGroup>,
    references: BTreeMap<usize, Vec<ConnectionReference>>,
}

impl CompactedConnections {
    /// References of the element at `element` (empty when it shares no named node).
    pub fn references_for(&self, element: usize) -> &[ConnectionReference] {
        self.references
            .get(&element)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Groups that produce output (more than one member).
    pub fn emitted_groups(&self) -> impl Iterator<Item = &ConnectionGroup> {
        self.groups.iter().filter(|g| g.members.len() > 1)
    }

    pub fn emitted_group_count(&self) -> usize {
        self.emitted_groups().count()
    }
}

pub struct ConnectionCompactor;

impl ConnectionCompactor {
    /// Run wire erasure, group discovery and emission over a document.
    pub fn compact(document: &Document) -> CompactedConnections {
        let mut graph = ConnectivityGraph::from_elements(&document.elements);
        let records = Self::unique_descriptions(&document.elements, &graph);
        let groups = Self::discover_groups(&mut graph, &records);

        let mut references: BTreeMap<usize, Vec<ConnectionReference>> = BTreeMap::new();
        for group in groups.iter().filter(|g| g.members.len() > 1) {
            for (element, name) in &group.members {
                references
                    .entry(*element)
                    .or_default()
                    .push(ConnectionReference {
                        group_id: group.id.to_string(),
                        name: name.clone(),
                    });
            }
        }

        tracing::debug!(
            "Compacted {} named connections into {} groups ({} shared)",
            records.len(),
            groups.len(),
            groups.iter().filter(|g| g.members.len() > 1).count()
        );

        CompactedConnections { groups, references }
    }

    /// One record per distinct non-empty connection name per component,
    /// in element order then first-seen name order.
    pub fn unique_descriptions(
        elements: &[Element],
        graph: &ConnectivityGraph,
    ) -> Vec<UniqueConnectionDescription> {
        let mut records: Vec<UniqueConnectionDescription> = Vec::new();
        let mut by_name: HashMap<(usize, &str), usize> = HashMap::new();

        for (idx, ep) in graph.endpoints().iter().enumerate() {
            let EndpointKind::Connection(j) = ep.kind else {
                continue;
            };
            let Some(component) = elements.get(ep.element).and_then(|e| e.as_component()) else {
                continue;
            };
            let Some(cp) = component.connections.get(j) else {
                continue;
            };
            if cp.name.is_empty() {
                continue;
            }

            match by_name.get(&(ep.element, cp.name.as_str())) {
                Some(&r) => records[r].endpoints.push(idx),
                None => {
                    by_name.insert((ep.element, cp.name.as_str()), records.len());
                    records.push(UniqueConnectionDescription {
                        element: ep.element,
                        name: cp.name.clone(),
                        endpoints: vec![idx],
                    });
                }
            }
        }

        records
    }

    /// Partition records into classes of records sharing a centre; classes
    /// are numbered in the order their first record appears.
    pub fn discover_groups(
        graph: &mut ConnectivityGraph,
        records: &[UniqueConnectionDescription],
    ) -> Vec<ConnectionGroup> {
        let mut classes = UnionFind::new(records.len());
        let mut owner: HashMap<usize, usize> = HashMap::new();

        for (r, record) in records.iter().enumerate() {
            for &ep in &record.endpoints {
                let centre = graph.centre_of(ep);
                match owner.get(&centre) {
                    Some(&other) => {
                        classes.union(other, r);
                    }
                    None => {
                        owner.insert(centre, r);
                    }
                }
            }
        }

        let mut groups: Vec<ConnectionGroup> = Vec::new();
        let mut group_of_root: HashMap<usize, usize> = HashMap::new();
        for (r, record) in records.iter().enumerate() {
            let root = classes.find_mut(r);
            let g = *group_of_root.entry(root).or_insert_with(|| {
                groups.push(ConnectionGroup {
                    id: groups.len(),
                    members: Vec::new(),
                });
                groups.len() - 1
            });
            groups[g].members.push((record.element, record.name.clone()));
        }

        groups
    }
}

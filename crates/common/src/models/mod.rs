//! Graph data model
//!
//! Papers as returned by the bibliographic API, and the node/link graph
//! exchanged with the depth cache and the display sink.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Bibliographic record for one paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub paper_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub citation_count: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub influential_citation_count: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub fields_of_study: Vec<String>,
}

impl PaperRecord {
    /// Records without an id cannot be placed in a graph
    pub fn has_id(&self) -> bool {
        !self.paper_id.trim().is_empty()
    }
}

/// The API sends explicit `null` for unknown fields
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Graph node, one per distinct paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub label: String,
    pub fields_of_study: Vec<String>,
}

impl From<&PaperRecord> for Node {
    fn from(paper: &PaperRecord) -> Self {
        Self {
            id: paper.paper_id.clone(),
            label: paper.title.clone(),
            fields_of_study: paper.fields_of_study.clone(),
        }
    }
}

/// Identity of a citation edge.
///
/// The same edge is found from both of its papers (as a reference of the
/// citing paper and as a citation of the cited one); both discoveries
/// produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    pub cited: String,
    pub citing: String,
}

/// Graph link. `source` is the paper discovered while expanding `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkKey,
    pub source: String,
    pub target: String,
}

impl Link {
    /// `child` cites `parent`
    pub fn citation(parent: &str, child: &str) -> Self {
        Self {
            id: LinkKey {
                cited: parent.to_string(),
                citing: child.to_string(),
            },
            source: child.to_string(),
            target: parent.to_string(),
        }
    }

    /// `parent` cites `child`
    pub fn reference(parent: &str, child: &str) -> Self {
        Self {
            id: LinkKey {
                cited: child.to_string(),
                citing: parent.to_string(),
            },
            source: child.to_string(),
            target: parent.to_string(),
        }
    }
}

/// Node-link dataset. Node ids and link ids are unique within one value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl GraphData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph holding only the root paper
    pub fn with_root(root: &PaperRecord) -> Self {
        Self {
            nodes: vec![Node::from(root)],
            links: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn contains_link(&self, key: &LinkKey) -> bool {
        self.links.iter().any(|l| &l.id == key)
    }

    /// Add a node unless one with the same id is present
    pub fn push_node(&mut self, node: Node) -> bool {
        if self.contains_node(&node.id) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Add a link unless one with the same id is present
    pub fn push_link(&mut self, link: Link) -> bool {
        if self.contains_link(&link.id) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Append every node and link of `delta` whose id is not present yet.
    /// Existing entries are never replaced. Returns the number appended.
    pub fn absorb(&mut self, delta: GraphData) -> usize {
        let mut node_ids: HashSet<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
        let mut link_ids: HashSet<LinkKey> = self.links.iter().map(|l| l.id.clone()).collect();
        let mut added = 0;

        for node in delta.nodes {
            if node_ids.insert(node.id.clone()) {
                self.nodes.push(node);
                added += 1;
            }
        }

        for link in delta.links {
            if link_ids.insert(link.id.clone()) {
                self.links.push(link);
                added += 1;
            }
        }

        added
    }
}

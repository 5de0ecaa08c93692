//! Registry of known remote sensor nodes.
//!
//! Nodes are created from proximity packets (keyed on the remote device id)
//! or added by hand. The registry stores whatever status it is handed and
//! never evaluates thresholds itself.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use smartguard_types::{DeviceNode, NodeRole, Status};

/// Length of generated local ids.
pub const LOCAL_ID_LEN: usize = 9;

const DEFAULT_NAME: &str = "New Node";
const DEFAULT_LOCATION: &str = "Unknown";
const DEFAULT_BATTERY: u8 = 100;
const DEFAULT_SIGNAL_DBM: i16 = -50;

/// Fields carried by a proximity sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Gas concentration in ppm.
    pub ppm: f64,
    /// Temperature, when the packet carries one.
    pub temperature: Option<f64>,
    /// Humidity, when the packet carries one.
    pub humidity: Option<f64>,
    /// Location, when the packet carries one.
    pub location: Option<String>,
    /// Status assigned by the listener.
    pub status: Status,
    /// When the packet arrived.
    pub seen_at: OffsetDateTime,
}

/// A node added by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    /// Display name (defaults to "New Node").
    pub name: Option<String>,
    /// Location (defaults to "Unknown").
    pub location: Option<String>,
    /// Remote device id, if the node is known to report over the mesh.
    pub device_id: Option<String>,
}

/// A partial update to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub battery: Option<u8>,
    pub signal: Option<i16>,
    pub status: Option<Status>,
}

impl NodePatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &NodePatch::default()
    }
}

/// Outcome of [`NodeRegistry::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// The node after the update.
    pub node: DeviceNode,
    /// Whether the node was created by this call.
    pub created: bool,
}

/// Insertion-ordered collection of nodes, unique by remote device id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRegistry {
    nodes: Vec<DeviceNode>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted nodes.
    ///
    /// Entries repeating an earlier remote device id or local id are dropped.
    pub fn from_nodes(nodes: Vec<DeviceNode>) -> Self {
        let mut registry = Self::new();
        for node in nodes {
            let duplicate = registry.get(&node.id).is_some()
                || node
                    .device_id
                    .as_deref()
                    .is_some_and(|id| registry.find_by_device_id(id).is_some());
            if duplicate {
                warn!(id = %node.id, "Dropping duplicate persisted node");
                continue;
            }
            registry.nodes.push(node);
        }
        registry
    }

    /// Record a sighting of `device_id`, creating the node if it is new.
    pub fn upsert(&mut self, device_id: &str, observation: Observation) -> Upserted {
        if let Some(node) = self
            .nodes
            .iter_mut()
            .find(|n| n.device_id.as_deref() == Some(device_id))
        {
            node.ppm = observation.ppm;
            if let Some(temperature) = observation.temperature {
                node.temperature = temperature;
            }
            if let Some(humidity) = observation.humidity {
                node.humidity = humidity;
            }
            if let Some(location) = non_empty(observation.location) {
                node.location = location;
            }
            node.status = observation.status;
            node.last_seen = Some(observation.seen_at);
            debug!(device_id, status = %node.status, "Updated node");
            return Upserted {
                node: node.clone(),
                created: false,
            };
        }

        let node = DeviceNode {
            id: self.generate_id(),
            device_id: Some(device_id.to_string()),
            name: device_id.to_string(),
            location: non_empty(observation.location)
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            role: NodeRole::Node,
            ppm: observation.ppm,
            temperature: observation.temperature.unwrap_or(0.0),
            humidity: observation.humidity.unwrap_or(0.0),
            battery: DEFAULT_BATTERY,
            signal: DEFAULT_SIGNAL_DBM,
            status: observation.status,
            last_seen: Some(observation.seen_at),
        };
        debug!(device_id, id = %node.id, "Discovered node");
        self.nodes.push(node.clone());
        Upserted {
            node,
            created: true,
        }
    }

    /// Add a node by hand.
    ///
    /// Returns `None` if `device_id` is already registered.
    pub fn add(&mut self, new: NewNode) -> Option<DeviceNode> {
        if let Some(device_id) = new.device_id.as_deref()
            && self.find_by_device_id(device_id).is_some()
        {
            return None;
        }

        let node = DeviceNode {
            id: self.generate_id(),
            device_id: new.device_id,
            name: non_empty(new.name).unwrap_or_else(|| DEFAULT_NAME.to_string()),
            location: non_empty(new.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            role: NodeRole::Node,
            ppm: 0.0,
            temperature: 0.0,
            humidity: 0.0,
            battery: DEFAULT_BATTERY,
            signal: DEFAULT_SIGNAL_DBM,
            status: Status::Safe,
            last_seen: None,
        };
        self.nodes.push(node.clone());
        Some(node)
    }

    /// Apply a partial update to the node with local id `id`.
    pub fn update(&mut self, id: &str, patch: NodePatch) -> Option<DeviceNode> {
        let node = self.nodes.iter_mut().find(|n| n.id == id)?;
        if let Some(name) = non_empty(patch.name) {
            node.name = name;
        }
        if let Some(location) = non_empty(patch.location) {
            node.location = location;
        }
        if let Some(battery) = patch.battery {
            node.battery = battery.min(100);
        }
        if let Some(signal) = patch.signal {
            node.signal = signal;
        }
        if let Some(status) = patch.status {
            node.status = status;
        }
        Some(node.clone())
    }

    /// Remove the node with local id `id`.
    pub fn remove(&mut self, id: &str) -> Option<DeviceNode> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(index))
    }

    /// All nodes in insertion order.
    pub fn list(&self) -> &[DeviceNode] {
        &self.nodes
    }

    /// Node by local id.
    pub fn get(&self, id: &str) -> Option<&DeviceNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Node by remote device id.
    pub fn find_by_device_id(&self, device_id: &str) -> Option<&DeviceNode> {
        self.nodes
            .iter()
            .find(|n| n.device_id.as_deref() == Some(device_id))
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any node currently reports danger.
    pub fn any_in_danger(&self) -> bool {
        self.nodes.iter().any(|n| n.status == Status::Danger)
    }

    /// Nodes currently reporting danger.
    pub fn in_danger(&self) -> impl Iterator<Item = &DeviceNode> {
        self.nodes.iter().filter(|n| n.status == Status::Danger)
    }

    fn generate_id(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let id: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(LOCAL_ID_LEN)
                .map(|b| char::from(b).to_ascii_lowercase())
                .collect();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sighting(ppm: f64, status: Status) -> Observation {
        Observation {
            ppm,
            temperature: Some(21.0),
            humidity: Some(40.0),
            location: None,
            status,
            seen_at: datetime!(2026-03-01 12:00 UTC),
        }
    }

    #[test]
    fn test_upsert_creates_once() {
        let mut registry = NodeRegistry::new();
        let first = registry.upsert("N-1", sighting(400.0, Status::Safe));
        assert!(first.created);
        assert_eq!(registry.len(), 1);

        let second = registry.upsert("N-1", sighting(2900.0, Status::Danger));
        assert!(!second.created);
        assert_eq!(registry.len(), 1);
        assert_eq!(second.node.id, first.node.id);
        assert_eq!(second.node.ppm, 2900.0);
        assert_eq!(second.node.status, Status::Danger);
        assert!(registry.any_in_danger());
    }

    #[test]
    fn test_upsert_keeps_fields_not_carried() {
        let mut registry = NodeRegistry::new();
        registry.upsert("N-1", sighting(400.0, Status::Safe));
        let alert = Observation {
            ppm: 3100.0,
            temperature: None,
            humidity: None,
            location: Some("Kitchen".to_string()),
            status: Status::Danger,
            seen_at: datetime!(2026-03-01 12:05 UTC),
        };
        let node = registry.upsert("N-1", alert).node;
        assert_eq!(node.temperature, 21.0);
        assert_eq!(node.humidity, 40.0);
        assert_eq!(node.location, "Kitchen");
    }

    #[test]
    fn test_empty_location_never_overwrites() {
        let mut registry = NodeRegistry::new();
        let alert = |location: &str| Observation {
            ppm: 3000.0,
            temperature: None,
            humidity: None,
            location: Some(location.to_string()),
            status: Status::Danger,
            seen_at: datetime!(2026-03-01 12:05 UTC),
        };

        assert_eq!(registry.upsert("X1", alert("")).node.location, DEFAULT_LOCATION);

        registry.upsert("X2", alert("Kitchen"));
        let node = registry.upsert("X2", alert("")).node;
        assert_eq!(node.location, "Kitchen");
    }

    #[test]
    fn test_add_defaults() {
        let mut registry = NodeRegistry::new();
        let node = registry.add(NewNode::default()).unwrap();
        assert_eq!(node.name, "New Node");
        assert_eq!(node.location, "Unknown");
        assert_eq!(node.battery, 100);
        assert_eq!(node.signal, -50);
        assert_eq!(node.status, Status::Safe);
        assert_eq!(node.id.len(), LOCAL_ID_LEN);
        assert!(node.id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_add_rejects_known_device_id() {
        let mut registry = NodeRegistry::new();
        registry.upsert("N-1", sighting(400.0, Status::Safe));
        let dup = NewNode {
            device_id: Some("N-1".to_string()),
            ..Default::default()
        };
        assert!(registry.add(dup).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_and_remove() {
        let mut registry = NodeRegistry::new();
        let node = registry
            .add(NewNode {
                name: Some("Garage".to_string()),
                ..Default::default()
            })
            .unwrap();

        let patch = NodePatch {
            location: Some("North wall".to_string()),
            battery: Some(250),
            name: Some("   ".to_string()),
            ..Default::default()
        };
        let updated = registry.update(&node.id, patch).unwrap();
        assert_eq!(updated.name, "Garage");
        assert_eq!(updated.location, "North wall");
        assert_eq!(updated.battery, 100);

        assert!(registry.update("missing", NodePatch::default()).is_none());
        assert_eq!(registry.remove(&node.id).map(|n| n.id), Some(node.id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_nodes_drops_duplicates() {
        let mut source = NodeRegistry::new();
        let a = source.upsert("N-1", sighting(400.0, Status::Safe)).node;
        let mut b = a.clone();
        b.id = "other0001".to_string();

        let registry = NodeRegistry::from_nodes(vec![a.clone(), b]);
        assert_eq!(registry.list(), &[a]);
    }
}

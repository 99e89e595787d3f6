//! Resource catalog and CORECONF capability description
//!
//! The catalog is the dispatch table for the server: each entry names a
//! path, its resource type for discovery, the methods it accepts and
//! whether it can be observed.

use serde::Serialize;
use serde_json::{Value, json};

use crate::codec;
use crate::coap_types::Method;

/// The resources exposed by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Discovery,
    Capabilities,
    Sensors,
    Config,
    Leds,
}

/// Static description of one resource
#[derive(Debug)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub path: &'static str,
    /// `rt` attribute advertised in discovery
    pub resource_type: &'static str,
    pub methods: &'static [Method],
    pub observable: bool,
}

/// Dispatch table, in discovery order
pub static CATALOG: [ResourceDescriptor; 5] = [
    ResourceDescriptor {
        kind: ResourceKind::Sensors,
        path: "/sensors",
        resource_type: "sensors",
        methods: &[Method::Get],
        observable: false,
    },
    ResourceDescriptor {
        kind: ResourceKind::Capabilities,
        path: "/capabilities",
        resource_type: "capabilities",
        methods: &[Method::Get],
        observable: false,
    },
    ResourceDescriptor {
        kind: ResourceKind::Config,
        path: "/config",
        resource_type: "config",
        methods: &[Method::Get, Method::Put],
        observable: false,
    },
    ResourceDescriptor {
        kind: ResourceKind::Leds,
        path: "/leds",
        resource_type: "leds",
        methods: &[Method::Get, Method::Put],
        observable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::Discovery,
        path: "/.well-known/core",
        resource_type: "core",
        methods: &[Method::Get],
        observable: false,
    },
];

impl ResourceKind {
    /// Look up a resource by Uri-Path; leading and trailing '/' are ignored
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim_matches('/');
        CATALOG
            .iter()
            .find(|entry| entry.path.trim_start_matches('/') == trimmed)
            .map(|entry| entry.kind)
    }

    pub fn descriptor(self) -> &'static ResourceDescriptor {
        // Every variant has exactly one catalog entry
        match self {
            ResourceKind::Sensors => &CATALOG[0],
            ResourceKind::Capabilities => &CATALOG[1],
            ResourceKind::Config => &CATALOG[2],
            ResourceKind::Leds => &CATALOG[3],
            ResourceKind::Discovery => &CATALOG[4],
        }
    }

    pub fn path(self) -> &'static str {
        self.descriptor().path
    }

    pub fn allows(self, method: Method) -> bool {
        self.descriptor().methods.contains(&method)
    }

    pub fn is_observable(self) -> bool {
        self.descriptor().observable
    }
}

#[derive(Debug, Serialize)]
struct DiscoveryEntry {
    path: &'static str,
    rt: &'static str,
}

#[derive(Debug, Serialize)]
struct Discovery {
    resources: Vec<DiscoveryEntry>,
}

/// Static capability/schema description served at `/capabilities`
#[derive(Debug, Clone)]
pub struct ResourceModel {
    yang_model: Value,
}

impl Default for ResourceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceModel {
    pub fn new() -> Self {
        let yang_model = json!({
            "module": "sensor-data",
            "namespace": "urn:example:sensor-data",
            "container": "sensor-data",
            "leaves": {
                "timestamp": {"type": "string", "description": "Time of measurement"},
                "temperature": {"type": "decimal64", "description": "Temperature in Celsius"},
                "humidity": {"type": "decimal64", "description": "Humidity in percentage"},
                "lightLevel": {"type": "uint16", "description": "Raw light sensor reading"},
                "binLevel": {"type": "decimal64", "description": "Bin fill percentage"},
                "ledStates": {
                    "type": "container",
                    "description": "LED states",
                    "leaves": {
                        "redLed": {"type": "boolean", "description": "Red LED state"},
                        "yellowLed": {"type": "boolean", "description": "Yellow LED state"},
                        "greenLed": {"type": "boolean", "description": "Green LED state"}
                    }
                },
                "config": {
                    "type": "container",
                    "description": "Runtime configuration",
                    "leaves": {
                        "samplingIntervalSeconds": {
                            "type": "uint32",
                            "description": "Seconds between sensor samples"
                        }
                    }
                }
            }
        });
        Self { yang_model }
    }

    /// The schema as a JSON value
    pub fn yang_model(&self) -> &Value {
        &self.yang_model
    }

    /// CBOR-encoded schema
    pub fn capabilities_descriptor(&self) -> Vec<u8> {
        codec::encode_or_fallback(&self.yang_model)
    }

    /// CBOR-encoded `{resources: [{path, rt}, ...]}`, discovery resource excluded
    pub fn discovery_descriptor(&self) -> Vec<u8> {
        let discovery = Discovery {
            resources: CATALOG
                .iter()
                .filter(|entry| entry.kind != ResourceKind::Discovery)
                .map(|entry| DiscoveryEntry {
                    path: entry.path,
                    rt: entry.resource_type,
                })
                .collect(),
        };
        codec::encode_or_fallback(&discovery)
    }

    /// RFC 6690 link-format rendering of the catalog
    pub fn link_format(&self) -> String {
        CATALOG
            .iter()
            .filter(|entry| entry.kind != ResourceKind::Discovery)
            .map(|entry| {
                let mut link = format!("<{}>;rt=\"{}\"", entry.path, entry.resource_type);
                if entry.observable {
                    link.push_str(";obs");
                }
                link
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

//! The octree snapshot envelope: identity and version metadata wrapped
//! around a serialized octree payload, persisted as UTF-8 JSON with optional
//! gzip framing. Readers auto-detect the framing.

use std::{fs, path::Path};

use log::{debug, warn};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::{connection::packet_type::PacketType, gzip};

/// Data version assigned to freshly reset snapshots.
pub const INITIAL_VERSION: u64 = 0;

/// Errors that can occur while reading or writing snapshots
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot file could not be read
    #[error("Cannot open snapshot file for reading: {path}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot bytes are not valid JSON
    #[error("Snapshot JSON is invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Snapshot JSON parsed but the root is not an object
    #[error("Snapshot root is not a JSON object")]
    NotAnObject,

    /// Gzip compression failed
    #[error("Unable to gzip snapshot data")]
    GzipFailed(#[source] std::io::Error),
}

/// Payload variants a snapshot can carry, one per concrete octree kind.
/// [`OctreeSnapshot::data_packet_type`] matches on this exhaustively, so
/// there is no incomplete base type whose accessor can be misused.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPayload {
    /// An ordered list of entity objects, opaque at this layer.
    Entities(Vec<Value>),
}

/// Identity and version metadata plus the payload of a serialized octree.
#[derive(Debug, Clone, PartialEq)]
pub struct OctreeSnapshot {
    pub id: Uuid,
    pub data_version: u64,
    pub version: u64,
    pub payload: SnapshotPayload,
}

impl OctreeSnapshot {
    /// An empty entity snapshot with nil identity.
    pub fn new_entities() -> Self {
        Self {
            id: Uuid::nil(),
            data_version: 0,
            version: 0,
            payload: SnapshotPayload::Entities(Vec::new()),
        }
    }

    /// Parses snapshot bytes, transparently unwrapping gzip framing: bytes
    /// that fail to gunzip are parsed as-is.
    pub fn from_slice(data: &[u8]) -> Result<Self, SnapshotError> {
        let plain = match gzip::gunzip(data) {
            Ok(unzipped) => unzipped,
            Err(_) => data.to_vec(),
        };

        let root: Value = serde_json::from_slice(&plain).map_err(|error| {
            warn!("Snapshot bytes are not valid JSON: {error}");
            SnapshotError::from(error)
        })?;
        let Value::Object(root) = root else {
            warn!("Snapshot root is not a JSON object");
            return Err(SnapshotError::NotAnObject);
        };

        Ok(Self::from_json_object(&root))
    }

    /// Reads and parses a snapshot file, gzipped or plain.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| SnapshotError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_slice(&data)
    }

    /// Builds a snapshot from a parsed JSON object.
    ///
    /// The id/version header fields are read only when all three are
    /// present; otherwise they stay nil/zero while the payload is still
    /// read. An unparseable `"Id"` string also reads as nil.
    pub fn from_json_object(root: &Map<String, Value>) -> Self {
        let mut snapshot = Self::new_entities();

        if root.contains_key("Id") && root.contains_key("DataVersion") && root.contains_key("Version")
        {
            snapshot.id = root["Id"]
                .as_str()
                .and_then(|text| Uuid::parse_str(text).ok())
                .unwrap_or_default();
            snapshot.data_version = root["DataVersion"].as_u64().unwrap_or(0);
            snapshot.version = root["Version"].as_u64().unwrap_or(0);
        }

        if let Some(entities) = root.get("Entities").and_then(Value::as_array) {
            snapshot.payload = SnapshotPayload::Entities(entities.clone());
        }

        snapshot
    }

    /// Serializes to UTF-8 JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let SnapshotPayload::Entities(entities) = &self.payload;
        let root = json!({
            "DataVersion": self.data_version,
            "Id": self.id.to_string(),
            "Version": self.version,
            "Entities": entities,
        });
        Ok(serde_json::to_vec_pretty(&root)?)
    }

    /// Serializes to gzipped UTF-8 JSON at the default compression level.
    pub fn to_gzipped_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let plain = self.to_bytes()?;
        gzip::gzip(&plain).map_err(SnapshotError::GzipFailed)
    }

    /// The packet type under which this snapshot's payload travels.
    pub fn data_packet_type(&self) -> PacketType {
        match self.payload {
            SnapshotPayload::Entities(_) => PacketType::EntityData,
        }
    }

    /// Assigns a fresh random identity and resets the data version.
    pub fn reset_id_and_version(&mut self) {
        self.id = Uuid::new_v4();
        self.data_version = INITIAL_VERSION;
        debug!("Reset octree data to: {} {}", self.id, self.data_version);
    }
}

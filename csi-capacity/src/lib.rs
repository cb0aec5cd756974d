use std::collections::BTreeMap;

use constcat::concat;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Name the local CSI driver registers under.
///
pub const CSI_DRIVER_NAME: &str = "kubernetes.io.csi.local";

pub const CAPACITY_ANNOTATION_PREFIX: &str = "csi.volume.kubernetes.io/";

/// Well-known node annotation key carrying the per-volume-group capacity map.
///
pub const CAPACITY_ANNOTATION: &str = concat!(CAPACITY_ANNOTATION_PREFIX, CSI_DRIVER_NAME);

/// Volume group reported by the driver when none is configured explicitly.
/// Different nodes may carry differently named groups; see the capacity
/// query parameters for how the group name reaches the driver.
///
pub const DEFAULT_VOLUME_GROUP: &str = "vg10000";

/// Parameter key naming the volume group in a CSI `GetCapacity` request.
///
pub const VOLUME_GROUP_PARAMETER: &str = "volume-group";

#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("malformed capacity annotation value {value:?}: {source}")]
    Parse {
        value: String,
        source: serde_json::Error,
    },
    #[error("failed to encode capacity annotation value: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The value stored under [`CAPACITY_ANNOTATION`]: a JSON object mapping
/// volume-group name to available capacity, kept as the decimal string the
/// driver reported. At most one entry per group; entries for other groups
/// survive every update.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeGroupCapacities(BTreeMap<String, String>);

impl VolumeGroupCapacities {
    /// Parse a stored annotation value. A missing or empty value is an empty
    /// map; anything else must be a JSON string-to-string object.
    ///
    pub fn parse(value: Option<&str>) -> Result<Self, CapacityError> {
        match value {
            None | Some("") => Ok(Self::default()),
            Some(raw) => serde_json::from_str(raw).map_err(|source| CapacityError::Parse {
                value: raw.to_string(),
                source,
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, CapacityError> {
        serde_json::to_string(self).map_err(CapacityError::Encode)
    }

    pub fn get(&self, volume_group: &str) -> Option<&str> {
        self.0.get(volume_group).map(String::as_str)
    }

    /// Set or overwrite the capacity recorded for `volume_group`.
    ///
    pub fn set(&mut self, volume_group: impl ToString, capacity: impl ToString) {
        self.0
            .insert(volume_group.to_string(), capacity.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

//! Bluetooth UUIDs for SmartGuard gateways.

use uuid::{Uuid, uuid};

/// Primary GATT service exposed by the gateway firmware.
pub const MESH_SERVICE: Uuid = uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

/// Notify characteristic carrying `ALERT`/`DATA` text packets.
pub const PACKET_CHARACTERISTIC: Uuid = uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_are_distinct() {
        assert_ne!(MESH_SERVICE, PACKET_CHARACTERISTIC);
        assert_eq!(
            MESH_SERVICE.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
    }
}

//! Discovery records handed to the controller.
//!
//! The controller does not browse the network itself. Whatever performs
//! mDNS resolution (or reads a cached record) fills in a
//! [`DiscoveredAccessory`] and passes it to
//! [`HapController::pair`](crate::HapController::pair).

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// A resolved HAP accessory as advertised in its `_hap._tcp` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredAccessory {
    /// Resolved IP address
    pub address: IpAddr,
    /// TCP port for the HAP endpoint
    pub port: u16,
    /// Accessory pairing identifier (the `id` TXT key)
    pub pairing_id: String,
    /// Accessory category (the `ci` TXT key)
    pub category: u16,
    /// Status flags (the `sf` TXT key); bit 0 set means unpaired
    pub status_flags: u8,
}

impl DiscoveredAccessory {
    /// Returns true when the accessory advertises itself as unpaired.
    #[must_use]
    pub fn accepts_pairing(&self) -> bool {
        self.status_flags & 0x01 != 0
    }

    /// Socket address of the HAP endpoint.
    #[must_use]
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags_gate_pairing() {
        let mut record = DiscoveredAccessory {
            address: "192.168.1.40".parse().unwrap(),
            port: 51826,
            pairing_id: "AA:BB:CC:DD:EE:FF".to_string(),
            category: 5,
            status_flags: 1,
        };
        assert!(record.accepts_pairing());

        record.status_flags = 0;
        assert!(!record.accepts_pairing());
    }

    #[test]
    fn record_roundtrips_through_json() {
        let record = DiscoveredAccessory {
            address: "10.0.0.7".parse().unwrap(),
            port: 8080,
            pairing_id: "11:22:33:44:55:66".to_string(),
            category: 2,
            status_flags: 0,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: DiscoveredAccessory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(record.socket_addr().port(), 8080);
    }
}

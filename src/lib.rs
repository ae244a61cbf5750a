//! A ring-distance Kademlia DHT core for a light peer-to-peer node.
//!
//! Nearest-neighbor ordering and lookup convergence use ring (modular) distance
//! over the 256-bit keyspace rather than XOR; k-bucket placement still uses the
//! classic XOR highest-differing-bit scheme. See [`key::RingKey`] for both
//! metrics side by side. Peer transport, object storage, and node identity are
//! external collaborators represented here only as traits (`transport`,
//! `object_store`, `identity`) with in-memory test doubles.

#![allow(clippy::too_many_arguments, dead_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod handshake;
pub mod identity;
pub mod logging;
pub mod lookup;
pub mod maintenance;
pub mod metrics;
pub mod object_store;
pub mod persistence;
pub mod redistribution;
pub mod routing;
pub mod session;
pub mod transport;

mod key;

pub use config::{DhtConfig, SeedSpec};
pub use error::{DhtError, DhtResult};
pub use events::DhtEvent;
pub use facade::DhtFacade;
pub use handshake::HandshakeHandler;
pub use key::RingKey;
pub use lookup::{LookupEngine, LookupOutcome};
pub use routing::{PeerRecord, RoutingTable};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = DhtConfig::default();
        let _ = RingKey::ZERO;
    }
}

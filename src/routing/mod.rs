//! C1: Routing Table. See [`table::RoutingTable`] for the component itself and
//! [`bucket::KBucket`] for the per-bucket overflow policy.

pub mod bucket;
pub mod table;

pub use bucket::PeerRecord;
pub use table::RoutingTable;

/*
    identity.rs - the local-node identity boundary.

    Responsibilities:
    Real keypair management, signing, and address derivation live in the host's
    identity stack (spec.md §6 out of scope); this module only defines the slim
    trait the DHT needs (its own address, and whether a given key is itself) plus
    a deterministic test double.
*/

use crate::key::RingKey;

pub trait Identity: Send + Sync {
    fn address_of(&self) -> RingKey;

    fn is_local(&self, id: &RingKey) -> bool {
        id == &self.address_of()
    }
}

pub struct StaticIdentity {
    address: RingKey,
}

impl StaticIdentity {
    pub fn new(address: RingKey) -> Self {
        StaticIdentity { address }
    }

    pub fn from_seed(seed: &str) -> Self {
        StaticIdentity { address: RingKey::hash_str(seed) }
    }
}

impl Identity for StaticIdentity {
    fn address_of(&self) -> RingKey {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_local_matches_own_address() {
        let identity = StaticIdentity::from_seed("node-a");
        assert!(identity.is_local(&identity.address_of()));
    }

    #[test]
    fn is_local_rejects_other_address() {
        let identity = StaticIdentity::from_seed("node-a");
        let other = RingKey::hash_str("node-b");
        assert!(!identity.is_local(&other));
    }
}

//! Trust anchors: the statically configured roots of validation.

use crate::crypto;
use serde::{Deserialize, Serialize};
use sigil_proto::rdata::{DNSKEY, DS};
use sigil_proto::Name;
use std::collections::HashMap;
use tracing::debug;

/// A single trust anchor for a zone, in DS or DNSKEY form.
///
/// DS-form anchors commit to a key by digest and are resolved into a
/// trusted keyset on first use; DNSKEY-form anchors are trusted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrustAnchor {
    /// A DS-style anchor.
    Ds {
        /// The anchored zone.
        zone: Name,
        /// The DS record data.
        ds: DS,
    },
    /// A DNSKEY-style anchor.
    Key {
        /// The anchored zone.
        zone: Name,
        /// The DNSKEY record data.
        key: DNSKEY,
    },
}

impl TrustAnchor {
    /// Returns the anchored zone.
    pub fn zone(&self) -> &Name {
        match self {
            Self::Ds { zone, .. } | Self::Key { zone, .. } => zone,
        }
    }

    /// Returns true if the anchor commits to the given DNSKEY.
    pub fn matches_dnskey(&self, key: &DNSKEY) -> bool {
        match self {
            Self::Ds { zone, ds } => crypto::ds_matches_key(zone, ds, key),
            Self::Key { key: anchored, .. } => {
                anchored.key_tag() == key.key_tag()
                    && anchored.algorithm == key.algorithm
                    && anchored.public_key == key.public_key
            }
        }
    }

    /// Returns true if the anchor references an algorithm and digest this
    /// build can verify. Unusable anchors make everything below them
    /// indeterminate rather than bogus.
    pub fn is_usable(&self) -> bool {
        match self {
            Self::Ds { ds, .. } => {
                crypto::algorithm_supported(ds.algorithm) && crypto::digest_supported(ds.digest_type)
            }
            Self::Key { key, .. } => crypto::algorithm_supported(key.algorithm),
        }
    }
}

/// The set of configured trust anchors, indexed by zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustAnchorStore {
    anchors: HashMap<Name, Vec<TrustAnchor>>,
}

impl TrustAnchorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an anchor.
    pub fn add(&mut self, anchor: TrustAnchor) {
        if !anchor.is_usable() {
            debug!(zone = %anchor.zone(), "configured trust anchor uses unsupported parameters");
        }
        self.anchors
            .entry(anchor.zone().clone())
            .or_default()
            .push(anchor);
    }

    /// Adds a DS anchor for a zone.
    pub fn add_ds(&mut self, zone: Name, ds: DS) {
        self.add(TrustAnchor::Ds { zone, ds });
    }

    /// Adds a DNSKEY anchor for a zone.
    pub fn add_key(&mut self, zone: Name, key: DNSKEY) {
        self.add(TrustAnchor::Key { zone, key });
    }

    /// Returns the anchors configured for exactly `zone`.
    pub fn anchors_for(&self, zone: &Name) -> &[TrustAnchor] {
        self.anchors.get(zone).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Finds the deepest anchored zone at or above `name`.
    ///
    /// This decides whether a query is covered by any trust anchor at all;
    /// uncovered queries are indeterminate.
    pub fn find_closest(&self, name: &Name) -> Option<(Name, &[TrustAnchor])> {
        let mut current = name.clone();
        loop {
            if let Some(anchors) = self.anchors.get(&current) {
                return Some((current, anchors));
            }
            current = current.parent()?;
        }
    }
}

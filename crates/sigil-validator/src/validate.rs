//! Response-body validation: positive and CNAME answers, wildcard
//! expansion proofs, and the NXDOMAIN/NODATA denial dispatch.

use crate::engine::{Session, Upstream};
use crate::keycache::KeyEntry;
use crate::status::{Reason, SecMessage, SecurityStatus};
use crate::{chain, nsec, nsec3, verify};
use sigil_proto::rdata::{NSEC, NSEC3};
use sigil_proto::{Name, Question, RecordType, Rrset};
use std::time::Duration;
use tracing::{debug, trace};

type Verdict = (SecurityStatus, Option<Reason>);

/// Folds a per-RRset verdict into the message verdict: any bogus part
/// makes the message bogus; insecurity and indeterminacy beat security.
fn merge(current: Verdict, incoming: Verdict) -> Verdict {
    use SecurityStatus::*;
    match (current.0, incoming.0) {
        (Bogus, _) => current,
        (_, Bogus) => incoming,
        (Insecure, _) => current,
        (_, Insecure) => incoming,
        (Indeterminate, _) => current,
        (_, Indeterminate) => incoming,
        _ => current,
    }
}

impl<U: Upstream + ?Sized> Session<'_, U> {
    /// Validates a positive, CNAME or ANY response: every answer RRset is
    /// verified under the zone that signed it, re-entering the chain
    /// walker when a CNAME chain crosses a zone cut, and wildcard-expanded
    /// answers demand a proof that no closer match exists.
    pub(crate) async fn validate_positive(
        &mut self,
        response: &mut SecMessage,
        question: &Question,
        entry: &KeyEntry,
    ) -> Verdict {
        let mut overall: Verdict = (SecurityStatus::Secure, None);
        let mut expansions: Vec<Name> = Vec::new();

        for idx in 0..response.answer().len() {
            let rrset = response.answer()[idx].rrset().clone();
            let verdict = self.validate_rrset(&rrset, entry).await;

            if verdict.0 == SecurityStatus::Secure {
                if let Some(wildcard) = verify::wildcard_of(&rrset) {
                    trace!(owner = %rrset.owner(), wildcard = %wildcard, "wildcard-expanded answer");
                    expansions.push(rrset.owner().clone());
                }
            }

            response.answer_mut()[idx].upgrade(verdict.0);
            overall = merge(overall, verdict);
        }

        if let Some(bad) = self.verify_authority(response, entry).await {
            return bad;
        }

        if !expansions.is_empty() {
            let Some(keys) = entry.keys().cloned() else {
                return (SecurityStatus::Bogus, Some(Reason::BadKeyCached));
            };
            let (nsecs, nsec3s, zone) = collect_verified_denials(response, &keys, self.now);

            for owner in &expansions {
                let nsec_proof = nsecs
                    .iter()
                    .any(|(o, n, _)| nsec::proves_name_error(o, n, owner, &zone));

                let pairs: Vec<(&Name, &NSEC3)> =
                    nsec3s.iter().map(|(o, n, _)| (o, n)).collect();
                let nsec3_proof = nsec3::Nsec3Set::new(&pairs, &zone)
                    .is_some_and(|set| set.proves_no_closer_match(owner));

                if !nsec_proof && !nsec3_proof {
                    debug!(
                        qname = %question.qname,
                        owner = %owner,
                        "wildcard expansion lacks a no-closer-match proof"
                    );
                    return (SecurityStatus::Bogus, Some(Reason::DenialFailed));
                }
            }
        }

        overall
    }

    /// Validates one RRset under the zone that signed it, resolving that
    /// zone through the chain walker when it differs from the entry at
    /// hand. Unsigned RRsets are acceptable only below a provably
    /// insecure delegation.
    async fn validate_rrset(&mut self, rrset: &Rrset, entry: &KeyEntry) -> Verdict {
        let Some(signer) = rrset.signer_name().cloned() else {
            return match self.ensure_chain(rrset.owner()).await {
                Ok(e) if e.is_null() => (SecurityStatus::Insecure, None),
                Ok(e) if e.is_bad() => (SecurityStatus::Bogus, Some(Reason::BadKeyCached)),
                Ok(_) => (SecurityStatus::Bogus, Some(Reason::MissingSignature)),
                Err(Reason::NoTrustAnchor) => {
                    (SecurityStatus::Indeterminate, Some(Reason::NoTrustAnchor))
                }
                Err(reason) => (SecurityStatus::Bogus, Some(reason)),
            };
        };

        let keys_entry = if signer == *entry.zone() {
            entry.clone()
        } else {
            match self.ensure_chain(&signer).await {
                Ok(e) => e,
                Err(Reason::NoTrustAnchor) => {
                    return (SecurityStatus::Indeterminate, Some(Reason::NoTrustAnchor))
                }
                Err(reason) => return (SecurityStatus::Bogus, Some(reason)),
            }
        };

        if keys_entry.is_null() {
            return (SecurityStatus::Insecure, None);
        }
        let Some(keys) = keys_entry.keys() else {
            return (SecurityStatus::Bogus, Some(Reason::BadKeyCached));
        };

        match verify::verify_rrset(rrset, keys, self.now) {
            Ok(()) => (SecurityStatus::Secure, None),
            Err(reason) => (SecurityStatus::Bogus, Some(reason)),
        }
    }

    /// Verifies the signed authority RRsets. Unsigned NS sets pass as
    /// delegation pointers; any signed RRset that fails to verify makes
    /// the response bogus.
    async fn verify_authority(
        &mut self,
        response: &mut SecMessage,
        entry: &KeyEntry,
    ) -> Option<Verdict> {
        for idx in 0..response.authority().len() {
            let rrset = response.authority()[idx].rrset().clone();

            if !rrset.is_signed() {
                if rrset.rtype() == RecordType::NS {
                    trace!(owner = %rrset.owner(), "unsigned NS delegation in authority");
                    continue;
                }
                debug!(owner = %rrset.owner(), rtype = %rrset.rtype(), "unsigned authority RRset");
                return Some((SecurityStatus::Bogus, Some(Reason::MissingSignature)));
            }

            let verdict = self.validate_rrset(&rrset, entry).await;
            response.authority_mut()[idx].upgrade(verdict.0);
            if verdict.0 == SecurityStatus::Bogus {
                debug!(owner = %rrset.owner(), rtype = %rrset.rtype(), "authority RRset failed validation");
                return Some(verdict);
            }
        }
        None
    }

    /// Validates an NXDOMAIN response: the denial RRsets must verify and
    /// prove both the nonexistence of the name and the absence of a
    /// covering wildcard.
    pub(crate) async fn validate_nxdomain(
        &mut self,
        response: &mut SecMessage,
        qname: &Name,
        entry: &KeyEntry,
    ) -> Verdict {
        if let Some(bad) = self.verify_authority(response, entry).await {
            return bad;
        }
        let Some(keys) = entry.keys().cloned() else {
            return (SecurityStatus::Bogus, Some(Reason::BadKeyCached));
        };
        let (nsecs, nsec3s, zone) = collect_verified_denials(response, &keys, self.now);

        // NSEC: one record proving the interval, one proving no wildcard.
        let interval = nsecs
            .iter()
            .any(|(o, n, _)| nsec::proves_name_error(o, n, qname, &zone));
        let no_wildcard = nsecs
            .iter()
            .any(|(o, n, _)| nsec::proves_no_wildcard(o, n, qname, &zone));
        if interval && no_wildcard {
            return (SecurityStatus::Secure, None);
        }

        let pairs: Vec<(&Name, &NSEC3)> = nsec3s.iter().map(|(o, n, _)| (o, n)).collect();
        if let Some(set) = nsec3::Nsec3Set::new(&pairs, &zone) {
            if let Some(verdict) = self.check_nsec3_iterations(&set, &keys) {
                return verdict;
            }
            if set.proves_name_error(qname) {
                // An opt-out span may hide an unsigned delegation, which
                // keeps the name from being provably absent.
                if set.next_closer_opt_out(qname) {
                    return (SecurityStatus::Insecure, None);
                }
                return (SecurityStatus::Secure, None);
            }
        }

        debug!(qname = %qname, "NXDOMAIN without a complete denial proof");
        (SecurityStatus::Bogus, Some(Reason::DenialFailed))
    }

    /// Validates a NODATA response for `(qname, qtype)`.
    pub(crate) async fn validate_nodata(
        &mut self,
        response: &mut SecMessage,
        question: &Question,
        entry: &KeyEntry,
    ) -> Verdict {
        let qname = &question.qname;
        let qtype = question.qtype;

        if let Some(bad) = self.verify_authority(response, entry).await {
            return bad;
        }
        let Some(keys) = entry.keys().cloned() else {
            return (SecurityStatus::Bogus, Some(Reason::BadKeyCached));
        };
        let (nsecs, nsec3s, zone) = collect_verified_denials(response, &keys, self.now);

        for (owner, nsec, _) in &nsecs {
            if !nsec::proves_nodata(owner, nsec, qname, qtype) {
                continue;
            }
            // A wildcard NSEC proves the type absence at the wildcard; the
            // query name itself must additionally be proven nonexistent.
            if owner.is_wildcard() {
                let qname_absent = nsecs
                    .iter()
                    .any(|(o, n, _)| nsec::proves_name_error(o, n, qname, &zone));
                if !qname_absent {
                    continue;
                }
            }
            return (SecurityStatus::Secure, None);
        }

        let pairs: Vec<(&Name, &NSEC3)> = nsec3s.iter().map(|(o, n, _)| (o, n)).collect();
        if let Some(set) = nsec3::Nsec3Set::new(&pairs, &zone) {
            if let Some(verdict) = self.check_nsec3_iterations(&set, &keys) {
                return verdict;
            }
            if set.proves_nodata(qname, qtype) {
                return (SecurityStatus::Secure, None);
            }
            if qtype == RecordType::DS {
                match set.proves_no_ds(qname) {
                    SecurityStatus::Secure => return (SecurityStatus::Secure, None),
                    SecurityStatus::Insecure => return (SecurityStatus::Insecure, None),
                    _ => {}
                }
            }
        }

        debug!(qname = %qname, %qtype, "NODATA without a denial proof");
        (SecurityStatus::Bogus, Some(Reason::DenialFailed))
    }

    /// Applies the per-keysize NSEC3 iteration cap; answers relying on
    /// over-iterated NSEC3 records degrade to insecure.
    fn check_nsec3_iterations(&self, set: &nsec3::Nsec3Set<'_>, keys: &Rrset) -> Option<Verdict> {
        let cap = self
            .validator
            .config
            .max_nsec3_iterations(chain::zone_key_bits(keys));
        if set.iterations() > cap {
            debug!(iterations = set.iterations(), cap, "NSEC3 iteration count above policy cap");
            return Some((
                SecurityStatus::Insecure,
                Some(Reason::Nsec3IterationsExceeded),
            ));
        }
        None
    }
}

/// Collects the authenticated NSEC and NSEC3 records of the authority
/// section, verifying any that are not verified yet under `keys`.
///
/// Returns the records with their entry lifetimes plus the signing zone
/// name. Records signed by other zones or failing verification are left
/// out (and the latter marked bogus).
pub(crate) fn collect_verified_denials(
    response: &mut SecMessage,
    keys: &Rrset,
    now: u32,
) -> (
    Vec<(Name, NSEC, Duration)>,
    Vec<(Name, NSEC3, Duration)>,
    Name,
) {
    let zone = keys.owner().clone();
    let mut nsecs = Vec::new();
    let mut nsec3s = Vec::new();

    for idx in 0..response.authority().len() {
        let rrset = response.authority()[idx].rrset().clone();
        let status = response.authority()[idx].status();

        if !matches!(rrset.rtype(), RecordType::NSEC | RecordType::NSEC3) {
            continue;
        }
        if rrset.signer_name() != Some(&zone) {
            continue;
        }

        let verified = status == SecurityStatus::Secure
            || match verify::verify_rrset(&rrset, keys, now) {
                Ok(()) => {
                    response.authority_mut()[idx].upgrade(SecurityStatus::Secure);
                    true
                }
                Err(reason) => {
                    debug!(owner = %rrset.owner(), %reason, "denial RRset failed verification");
                    response.authority_mut()[idx].upgrade(SecurityStatus::Bogus);
                    false
                }
            };
        if !verified {
            continue;
        }

        let ttl = chain::entry_ttl(&rrset, now);
        match rrset.rtype() {
            RecordType::NSEC => {
                if let Some(nsec) = rrset.as_nsec() {
                    nsecs.push((rrset.owner().clone(), nsec.clone(), ttl));
                }
            }
            RecordType::NSEC3 => {
                if let Some(nsec3) = rrset.as_nsec3() {
                    nsec3s.push((rrset.owner().clone(), nsec3.clone(), ttl));
                }
            }
            _ => unreachable!(),
        }
    }

    (nsecs, nsec3s, zone)
}

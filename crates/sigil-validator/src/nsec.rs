//! NSEC denial-of-existence proofs (RFC 4035 Section 5.4).
//!
//! Each function answers one narrow question about a single NSEC record
//! and never proves anything by contradiction. The zone apex wrap of the
//! NSEC chain is detected exclusively by the `next` field equalling the
//! signer name.

use crate::status::SecurityStatus;
use sigil_proto::rdata::NSEC;
use sigil_proto::{Name, RecordType};

/// Returns true if `name` falls in the open interval between `owner` and
/// `next`, where `next` equal to the zone name marks the last NSEC of the
/// chain and the interval wraps.
fn covers(owner: &Name, next: &Name, name: &Name, zone: &Name) -> bool {
    name > owner && (name < next || zone == next)
}

/// Determines whether an NSEC proves that `qname` does not exist
/// (the interval part of an NXDOMAIN proof).
pub fn proves_name_error(owner: &Name, nsec: &NSEC, qname: &Name, zone: &Name) -> bool {
    // An NSEC owned by qname proves the name exists.
    if qname == owner {
        return false;
    }

    // An NSEC at an ancestor with a DNAME, or at a delegation (NS without
    // SOA), is being misused to deny names below the cut.
    if qname.is_strict_subdomain_of(owner)
        && (nsec.types.has_type(RecordType::DNAME)
            || (nsec.types.has_type(RecordType::NS) && !nsec.types.has_type(RecordType::SOA)))
    {
        return false;
    }

    covers(owner, &nsec.next_name, qname, zone)
}

/// Determines whether an NSEC proves that no wildcard could have
/// synthesized `qname`: every candidate wildcard between the zone and the
/// query name is checked against the NSEC interval.
pub fn proves_no_wildcard(owner: &Name, nsec: &NSEC, qname: &Name, zone: &Name) -> bool {
    let depth = qname.non_root_labels().saturating_sub(zone.non_root_labels());
    for strip in (1..=depth).rev() {
        let Ok(wc) = qname.wild(strip) else {
            continue;
        };
        if covers(owner, &nsec.next_name, &wc, zone) {
            return true;
        }
    }
    false
}

/// Determines whether an NSEC proves NODATA for `(qname, qtype)`.
///
/// Covers the exact-owner case (type bitmap rules), the empty non-terminal
/// case, and the wildcard-owner case. The wildcard case additionally needs
/// a proof that `qname` itself does not exist, which is the caller's
/// responsibility.
pub fn proves_nodata(owner: &Name, nsec: &NSEC, qname: &Name, qtype: RecordType) -> bool {
    if owner != qname {
        // Wildcard owner: qname must fall below the purported closest
        // encloser and the type must be absent.
        if owner.is_wildcard() {
            let Some(ce) = owner.parent() else {
                return false;
            };
            return qname.is_strict_subdomain_of(&ce) && !nsec.types.has_type(qtype);
        }

        // Empty non-terminal: the next name hangs below qname, so qname
        // exists but owns no records.
        return nsec.next_name.is_strict_subdomain_of(qname) && qname > owner;
    }

    // The NSEC owner is the query name; the bitmap decides.
    if nsec.types.has_type(qtype) {
        return false;
    }
    if nsec.types.has_type(RecordType::CNAME) {
        return false;
    }
    // A delegation point (NS without SOA) should have produced a referral,
    // and a DNAME should have rewritten the query.
    if nsec.types.has_type(RecordType::NS) && !nsec.types.has_type(RecordType::SOA) {
        return false;
    }
    if nsec.types.has_type(RecordType::DNAME) {
        return false;
    }

    true
}

/// Determines what an NSEC owned by `qname` proves about the existence of
/// a DS record there.
///
/// `Secure` means a proven insecure delegation (NS present, DS and SOA
/// absent); `Bogus` means the NSEC contradicts the DS query (SOA marks the
/// child apex, DS should have been answered positively); `Insecure` means
/// the record proves nothing either way.
pub fn proves_no_ds(nsec: &NSEC) -> SecurityStatus {
    if nsec.types.has_type(RecordType::SOA) || nsec.types.has_type(RecordType::DS) {
        return SecurityStatus::Bogus;
    }
    if !nsec.types.has_type(RecordType::NS) {
        return SecurityStatus::Insecure;
    }
    SecurityStatus::Secure
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_proto::rdata::TypeBitmap;
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn nsec(next: &str, types: &[RecordType]) -> NSEC {
        NSEC::new(name(next), TypeBitmap::from_types(types))
    }

    #[test]
    fn name_error_interval() {
        let zone = name("example.com");
        let owner = name("alpha.example.com");
        let rec = nsec("omega.example.com", &[RecordType::A]);

        assert!(proves_name_error(&owner, &rec, &name("missing.example.com"), &zone));
        // Below the interval.
        assert!(!proves_name_error(&owner, &rec, &name("aaa.example.com"), &zone));
        // The owner itself exists.
        assert!(!proves_name_error(&owner, &rec, &owner, &zone));
        // Above the interval without wrap.
        assert!(!proves_name_error(&owner, &rec, &name("zulu.example.com"), &zone));
    }

    #[test]
    fn name_error_wraps_at_apex() {
        let zone = name("example.com");
        let owner = name("zulu.example.com");
        // Last NSEC in the chain: next is the zone apex.
        let rec = nsec("example.com", &[RecordType::A]);

        assert!(proves_name_error(&owner, &rec, &name("zzz.example.com"), &zone));
        assert!(!proves_name_error(&owner, &rec, &name("alpha.example.com"), &zone));
    }

    #[test]
    fn name_error_rejects_delegation_misuse() {
        let zone = name("example.com");
        let owner = name("child.example.com");
        // NSEC at a delegation point (NS, no SOA).
        let rec = nsec("zzz.example.com", &[RecordType::NS]);

        assert!(!proves_name_error(&owner, &rec, &name("a.child.example.com"), &zone));
        // A name beside the delegation is still provable.
        assert!(proves_name_error(&owner, &rec, &name("other.example.com"), &zone));
    }

    #[test]
    fn no_wildcard_proof() {
        let zone = name("example.com");
        // '*' sorts before alphanumeric labels, so the interval from the
        // apex to aaa.example.com covers *.example.com.
        let owner = name("example.com");
        let rec = nsec("aaa.example.com", &[RecordType::SOA]);

        // *.example.com falls between the apex and aaa.example.com.
        assert!(proves_no_wildcard(&owner, &rec, &name("missing.example.com"), &zone));

        let unrelated = nsec("zzz.example.com", &[RecordType::A]);
        assert!(!proves_no_wildcard(&name("yyy.example.com"), &unrelated, &name("missing.example.com"), &zone));
    }

    #[test]
    fn nodata_exact_owner() {
        let qname = name("www.example.com");
        let rec = nsec("zzz.example.com", &[RecordType::A, RecordType::TXT]);

        assert!(proves_nodata(&qname, &rec, &qname, RecordType::MX));
        // Type present: no NODATA.
        assert!(!proves_nodata(&qname, &rec, &qname, RecordType::A));
    }

    #[test]
    fn nodata_rejects_cname_and_cut() {
        let qname = name("www.example.com");

        let with_cname = nsec("zzz.example.com", &[RecordType::CNAME]);
        assert!(!proves_nodata(&qname, &with_cname, &qname, RecordType::MX));

        let delegation = nsec("zzz.example.com", &[RecordType::NS]);
        assert!(!proves_nodata(&qname, &delegation, &qname, RecordType::MX));

        // Zone apex (NS plus SOA) is fine.
        let apex = nsec("zzz.example.com", &[RecordType::NS, RecordType::SOA]);
        assert!(proves_nodata(&qname, &apex, &qname, RecordType::MX));

        let dname = nsec("zzz.example.com", &[RecordType::DNAME]);
        assert!(!proves_nodata(&qname, &dname, &qname, RecordType::MX));
    }

    #[test]
    fn nodata_empty_non_terminal() {
        let qname = name("ent.example.com");
        let owner = name("alpha.example.com");
        // The next name hangs below qname: qname is an ENT.
        let rec = nsec("a.ent.example.com", &[RecordType::A]);
        assert!(proves_nodata(&owner, &rec, &qname, RecordType::A));

        // Next name elsewhere proves nothing.
        let other = nsec("zzz.example.com", &[RecordType::A]);
        assert!(!proves_nodata(&owner, &other, &qname, RecordType::A));
    }

    #[test]
    fn nodata_wildcard_owner() {
        let owner = name("*.example.com");
        let rec = nsec("zzz.example.com", &[RecordType::A]);

        assert!(proves_nodata(&owner, &rec, &name("missing.example.com"), RecordType::MX));
        assert!(!proves_nodata(&owner, &rec, &name("missing.example.com"), RecordType::A));
        // qname not below the closest encloser.
        assert!(!proves_nodata(&owner, &rec, &name("missing.example.org"), RecordType::MX));
    }

    #[test]
    fn no_ds_trichotomy() {
        // Insecure delegation proven: NS without DS or SOA.
        assert_eq!(
            proves_no_ds(&nsec("z.example.com", &[RecordType::NS])),
            SecurityStatus::Secure
        );
        // SOA: answer came from the child side of the cut.
        assert_eq!(
            proves_no_ds(&nsec("z.example.com", &[RecordType::NS, RecordType::SOA])),
            SecurityStatus::Bogus
        );
        // DS in the bitmap contradicts the denial.
        assert_eq!(
            proves_no_ds(&nsec("z.example.com", &[RecordType::NS, RecordType::DS])),
            SecurityStatus::Bogus
        );
        // No NS: proves nothing.
        assert_eq!(
            proves_no_ds(&nsec("z.example.com", &[RecordType::A])),
            SecurityStatus::Insecure
        );
    }
}

//! Add-Pairing, Remove-Pairing and List-Pairings. Each runs over an
//! already-established (encrypted) Pair-Verify session; this module
//! only builds and parses the TLV bodies, the transport is responsible
//! for wrapping them in the session's AEAD frames.

use crate::message::{expect_state, require_value};
use crate::tag::{self, Method, Permission};
use hap_core::{Error, Result};
use hap_tlv::{decode, encode, Tlv8, TlvItem};

/// Build the Add-Pairing request body.
pub fn add_pairing_request(identifier: &[u8], long_term_public_key: &[u8; 32], permissions: Permission) -> Vec<u8> {
    let tlv = Tlv8::new()
        .push(tag::STATE, vec![1])
        .push(tag::METHOD, vec![Method::AddPairing as u8])
        .push(tag::IDENTIFIER, identifier.to_vec())
        .push(tag::PUBLIC_KEY, long_term_public_key.to_vec())
        .push(tag::PERMISSIONS, vec![permissions as u8]);
    encode(&tlv)
}

/// Parse and validate an Add-Pairing response body.
pub fn parse_add_pairing_response(body: &[u8]) -> Result<()> {
    let tlv = decode(body)?;
    expect_state(&tlv, 2)
}

/// Build the Remove-Pairing request body.
pub fn remove_pairing_request(identifier: &[u8]) -> Vec<u8> {
    let tlv = Tlv8::new()
        .push(tag::STATE, vec![1])
        .push(tag::METHOD, vec![Method::RemovePairing as u8])
        .push(tag::IDENTIFIER, identifier.to_vec());
    encode(&tlv)
}

/// Parse and validate a Remove-Pairing response body.
pub fn parse_remove_pairing_response(body: &[u8]) -> Result<()> {
    let tlv = decode(body)?;
    expect_state(&tlv, 2)
}

/// Build the List-Pairings request body.
pub fn list_pairings_request() -> Vec<u8> {
    let tlv = Tlv8::new().push(tag::STATE, vec![1]).push(tag::METHOD, vec![Method::ListPairings as u8]);
    encode(&tlv)
}

/// One entry of a List-Pairings response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingEntry {
    pub identifier: Vec<u8>,
    pub public_key: Vec<u8>,
    pub permissions: u8,
}

/// Parse a List-Pairings response body. Each entry's `Identifier`,
/// `PublicKey` and `Permissions` tags are zipped positionally; a
/// malformed response where these three lists disagree in length is
/// rejected rather than silently truncated.
pub fn parse_list_pairings_response(body: &[u8]) -> Result<Vec<PairingEntry>> {
    let tlv = decode(body)?;
    expect_state(&tlv, 2)?;

    let identifiers = as_list(&tlv, tag::IDENTIFIER, "Identifier")?;
    let public_keys = as_list(&tlv, tag::PUBLIC_KEY, "PublicKey")?;
    let permissions = as_list(&tlv, tag::PERMISSIONS, "Permissions")?;

    if identifiers.len() != public_keys.len() || identifiers.len() != permissions.len() {
        return Err(Error::protocol("List-Pairings response has mismatched entry counts"));
    }

    identifiers
        .into_iter()
        .zip(public_keys)
        .zip(permissions)
        .map(|((identifier, public_key), permission)| {
            let permissions = *permission
                .first()
                .ok_or_else(|| Error::protocol("List-Pairings entry has empty Permissions value"))?;
            Ok(PairingEntry { identifier: identifier.to_vec(), public_key: public_key.to_vec(), permissions })
        })
        .collect()
}

/// A tag present once decodes as a single-element list; present more
/// than once (separated by `0xFF`) decodes as a multi-element list.
fn as_list<'a>(tlv: &'a Tlv8, t: u8, name: &str) -> Result<Vec<&'a [u8]>> {
    match tlv.get(t) {
        Some(TlvItem::Value(v)) => Ok(vec![v.as_slice()]),
        Some(TlvItem::List(values)) => Ok(values.iter().map(Vec::as_slice).collect()),
        None => Err(Error::protocol(format!("List-Pairings response missing {name} tag"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_pairing_request_carries_method_and_permissions() {
        let body = add_pairing_request(b"controller-1", &[7u8; 32], Permission::Admin);
        let tlv = decode(&body).unwrap();
        assert_eq!(tlv.get_value(tag::METHOD), Some(&[Method::AddPairing as u8][..]));
        assert_eq!(tlv.get_value(tag::PERMISSIONS), Some(&[Permission::Admin as u8][..]));
    }

    #[test]
    fn parse_list_pairings_response_zips_single_entry() {
        let body = encode(
            &Tlv8::new()
                .push(tag::STATE, vec![2])
                .push(tag::IDENTIFIER, b"controller-1".to_vec())
                .push(tag::PUBLIC_KEY, vec![1u8; 32])
                .push(tag::PERMISSIONS, vec![Permission::Admin as u8]),
        );
        let entries = parse_list_pairings_response(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].permissions, Permission::Admin as u8);
    }

    #[test]
    fn parse_list_pairings_response_zips_multiple_entries() {
        let body = encode(
            &Tlv8::new()
                .push(tag::STATE, vec![2])
                .push_list(tag::IDENTIFIER, vec![b"c1".to_vec(), b"c2".to_vec()])
                .push_list(tag::PUBLIC_KEY, vec![vec![1u8; 32], vec![2u8; 32]])
                .push_list(tag::PERMISSIONS, vec![vec![Permission::Admin as u8], vec![Permission::User as u8]]),
        );
        let entries = parse_list_pairings_response(&body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].identifier, b"c2".to_vec());
        assert_eq!(entries[1].permissions, Permission::User as u8);
    }

    #[test]
    fn parse_list_pairings_response_rejects_mismatched_lengths() {
        let body = encode(
            &Tlv8::new()
                .push(tag::STATE, vec![2])
                .push_list(tag::IDENTIFIER, vec![b"c1".to_vec(), b"c2".to_vec()])
                .push(tag::PUBLIC_KEY, vec![1u8; 32])
                .push(tag::PERMISSIONS, vec![Permission::Admin as u8]),
        );
        assert!(parse_list_pairings_response(&body).is_err());
    }

    #[test]
    fn parse_remove_pairing_response_rejects_accessory_error() {
        let body = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::ERROR, vec![4]));
        assert!(parse_remove_pairing_response(&body).is_err());
    }
}

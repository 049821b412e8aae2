//! PEM certificate decoding for listener TLS filter chains.

use crate::errors::{Error, Result};
use rustls::pki_types::{pem::PemObject, CertificateDer};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::{FromDer, X509Certificate};

/// Decode every certificate in a PEM bundle, leaf first
pub fn decode_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    CertificateDer::pem_slice_iter(pem)
        .map(|result| {
            result.map_err(|e| Error::structural(format!("unable to decode certificates: {e}")))
        })
        .collect()
}

/// DNS names from the subject alternative name extension of a DER certificate
pub fn dns_names(der: &CertificateDer<'_>) -> Result<Vec<String>> {
    let (_, certificate) = X509Certificate::from_der(der.as_ref())
        .map_err(|e| Error::structural(format!("unable to parse certificate: {e}")))?;

    let mut names = Vec::new();
    for extension in certificate.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = extension.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    names.push(dns.to_string());
                }
            }
        }
    }
    Ok(names)
}

/// SNI names served by a PEM certificate chain, taken from its leaf.
///
/// Fails when the PEM holds no certificate or the leaf has no DNS SAN.
pub fn leaf_server_names(pem: &str) -> Result<Vec<String>> {
    let chain = decode_certificates(pem.as_bytes())?;
    let leaf = chain
        .first()
        .ok_or_else(|| Error::structural("resulting cert chain length was 0"))?;

    let names = dns_names(leaf)?;
    if names.is_empty() {
        return Err(Error::structural(
            "found certificate without SAN. All provided certificates must have at least one SAN",
        ));
    }
    Ok(names)
}

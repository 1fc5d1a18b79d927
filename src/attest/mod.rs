//! VSA attestation
//!
//! Wraps a written predicate in an in-toto statement, signs it through an
//! injected `Signer`, and writes the DSSE envelope next to the predicate.

mod attestor;
mod envelope;
mod signing;
mod statement;

pub use attestor::{attest_vsa, AttestError, AttestedEnvelope, Attestor, ENVELOPE_SUFFIX};
pub use envelope::{pae, Envelope, EnvelopeDecodeError, EnvelopeSignature, IN_TOTO_PAYLOAD_TYPE};
pub use signing::{
    compute_key_fingerprint, decode_signing_key, encode_signing_key, encode_verifying_key,
    generate_keypair, Ed25519Signer, Signer, SigningError, SigningResult,
};
pub use statement::{
    Statement, Subject, SubjectMetadata, GIT_URL_ANNOTATION, STATEMENT_TYPE, VSA_PREDICATE_TYPE,
};

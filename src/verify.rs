//! Candidate authentication: topic scoping, signer trust, freshness
//! pre-filter, identity hash and Schnorr signature.

use secp256k1::{schnorr::Signature, Message, Secp256k1, VerifyOnly, XOnlyPublicKey};
use thiserror::Error;

use crate::{codec::TopicFilter, event::Event, payload::FilterDocument};

/// Reason a candidate event was dropped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Hash)]
pub enum Rejection {
    #[error("wrong event kind")]
    WrongKind,
    #[error("topic tag missing or different")]
    WrongTopic,
    #[error("signer not in allowlist")]
    UntrustedSigner,
    #[error("not newer than the accepted update")]
    Stale,
    #[error("id does not match content hash")]
    IdentityMismatch,
    #[error("signature verification failed")]
    BadSignature,
    #[error("content is not a filter document")]
    MalformedPayload,
}

impl Rejection {
    /// Stable label for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::WrongKind => "wrong-kind",
            Rejection::WrongTopic => "wrong-topic",
            Rejection::UntrustedSigner => "untrusted-signer",
            Rejection::Stale => "stale",
            Rejection::IdentityMismatch => "identity-mismatch",
            Rejection::BadSignature => "bad-signature",
            Rejection::MalformedPayload => "malformed-payload",
        }
    }

    /// Rejections that point at a misbehaving or hostile sender rather than
    /// ordinary relay noise.
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Rejection::UntrustedSigner
                | Rejection::IdentityMismatch
                | Rejection::BadSignature
                | Rejection::MalformedPayload
        )
    }
}

/// Validates candidates against one [`TopicFilter`].
pub struct Verifier {
    topic: TopicFilter,
    secp: Secp256k1<VerifyOnly>,
}

impl Verifier {
    pub fn new(topic: TopicFilter) -> Self {
        Self {
            topic,
            secp: Secp256k1::verification_only(),
        }
    }

    /// Run every check in order, stopping at the first failure.
    ///
    /// `accepted_at` is the `created_at` of the current accepted update, if
    /// any. Stale candidates are dropped before any hashing or signature work.
    pub fn validate(
        &self,
        event: &Event,
        accepted_at: Option<u64>,
    ) -> Result<FilterDocument, Rejection> {
        if event.kind != self.topic.kind {
            return Err(Rejection::WrongKind);
        }
        if !event.has_tag(&self.topic.tag_key, &self.topic.topic) {
            return Err(Rejection::WrongTopic);
        }
        if !self.topic.authorized_signers.is_empty()
            && !self
                .topic
                .authorized_signers
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&event.pubkey))
        {
            return Err(Rejection::UntrustedSigner);
        }
        if accepted_at.is_some_and(|ts| event.created_at <= ts) {
            return Err(Rejection::Stale);
        }
        let hash = event
            .compute_hash()
            .map_err(|_| Rejection::IdentityMismatch)?;
        if hex::encode(hash) != event.id {
            return Err(Rejection::IdentityMismatch);
        }
        self.verify_signature(event, &hash)
            .ok_or(Rejection::BadSignature)?;
        FilterDocument::parse(&event.content).map_err(|_| Rejection::MalformedPayload)
    }

    /// Schnorr verification over the id bytes. Any decoding or library error
    /// counts as a failed verification.
    fn verify_signature(&self, event: &Event, hash: &[u8; 32]) -> Option<()> {
        let sig_bytes = hex::decode(&event.sig).ok()?;
        let key_bytes = hex::decode(&event.pubkey).ok()?;
        let sig = Signature::from_slice(&sig_bytes).ok()?;
        let pk = XOnlyPublicKey::from_slice(&key_bytes).ok()?;
        let msg = Message::from_digest_slice(hash).ok()?;
        self.secp.verify_schnorr(&sig, &msg, &pk).ok()
    }
}

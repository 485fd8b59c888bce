// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Solana wire formats: transactions, status metas, and the RPC encodings.
//!
//! Nothing here validates chain data; this module only re-frames bytes that
//! were validated upstream when the archives were produced.

pub mod encoding;
pub mod meta;
mod shortvec;
mod transaction;
mod wire;

pub use transaction::{
    encode_transaction, parse_transaction, CompiledInstruction, Message,
    MessageAddressTableLookup, MessageHeader, MessageV0, VersionedMessage, VersionedTransaction,
};
#[cfg(test)]
pub(crate) use transaction::testing;
pub use wire::{Decoder, Encoder};

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum SolanaError {
    #[error("truncated input at byte {0}")]
    Truncated(usize),
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("unknown enum variant {variant} for {what}")]
    UnknownVariant { what: &'static str, variant: u32 },
    #[error("trailing bytes after {0}")]
    TrailingBytes(&'static str),
    #[error("meta did not parse under any known schema")]
    UnknownMetaSchema,
    #[error("zstd: {0}")]
    Zstd(String),
}

impl SolanaError {
    pub fn malformed(what: &'static str, detail: impl fmt::Display) -> Self {
        Self::Malformed {
            what,
            detail: detail.to_string(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

impl FromStr for Pubkey {
    type Err = SolanaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        let len = bs58::decode(s)
            .onto(&mut out)
            .map_err(|e| SolanaError::malformed("pubkey", e))?;
        if len != 32 {
            return Err(SolanaError::malformed("pubkey", format!("{len} bytes")));
        }
        Ok(Self(out))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl FromStr for Signature {
    type Err = SolanaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 64];
        let len = bs58::decode(s)
            .onto(&mut out)
            .map_err(|e| SolanaError::malformed("signature", e))?;
        if len != 64 {
            return Err(SolanaError::malformed("signature", format!("{len} bytes")));
        }
        Ok(Self(out))
    }
}

/// The vote program; structural vote detection compares against it.
pub fn vote_program_id() -> &'static Pubkey {
    static ID: OnceLock<Pubkey> = OnceLock::new();
    ID.get_or_init(|| {
        "Vote111111111111111111111111111111111111111"
            .parse()
            .expect("hardcoded vote program id")
    })
}

/// The two deployed memo programs, v1 and v2.
pub fn memo_program_ids() -> &'static [Pubkey; 2] {
    static IDS: OnceLock<[Pubkey; 2]> = OnceLock::new();
    IDS.get_or_init(|| {
        [
            "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo"
                .parse()
                .expect("hardcoded memo v1 program id"),
            "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr"
                .parse()
                .expect("hardcoded memo v2 program id"),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_base58_roundtrip() {
        let key = Pubkey([7u8; 32]);
        let parsed: Pubkey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn signature_rejects_wrong_length() {
        assert!("abc".parse::<Signature>().is_err());
        let sig = Signature([3u8; 64]);
        assert_eq!(sig.to_string().parse::<Signature>().unwrap(), sig);
    }

    #[test]
    fn known_program_ids_parse() {
        assert_eq!(vote_program_id().to_string().chars().next(), Some('V'));
        assert_eq!(memo_program_ids().len(), 2);
    }
}

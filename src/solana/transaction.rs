// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transaction wire parsing: signatures, legacy and v0 messages, and the
//! structural vote test.

use super::shortvec;
use super::{Pubkey, Signature, SolanaError};

/// Bit marking a versioned (non-legacy) message in its first byte.
const MESSAGE_VERSION_PREFIX: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedTransaction {
    pub signatures: Vec<Signature>,
    pub message: VersionedMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedMessage {
    Legacy(Message),
    V0(MessageV0),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageV0 {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<MessageAddressTableLookup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAddressTableLookup {
    pub account_key: Pubkey,
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

impl VersionedMessage {
    pub fn header(&self) -> &MessageHeader {
        match self {
            Self::Legacy(m) => &m.header,
            Self::V0(m) => &m.header,
        }
    }

    pub fn static_account_keys(&self) -> &[Pubkey] {
        match self {
            Self::Legacy(m) => &m.account_keys,
            Self::V0(m) => &m.account_keys,
        }
    }

    pub fn instructions(&self) -> &[CompiledInstruction] {
        match self {
            Self::Legacy(m) => &m.instructions,
            Self::V0(m) => &m.instructions,
        }
    }

    pub fn recent_blockhash(&self) -> &[u8; 32] {
        match self {
            Self::Legacy(m) => &m.recent_blockhash,
            Self::V0(m) => &m.recent_blockhash,
        }
    }

    /// `None` for legacy, `Some(0)` for v0.
    pub fn version(&self) -> Option<u8> {
        match self {
            Self::Legacy(_) => None,
            Self::V0(_) => Some(0),
        }
    }

    /// The program invoked by `instruction`, if its index is in range.
    pub fn program_id(&self, instruction: &CompiledInstruction) -> Option<&Pubkey> {
        self.static_account_keys()
            .get(usize::from(instruction.program_id_index))
    }
}

impl VersionedTransaction {
    pub fn first_signature(&self) -> Option<&Signature> {
        self.signatures.first()
    }

    /// Structural vote detection: a legacy message with one or two
    /// signatures and exactly one instruction invoking the vote program.
    pub fn is_vote(&self) -> bool {
        let VersionedMessage::Legacy(message) = &self.message else {
            return false;
        };
        if !(1..=2).contains(&self.signatures.len()) {
            return false;
        }
        let [instruction] = message.instructions.as_slice() else {
            return false;
        };
        self.message.program_id(instruction) == Some(super::vote_program_id())
    }

    /// First memo instruction's payload, if any.
    pub fn memo(&self) -> Option<String> {
        let memo_ids = super::memo_program_ids();
        self.message.instructions().iter().find_map(|ix| {
            let program = self.message.program_id(ix)?;
            if memo_ids.contains(program) {
                Some(String::from_utf8_lossy(&ix.data).into_owned())
            } else {
                None
            }
        })
    }
}

pub fn parse_transaction(bytes: &[u8]) -> Result<VersionedTransaction, SolanaError> {
    let mut pos = 0usize;
    let sig_count = shortvec::decode_len(bytes, &mut pos)?;
    let mut signatures = Vec::with_capacity(sig_count);
    for _ in 0..sig_count {
        let raw: [u8; 64] = take(bytes, &mut pos, 64)?
            .try_into()
            .expect("exact length");
        signatures.push(Signature(raw));
    }
    let message = parse_message(bytes, &mut pos)?;
    if pos != bytes.len() {
        return Err(SolanaError::TrailingBytes("transaction"));
    }
    Ok(VersionedTransaction {
        signatures,
        message,
    })
}

fn parse_message(bytes: &[u8], pos: &mut usize) -> Result<VersionedMessage, SolanaError> {
    let first = *bytes.get(*pos).ok_or(SolanaError::Truncated(*pos))?;
    if first & MESSAGE_VERSION_PREFIX == 0 {
        return Ok(VersionedMessage::Legacy(parse_legacy_message(bytes, pos)?));
    }
    let version = first & !MESSAGE_VERSION_PREFIX;
    *pos += 1;
    if version != 0 {
        return Err(SolanaError::malformed(
            "message",
            format!("unsupported version {version}"),
        ));
    }
    let (header, account_keys, recent_blockhash, instructions) = parse_message_body(bytes, pos)?;
    let lookup_count = shortvec::decode_len(bytes, pos)?;
    let mut address_table_lookups = Vec::with_capacity(lookup_count);
    for _ in 0..lookup_count {
        let account_key = Pubkey(
            take(bytes, pos, 32)?
                .try_into()
                .expect("exact length"),
        );
        let writable_indexes = short_byte_vec(bytes, pos)?;
        let readonly_indexes = short_byte_vec(bytes, pos)?;
        address_table_lookups.push(MessageAddressTableLookup {
            account_key,
            writable_indexes,
            readonly_indexes,
        });
    }
    Ok(VersionedMessage::V0(MessageV0 {
        header,
        account_keys,
        recent_blockhash,
        instructions,
        address_table_lookups,
    }))
}

fn parse_legacy_message(bytes: &[u8], pos: &mut usize) -> Result<Message, SolanaError> {
    let (header, account_keys, recent_blockhash, instructions) = parse_message_body(bytes, pos)?;
    Ok(Message {
        header,
        account_keys,
        recent_blockhash,
        instructions,
    })
}

type MessageBody = (
    MessageHeader,
    Vec<Pubkey>,
    [u8; 32],
    Vec<CompiledInstruction>,
);

fn parse_message_body(bytes: &[u8], pos: &mut usize) -> Result<MessageBody, SolanaError> {
    let header = MessageHeader {
        num_required_signatures: take_u8(bytes, pos)?,
        num_readonly_signed_accounts: take_u8(bytes, pos)?,
        num_readonly_unsigned_accounts: take_u8(bytes, pos)?,
    };
    let key_count = shortvec::decode_len(bytes, pos)?;
    let mut account_keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        account_keys.push(Pubkey(
            take(bytes, pos, 32)?.try_into().expect("exact length"),
        ));
    }
    let recent_blockhash: [u8; 32] = take(bytes, pos, 32)?
        .try_into()
        .expect("exact length");
    let ix_count = shortvec::decode_len(bytes, pos)?;
    let mut instructions = Vec::with_capacity(ix_count);
    for _ in 0..ix_count {
        instructions.push(CompiledInstruction {
            program_id_index: take_u8(bytes, pos)?,
            accounts: short_byte_vec(bytes, pos)?,
            data: short_byte_vec(bytes, pos)?,
        });
    }
    Ok((header, account_keys, recent_blockhash, instructions))
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], SolanaError> {
    let out = bytes
        .get(*pos..*pos + n)
        .ok_or(SolanaError::Truncated(*pos))?;
    *pos += n;
    Ok(out)
}

fn take_u8(bytes: &[u8], pos: &mut usize) -> Result<u8, SolanaError> {
    Ok(take(bytes, pos, 1)?[0])
}

fn short_byte_vec(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, SolanaError> {
    let len = shortvec::decode_len(bytes, pos)?;
    Ok(take(bytes, pos, len)?.to_vec())
}

/// Serialize a transaction back to wire bytes. Mirrors [`parse_transaction`]
/// bit for bit; the server itself only reads, the write path exists for the
/// index builders' fixtures and tests.
pub fn encode_transaction(tx: &VersionedTransaction) -> Vec<u8> {
    let mut out = Vec::new();
    shortvec::encode_len(tx.signatures.len() as u16, &mut out);
    for sig in &tx.signatures {
        out.extend_from_slice(&sig.0);
    }
    match &tx.message {
        VersionedMessage::Legacy(m) => {
            encode_message_body(&mut out, &m.header, &m.account_keys, &m.recent_blockhash, &m.instructions);
        }
        VersionedMessage::V0(m) => {
            out.push(MESSAGE_VERSION_PREFIX);
            encode_message_body(&mut out, &m.header, &m.account_keys, &m.recent_blockhash, &m.instructions);
            shortvec::encode_len(m.address_table_lookups.len() as u16, &mut out);
            for lookup in &m.address_table_lookups {
                out.extend_from_slice(&lookup.account_key.0);
                shortvec::encode_len(lookup.writable_indexes.len() as u16, &mut out);
                out.extend_from_slice(&lookup.writable_indexes);
                shortvec::encode_len(lookup.readonly_indexes.len() as u16, &mut out);
                out.extend_from_slice(&lookup.readonly_indexes);
            }
        }
    }
    out
}

fn encode_message_body(
    out: &mut Vec<u8>,
    header: &MessageHeader,
    account_keys: &[Pubkey],
    recent_blockhash: &[u8; 32],
    instructions: &[CompiledInstruction],
) {
    out.push(header.num_required_signatures);
    out.push(header.num_readonly_signed_accounts);
    out.push(header.num_readonly_unsigned_accounts);
    shortvec::encode_len(account_keys.len() as u16, out);
    for key in account_keys {
        out.extend_from_slice(&key.0);
    }
    out.extend_from_slice(recent_blockhash);
    shortvec::encode_len(instructions.len() as u16, out);
    for ix in instructions {
        out.push(ix.program_id_index);
        shortvec::encode_len(ix.accounts.len() as u16, out);
        out.extend_from_slice(&ix.accounts);
        shortvec::encode_len(ix.data.len() as u16, out);
        out.extend_from_slice(&ix.data);
    }
}

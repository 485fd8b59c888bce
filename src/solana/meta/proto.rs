// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Current protobuf status-meta schema (`confirmed_block` messages), kept
//! in-tree in generated style and read with `quick-protobuf`.

#![allow(clippy::all)]

use quick_protobuf::sizeofs::*;
use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Result, Writer, WriterBackend};

#[derive(Debug, Default, PartialEq, Clone)]
pub struct TransactionError {
    pub err: Vec<u8>,
}

impl<'a> MessageRead<'a> for TransactionError {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.err = r.read_bytes(bytes)?.to_owned(),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for TransactionError {
    fn get_size(&self) -> usize {
        0 + if self.err.is_empty() {
            0
        } else {
            1 + sizeof_len(self.err.len())
        }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if !self.err.is_empty() {
            w.write_with_tag(10, |w| w.write_bytes(&self.err))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct InnerInstruction {
    pub program_id_index: u32,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
    pub stack_height: Option<u32>,
}

impl<'a> MessageRead<'a> for InnerInstruction {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.program_id_index = r.read_uint32(bytes)?,
                Ok(18) => msg.accounts = r.read_bytes(bytes)?.to_owned(),
                Ok(26) => msg.data = r.read_bytes(bytes)?.to_owned(),
                Ok(32) => msg.stack_height = Some(r.read_uint32(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for InnerInstruction {
    fn get_size(&self) -> usize {
        0 + if self.program_id_index == 0u32 {
            0
        } else {
            1 + sizeof_varint(u64::from(self.program_id_index))
        } + if self.accounts.is_empty() {
            0
        } else {
            1 + sizeof_len(self.accounts.len())
        } + if self.data.is_empty() {
            0
        } else {
            1 + sizeof_len(self.data.len())
        } + self
            .stack_height
            .map_or(0, |m| 1 + sizeof_varint(u64::from(m)))
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.program_id_index != 0u32 {
            w.write_with_tag(8, |w| w.write_uint32(self.program_id_index))?;
        }
        if !self.accounts.is_empty() {
            w.write_with_tag(18, |w| w.write_bytes(&self.accounts))?;
        }
        if !self.data.is_empty() {
            w.write_with_tag(26, |w| w.write_bytes(&self.data))?;
        }
        if let Some(ref s) = self.stack_height {
            w.write_with_tag(32, |w| w.write_uint32(*s))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct InnerInstructions {
    pub index: u32,
    pub instructions: Vec<InnerInstruction>,
}

impl<'a> MessageRead<'a> for InnerInstructions {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.index = r.read_uint32(bytes)?,
                Ok(18) => msg.instructions.push(r.read_message::<InnerInstruction>(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for InnerInstructions {
    fn get_size(&self) -> usize {
        0 + if self.index == 0u32 {
            0
        } else {
            1 + sizeof_varint(u64::from(self.index))
        } + self
            .instructions
            .iter()
            .map(|s| 1 + sizeof_len(s.get_size()))
            .sum::<usize>()
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.index != 0u32 {
            w.write_with_tag(8, |w| w.write_uint32(self.index))?;
        }
        for s in &self.instructions {
            w.write_with_tag(18, |w| w.write_message(s))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct UiTokenAmount {
    pub ui_amount: f64,
    pub decimals: u32,
    pub amount: String,
    pub ui_amount_string: String,
}

impl<'a> MessageRead<'a> for UiTokenAmount {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(9) => msg.ui_amount = r.read_double(bytes)?,
                Ok(16) => msg.decimals = r.read_uint32(bytes)?,
                Ok(26) => msg.amount = r.read_string(bytes)?.to_owned(),
                Ok(34) => msg.ui_amount_string = r.read_string(bytes)?.to_owned(),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for UiTokenAmount {
    fn get_size(&self) -> usize {
        0 + if self.ui_amount == 0f64 { 0 } else { 1 + 8 }
            + if self.decimals == 0u32 {
                0
            } else {
                1 + sizeof_varint(u64::from(self.decimals))
            }
            + if self.amount.is_empty() {
                0
            } else {
                1 + sizeof_len(self.amount.len())
            }
            + if self.ui_amount_string.is_empty() {
                0
            } else {
                1 + sizeof_len(self.ui_amount_string.len())
            }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.ui_amount != 0f64 {
            w.write_with_tag(9, |w| w.write_double(self.ui_amount))?;
        }
        if self.decimals != 0u32 {
            w.write_with_tag(16, |w| w.write_uint32(self.decimals))?;
        }
        if !self.amount.is_empty() {
            w.write_with_tag(26, |w| w.write_string(&self.amount))?;
        }
        if !self.ui_amount_string.is_empty() {
            w.write_with_tag(34, |w| w.write_string(&self.ui_amount_string))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    pub ui_token_amount: Option<UiTokenAmount>,
    pub owner: String,
    pub program_id: String,
}

impl<'a> MessageRead<'a> for TokenBalance {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.account_index = r.read_uint32(bytes)?,
                Ok(18) => msg.mint = r.read_string(bytes)?.to_owned(),
                Ok(26) => msg.ui_token_amount = Some(r.read_message::<UiTokenAmount>(bytes)?),
                Ok(34) => msg.owner = r.read_string(bytes)?.to_owned(),
                Ok(42) => msg.program_id = r.read_string(bytes)?.to_owned(),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for TokenBalance {
    fn get_size(&self) -> usize {
        0 + if self.account_index == 0u32 {
            0
        } else {
            1 + sizeof_varint(u64::from(self.account_index))
        } + if self.mint.is_empty() {
            0
        } else {
            1 + sizeof_len(self.mint.len())
        } + self
            .ui_token_amount
            .as_ref()
            .map_or(0, |m| 1 + sizeof_len(m.get_size()))
            + if self.owner.is_empty() {
                0
            } else {
                1 + sizeof_len(self.owner.len())
            }
            + if self.program_id.is_empty() {
                0
            } else {
                1 + sizeof_len(self.program_id.len())
            }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if self.account_index != 0u32 {
            w.write_with_tag(8, |w| w.write_uint32(self.account_index))?;
        }
        if !self.mint.is_empty() {
            w.write_with_tag(18, |w| w.write_string(&self.mint))?;
        }
        if let Some(ref s) = self.ui_token_amount {
            w.write_with_tag(26, |w| w.write_message(s))?;
        }
        if !self.owner.is_empty() {
            w.write_with_tag(34, |w| w.write_string(&self.owner))?;
        }
        if !self.program_id.is_empty() {
            w.write_with_tag(42, |w| w.write_string(&self.program_id))?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RewardType {
    Unspecified = 0,
    Fee = 1,
    Rent = 2,
    Staking = 3,
    Voting = 4,
}

impl Default for RewardType {
    fn default() -> Self {
        RewardType::Unspecified
    }
}

impl From<i32> for RewardType {
    fn from(i: i32) -> Self {
        match i {
            1 => RewardType::Fee,
            2 => RewardType::Rent,
            3 => RewardType::Staking,
            4 => RewardType::Voting,
            _ => RewardType::Unspecified,
        }
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Reward {
    pub pubkey: String,
    pub lamports: i64,
    pub post_balance: u64,
    pub reward_type: RewardType,
    pub commission: String,
}

impl<'a> MessageRead<'a> for Reward {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.pubkey = r.read_string(bytes)?.to_owned(),
                Ok(16) => msg.lamports = r.read_int64(bytes)?,
                Ok(24) => msg.post_balance = r.read_uint64(bytes)?,
                Ok(32) => msg.reward_type = r.read_enum(bytes)?,
                Ok(42) => msg.commission = r.read_string(bytes)?.to_owned(),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for Reward {
    fn get_size(&self) -> usize {
        0 + if self.pubkey.is_empty() {
            0
        } else {
            1 + sizeof_len(self.pubkey.len())
        } + if self.lamports == 0i64 {
            0
        } else {
            1 + sizeof_varint(self.lamports as u64)
        } + if self.post_balance == 0u64 {
            0
        } else {
            1 + sizeof_varint(self.post_balance)
        } + if self.reward_type == RewardType::Unspecified {
            0
        } else {
            1 + sizeof_varint(self.reward_type as u64)
        } + if self.commission.is_empty() {
            0
        } else {
            1 + sizeof_len(self.commission.len())
        }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if !self.pubkey.is_empty() {
            w.write_with_tag(10, |w| w.write_string(&self.pubkey))?;
        }
        if self.lamports != 0i64 {
            w.write_with_tag(16, |w| w.write_int64(self.lamports))?;
        }
        if self.post_balance != 0u64 {
            w.write_with_tag(24, |w| w.write_uint64(self.post_balance))?;
        }
        if self.reward_type != RewardType::Unspecified {
            w.write_with_tag(32, |w| w.write_enum(self.reward_type as i32))?;
        }
        if !self.commission.is_empty() {
            w.write_with_tag(42, |w| w.write_string(&self.commission))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Rewards {
    pub rewards: Vec<Reward>,
}

impl<'a> MessageRead<'a> for Rewards {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.rewards.push(r.read_message::<Reward>(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for Rewards {
    fn get_size(&self) -> usize {
        0 + self
            .rewards
            .iter()
            .map(|s| 1 + sizeof_len(s.get_size()))
            .sum::<usize>()
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        for s in &self.rewards {
            w.write_with_tag(10, |w| w.write_message(s))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct ReturnData {
    pub program_id: Vec<u8>,
    pub data: Vec<u8>,
}

impl<'a> MessageRead<'a> for ReturnData {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.program_id = r.read_bytes(bytes)?.to_owned(),
                Ok(18) => msg.data = r.read_bytes(bytes)?.to_owned(),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for ReturnData {
    fn get_size(&self) -> usize {
        0 + if self.program_id.is_empty() {
            0
        } else {
            1 + sizeof_len(self.program_id.len())
        } + if self.data.is_empty() {
            0
        } else {
            1 + sizeof_len(self.data.len())
        }
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if !self.program_id.is_empty() {
            w.write_with_tag(10, |w| w.write_bytes(&self.program_id))?;
        }
        if !self.data.is_empty() {
            w.write_with_tag(18, |w| w.write_bytes(&self.data))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
pub struct TransactionStatusMeta {
    pub err: Option<TransactionError>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub inner_instructions: Vec<InnerInstructions>,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    pub rewards: Vec<Reward>,
    pub inner_instructions_none: bool,
    pub log_messages_none: bool,
    pub loaded_writable_addresses: Vec<Vec<u8>>,
    pub loaded_readonly_addresses: Vec<Vec<u8>>,
    pub return_data: Option<ReturnData>,
    pub return_data_none: bool,
    pub compute_units_consumed: Option<u64>,
}

impl<'a> MessageRead<'a> for TransactionStatusMeta {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> Result<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.err = Some(r.read_message::<TransactionError>(bytes)?),
                Ok(16) => msg.fee = r.read_uint64(bytes)?,
                Ok(26) => {
                    msg.pre_balances = r.read_packed(bytes, |r, bytes| r.read_uint64(bytes))?
                }
                Ok(24) => msg.pre_balances.push(r.read_uint64(bytes)?),
                Ok(34) => {
                    msg.post_balances = r.read_packed(bytes, |r, bytes| r.read_uint64(bytes))?
                }
                Ok(32) => msg.post_balances.push(r.read_uint64(bytes)?),
                Ok(42) => msg
                    .inner_instructions
                    .push(r.read_message::<InnerInstructions>(bytes)?),
                Ok(50) => msg.log_messages.push(r.read_string(bytes)?.to_owned()),
                Ok(58) => msg
                    .pre_token_balances
                    .push(r.read_message::<TokenBalance>(bytes)?),
                Ok(66) => msg
                    .post_token_balances
                    .push(r.read_message::<TokenBalance>(bytes)?),
                Ok(74) => msg.rewards.push(r.read_message::<Reward>(bytes)?),
                Ok(80) => msg.inner_instructions_none = r.read_bool(bytes)?,
                Ok(88) => msg.log_messages_none = r.read_bool(bytes)?,
                Ok(98) => msg
                    .loaded_writable_addresses
                    .push(r.read_bytes(bytes)?.to_owned()),
                Ok(106) => msg
                    .loaded_readonly_addresses
                    .push(r.read_bytes(bytes)?.to_owned()),
                Ok(114) => msg.return_data = Some(r.read_message::<ReturnData>(bytes)?),
                Ok(120) => msg.return_data_none = r.read_bool(bytes)?,
                Ok(128) => msg.compute_units_consumed = Some(r.read_uint64(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl MessageWrite for TransactionStatusMeta {
    fn get_size(&self) -> usize {
        0 + self.err.as_ref().map_or(0, |m| 1 + sizeof_len(m.get_size()))
            + if self.fee == 0u64 {
                0
            } else {
                1 + sizeof_varint(self.fee)
            }
            + if self.pre_balances.is_empty() {
                0
            } else {
                1 + sizeof_len(
                    self.pre_balances
                        .iter()
                        .map(|s| sizeof_varint(*s))
                        .sum::<usize>(),
                )
            }
            + if self.post_balances.is_empty() {
                0
            } else {
                1 + sizeof_len(
                    self.post_balances
                        .iter()
                        .map(|s| sizeof_varint(*s))
                        .sum::<usize>(),
                )
            }
            + self
                .inner_instructions
                .iter()
                .map(|s| 1 + sizeof_len(s.get_size()))
                .sum::<usize>()
            + self
                .log_messages
                .iter()
                .map(|s| 1 + sizeof_len(s.len()))
                .sum::<usize>()
            + self
                .pre_token_balances
                .iter()
                .map(|s| 1 + sizeof_len(s.get_size()))
                .sum::<usize>()
            + self
                .post_token_balances
                .iter()
                .map(|s| 1 + sizeof_len(s.get_size()))
                .sum::<usize>()
            + self
                .rewards
                .iter()
                .map(|s| 1 + sizeof_len(s.get_size()))
                .sum::<usize>()
            + if !self.inner_instructions_none {
                0
            } else {
                1 + sizeof_varint(u64::from(self.inner_instructions_none))
            }
            + if !self.log_messages_none {
                0
            } else {
                1 + sizeof_varint(u64::from(self.log_messages_none))
            }
            + self
                .loaded_writable_addresses
                .iter()
                .map(|s| 1 + sizeof_len(s.len()))
                .sum::<usize>()
            + self
                .loaded_readonly_addresses
                .iter()
                .map(|s| 1 + sizeof_len(s.len()))
                .sum::<usize>()
            + self
                .return_data
                .as_ref()
                .map_or(0, |m| 1 + sizeof_len(m.get_size()))
            + if !self.return_data_none {
                0
            } else {
                1 + sizeof_varint(u64::from(self.return_data_none))
            }
            + self
                .compute_units_consumed
                .map_or(0, |m| 2 + sizeof_varint(m))
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> Result<()> {
        if let Some(ref s) = self.err {
            w.write_with_tag(10, |w| w.write_message(s))?;
        }
        if self.fee != 0u64 {
            w.write_with_tag(16, |w| w.write_uint64(self.fee))?;
        }
        w.write_packed_with_tag(
            26,
            &self.pre_balances,
            |w, m| w.write_uint64(*m),
            &|m| sizeof_varint(*m),
        )?;
        w.write_packed_with_tag(
            34,
            &self.post_balances,
            |w, m| w.write_uint64(*m),
            &|m| sizeof_varint(*m),
        )?;
        for s in &self.inner_instructions {
            w.write_with_tag(42, |w| w.write_message(s))?;
        }
        for s in &self.log_messages {
            w.write_with_tag(50, |w| w.write_string(s))?;
        }
        for s in &self.pre_token_balances {
            w.write_with_tag(58, |w| w.write_message(s))?;
        }
        for s in &self.post_token_balances {
            w.write_with_tag(66, |w| w.write_message(s))?;
        }
        for s in &self.rewards {
            w.write_with_tag(74, |w| w.write_message(s))?;
        }
        if self.inner_instructions_none {
            w.write_with_tag(80, |w| w.write_bool(self.inner_instructions_none))?;
        }
        if self.log_messages_none {
            w.write_with_tag(88, |w| w.write_bool(self.log_messages_none))?;
        }
        for s in &self.loaded_writable_addresses {
            w.write_with_tag(98, |w| w.write_bytes(s))?;
        }
        for s in &self.loaded_readonly_addresses {
            w.write_with_tag(106, |w| w.write_bytes(s))?;
        }
        if let Some(ref s) = self.return_data {
            w.write_with_tag(114, |w| w.write_message(s))?;
        }
        if self.return_data_none {
            w.write_with_tag(120, |w| w.write_bool(self.return_data_none))?;
        }
        if let Some(ref s) = self.compute_units_consumed {
            w.write_with_tag(128, |w| w.write_uint64(*s))?;
        }
        Ok(())
    }
}

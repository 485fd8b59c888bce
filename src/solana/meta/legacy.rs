// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The two pre-protobuf status meta layouts.
//!
//! "Latest" is the last bincode layout before the protobuf migration;
//! "oldest" is the original four-field one. The oldest layout is a strict
//! prefix of the latest, so both decoders demand full consumption — that is
//! what keeps `parse_any_meta`'s ordered probing unambiguous.

use super::error::{decode_status, encode_status, TransactionError};
use crate::solana::wire::{Decoder, Encoder};
use crate::solana::SolanaError;

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyCompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyInnerInstructions {
    pub index: u8,
    pub instructions: Vec<LegacyCompiledInstruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyUiTokenAmount {
    pub ui_amount: f64,
    pub decimals: u8,
    pub amount: String,
    pub ui_amount_string: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTokenBalance {
    pub account_index: u8,
    pub mint: String,
    pub ui_token_amount: LegacyUiTokenAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyRewardType {
    Fee,
    Rent,
    Staking,
    Voting,
}

impl LegacyRewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fee => "fee",
            Self::Rent => "rent",
            Self::Staking => "staking",
            Self::Voting => "voting",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyReward {
    pub pubkey: String,
    pub lamports: i64,
    pub post_balance: u64,
    pub reward_type: Option<LegacyRewardType>,
    pub commission: Option<u8>,
}

/// Last bincode layout before the protobuf migration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyMetaLatest {
    pub err: Option<TransactionError>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub inner_instructions: Option<Vec<LegacyInnerInstructions>>,
    pub log_messages: Option<Vec<String>>,
    pub pre_token_balances: Option<Vec<LegacyTokenBalance>>,
    pub post_token_balances: Option<Vec<LegacyTokenBalance>>,
    pub rewards: Option<Vec<LegacyReward>>,
}

/// The original four-field layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyMetaOldest {
    pub err: Option<TransactionError>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

fn decode_instruction(d: &mut Decoder<'_>) -> Result<LegacyCompiledInstruction, SolanaError> {
    Ok(LegacyCompiledInstruction {
        program_id_index: d.u8()?,
        accounts: d.byte_vec()?,
        data: d.byte_vec()?,
    })
}

fn decode_inner(d: &mut Decoder<'_>) -> Result<LegacyInnerInstructions, SolanaError> {
    Ok(LegacyInnerInstructions {
        index: d.u8()?,
        instructions: d.vec(decode_instruction)?,
    })
}

fn decode_token_balance(d: &mut Decoder<'_>) -> Result<LegacyTokenBalance, SolanaError> {
    Ok(LegacyTokenBalance {
        account_index: d.u8()?,
        mint: d.string()?,
        ui_token_amount: LegacyUiTokenAmount {
            ui_amount: d.f64()?,
            decimals: d.u8()?,
            amount: d.string()?,
            ui_amount_string: d.string()?,
        },
    })
}

fn decode_reward_type(d: &mut Decoder<'_>) -> Result<LegacyRewardType, SolanaError> {
    match d.u32()? {
        0 => Ok(LegacyRewardType::Fee),
        1 => Ok(LegacyRewardType::Rent),
        2 => Ok(LegacyRewardType::Staking),
        3 => Ok(LegacyRewardType::Voting),
        other => Err(SolanaError::UnknownVariant {
            what: "RewardType",
            variant: other,
        }),
    }
}

fn decode_reward(d: &mut Decoder<'_>) -> Result<LegacyReward, SolanaError> {
    Ok(LegacyReward {
        pubkey: d.string()?,
        lamports: d.i64()?,
        post_balance: d.u64()?,
        reward_type: d.option(decode_reward_type)?,
        commission: d.option(|d| d.u8())?,
    })
}

impl LegacyMetaLatest {
    pub fn decode(bytes: &[u8]) -> Result<Self, SolanaError> {
        let mut d = Decoder::new(bytes);
        let meta = Self {
            err: decode_status(&mut d)?,
            fee: d.u64()?,
            pre_balances: d.vec(|d| d.u64())?,
            post_balances: d.vec(|d| d.u64())?,
            inner_instructions: d.option(|d| d.vec(decode_inner))?,
            log_messages: d.option(|d| d.vec(|d| d.string()))?,
            pre_token_balances: d.option(|d| d.vec(decode_token_balance))?,
            post_token_balances: d.option(|d| d.vec(decode_token_balance))?,
            rewards: d.option(|d| d.vec(decode_reward))?,
        };
        d.finish("legacy-latest meta")?;
        Ok(meta)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut e = Encoder::new();
        encode_status(self.err.as_ref(), &mut e);
        e.u64(self.fee);
        e.vec(&self.pre_balances, |e, v| {
            e.u64(*v);
        });
        e.vec(&self.post_balances, |e, v| {
            e.u64(*v);
        });
        e.option(self.inner_instructions.as_ref(), |e, inner| {
            e.vec(inner, |e, i| {
                e.u8(i.index);
                e.vec(&i.instructions, |e, ix| {
                    e.u8(ix.program_id_index);
                    e.byte_vec(&ix.accounts);
                    e.byte_vec(&ix.data);
                });
            });
        });
        e.option(self.log_messages.as_ref(), |e, logs| {
            e.vec(logs, |e, l| {
                e.string(l);
            });
        });
        e.option(self.pre_token_balances.as_ref(), encode_token_balances);
        e.option(self.post_token_balances.as_ref(), encode_token_balances);
        e.option(self.rewards.as_ref(), |e, rewards| {
            e.vec(rewards, |e, r| {
                e.string(&r.pubkey);
                e.i64(r.lamports);
                e.u64(r.post_balance);
                e.option(r.reward_type.as_ref(), |e, t| {
                    e.u32(match t {
                        LegacyRewardType::Fee => 0,
                        LegacyRewardType::Rent => 1,
                        LegacyRewardType::Staking => 2,
                        LegacyRewardType::Voting => 3,
                    });
                });
                e.option(r.commission.as_ref(), |e, c| {
                    e.u8(*c);
                });
            });
        });
        e.into_bytes()
    }
}

fn encode_token_balances(e: &mut Encoder, balances: &Vec<LegacyTokenBalance>) {
    e.vec(balances, |e, b| {
        e.u8(b.account_index);
        e.string(&b.mint);
        e.f64(b.ui_token_amount.ui_amount);
        e.u8(b.ui_token_amount.decimals);
        e.string(&b.ui_token_amount.amount);
        e.string(&b.ui_token_amount.ui_amount_string);
    });
}

impl LegacyMetaOldest {
    pub fn decode(bytes: &[u8]) -> Result<Self, SolanaError> {
        let mut d = Decoder::new(bytes);
        let meta = Self {
            err: decode_status(&mut d)?,
            fee: d.u64()?,
            pre_balances: d.vec(|d| d.u64())?,
            post_balances: d.vec(|d| d.u64())?,
        };
        d.finish("legacy-oldest meta")?;
        Ok(meta)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut e = Encoder::new();
        encode_status(self.err.as_ref(), &mut e);
        e.u64(self.fee);
        e.vec(&self.pre_balances, |e, v| {
            e.u64(*v);
        });
        e.vec(&self.post_balances, |e, v| {
            e.u64(*v);
        });
        e.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_latest() -> LegacyMetaLatest {
        LegacyMetaLatest {
            err: Some(TransactionError::InstructionError(
                1,
                super::super::error::InstructionError::Custom(9),
            )),
            fee: 5000,
            pre_balances: vec![100, 200],
            post_balances: vec![95, 200],
            inner_instructions: Some(vec![LegacyInnerInstructions {
                index: 0,
                instructions: vec![LegacyCompiledInstruction {
                    program_id_index: 2,
                    accounts: vec![0, 1],
                    data: vec![9, 8, 7],
                }],
            }]),
            log_messages: Some(vec!["Program log: hi".into()]),
            pre_token_balances: Some(vec![LegacyTokenBalance {
                account_index: 1,
                mint: "So11111111111111111111111111111111111111112".into(),
                ui_token_amount: LegacyUiTokenAmount {
                    ui_amount: 1.5,
                    decimals: 9,
                    amount: "1500000000".into(),
                    ui_amount_string: "1.5".into(),
                },
            }]),
            post_token_balances: Some(vec![]),
            rewards: Some(vec![LegacyReward {
                pubkey: "Vote111111111111111111111111111111111111111".into(),
                lamports: -42,
                post_balance: 1_000,
                reward_type: Some(LegacyRewardType::Rent),
                commission: Some(5),
            }]),
        }
    }

    #[test]
    fn latest_roundtrip() {
        let meta = sample_latest();
        let decoded = LegacyMetaLatest::decode(&meta.encode()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn oldest_roundtrip() {
        let meta = LegacyMetaOldest {
            err: None,
            fee: 5000,
            pre_balances: vec![7],
            post_balances: vec![2],
        };
        let decoded = LegacyMetaOldest::decode(&meta.encode()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn latest_decoder_rejects_oldest_bytes() {
        let oldest = LegacyMetaOldest {
            err: None,
            fee: 1,
            pre_balances: vec![],
            post_balances: vec![],
        };
        assert!(LegacyMetaLatest::decode(&oldest.encode()).is_err());
    }

    #[test]
    fn oldest_decoder_rejects_latest_bytes() {
        assert!(matches!(
            LegacyMetaOldest::decode(&sample_latest().encode()),
            Err(SolanaError::TrailingBytes(_))
        ));
    }
}

// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wire encodings for transactions and the meta-shape normalisation the
//! upstream client expects: absent containers become empty ones, inner
//! instruction accounts become integer arrays, instruction data becomes
//! base58, and `status` is derived from `err`.

use base64::Engine;
use serde_json::{json, Value};

use super::meta::{legacy, proto, TxMeta};
use super::{SolanaError, VersionedMessage, VersionedTransaction};

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiEncoding {
    Base58,
    Base64,
    Base64Zstd,
    #[default]
    Json,
    JsonParsed,
}

impl UiEncoding {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "base58" => Some(Self::Base58),
            "base64" => Some(Self::Base64),
            "base64+zstd" => Some(Self::Base64Zstd),
            "json" => Some(Self::Json),
            "jsonParsed" => Some(Self::JsonParsed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base58 => "base58",
            Self::Base64 => "base64",
            Self::Base64Zstd => "base64+zstd",
            Self::Json => "json",
            Self::JsonParsed => "jsonParsed",
        }
    }
}

/// Encode raw transaction wire bytes for the response. `jsonParsed` needs
/// the program-aware instruction parser, which is not wired in; requesting
/// it is an unsupported-encoding error rather than a silent downgrade.
pub fn encode_transaction_payload(
    raw: &[u8],
    tx: &VersionedTransaction,
    encoding: UiEncoding,
) -> Result<Value, SolanaError> {
    Ok(match encoding {
        UiEncoding::Base58 => json!([bs58::encode(raw).into_string(), "base58"]),
        UiEncoding::Base64 => json!([BASE64.encode(raw), "base64"]),
        UiEncoding::Base64Zstd => {
            let compressed = zstd::stream::encode_all(raw, 0)
                .map_err(|e| SolanaError::Zstd(e.to_string()))?;
            json!([BASE64.encode(compressed), "base64+zstd"])
        }
        UiEncoding::Json => transaction_to_json(tx),
        UiEncoding::JsonParsed => {
            return Err(SolanaError::malformed(
                "encoding",
                "jsonParsed requires an instruction parser, none is configured",
            ))
        }
    })
}

pub fn transaction_to_json(tx: &VersionedTransaction) -> Value {
    let message = &tx.message;
    let header = message.header();
    let mut msg = json!({
        "header": {
            "numRequiredSignatures": header.num_required_signatures,
            "numReadonlySignedAccounts": header.num_readonly_signed_accounts,
            "numReadonlyUnsignedAccounts": header.num_readonly_unsigned_accounts,
        },
        "accountKeys": message
            .static_account_keys()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>(),
        "recentBlockhash": bs58::encode(message.recent_blockhash()).into_string(),
        "instructions": message
            .instructions()
            .iter()
            .map(|ix| {
                json!({
                    "programIdIndex": ix.program_id_index,
                    "accounts": ix.accounts,
                    "data": bs58::encode(&ix.data).into_string(),
                })
            })
            .collect::<Vec<_>>(),
    });
    if let VersionedMessage::V0(v0) = message {
        msg["addressTableLookups"] = v0
            .address_table_lookups
            .iter()
            .map(|l| {
                json!({
                    "accountKey": l.account_key.to_string(),
                    "writableIndexes": l.writable_indexes,
                    "readonlyIndexes": l.readonly_indexes,
                })
            })
            .collect();
    }
    json!({
        "signatures": tx
            .signatures
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
        "message": msg,
    })
}

/// Normalised UI meta. Every absent container defaults the way the
/// upstream client expects, regardless of which schema the archive stored.
pub fn meta_to_json(meta: &TxMeta) -> Result<Value, SolanaError> {
    let err = meta.err()?;
    let err_value = match &err {
        None => Value::Null,
        Some(e) => serde_json::to_value(e)
            .map_err(|e| SolanaError::malformed("transaction error", e))?,
    };
    let status = match &err {
        None => json!({"Ok": null}),
        Some(_) => json!({"Err": err_value.clone()}),
    };

    let mut out = json!({
        "err": err_value,
        "status": status,
        "fee": meta.fee(),
        "preBalances": [],
        "postBalances": [],
        "innerInstructions": [],
        "logMessages": [],
        "preTokenBalances": [],
        "postTokenBalances": [],
        "rewards": [],
        "loadedAddresses": {"writable": [], "readonly": []},
    });

    match meta {
        TxMeta::Current(m) => {
            out["preBalances"] = json!(m.pre_balances);
            out["postBalances"] = json!(m.post_balances);
            out["innerInstructions"] = m
                .inner_instructions
                .iter()
                .map(proto_inner_to_json)
                .collect();
            out["logMessages"] = json!(m.log_messages);
            out["preTokenBalances"] = m
                .pre_token_balances
                .iter()
                .map(proto_token_balance_to_json)
                .collect();
            out["postTokenBalances"] = m
                .post_token_balances
                .iter()
                .map(proto_token_balance_to_json)
                .collect();
            out["rewards"] = m.rewards.iter().map(proto_reward_to_json).collect();
            let (writable, readonly) = meta.loaded_addresses();
            out["loadedAddresses"] = json!({
                "writable": writable.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                "readonly": readonly.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            });
            if let Some(units) = m.compute_units_consumed {
                out["computeUnitsConsumed"] = json!(units);
            }
            if let Some(return_data) = &m.return_data {
                out["returnData"] = json!({
                    "programId": bs58::encode(&return_data.program_id).into_string(),
                    "data": [BASE64.encode(&return_data.data), "base64"],
                });
            }
        }
        TxMeta::LegacyLatest(m) => {
            out["preBalances"] = json!(m.pre_balances);
            out["postBalances"] = json!(m.post_balances);
            if let Some(inner) = &m.inner_instructions {
                out["innerInstructions"] = inner.iter().map(legacy_inner_to_json).collect();
            }
            if let Some(logs) = &m.log_messages {
                out["logMessages"] = json!(logs);
            }
            if let Some(balances) = &m.pre_token_balances {
                out["preTokenBalances"] =
                    balances.iter().map(legacy_token_balance_to_json).collect();
            }
            if let Some(balances) = &m.post_token_balances {
                out["postTokenBalances"] =
                    balances.iter().map(legacy_token_balance_to_json).collect();
            }
            if let Some(rewards) = &m.rewards {
                out["rewards"] = rewards.iter().map(legacy_reward_to_json).collect();
            }
        }
        TxMeta::LegacyOldest(m) => {
            out["preBalances"] = json!(m.pre_balances);
            out["postBalances"] = json!(m.post_balances);
        }
    }
    Ok(out)
}

fn proto_inner_to_json(inner: &proto::InnerInstructions) -> Value {
    json!({
        "index": inner.index,
        "instructions": inner
            .instructions
            .iter()
            .map(|ix| {
                let mut v = json!({
                    "programIdIndex": ix.program_id_index,
                    "accounts": ix.accounts,
                    "data": bs58::encode(&ix.data).into_string(),
                });
                if let Some(height) = ix.stack_height {
                    v["stackHeight"] = json!(height);
                }
                v
            })
            .collect::<Vec<_>>(),
    })
}

fn legacy_inner_to_json(inner: &legacy::LegacyInnerInstructions) -> Value {
    json!({
        "index": inner.index,
        "instructions": inner
            .instructions
            .iter()
            .map(|ix| {
                json!({
                    "programIdIndex": ix.program_id_index,
                    "accounts": ix.accounts,
                    "data": bs58::encode(&ix.data).into_string(),
                })
            })
            .collect::<Vec<_>>(),
    })
}

fn proto_token_balance_to_json(balance: &proto::TokenBalance) -> Value {
    let amount = balance.ui_token_amount.clone().unwrap_or_default();
    json!({
        "accountIndex": balance.account_index,
        "mint": balance.mint,
        "owner": balance.owner,
        "programId": balance.program_id,
        "uiTokenAmount": {
            "uiAmount": if amount.ui_amount == 0.0 { Value::Null } else { json!(amount.ui_amount) },
            "decimals": amount.decimals,
            "amount": amount.amount,
            "uiAmountString": amount.ui_amount_string,
        },
    })
}

fn legacy_token_balance_to_json(balance: &legacy::LegacyTokenBalance) -> Value {
    json!({
        "accountIndex": balance.account_index,
        "mint": balance.mint,
        "uiTokenAmount": {
            "uiAmount": balance.ui_token_amount.ui_amount,
            "decimals": balance.ui_token_amount.decimals,
            "amount": balance.ui_token_amount.amount,
            "uiAmountString": balance.ui_token_amount.ui_amount_string,
        },
    })
}

fn proto_reward_to_json(reward: &proto::Reward) -> Value {
    json!({
        "pubkey": reward.pubkey,
        "lamports": reward.lamports,
        "postBalance": reward.post_balance,
        "rewardType": match reward.reward_type {
            proto::RewardType::Unspecified => Value::Null,
            proto::RewardType::Fee => json!("fee"),
            proto::RewardType::Rent => json!("rent"),
            proto::RewardType::Staking => json!("staking"),
            proto::RewardType::Voting => json!("voting"),
        },
        "commission": if reward.commission.is_empty() {
            Value::Null
        } else {
            json!(reward.commission)
        },
    })
}

pub fn legacy_reward_to_json(reward: &legacy::LegacyReward) -> Value {
    json!({
        "pubkey": reward.pubkey,
        "lamports": reward.lamports,
        "postBalance": reward.post_balance,
        "rewardType": reward.reward_type.map_or(Value::Null, |t| json!(t.as_str())),
        "commission": reward.commission.map_or(Value::Null, |c| json!(c)),
    })
}

/// Rewards sidecar for the `rewards` field of `getBlock`.
pub fn rewards_to_json(rewards: &proto::Rewards) -> Value {
    rewards.rewards.iter().map(proto_reward_to_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solana::meta::{LegacyMetaOldest, TransactionError};
    use crate::solana::testing::sample_transaction;
    use crate::solana::{encode_transaction, Pubkey};

    fn tx() -> (Vec<u8>, VersionedTransaction) {
        let tx = sample_transaction(Pubkey([1; 32]), Pubkey([2; 32]), 7);
        (encode_transaction(&tx), tx)
    }

    #[test]
    fn binary_encodings_wrap_in_tagged_arrays() {
        let (raw, parsed) = tx();
        let b58 = encode_transaction_payload(&raw, &parsed, UiEncoding::Base58).unwrap();
        assert_eq!(b58[1], "base58");
        assert_eq!(
            bs58::decode(b58[0].as_str().unwrap()).into_vec().unwrap(),
            raw
        );

        let b64 = encode_transaction_payload(&raw, &parsed, UiEncoding::Base64).unwrap();
        assert_eq!(b64[1], "base64");
        assert_eq!(BASE64.decode(b64[0].as_str().unwrap()).unwrap(), raw);

        let zstd_enc =
            encode_transaction_payload(&raw, &parsed, UiEncoding::Base64Zstd).unwrap();
        assert_eq!(zstd_enc[1], "base64+zstd");
        let compressed = BASE64.decode(zstd_enc[0].as_str().unwrap()).unwrap();
        assert_eq!(zstd::stream::decode_all(&compressed[..]).unwrap(), raw);
    }

    #[test]
    fn json_parsed_is_unsupported() {
        let (raw, parsed) = tx();
        assert!(encode_transaction_payload(&raw, &parsed, UiEncoding::JsonParsed).is_err());
    }

    #[test]
    fn json_encoding_exposes_message_fields() {
        let (_, parsed) = tx();
        let v = transaction_to_json(&parsed);
        assert_eq!(v["signatures"].as_array().unwrap().len(), 1);
        assert_eq!(v["message"]["accountKeys"].as_array().unwrap().len(), 2);
        assert_eq!(
            v["message"]["header"]["numRequiredSignatures"].as_u64(),
            Some(1)
        );
        assert!(v["message"]["instructions"][0]["data"].is_string());
        assert!(v["message"].get("addressTableLookups").is_none());
    }

    #[test]
    fn meta_defaults_are_empty_containers() {
        let meta = TxMeta::LegacyOldest(LegacyMetaOldest {
            err: None,
            fee: 5000,
            pre_balances: vec![1],
            post_balances: vec![2],
        });
        let v = meta_to_json(&meta).unwrap();
        assert_eq!(v["status"], json!({"Ok": null}));
        assert_eq!(v["err"], Value::Null);
        assert_eq!(v["innerInstructions"], json!([]));
        assert_eq!(v["rewards"], json!([]));
        assert_eq!(v["loadedAddresses"], json!({"writable": [], "readonly": []}));
    }

    #[test]
    fn failed_meta_derives_status_from_err() {
        let meta = TxMeta::LegacyOldest(LegacyMetaOldest {
            err: Some(TransactionError::AccountInUse),
            fee: 5000,
            pre_balances: vec![],
            post_balances: vec![],
        });
        let v = meta_to_json(&meta).unwrap();
        assert_eq!(v["err"], json!("AccountInUse"));
        assert_eq!(v["status"], json!({"Err": "AccountInUse"}));
    }

    #[test]
    fn encoding_names_roundtrip() {
        for name in ["base58", "base64", "base64+zstd", "json", "jsonParsed"] {
            assert_eq!(UiEncoding::from_str(name).unwrap().as_str(), name);
        }
        assert!(UiEncoding::from_str("jsonparsed").is_none());
    }
}

// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The transaction error sum type shared by all three meta schemas.
//!
//! Wire JSON comes straight from the serde derives: unit variants render as
//! strings, payload variants as single-key objects, which is exactly the
//! `{VariantName: [code, {NestedVariant: …}]}` shape the upstream client
//! expects. The binary layout is the historical bincode one: `u32` variant
//! tags, and a `u8` instruction index ahead of the nested instruction
//! error.

use serde::{Deserialize, Serialize};

use crate::solana::wire::{Decoder, Encoder};
use crate::solana::SolanaError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionError {
    AccountInUse,
    AccountLoadedTwice,
    AccountNotFound,
    ProgramAccountNotFound,
    InsufficientFundsForFee,
    InvalidAccountForFee,
    AlreadyProcessed,
    BlockhashNotFound,
    InstructionError(u8, InstructionError),
    CallChainTooDeep,
    MissingSignatureForFee,
    InvalidAccountIndex,
    SignatureFailure,
    InvalidProgramForExecution,
    SanitizeFailure,
    ClusterMaintenance,
    WouldExceedMaxBlockCostLimit,
    UnsupportedVersion,
    InvalidWritableAccount,
    WouldExceedMaxAccountCostLimit,
    WouldExceedAccountDataBlockLimit,
    TooManyAccountLocks,
    AddressLookupTableNotFound,
    InvalidAddressLookupTableOwner,
    InvalidAddressLookupTableData,
    InvalidAddressLookupTableIndex,
    InvalidRentPayingAccount,
    WouldExceedMaxVoteCostLimit,
    WouldExceedAccountDataTotalLimit,
    DuplicateInstruction(u8),
    InsufficientFundsForRent { account_index: u8 },
    MaxLoadedAccountsDataSizeExceeded,
    InvalidLoadedAccountsDataSizeLimit,
    ResanitizationNeeded,
    ProgramExecutionTemporarilyRestricted { account_index: u8 },
    UnbalancedTransaction,
    ProgramCacheHitMaxLimit,
    CommitCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionError {
    GenericError,
    InvalidArgument,
    InvalidInstructionData,
    InvalidAccountData,
    AccountDataTooSmall,
    InsufficientFunds,
    IncorrectProgramId,
    MissingRequiredSignature,
    AccountAlreadyInitialized,
    UninitializedAccount,
    UnbalancedInstruction,
    ModifiedProgramId,
    ExternalAccountLamportSpend,
    ExternalAccountDataModified,
    ReadonlyLamportChange,
    ReadonlyDataModified,
    DuplicateAccountIndex,
    ExecutableModified,
    RentEpochModified,
    NotEnoughAccountKeys,
    AccountDataSizeChanged,
    AccountNotExecutable,
    AccountBorrowFailed,
    AccountBorrowOutstanding,
    DuplicateAccountOutOfSync,
    Custom(u32),
    InvalidError,
    ExecutableDataModified,
    ExecutableLamportChange,
    ExecutableAccountNotRentExempt,
    UnsupportedProgramId,
    CallDepth,
    MissingAccount,
    ReentrancyNotAllowed,
    MaxSeedLengthExceeded,
    InvalidSeeds,
    InvalidRealloc,
    ComputationalBudgetExceeded,
    PrivilegeEscalation,
    ProgramEnvironmentSetupFailure,
    ProgramFailedToComplete,
    ProgramFailedToCompile,
    Immutable,
    IncorrectAuthority,
    BorshIoError(String),
    AccountNotRentExempt,
    InvalidAccountOwner,
    ArithmeticOverflow,
    UnsupportedSysvar,
    IllegalOwner,
    MaxAccountsDataAllocationsExceeded,
    MaxAccountsExceeded,
    MaxInstructionTraceLengthExceeded,
    BuiltinProgramsMustConsumeComputeUnits,
}

macro_rules! unit_variants {
    ($($tag:literal => $variant:ident,)*) => {
        fn transaction_error_unit(tag: u32) -> Option<TransactionError> {
            match tag {
                $($tag => Some(TransactionError::$variant),)*
                _ => None,
            }
        }

        fn transaction_error_unit_tag(err: &TransactionError) -> Option<u32> {
            match err {
                $(TransactionError::$variant => Some($tag),)*
                _ => None,
            }
        }
    };
}

unit_variants! {
    0 => AccountInUse,
    1 => AccountLoadedTwice,
    2 => AccountNotFound,
    3 => ProgramAccountNotFound,
    4 => InsufficientFundsForFee,
    5 => InvalidAccountForFee,
    6 => AlreadyProcessed,
    7 => BlockhashNotFound,
    9 => CallChainTooDeep,
    10 => MissingSignatureForFee,
    11 => InvalidAccountIndex,
    12 => SignatureFailure,
    13 => InvalidProgramForExecution,
    14 => SanitizeFailure,
    15 => ClusterMaintenance,
    16 => WouldExceedMaxBlockCostLimit,
    17 => UnsupportedVersion,
    18 => InvalidWritableAccount,
    19 => WouldExceedMaxAccountCostLimit,
    20 => WouldExceedAccountDataBlockLimit,
    21 => TooManyAccountLocks,
    22 => AddressLookupTableNotFound,
    23 => InvalidAddressLookupTableOwner,
    24 => InvalidAddressLookupTableData,
    25 => InvalidAddressLookupTableIndex,
    26 => InvalidRentPayingAccount,
    27 => WouldExceedMaxVoteCostLimit,
    28 => WouldExceedAccountDataTotalLimit,
    31 => MaxLoadedAccountsDataSizeExceeded,
    32 => InvalidLoadedAccountsDataSizeLimit,
    33 => ResanitizationNeeded,
    35 => UnbalancedTransaction,
    36 => ProgramCacheHitMaxLimit,
    37 => CommitCancelled,
}

impl TransactionError {
    pub fn decode(d: &mut Decoder<'_>) -> Result<Self, SolanaError> {
        let tag = d.u32()?;
        if let Some(unit) = transaction_error_unit(tag) {
            return Ok(unit);
        }
        Ok(match tag {
            // The index ahead of the nested error is a u8, matching current
            // producer behaviour.
            8 => Self::InstructionError(d.u8()?, InstructionError::decode(d)?),
            29 => Self::DuplicateInstruction(d.u8()?),
            30 => Self::InsufficientFundsForRent {
                account_index: d.u8()?,
            },
            34 => Self::ProgramExecutionTemporarilyRestricted {
                account_index: d.u8()?,
            },
            other => {
                return Err(SolanaError::UnknownVariant {
                    what: "TransactionError",
                    variant: other,
                })
            }
        })
    }

    pub fn encode(&self, e: &mut Encoder) {
        if let Some(tag) = transaction_error_unit_tag(self) {
            e.u32(tag);
            return;
        }
        match self {
            Self::InstructionError(index, err) => {
                e.u32(8).u8(*index);
                err.encode(e);
            }
            Self::DuplicateInstruction(index) => {
                e.u32(29).u8(*index);
            }
            Self::InsufficientFundsForRent { account_index } => {
                e.u32(30).u8(*account_index);
            }
            Self::ProgramExecutionTemporarilyRestricted { account_index } => {
                e.u32(34).u8(*account_index);
            }
            _ => unreachable!("unit variants handled above"),
        }
    }
}

macro_rules! instruction_unit_variants {
    ($($tag:literal => $variant:ident,)*) => {
        fn instruction_error_unit(tag: u32) -> Option<InstructionError> {
            match tag {
                $($tag => Some(InstructionError::$variant),)*
                _ => None,
            }
        }

        fn instruction_error_unit_tag(err: &InstructionError) -> Option<u32> {
            match err {
                $(InstructionError::$variant => Some($tag),)*
                _ => None,
            }
        }
    };
}

instruction_unit_variants! {
    0 => GenericError,
    1 => InvalidArgument,
    2 => InvalidInstructionData,
    3 => InvalidAccountData,
    4 => AccountDataTooSmall,
    5 => InsufficientFunds,
    6 => IncorrectProgramId,
    7 => MissingRequiredSignature,
    8 => AccountAlreadyInitialized,
    9 => UninitializedAccount,
    10 => UnbalancedInstruction,
    11 => ModifiedProgramId,
    12 => ExternalAccountLamportSpend,
    13 => ExternalAccountDataModified,
    14 => ReadonlyLamportChange,
    15 => ReadonlyDataModified,
    16 => DuplicateAccountIndex,
    17 => ExecutableModified,
    18 => RentEpochModified,
    19 => NotEnoughAccountKeys,
    20 => AccountDataSizeChanged,
    21 => AccountNotExecutable,
    22 => AccountBorrowFailed,
    23 => AccountBorrowOutstanding,
    24 => DuplicateAccountOutOfSync,
    26 => InvalidError,
    27 => ExecutableDataModified,
    28 => ExecutableLamportChange,
    29 => ExecutableAccountNotRentExempt,
    30 => UnsupportedProgramId,
    31 => CallDepth,
    32 => MissingAccount,
    33 => ReentrancyNotAllowed,
    34 => MaxSeedLengthExceeded,
    35 => InvalidSeeds,
    36 => InvalidRealloc,
    37 => ComputationalBudgetExceeded,
    38 => PrivilegeEscalation,
    39 => ProgramEnvironmentSetupFailure,
    40 => ProgramFailedToComplete,
    41 => ProgramFailedToCompile,
    42 => Immutable,
    43 => IncorrectAuthority,
    45 => AccountNotRentExempt,
    46 => InvalidAccountOwner,
    47 => ArithmeticOverflow,
    48 => UnsupportedSysvar,
    49 => IllegalOwner,
    50 => MaxAccountsDataAllocationsExceeded,
    51 => MaxAccountsExceeded,
    52 => MaxInstructionTraceLengthExceeded,
    53 => BuiltinProgramsMustConsumeComputeUnits,
}

impl InstructionError {
    pub fn decode(d: &mut Decoder<'_>) -> Result<Self, SolanaError> {
        let tag = d.u32()?;
        if let Some(unit) = instruction_error_unit(tag) {
            return Ok(unit);
        }
        Ok(match tag {
            25 => Self::Custom(d.u32()?),
            44 => Self::BorshIoError(d.string()?),
            other => {
                return Err(SolanaError::UnknownVariant {
                    what: "InstructionError",
                    variant: other,
                })
            }
        })
    }

    pub fn encode(&self, e: &mut Encoder) {
        if let Some(tag) = instruction_error_unit_tag(self) {
            e.u32(tag);
            return;
        }
        match self {
            Self::Custom(code) => {
                e.u32(25).u32(*code);
            }
            Self::BorshIoError(msg) => {
                e.u32(44).string(msg);
            }
            _ => unreachable!("unit variants handled above"),
        }
    }
}

/// Decode the `Result<(), TransactionError>` status field of the legacy
/// layouts: variant 0 is `Ok`, variant 1 carries the error.
pub fn decode_status(d: &mut Decoder<'_>) -> Result<Option<TransactionError>, SolanaError> {
    match d.u32()? {
        0 => Ok(None),
        1 => Ok(Some(TransactionError::decode(d)?)),
        other => Err(SolanaError::UnknownVariant {
            what: "Result",
            variant: other,
        }),
    }
}

pub fn encode_status(status: Option<&TransactionError>, e: &mut Encoder) {
    match status {
        None => {
            e.u32(0);
        }
        Some(err) => {
            e.u32(1);
            err.encode(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(err: TransactionError) {
        let mut enc = Encoder::new();
        err.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(TransactionError::decode(&mut dec).unwrap(), err);
        dec.finish("error").unwrap();
    }

    #[test]
    fn binary_roundtrip_covers_payload_variants() {
        roundtrip(TransactionError::AccountInUse);
        roundtrip(TransactionError::CommitCancelled);
        roundtrip(TransactionError::DuplicateInstruction(4));
        roundtrip(TransactionError::InsufficientFundsForRent { account_index: 2 });
        roundtrip(TransactionError::InstructionError(
            3,
            InstructionError::Custom(777),
        ));
        roundtrip(TransactionError::InstructionError(
            0,
            InstructionError::BorshIoError("failed".into()),
        ));
    }

    #[test]
    fn wire_json_shape_matches_upstream() {
        let err = TransactionError::InstructionError(0, InstructionError::Custom(42));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({"InstructionError": [0, {"Custom": 42}]})
        );
        assert_eq!(
            serde_json::to_value(TransactionError::AccountInUse).unwrap(),
            serde_json::json!("AccountInUse")
        );
        assert_eq!(
            serde_json::to_value(TransactionError::InstructionError(
                1,
                InstructionError::InvalidArgument
            ))
            .unwrap(),
            serde_json::json!({"InstructionError": [1, "InvalidArgument"]})
        );
        assert_eq!(
            serde_json::to_value(TransactionError::InsufficientFundsForRent {
                account_index: 3
            })
            .unwrap(),
            serde_json::json!({"InsufficientFundsForRent": {"account_index": 3}})
        );
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let mut enc = Encoder::new();
        enc.u32(9999);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            TransactionError::decode(&mut dec),
            Err(SolanaError::UnknownVariant { .. })
        ));
    }
}

//! Delegated Approval Verifier
//!
//! A user authorizes a master contract (and every market deployed from it) to
//! move their vault funds by signing a typed, domain-separated message
//! off-band. Anyone may submit the signature; the vault rebuilds the message,
//! recovers the signer and consumes the user's nonce.
//!
//! ## Message Layout
//!
//! ```text
//! domain  = EIP712Domain(string name,uint256 chainId,address verifyingContract)
//! message = SetMasterContractApproval(string warning,address user,
//!           address masterContract,bool approved,uint256 nonce)
//! digest  = keccak256(0x19 0x01 || domainSeparator || hashStruct(message))
//! ```
//!
//! Every field is ABI-encoded as a 32-byte word; strings are hashed first.

use borsh::{BorshDeserialize, BorshSerialize};
use ethereum_types::U256;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use chamber_common::{
    constants::approval::{APPROVAL_WARNING, DEFAULT_CHAIN_ID, DOMAIN_NAME, REVOKE_WARNING},
    errors::{ChamberError, ChamberResult},
    types::Address,
};

const DOMAIN_TYPE: &[u8] = b"EIP712Domain(string name,uint256 chainId,address verifyingContract)";

const APPROVAL_TYPE: &[u8] =
    b"SetMasterContractApproval(string warning,address user,address masterContract,bool approved,uint256 nonce)";

// ============ Domain ============

/// Network and contract the approval signatures are bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ApprovalDomain {
    pub name: String,
    pub chain_id: u64,
    /// The vault verifying the signatures
    pub verifying_contract: Address,
}

impl ApprovalDomain {
    /// Domain with the default name and chain id for `verifying_contract`
    pub fn new(verifying_contract: Address) -> Self {
        Self {
            name: DOMAIN_NAME.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            verifying_contract,
        }
    }

    /// Domain separator hash
    pub fn separator(&self) -> [u8; 32] {
        let mut encoder = Vec::with_capacity(32 * 4);
        encoder.extend_from_slice(&keccak(DOMAIN_TYPE));
        encoder.extend_from_slice(&keccak(self.name.as_bytes()));
        encoder.extend_from_slice(&uint_word(U256::from(self.chain_id)));
        encoder.extend_from_slice(&address_word(&self.verifying_contract));
        keccak(&encoder)
    }
}

// ============ Signature ============

/// Recoverable secp256k1 signature in `(v, r, s)` form, `v` in {27, 28}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ApprovalSignature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl ApprovalSignature {
    /// Build from a 64-byte compact signature and a 0/1 recovery id
    pub fn from_compact(compact: &[u8; 64], recovery_id: i32) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        Self {
            v: (recovery_id as u8).wrapping_add(27),
            r,
            s,
        }
    }
}

// ============ Hashing ============

/// Warning string the user saw when signing
pub fn approval_warning(approved: bool) -> &'static str {
    if approved {
        APPROVAL_WARNING
    } else {
        REVOKE_WARNING
    }
}

/// Digest a user signs to (dis)approve `master` at `nonce`
pub fn approval_digest(
    domain: &ApprovalDomain,
    user: &Address,
    master: &Address,
    approved: bool,
    nonce: u128,
) -> [u8; 32] {
    let mut encoder = Vec::with_capacity(32 * 6);
    encoder.extend_from_slice(&keccak(APPROVAL_TYPE));
    encoder.extend_from_slice(&keccak(approval_warning(approved).as_bytes()));
    encoder.extend_from_slice(&address_word(user));
    encoder.extend_from_slice(&address_word(master));
    encoder.extend_from_slice(&uint_word(U256::from(approved as u8)));
    encoder.extend_from_slice(&uint_word(U256::from(nonce)));
    let struct_hash = keccak(&encoder);

    let mut message = Vec::with_capacity(2 + 64);
    message.push(0x19);
    message.push(0x01);
    message.extend_from_slice(&domain.separator());
    message.extend_from_slice(&struct_hash);
    keccak(&message)
}

// ============ Recovery ============

/// Recover the address that produced `signature` over `digest`
pub fn recover_signer(digest: &[u8; 32], signature: &ApprovalSignature) -> ChamberResult<Address> {
    let recovery = i32::from(signature.v) - 27;
    let recovery_id = RecoveryId::from_i32(recovery).map_err(|_| ChamberError::InvalidSignature)?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&signature.r);
    compact[32..].copy_from_slice(&signature.s);
    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|_| ChamberError::InvalidSignature)?;

    let message = Message::from_slice(digest).map_err(|_| ChamberError::InvalidSignature)?;
    let public_key = Secp256k1::verification_only()
        .recover_ecdsa(&message, &recoverable)
        .map_err(|_| ChamberError::InvalidSignature)?;

    Ok(address_from_public_key(&public_key))
}

/// Last 20 bytes of the Keccak-256 hash of the uncompressed key body
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Check that `signature` is `user`'s approval of `master` at `nonce`
pub fn verify_approval(
    domain: &ApprovalDomain,
    user: &Address,
    master: &Address,
    approved: bool,
    nonce: u128,
    signature: &ApprovalSignature,
) -> ChamberResult<()> {
    let digest = approval_digest(domain, user, master, approved, nonce);
    let signer = recover_signer(&digest, signature)?;
    if signer != *user {
        return Err(ChamberError::InvalidSignature);
    }
    Ok(())
}

// ============ Helpers ============

fn keccak(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn uint_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

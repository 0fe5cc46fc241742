use alloy_primitives::{keccak256, Address, B256 as Hash, U256};
use k256::ecdsa::{
    RecoveryId as K256RecoveryId, Signature as K256EcdsaSignature, SigningKey as K256SigningKey,
    VerifyingKey as K256VerifyingKey,
};
use std::fmt;

use crate::error::QbftError;
use crate::types::RlpSignature;

/// Signing capability of the local validator.
pub trait NodeKey: Send + Sync + fmt::Debug {
    /// Address derived from the node's public key.
    fn address(&self) -> Address;

    /// Produces a recoverable signature over a 32-byte digest.
    fn sign_hash(&self, hash: Hash) -> Result<RlpSignature, QbftError>;
}

/// Recovers the signer address of a digest/signature pair.
pub trait SignatureRecovery: Send + Sync {
    fn recover_address(&self, hash: Hash, signature: &RlpSignature) -> Result<Address, QbftError>;
}

/// Ethereum-style address of a secp256k1 public key: last 20 bytes of the keccak256 of the
/// uncompressed point (without the 0x04 prefix).
pub fn address_from_verifying_key(key: &K256VerifyingKey) -> Address {
    let encoded_point = key.to_encoded_point(false);
    let hashed_pk = keccak256(&encoded_point.as_bytes()[1..]);
    Address::from_slice(&hashed_pk[12..])
}

/// [`NodeKey`] backed by an in-memory k256 secret key.
#[derive(Clone)]
pub struct K256NodeKey {
    signing_key: K256SigningKey,
    address: Address,
}

impl K256NodeKey {
    pub fn new(signing_key: K256SigningKey) -> Self {
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self { signing_key, address }
    }

    pub fn from_slice(secret: &[u8]) -> Result<Self, QbftError> {
        let signing_key = K256SigningKey::from_slice(secret)?;
        Ok(Self::new(signing_key))
    }
}

impl fmt::Debug for K256NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("K256NodeKey").field("address", &self.address).finish_non_exhaustive()
    }
}

impl NodeKey for K256NodeKey {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: Hash) -> Result<RlpSignature, QbftError> {
        let (k256_sig, recovery_id): (K256EcdsaSignature, K256RecoveryId) =
            self.signing_key.sign_prehash_recoverable(hash.as_slice())?;
        let rs = k256_sig.to_bytes();
        Ok(RlpSignature::from_parts(
            U256::from_be_slice(&rs[..32]),
            U256::from_be_slice(&rs[32..]),
            recovery_id.is_y_odd(),
        ))
    }
}

/// Public-key recovery over secp256k1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Recovery;

impl SignatureRecovery for Secp256k1Recovery {
    fn recover_address(&self, hash: Hash, signature: &RlpSignature) -> Result<Address, QbftError> {
        let r_bytes: [u8; 32] = signature.r().to_be_bytes();
        let s_bytes: [u8; 32] = signature.s().to_be_bytes();
        let k256_sig = K256EcdsaSignature::from_scalars(r_bytes, s_bytes)
            .map_err(|e| QbftError::InvalidSignature(format!("malformed signature scalars: {e}")))?;
        let recovery_id = K256RecoveryId::try_from(signature.v() as u8)
            .map_err(|e| QbftError::InvalidSignature(format!("invalid recovery id: {e}")))?;
        let verifying_key = K256VerifyingKey::recover_from_prehash(hash.as_slice(), &k256_sig, recovery_id)
            .map_err(|e| QbftError::InvalidSignature(format!("public key recovery failed: {e}")))?;
        Ok(address_from_verifying_key(&verifying_key))
    }
}

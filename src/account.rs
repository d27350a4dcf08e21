//! Account keys and network addresses.
//!
//! Accounts are secp256k1 keys held by alloy's local signer. The on-chain
//! account id is the blake2b-256 hash of the compressed public key, and
//! addresses are rendered in SS58 form for a given network prefix.

use std::fmt;

use alloy::{
    primitives::{hex, Bytes, B256},
    signers::{local::PrivateKeySigner, SignerSync},
};
use blake2b_simd::Params as Blake2bParams;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AgentError, Result};

const SS58_PREFIX: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

pub(crate) fn blake2_256(data: &[u8]) -> [u8; 32] {
    let hash = Blake2bParams::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

fn ss58_checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = Blake2bParams::new()
        .hash_length(64)
        .to_state()
        .update(SS58_PREFIX)
        .update(payload)
        .finalize();
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// 32-byte on-chain account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encodes the account as an SS58 address for `prefix` (0..=16383).
    pub fn to_ss58(&self, prefix: u16) -> String {
        let mut payload = Vec::with_capacity(2 + 32 + CHECKSUM_LEN);
        match prefix {
            0..=63 => payload.push(prefix as u8),
            _ => {
                let ident = prefix & 0b0011_1111_1111_1111;
                payload.push((((ident & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000);
                payload.push(((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6));
            }
        }
        payload.extend_from_slice(&self.0);
        let checksum = ss58_checksum(&payload);
        payload.extend_from_slice(&checksum);
        bs58::encode(payload).into_string()
    }

    /// Decodes an SS58 address, returning the account and its network prefix.
    pub fn from_ss58_with_prefix(address: &str) -> Result<(Self, u16)> {
        let invalid = |why: &str| AgentError::InvalidParameter(format!("address {address:?}: {why}"));

        let data = bs58::decode(address.trim())
            .into_vec()
            .map_err(|_| invalid("not base58"))?;
        let (prefix_len, prefix) = match data.first() {
            Some(b @ 0..=63) => (1, *b as u16),
            Some(64..=127) if data.len() > 1 => {
                let lower = (data[0] << 2) | (data[1] >> 6);
                let upper = data[1] & 0b0011_1111;
                (2, (lower as u16) | ((upper as u16) << 8))
            }
            _ => return Err(invalid("unsupported prefix")),
        };
        if data.len() != prefix_len + 32 + CHECKSUM_LEN {
            return Err(invalid("wrong length"));
        }

        let (payload, checksum) = data.split_at(prefix_len + 32);
        if ss58_checksum(payload) != checksum {
            return Err(invalid("bad checksum"));
        }

        let mut account = [0u8; 32];
        account.copy_from_slice(&payload[prefix_len..]);
        Ok((Self(account), prefix))
    }

    pub fn from_ss58(address: &str) -> Result<Self> {
        Self::from_ss58_with_prefix(address).map(|(account, _)| account)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts either `0x`-prefixed hex or an SS58 address.
impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.strip_prefix("0x") {
            Some(raw) => {
                let bytes = hex::decode(raw).map_err(de::Error::custom)?;
                let bytes: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| de::Error::custom("account id must be 32 bytes"))?;
                Ok(Self(bytes))
            }
            None => Self::from_ss58(&s).map_err(de::Error::custom),
        }
    }
}

/// A signing key and the account it controls.
#[derive(Clone)]
pub struct Keypair {
    signer: PrivateKeySigner,
    public: [u8; 33],
    account: AccountId,
}

impl Keypair {
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(AgentError::MissingCredential("secret key"));
        }
        let secret = B256::try_from(secret).map_err(|_| {
            AgentError::InvalidCredential(format!("expected 32 bytes, got {}", secret.len()))
        })?;
        let signer = PrivateKeySigner::from_bytes(&secret)
            .map_err(|e| AgentError::InvalidCredential(e.to_string()))?;

        let point = signer.credential().verifying_key().to_encoded_point(true);
        let public: [u8; 33] = point
            .as_bytes()
            .try_into()
            .map_err(|_| AgentError::InvalidCredential("unexpected public key length".into()))?;
        let account = AccountId(blake2_256(&public));

        Ok(Self {
            signer,
            public,
            account,
        })
    }

    /// Accepts the secret as hex, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(AgentError::MissingCredential("secret key"));
        }
        let bytes = hex::decode(secret.strip_prefix("0x").unwrap_or(secret))
            .map_err(|_| AgentError::InvalidCredential("secret key is not hex".into()))?;
        Self::from_secret(&bytes)
    }

    pub fn public_key(&self) -> &[u8; 33] {
        &self.public
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub(crate) fn sign_prehash(&self, hash: &B256) -> Result<Bytes> {
        let signature = self
            .signer
            .sign_hash_sync(hash)
            .map_err(|e| AgentError::InvalidCredential(e.to_string()))?;
        Ok(signature.as_bytes().into())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// The controlling account plus an optional delegate.
#[derive(Clone, Debug)]
pub struct AgentIdentity {
    address: String,
    delegate_address: Option<String>,
    keypair: Keypair,
    delegate: Option<Keypair>,
    ss58_prefix: u16,
}

impl AgentIdentity {
    pub fn derive(primary: &[u8], delegate: Option<&[u8]>, ss58_prefix: u16) -> Result<Self> {
        let keypair = Keypair::from_secret(primary)?;
        let delegate = delegate.map(Keypair::from_secret).transpose()?;
        Ok(Self::from_keypairs(keypair, delegate, ss58_prefix))
    }

    pub fn from_keypairs(keypair: Keypair, delegate: Option<Keypair>, ss58_prefix: u16) -> Self {
        Self {
            address: keypair.account().to_ss58(ss58_prefix),
            delegate_address: delegate.as_ref().map(|d| d.account().to_ss58(ss58_prefix)),
            keypair,
            delegate,
            ss58_prefix,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn delegate_address(&self) -> Option<&str> {
        self.delegate_address.as_deref()
    }

    pub fn account(&self) -> AccountId {
        self.keypair.account()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn delegate(&self) -> Option<&Keypair> {
        self.delegate.as_ref()
    }

    pub fn ss58_prefix(&self) -> u16 {
        self.ss58_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [7u8; 32];

    #[test]
    fn ss58_matches_known_address() {
        // well-known development account
        let raw = hex::decode("d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d")
            .unwrap();
        let account = AccountId(raw.try_into().unwrap());
        let address = account.to_ss58(42);
        assert_eq!(address, "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY");
        assert_eq!(AccountId::from_ss58_with_prefix(&address).unwrap(), (account, 42));
    }

    #[test]
    fn ss58_two_byte_prefix_roundtrips() {
        let account = AccountId([3u8; 32]);
        let address = account.to_ss58(1284);
        assert_eq!(AccountId::from_ss58_with_prefix(&address).unwrap(), (account, 1284));
    }

    #[test]
    fn ss58_rejects_tampered_address() {
        let mut address = AccountId([9u8; 32]).to_ss58(42).into_bytes();
        let last = address.len() - 1;
        address[last] = if address[last] == b'a' { b'b' } else { b'a' };
        let address = String::from_utf8(address).unwrap();
        assert!(matches!(
            AccountId::from_ss58(&address),
            Err(AgentError::InvalidParameter(_))
        ));
        assert!(AccountId::from_ss58("not an address").is_err());
    }

    #[test]
    fn account_id_serde_accepts_hex_and_ss58() {
        let account = AccountId([5u8; 32]);
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "05".repeat(32)));
        assert_eq!(serde_json::from_str::<AccountId>(&json).unwrap(), account);

        let ss58 = format!("\"{}\"", account.to_ss58(42));
        assert_eq!(serde_json::from_str::<AccountId>(&ss58).unwrap(), account);
        assert!(serde_json::from_str::<AccountId>("\"0x0102\"").is_err());
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = AgentIdentity::derive(&SECRET, None, 42).unwrap();
        let b = AgentIdentity::derive(&SECRET, None, 42).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.keypair().public_key(), b.keypair().public_key());
        assert!(a.delegate_address().is_none());
        assert_eq!(AccountId::from_ss58(a.address()).unwrap(), a.account());
    }

    #[test]
    fn delegate_is_derived_when_supplied() {
        let id = AgentIdentity::derive(&SECRET, Some(&[8u8; 32]), 42).unwrap();
        let delegate = id.delegate().unwrap();
        assert_ne!(delegate.account(), id.account());
        assert_eq!(id.delegate_address(), Some(delegate.account().to_ss58(42).as_str()));
    }

    #[test]
    fn hex_and_raw_secrets_agree() {
        let from_hex = Keypair::from_hex(&format!("0x{}", hex::encode(SECRET))).unwrap();
        let from_raw = Keypair::from_secret(&SECRET).unwrap();
        assert_eq!(from_hex.account(), from_raw.account());
        assert_eq!(from_hex.public_key()[0] & 0xfe, 0x02);
    }

    #[test]
    fn missing_and_invalid_secrets_are_rejected() {
        assert!(matches!(
            Keypair::from_secret(&[]),
            Err(AgentError::MissingCredential(_))
        ));
        assert!(matches!(
            Keypair::from_hex("  "),
            Err(AgentError::MissingCredential(_))
        ));
        assert!(matches!(
            Keypair::from_secret(&[1u8; 31]),
            Err(AgentError::InvalidCredential(_))
        ));
        assert!(matches!(
            Keypair::from_secret(&[0u8; 32]),
            Err(AgentError::InvalidCredential(_))
        ));
        assert!(matches!(
            Keypair::from_hex("zz"),
            Err(AgentError::InvalidCredential(_))
        ));
    }
}

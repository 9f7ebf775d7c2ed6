//! Ephemeral P-256 key agreement
//!
//! Each side of a pairing generates a fresh key pair, publishes the public
//! half and derives the channel key from its own private half and the peer's
//! public half. The channel key is the raw x-coordinate of the shared point,
//! the same key a browser's `deriveKey` produces for an AES-GCM 256 target.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use super::jwk::{Jwk, KeyCodecError, KeyOp};
use super::secret::SymmetricKey;

/// JWK `crv` value for the agreement curve
pub const CURVE: &str = "P-256";
/// Size of a P-256 coordinate or scalar in bytes
pub const COORDINATE_SIZE: usize = 32;

const PRIVATE_OPS: [KeyOp; 1] = [KeyOp::DeriveKey];

#[derive(Debug, thiserror::Error)]
pub enum AgreementError {
    #[error("key is not permitted to {0}")]
    KeyUsage(&'static str),
}

/// The public half of an agreement key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementPublicKey(PublicKey);

impl From<PublicKey> for AgreementPublicKey {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

impl AgreementPublicKey {
    /// Export to `{kty:"EC", crv:"P-256", x, y, ext:true, key_ops:[]}`
    pub fn to_jwk(&self) -> Jwk {
        let point = self.0.to_encoded_point(false);
        Jwk {
            kty: "EC".to_string(),
            crv: Some(CURVE.to_string()),
            x: point.x().map(|x| Jwk::encode_member(x)),
            y: point.y().map(|y| Jwk::encode_member(y)),
            ext: Some(true),
            key_ops: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Import a public key, rejecting coordinates that are not on the curve
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyCodecError> {
        expect_curve(jwk)?;
        let x = Jwk::decode_member(jwk.x.as_deref(), "x", COORDINATE_SIZE)?;
        let y = Jwk::decode_member(jwk.y.as_deref(), "y", COORDINATE_SIZE)?;

        let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_SIZE);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        PublicKey::from_sec1_bytes(&sec1)
            .map(Self)
            .map_err(|_| KeyCodecError::InvalidParameter("x"))
    }
}

/// The private half of an agreement key pair
///
/// Never leaves the device except as the persisted session JWK. The scalar is
/// wiped when the key is dropped.
#[derive(Clone)]
pub struct AgreementPrivateKey {
    secret: SecretKey,
    ops: Vec<KeyOp>,
}

impl std::fmt::Debug for AgreementPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementPrivateKey")
            .field("public", &self.public_key())
            .field("ops", &self.ops)
            .finish_non_exhaustive()
    }
}

impl From<SecretKey> for AgreementPrivateKey {
    fn from(secret: SecretKey) -> Self {
        Self {
            secret,
            ops: PRIVATE_OPS.to_vec(),
        }
    }
}

impl AgreementPrivateKey {
    pub fn public_key(&self) -> AgreementPublicKey {
        AgreementPublicKey(self.secret.public_key())
    }

    pub fn permits(&self, op: KeyOp) -> bool {
        self.ops.contains(&op)
    }

    /// Export the public coordinates plus `d`, with `key_ops:["deriveKey"]`
    pub fn to_jwk(&self) -> Jwk {
        let d = Zeroizing::new(self.secret.to_bytes().to_vec());
        Jwk {
            d: Some(Jwk::encode_member(&d)),
            key_ops: Some(Jwk::ops_to_strings(&self.ops)),
            ..self.public_key().to_jwk()
        }
    }

    /// Import a private key
    ///
    /// When the JWK carries `x`/`y` they must describe the public key that
    /// `d` generates.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyCodecError> {
        expect_curve(jwk)?;
        let d = Zeroizing::new(Jwk::decode_member(jwk.d.as_deref(), "d", COORDINATE_SIZE)?);
        let secret = SecretKey::from_slice(&d).map_err(|_| KeyCodecError::InvalidParameter("d"))?;

        let key = Self {
            secret,
            ops: jwk.granted(&PRIVATE_OPS),
        };

        if jwk.x.is_some() || jwk.y.is_some() {
            let claimed = AgreementPublicKey::from_jwk(jwk)?;
            if claimed != key.public_key() {
                return Err(KeyCodecError::InvalidParameter("x"));
            }
        }

        Ok(key)
    }
}

/// A freshly generated agreement key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: AgreementPublicKey,
    pub private: AgreementPrivateKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with(rng: &mut impl CryptoRngCore) -> Self {
        let private = AgreementPrivateKey::from(SecretKey::random(rng));
        Self {
            public: private.public_key(),
            private,
        }
    }
}

/// Derive the AES-256-GCM channel key shared with the owner of `public`
///
/// Both sides arrive at the same key: `derive(a.private, b.public)` and
/// `derive(b.private, a.public)` encrypt and decrypt interchangeably.
pub fn derive_shared_key(
    private: &AgreementPrivateKey,
    public: &AgreementPublicKey,
) -> Result<SymmetricKey, AgreementError> {
    if !private.permits(KeyOp::DeriveKey) {
        return Err(AgreementError::KeyUsage(KeyOp::DeriveKey.as_str()));
    }

    let shared = ecdh::diffie_hellman(private.secret.to_nonzero_scalar(), public.0.as_affine());
    let mut bytes = Zeroizing::new([0u8; COORDINATE_SIZE]);
    bytes.copy_from_slice(shared.raw_secret_bytes());
    Ok(SymmetricKey::from(*bytes))
}

fn expect_curve(jwk: &Jwk) -> Result<(), KeyCodecError> {
    jwk.expect_kty("EC")?;
    match jwk.crv.as_deref() {
        Some(CURVE) => Ok(()),
        Some(other) => Err(KeyCodecError::Curve(other.to_string())),
        None => Err(KeyCodecError::MissingParameter("crv")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::{json, Value};

    #[test]
    fn test_ecdh_symmetry() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let alice_key = derive_shared_key(&alice.private, &bob.public).unwrap();
        let bob_key = derive_shared_key(&bob.private, &alice.public).unwrap();

        let value = json!({"accountId": "abc", "n": [1, 2, 3]});
        let encrypted = alice_key.encrypt_json(&value).unwrap();
        let decrypted: Value = bob_key.decrypt_json(&encrypted).unwrap();
        assert_eq!(value, decrypted);

        let encrypted = bob_key.encrypt_json(&value).unwrap();
        let decrypted: Value = alice_key.decrypt_json(&encrypted).unwrap();
        assert_eq!(value, decrypted);
    }

    #[test]
    fn test_third_party_cannot_decrypt() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let eve = KeyPair::generate();

        let channel = derive_shared_key(&alice.private, &bob.public).unwrap();
        let eve_key = derive_shared_key(&eve.private, &alice.public).unwrap();

        let encrypted = channel.encrypt_json(&json!("private")).unwrap();
        assert!(eve_key.decrypt_json::<Value>(&encrypted).is_err());
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = KeyPair::generate_with(&mut StdRng::seed_from_u64(7));
        let b = KeyPair::generate_with(&mut StdRng::seed_from_u64(7));
        let c = KeyPair::generate_with(&mut StdRng::seed_from_u64(8));
        assert_eq!(a.public, b.public);
        assert_ne!(a.public, c.public);
    }

    #[test]
    fn test_public_jwk_roundtrip() {
        let pair = KeyPair::generate();
        let jwk = pair.public.to_jwk();

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some(CURVE));
        assert_eq!(jwk.key_ops, Some(vec![]));
        assert!(jwk.d.is_none());
        assert_eq!(jwk.x.as_ref().map(|x| x.len()), Some(43));

        let json = jwk.to_json_string().unwrap();
        let imported = AgreementPublicKey::from_jwk(&json.parse().unwrap()).unwrap();
        assert_eq!(imported, pair.public);
    }

    #[test]
    fn test_private_jwk_roundtrip() {
        let pair = KeyPair::generate();
        let peer = KeyPair::generate();
        let jwk = pair.private.to_jwk();

        assert!(jwk.d.is_some());
        assert_eq!(jwk.key_ops, Some(vec!["deriveKey".to_string()]));

        let imported = AgreementPrivateKey::from_jwk(&jwk).unwrap();
        assert_eq!(imported.public_key(), pair.public);

        let original = derive_shared_key(&pair.private, &peer.public).unwrap();
        let reloaded = derive_shared_key(&imported, &peer.public).unwrap();
        assert_eq!(original, reloaded);
    }

    #[test]
    fn test_point_not_on_curve_rejected() {
        let mut jwk = KeyPair::generate().public.to_jwk();
        jwk.x = Some(Jwk::encode_member(&[0u8; COORDINATE_SIZE]));
        jwk.y = Some(Jwk::encode_member(&[0u8; COORDINATE_SIZE]));
        assert!(matches!(
            AgreementPublicKey::from_jwk(&jwk),
            Err(KeyCodecError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_wrong_curve_and_type_rejected() {
        let mut jwk = KeyPair::generate().public.to_jwk();
        jwk.crv = Some("P-384".to_string());
        assert!(matches!(
            AgreementPublicKey::from_jwk(&jwk),
            Err(KeyCodecError::Curve(c)) if c == "P-384"
        ));

        let mut jwk = KeyPair::generate().public.to_jwk();
        jwk.kty = "oct".to_string();
        assert!(matches!(
            AgreementPublicKey::from_jwk(&jwk),
            Err(KeyCodecError::KeyType { .. })
        ));

        let mut jwk = KeyPair::generate().public.to_jwk();
        jwk.y = None;
        assert!(matches!(
            AgreementPublicKey::from_jwk(&jwk),
            Err(KeyCodecError::MissingParameter("y"))
        ));
    }

    #[test]
    fn test_private_key_with_foreign_public_part_rejected() {
        let ours = KeyPair::generate();
        let theirs = KeyPair::generate();

        let mut jwk = ours.private.to_jwk();
        let foreign = theirs.public.to_jwk();
        jwk.x = foreign.x;
        jwk.y = foreign.y;

        assert!(AgreementPrivateKey::from_jwk(&jwk).is_err());
    }

    #[test]
    fn test_private_key_without_derive_usage_fails_at_use() {
        let pair = KeyPair::generate();
        let peer = KeyPair::generate();

        let mut jwk = pair.private.to_jwk();
        jwk.key_ops = Some(vec!["sign".to_string()]);
        let imported = AgreementPrivateKey::from_jwk(&jwk).unwrap();

        assert!(matches!(
            derive_shared_key(&imported, &peer.public),
            Err(AgreementError::KeyUsage("deriveKey"))
        ));
    }

    #[test]
    fn test_debug_does_not_leak_scalar() {
        let pair = KeyPair::generate();
        let d = pair.private.to_jwk().d.unwrap();
        assert!(!format!("{:?}", pair.private).contains(&d));
    }
}

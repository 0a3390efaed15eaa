use base64::{engine::general_purpose, Engine as _};
use rsa::pkcs8::{spki, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use secrecy::zeroize::Zeroizing;
use thiserror::Error;

use super::types::Cryptogram;

/// Public key the gateway expects card cryptograms to be encrypted with.
pub const PROVIDER_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIICIjANBgkqhkiG9w0BAQEFAAOCAg8AMIICCgKCAgEAqoATnGMtByQojuoYFKEx
vEqszShV2vk6chCJFx0/vmSHBqcCTazhJqBmYU9gyM/TjVWLsjFAbd4nvCxIGpqF
g3J7UJccfODKibyfSUSqGsAJE1MJh3EaJivkd85/FkZkv3zBeT/193NmakNs0+T+
PUMmSdAPSnfUWi2KSIp48mSA38CbMvOwndkKNEeqCoIQn/fApfZ8MWIEFVd3gpfs
Ve0zYhSjvTOHPD0/7TOdcQyArxLZY0yS7m32rUOibuO7EhGNQL/bC73ZbuS5nXhr
a03nNIW3FfSJUTJBjVWDZRoNk9gm4pOimAeb0IiqnmlTPOvkqHYsOEjQ8KJAFlGO
1igelk1+dA5ZiY6r0YExc1KnW7UsnGk6nr7cgOR2po/sa4kctiKLqlGA35ILmUBQ
Yb6iReCQkggXMOvmP6p+4wEt1B7V8UJxzFZcQZ5QSRIk3o3pVrfY0gksidl0Xt5m
ft+E6a77ZQKG4TOQS9Ly1mIJ2qqaWqCWglVMWFiFCx9dXTN0RMli1T0rs1gA2jsP
z2/HiyY8EUp6t4Ufc8VbJYG9vt24UTwYgu+qDEBjggm5YKVCxjCvhJWwh9LaL9Uu
K46Apgr5wgEyMIJZRO7RxkjKkJI29FAP3wEs9y+/3qsjH3chFzdX0/+6lA+9lePK
PX0Z5SPexWRiQp9bND4iZRcCAwEAAQ==
-----END PUBLIC KEY-----
";

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    #[error("Public key is not an RSA key")]
    UnsupportedKeyType,

    #[error("Failed to serialize card payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("RSA encryption failed: {0}")]
    Encryption(#[from] rsa::Error),
}

/// Encrypts card data with RSA PKCS#1 v1.5 and base64-encodes the result.
#[derive(Debug, Clone)]
pub struct CardDataEncryptor {
    key: RsaPublicKey,
}

impl CardDataEncryptor {
    /// Encryptor for the gateway's published key.
    pub fn provider() -> Result<Self, EncryptionError> {
        Self::from_public_key_pem(PROVIDER_PUBLIC_KEY_PEM)
    }

    pub fn from_public_key_pem(pem: &str) -> Result<Self, EncryptionError> {
        let key = RsaPublicKey::from_public_key_pem(pem).map_err(|e| match e {
            spki::Error::OidUnknown { .. } => EncryptionError::UnsupportedKeyType,
            other => EncryptionError::MalformedKey(other.to_string()),
        })?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        let mut rng = rand::thread_rng();
        let ciphertext = self.key.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)?;
        Ok(general_purpose::STANDARD.encode(ciphertext))
    }

    /// Serializes the cryptogram to JSON and encrypts it. The plaintext buffer is wiped on drop.
    pub fn encrypt_cryptogram(&self, cryptogram: &Cryptogram<'_>) -> Result<String, EncryptionError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(cryptogram)?);
        self.encrypt(&plaintext)
    }
}

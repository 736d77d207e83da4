//! At-rest encryption for refresh tokens stored in the shared cache.
//!
//! The cache key is derived once per process from the configured passphrase with Argon2id and a
//! fixed application salt, so every instance sharing the passphrase derives the same key. Each
//! seal draws a fresh 96-bit IV and encrypts with AES-256-GCM; ciphertext and IV travel as hex.
//! Because the cipher is authenticated, a wrong passphrase or a corrupted entry always fails
//! to open instead of yielding garbage.

// crates.io
use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, KeyInit},
};
use argon2::Argon2;
// self
use crate::_prelude::*;

const KEY_SALT: &[u8] = b"openchokin.token-cache.v1";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;

/// Failures while deriving the key or sealing/opening a secret.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CryptoError {
	/// The passphrase could not be turned into a key.
	#[error("Cache key derivation failed: {message}.")]
	KeyDerivation {
		/// Human-readable cause.
		message: String,
	},
	/// Ciphertext or IV is not valid hex or has the wrong length.
	#[error("Sealed secret is not properly encoded: {message}.")]
	Encoding {
		/// Human-readable cause.
		message: String,
	},
	/// Authentication failed: wrong key, mismatched IV, or corrupted ciphertext.
	#[error("Sealed secret could not be decrypted.")]
	Decrypt,
	/// Encryption failed.
	#[error("Secret could not be encrypted.")]
	Encrypt,
}

/// Ciphertext plus the IV it was sealed with, both hex encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedSecret {
	/// Hex ciphertext (including the GCM tag).
	pub ciphertext: String,
	/// Hex initialization vector.
	pub iv: String,
}
impl Debug for SealedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SealedSecret").field("iv", &self.iv).finish_non_exhaustive()
	}
}

/// Symmetric cipher keyed from the cache passphrase.
pub struct TokenCipher {
	cipher: Aes256Gcm,
}
impl TokenCipher {
	/// Derives the cache key from `passphrase`.
	///
	/// Argon2id is slow; build one cipher at startup and share it.
	pub fn from_passphrase(passphrase: &str) -> Result<Self, CryptoError> {
		if passphrase.is_empty() {
			return Err(CryptoError::KeyDerivation { message: "passphrase is empty".into() });
		}

		let mut key = [0_u8; KEY_LEN];

		Argon2::default()
			.hash_password_into(passphrase.as_bytes(), KEY_SALT, &mut key)
			.map_err(|e| CryptoError::KeyDerivation { message: e.to_string() })?;

		let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

		Ok(Self { cipher })
	}

	/// Encrypts `plaintext` under a fresh random IV.
	pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, CryptoError> {
		let iv: [u8; IV_LEN] = rand::random();
		let ciphertext = self
			.cipher
			.encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
			.map_err(|_| CryptoError::Encrypt)?;

		Ok(SealedSecret { ciphertext: hex::encode(ciphertext), iv: hex::encode(iv) })
	}

	/// Decrypts a sealed secret; requires the matching key and IV.
	pub fn open(&self, sealed: &SealedSecret) -> Result<String, CryptoError> {
		let iv = hex::decode(&sealed.iv)
			.map_err(|e| CryptoError::Encoding { message: format!("iv: {e}") })?;

		if iv.len() != IV_LEN {
			return Err(CryptoError::Encoding {
				message: format!("iv must be {IV_LEN} bytes, got {}", iv.len()),
			});
		}

		let ciphertext = hex::decode(&sealed.ciphertext)
			.map_err(|e| CryptoError::Encoding { message: format!("ciphertext: {e}") })?;
		let plaintext = self
			.cipher
			.decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
			.map_err(|_| CryptoError::Decrypt)?;

		String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
	}
}
impl Debug for TokenCipher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenCipher(<redacted>)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn cipher(passphrase: &str) -> TokenCipher {
		TokenCipher::from_passphrase(passphrase).expect("Key derivation should succeed.")
	}

	#[test]
	fn seal_then_open_returns_plaintext() {
		let cipher = cipher("correct horse battery staple");
		let sealed = cipher.seal("r1").expect("Sealing should succeed.");

		assert_eq!(sealed.iv.len(), IV_LEN * 2);
		assert_eq!(cipher.open(&sealed).expect("Opening should succeed."), "r1");
	}

	#[test]
	fn fresh_iv_changes_ciphertext() {
		let cipher = cipher("correct horse battery staple");
		let first = cipher.seal("r1").expect("First seal should succeed.");
		let second = cipher.seal("r1").expect("Second seal should succeed.");

		assert_ne!(first.iv, second.iv);
		assert_ne!(first.ciphertext, second.ciphertext);
	}

	#[test]
	fn same_passphrase_derives_same_key() {
		let sealed = cipher("shared").seal("r1").expect("Sealing should succeed.");

		assert_eq!(cipher("shared").open(&sealed).expect("Other instance should open it."), "r1");
	}

	#[test]
	fn wrong_key_or_iv_fails_to_open() {
		let sealed = cipher("shared").seal("r1").expect("Sealing should succeed.");

		assert_eq!(cipher("other").open(&sealed), Err(CryptoError::Decrypt));

		let other_iv = cipher("shared").seal("r1").expect("Sealing should succeed.").iv;
		let swapped = SealedSecret { ciphertext: sealed.ciphertext.clone(), iv: other_iv };

		assert_eq!(cipher("shared").open(&swapped), Err(CryptoError::Decrypt));
	}

	#[test]
	fn malformed_encoding_is_distinct_from_decrypt_failure() {
		let cipher = cipher("shared");
		let bad_hex = SealedSecret { ciphertext: "zz".into(), iv: "00".repeat(IV_LEN) };
		let short_iv = SealedSecret { ciphertext: "00".into(), iv: "00".into() };

		assert!(matches!(cipher.open(&bad_hex), Err(CryptoError::Encoding { .. })));
		assert!(matches!(cipher.open(&short_iv), Err(CryptoError::Encoding { .. })));
	}

	#[test]
	fn empty_passphrase_is_rejected() {
		assert!(matches!(
			TokenCipher::from_passphrase(""),
			Err(CryptoError::KeyDerivation { .. })
		));
	}
}

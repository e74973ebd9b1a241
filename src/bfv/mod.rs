pub mod context;
pub mod ntt;
pub mod poly;
pub mod encoder;
pub mod keys;
pub mod encrypt;
pub mod evaluator;
pub mod packing;

// Réexportations pratiques pour l'utilisateur du module

pub use context::BfvContext;
pub use encoder::{BatchEncoder, Plaintext};
pub use encrypt::{Ciphertext, Decryptor, Encryptor};
pub use evaluator::{rotate, Evaluator};
pub use keys::{GaloisKeys, KeyGenerator, RelinKeys, SecretKey};
pub use packing::{
    pack_decode, pack_decrypt, pack_encode, pack_encrypt, pack_encrypt_table,
    pack_encrypt_table_parallel,
};

use crate::crypto_error::CryptoError;

/// Nombre maximal de régénérations de paramètres avant abandon
const MAX_KEY_ATTEMPTS: usize = 8;

/// Auto-test de l'encodeur : encode([0]) doit boucler exactement,
/// de même qu'un petit vecteur non trivial
pub fn valid_keys(ctx: &BfvContext) -> bool {
    let encoder = match BatchEncoder::new(ctx) {
        Ok(enc) => enc,
        Err(_) => return false,
    };
    let probe = |values: &[u64]| -> bool {
        match encoder.encode(values) {
            Ok(pt) => match encoder.decode(&pt) {
                Ok(decoded) => decoded[..values.len()] == *values,
                Err(_) => false,
            },
            Err(_) => false,
        }
    };
    probe(&[0]) && probe(&[1, 2, 3])
}

/// Instancie le schéma en régénérant les paramètres tant que l'auto-test
/// échoue, dans la limite d'un nombre d'essais borné
pub fn instantiate_encryption_scheme(
    n: usize,
    logqi: &[u32],
    ti: &[u64],
) -> Result<BfvContext, CryptoError> {
    for _ in 0..MAX_KEY_ATTEMPTS {
        let ctx = BfvContext::new(n, logqi, ti)?;
        if valid_keys(&ctx) {
            return Ok(ctx);
        }
    }
    Err(CryptoError::KeyInvalid)
}

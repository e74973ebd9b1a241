// ===========================================================================
// Pont entre l'empaquetage CRT et l'encodeur batch
//
// Un vecteur de k·N valeurs (bloc-major) devient N slots mod M = Πmᵢ,
// puis un plaintext, puis un chiffré. La table Cuckoo entière (k colonnes
// de n cases) se chiffre en ⌈n/N⌉ chiffrés : le slot j·k+ℓ du plaintext i
// porte values[ℓ][i·N + j].
// ===========================================================================

use crate::bfv::encoder::{BatchEncoder, Plaintext};
use crate::bfv::encrypt::{Ciphertext, Decryptor, Encryptor};
use crate::crypto_error::CryptoError;
use crate::math::crt::{crt_decode, crt_encode, CrtParams};

pub fn pack_encode(
    vs: &[u64],
    crt: &CrtParams,
    encoder: &BatchEncoder,
) -> Result<Plaintext, CryptoError> {
    encoder.encode(&crt_encode(vs, crt)?)
}

pub fn pack_decode(
    pt: &Plaintext,
    crt: &CrtParams,
    encoder: &BatchEncoder,
) -> Result<Vec<u64>, CryptoError> {
    Ok(crt_decode(&encoder.decode(pt)?, crt))
}

pub fn pack_encrypt(
    vs: &[u64],
    crt: &CrtParams,
    encoder: &BatchEncoder,
    encryptor: &Encryptor,
) -> Result<Ciphertext, CryptoError> {
    encryptor.encrypt_symmetric(&pack_encode(vs, crt, encoder)?)
}

pub fn pack_decrypt(
    ct: &Ciphertext,
    crt: &CrtParams,
    encoder: &BatchEncoder,
    decryptor: &Decryptor,
) -> Result<Vec<u64>, CryptoError> {
    pack_decode(&decryptor.decrypt(ct)?, crt, encoder)
}

// Vecteur entrelacé bloc-major du i-ème chiffré de la table
fn interleave_block(
    table: &[Vec<u64>],
    block: usize,
    slots: usize,
) -> Vec<u64> {
    let k = table.len();
    let size = table[0].len();
    let offset = block * slots;
    let filled = slots.min(size - offset);
    let mut vs = vec![0u64; k * slots];
    for j in 0..filled {
        for (l, column) in table.iter().enumerate() {
            vs[j * k + l] = column[offset + j];
        }
    }
    vs
}

/// Chiffre la table Cuckoo complète (k colonnes de même longueur)
pub fn pack_encrypt_table(
    table: &[Vec<u64>],
    crt: &CrtParams,
    encoder: &BatchEncoder,
    encryptor: &Encryptor,
) -> Result<Vec<Ciphertext>, CryptoError> {
    let k = crt.mi.len();
    if table.len() != k {
        return Err(CryptoError::CrtLength { len: table.len(), step: k });
    }
    let slots = encoder.slot_count();
    let count = table[0].len().div_ceil(slots);

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let vs = interleave_block(table, i, slots);
        out.push(pack_encrypt(&vs, crt, encoder, encryptor)?);
    }
    Ok(out)
}

/// Variante parallèle : les chiffrés de sortie sont partagés en tranches
/// contiguës, une par worker ; échecs agrégés après le join
pub fn pack_encrypt_table_parallel(
    table: &[Vec<u64>],
    crt: &CrtParams,
    encoder: &BatchEncoder,
    encryptor: &Encryptor,
    num_threads: usize,
) -> Result<Vec<Ciphertext>, CryptoError> {
    let k = crt.mi.len();
    if table.len() != k {
        return Err(CryptoError::CrtLength { len: table.len(), step: k });
    }
    let slots = encoder.slot_count();
    let count = table[0].len().div_ceil(slots);
    let workers = num_threads.max(1).min(count);
    if workers <= 1 {
        return pack_encrypt_table(table, crt, encoder, encryptor);
    }

    let chunk = count.div_ceil(workers);
    let mut out: Vec<Option<Ciphertext>> = vec![None; count];
    let mut failures: Vec<Option<CryptoError>> = vec![None; workers];

    std::thread::scope(|s| {
        for ((w, slice), failure) in out.chunks_mut(chunk).enumerate().zip(failures.iter_mut()) {
            s.spawn(move || {
                for (offset, slot) in slice.iter_mut().enumerate() {
                    let i = w * chunk + offset;
                    let vs = interleave_block(table, i, slots);
                    match pack_encrypt(&vs, crt, encoder, encryptor) {
                        Ok(ct) => *slot = Some(ct),
                        Err(e) => {
                            *failure = Some(e);
                            return;
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = failures.into_iter().flatten().next() {
        return Err(e);
    }
    Ok(out.into_iter().map(|ct| ct.expect("toutes les tranches remplies")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::context::BfvContext;
    use crate::bfv::keys::KeyGenerator;
    use crate::math::crt::crt_params;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_pack_encrypt_decrypt_table() {
        let ctx = BfvContext::new(4096, &[], &[40961, 65537]).unwrap();
        let encoder = BatchEncoder::new(&ctx).unwrap();
        let keygen = KeyGenerator::new(&ctx);
        let sk = keygen.secret_key();
        let encryptor = Encryptor::new(&ctx, &sk);
        let decryptor = Decryptor::new(&ctx, &sk);
        let crt = crt_params(&[40961, 65537]);

        // table k=2 de 64 cases, valeurs < min(mᵢ)
        let mut rng = StdRng::seed_from_u64(33);
        let table: Vec<Vec<u64>> = (0..2)
            .map(|_| (0..64).map(|_| rng.gen_range(0..40961u64)).collect())
            .collect();

        let cts = pack_encrypt_table(&table, &crt, &encoder, &encryptor).unwrap();
        assert_eq!(cts.len(), 1); // 64 cases < 4096 slots

        let values = pack_decrypt(&cts[0], &crt, &encoder, &decryptor).unwrap();
        // slot j·k+ℓ = table[ℓ][j]
        for j in 0..64 {
            for l in 0..2 {
                assert_eq!(values[j * 2 + l], table[l][j]);
            }
        }
        // remplissage à zéro au-delà de la table
        assert!(values[64 * 2..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_parallel_matches_sequential_shape() {
        let ctx = BfvContext::new(4096, &[], &[40961]).unwrap();
        let encoder = BatchEncoder::new(&ctx).unwrap();
        let keygen = KeyGenerator::new(&ctx);
        let sk = keygen.secret_key();
        let encryptor = Encryptor::new(&ctx, &sk);
        let decryptor = Decryptor::new(&ctx, &sk);
        let crt = crt_params(&[40961]);

        // 3 blocs de chiffrés (10000 cases / 4096 slots)
        let table: Vec<Vec<u64>> = vec![(0..10_000u64).map(|v| v % 40961).collect()];
        let cts = pack_encrypt_table_parallel(&table, &crt, &encoder, &encryptor, 4).unwrap();
        assert_eq!(cts.len(), 3);

        for (i, ct) in cts.iter().enumerate() {
            let values = pack_decrypt(ct, &crt, &encoder, &decryptor).unwrap();
            let offset = i * 4096;
            let filled = 4096.min(10_000 - offset);
            for j in 0..filled {
                assert_eq!(values[j], table[0][offset + j]);
            }
        }
    }

    #[test]
    fn test_table_with_wrong_column_count_is_rejected() {
        let ctx = BfvContext::new(4096, &[], &[40961, 65537]).unwrap();
        let encoder = BatchEncoder::new(&ctx).unwrap();
        let keygen = KeyGenerator::new(&ctx);
        let sk = keygen.secret_key();
        let encryptor = Encryptor::new(&ctx, &sk);
        let crt = crt_params(&[40961, 65537]);
        let table: Vec<Vec<u64>> = vec![vec![1, 2, 3]];
        assert!(pack_encrypt_table(&table, &crt, &encoder, &encryptor).is_err());
    }
}

// ===========================================================================
// Chiffrement symétrique et déchiffrement BFV
//
// c = (Δ·m + e - a·s, a) avec a uniforme dans R_q et e binomial centré.
// Le déchiffrement arrondit t·[c₀ + c₁·s]_q / q : cette formulation
// fonctionne identiquement au niveau plein et au niveau dernier, sans Δ
// explicite côté déchiffrement.
//
// Le déchiffreur ne prend que &self et ne possède que des tables
// précalculées immuables : il est partageable entre les workers du
// recrypt sans synchronisation.
// ===========================================================================

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::bfv::context::BfvContext;
use crate::bfv::encoder::Plaintext;
use crate::bfv::keys::{sample_noise, sample_uniform, SecretKey};
use crate::bfv::ntt::{add_mod, sub_mod};
use crate::bfv::poly::RnsPoly;
use crate::crypto_error::CryptoError;
use crate::math::math::mulmod;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ciphertext {
    /// Composantes polynomiales (taille 2 partout dans ce dépôt)
    pub c: Vec<RnsPoly>,
    /// Niveau dans la chaîne de modulus (0 = plein, dernier = q₁ seul)
    pub level: usize,
}

// Forme NTT de la clé secrète pour chaque module de niveau 0
fn secret_key_ntt(ctx: &BfvContext, sk: &SecretKey) -> Vec<Vec<u64>> {
    let s = sk.to_rns(ctx.moduli_at(0));
    s.rns
        .into_iter()
        .zip(ctx.ntt_at(0).iter())
        .map(|(mut coeffs, table)| {
            table.forward(&mut coeffs);
            coeffs
        })
        .collect()
}

// ===========================================================================
// Chiffreur symétrique
// ===========================================================================
pub struct Encryptor<'a> {
    ctx: &'a BfvContext,
    sk_ntt: Vec<Vec<u64>>,
}

impl<'a> Encryptor<'a> {
    pub fn new(ctx: &'a BfvContext, sk: &SecretKey) -> Encryptor<'a> {
        Encryptor { ctx, sk_ntt: secret_key_ntt(ctx, sk) }
    }

    pub fn encrypt_symmetric(&self, pt: &Plaintext) -> Result<Ciphertext, CryptoError> {
        let ctx = self.ctx;
        if pt.coeffs.len() != ctx.n {
            return Err(CryptoError::Parameter(format!(
                "plaintext de {} coefficients pour un degré {}",
                pt.coeffs.len(),
                ctx.n
            )));
        }

        let mut rng = StdRng::from_entropy();
        let a = sample_uniform(ctx, 0, &mut rng);
        let e = RnsPoly::from_signed(&sample_noise(ctx.n, &mut rng), ctx.moduli_at(0));

        let mut c0 = RnsPoly::zero(ctx.moduli_at(0).len(), ctx.n);
        for (i, table) in ctx.ntt_at(0).iter().enumerate() {
            let p = table.modulus;
            // a·s via la forme NTT précalculée de s
            let mut a_s = a.rns[i].clone();
            table.forward(&mut a_s);
            for (v, &s) in a_s.iter_mut().zip(self.sk_ntt[i].iter()) {
                *v = mulmod(*v, s, p);
            }
            table.inverse(&mut a_s);

            let delta = ctx.delta_mod_q[i];
            for j in 0..ctx.n {
                let dm = mulmod(delta, pt.coeffs[j] % p, p);
                c0.rns[i][j] = sub_mod(add_mod(dm, e.rns[i][j], p), a_s[j], p);
            }
        }

        Ok(Ciphertext { c: vec![c0, a], level: 0 })
    }
}

// ===========================================================================
// Déchiffreur — &self uniquement, donc Sync
// ===========================================================================
pub struct Decryptor<'a> {
    ctx: &'a BfvContext,
    sk_ntt: Vec<Vec<u64>>,
}

impl<'a> Decryptor<'a> {
    pub fn new(ctx: &'a BfvContext, sk: &SecretKey) -> Decryptor<'a> {
        Decryptor { ctx, sk_ntt: secret_key_ntt(ctx, sk) }
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Plaintext, CryptoError> {
        let ctx = self.ctx;
        if ct.c.len() != 2 {
            return Err(CryptoError::Protocol(format!(
                "chiffré à {} composantes (relinéarisation manquante ?)",
                ct.c.len()
            )));
        }
        let level = ct.level;
        let moduli = ctx.moduli_at(level);
        let tables = ctx.ntt_at(level);

        // c₀ + c₁·s par module
        let mut sum = ct.c[0].clone();
        for (i, table) in tables.iter().enumerate() {
            let p = table.modulus;
            let mut c1_s = ct.c[1].rns[i].clone();
            table.forward(&mut c1_s);
            for (v, &s) in c1_s.iter_mut().zip(self.sk_ntt[i].iter()) {
                *v = mulmod(*v, s, p);
            }
            table.inverse(&mut c1_s);
            for (v, &w) in sum.rns[i].iter_mut().zip(c1_s.iter()) {
                *v = add_mod(*v, w, p);
            }
        }

        // m = round(t·x / q) mod t, coefficient par coefficient
        let t = ctx.t;
        let q = ctx.q_at(level);
        let mut coeffs = vec![0u64; ctx.n];
        if level == ctx.last_level() {
            // q tient sur un seul module : tout passe en u128
            let q_half = q >> 1;
            for j in 0..ctx.n {
                let x = sum.rns[0][j] as u128;
                coeffs[j] = (((t as u128 * x + q_half) / q) % t as u128) as u64;
            }
        } else {
            let t_big = BigUint::from(t);
            for j in 0..ctx.n {
                let residues: Vec<u64> = (0..moduli.len()).map(|i| sum.rns[i][j]).collect();
                let x = BigUint::from(ctx.lift(&residues));
                let m = ((&t_big * x + &ctx.q_half) / &ctx.q_big) % &t_big;
                coeffs[j] = m.to_u64().unwrap_or(0);
            }
        }

        Ok(Plaintext { coeffs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bfv::encoder::BatchEncoder;
    use crate::bfv::keys::KeyGenerator;
    use rand::Rng;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let ctx = BfvContext::new(4096, &[], &[40961, 65537]).unwrap();
        let encoder = BatchEncoder::new(&ctx).unwrap();
        let keygen = KeyGenerator::new(&ctx);
        let sk = keygen.secret_key();
        let encryptor = Encryptor::new(&ctx, &sk);
        let decryptor = Decryptor::new(&ctx, &sk);

        let mut rng = StdRng::seed_from_u64(17);
        let values: Vec<u64> = (0..4096).map(|_| rng.gen_range(0..ctx.t)).collect();
        let pt = encoder.encode(&values).unwrap();
        let ct = encryptor.encrypt_symmetric(&pt).unwrap();
        let decrypted = decryptor.decrypt(&ct).unwrap();
        assert_eq!(encoder.decode(&decrypted).unwrap(), values);
    }

    #[test]
    fn test_decrypt_rejects_oversized_ciphertext() {
        let ctx = BfvContext::new(4096, &[], &[40961]).unwrap();
        let keygen = KeyGenerator::new(&ctx);
        let sk = keygen.secret_key();
        let decryptor = Decryptor::new(&ctx, &sk);
        let bogus = Ciphertext {
            c: vec![RnsPoly::zero(2, 4096); 3],
            level: 0,
        };
        assert!(decryptor.decrypt(&bogus).is_err());
    }
}

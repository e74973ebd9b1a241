// ===========================================================================
// Matériel de clés BFV
//
// Clé secrète ternaire (zéroisée à la destruction, comme toute clé
// secrète de ce dépôt), clés de relinéarisation et clés de Galois par
// key switching en base 2^16. Les clés de switching sont stockées en
// domaine NTT : l'application ne coûte alors qu'un aller-retour NTT par
// digit et par module.
// ===========================================================================

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::bfv::context::{BfvContext, DECOMP_BASE_BITS};
use crate::bfv::poly::RnsPoly;
use crate::crypto_error::CryptoError;
use crate::math::math::{mulmod, powm};

// ===========================================================================
// Clé secrète — ZÉROISÉE À LA DESTRUCTION
// ===========================================================================
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretKey {
    /// Coefficients ternaires dans {-1, 0, 1}
    pub coeffs: Vec<i8>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl SecretKey {
    pub fn random(n: usize) -> SecretKey {
        let mut rng = StdRng::from_entropy();
        SecretKey { coeffs: (0..n).map(|_| rng.gen_range(-1i8..=1)).collect() }
    }

    /// Représentation RNS de la clé pour les modules donnés
    pub fn to_rns(&self, moduli: &[u64]) -> RnsPoly {
        let signed: Vec<i64> = self.coeffs.iter().map(|&c| c as i64).collect();
        RnsPoly::from_signed(&signed, moduli)
    }
}

// ===========================================================================
// Clés de key switching (relinéarisation, Galois)
// ===========================================================================

/// Paires (b_i, a_i) en domaine NTT, niveau 0 :
/// b_i = -(a_i·s + e_i) + B^i·w, où w est la cible (s² ou σ(s))
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeySwitchKey {
    pub pairs: Vec<(RnsPoly, RnsPoly)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelinKeys {
    pub key: KeySwitchKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaloisKeys {
    /// élément de Galois → clé de switching vers σ_g(s)
    pub keys: BTreeMap<u64, KeySwitchKey>,
}

impl GaloisKeys {
    pub fn key_for(&self, galois_elt: u64) -> Result<&KeySwitchKey, CryptoError> {
        self.keys.get(&galois_elt).ok_or_else(|| {
            CryptoError::Parameter(format!("clé de Galois absente pour l'élément {galois_elt}"))
        })
    }
}

// ===========================================================================
// Échantillonnage
// ===========================================================================

/// Bruit binomial centré, amplitude ±4 (σ = √2)
pub fn sample_noise(n: usize, rng: &mut StdRng) -> Vec<i64> {
    (0..n)
        .map(|_| {
            let bits: u8 = rng.gen();
            (bits & 0x0F).count_ones() as i64 - (bits >> 4).count_ones() as i64
        })
        .collect()
}

/// Polynôme uniforme modulo q (rejet sur la largeur binaire de q)
pub fn sample_uniform(ctx: &BfvContext, level: usize, rng: &mut StdRng) -> RnsPoly {
    let moduli = ctx.moduli_at(level);
    let q = ctx.q_at(level);
    let bits = 128 - q.leading_zeros();
    let mut out = RnsPoly::zero(moduli.len(), ctx.n);
    for j in 0..ctx.n {
        let x = loop {
            let candidate = rng.gen::<u128>() >> (128 - bits);
            if candidate < q {
                break candidate;
            }
        };
        for (i, &p) in moduli.iter().enumerate() {
            out.rns[i][j] = (x % p as u128) as u64;
        }
    }
    out
}

// ===========================================================================
// Générateur de clés
// ===========================================================================

pub struct KeyGenerator<'a> {
    ctx: &'a BfvContext,
    sk: SecretKey,
}

impl<'a> KeyGenerator<'a> {
    pub fn new(ctx: &'a BfvContext) -> KeyGenerator<'a> {
        KeyGenerator { ctx, sk: SecretKey::random(ctx.n) }
    }

    pub fn from_secret_key(ctx: &'a BfvContext, sk: SecretKey) -> KeyGenerator<'a> {
        KeyGenerator { ctx, sk }
    }

    pub fn secret_key(&self) -> SecretKey {
        self.sk.clone()
    }

    /// Clé de switching vers la cible w (RNS niveau 0, domaine coefficient)
    fn create_switch_key(&self, target: &RnsPoly) -> KeySwitchKey {
        let ctx = self.ctx;
        let moduli = ctx.moduli_at(0);
        let mut rng = StdRng::from_entropy();
        let s = self.sk.to_rns(moduli);

        let mut pairs = Vec::with_capacity(ctx.decomp_len);
        for digit in 0..ctx.decomp_len {
            let a = sample_uniform(ctx, 0, &mut rng);
            let e = RnsPoly::from_signed(&sample_noise(ctx.n, &mut rng), moduli);

            // b = -(a·s + e) + B^digit · w, module par module
            let mut b = RnsPoly::zero(moduli.len(), ctx.n);
            for (i, table) in ctx.ntt_at(0).iter().enumerate() {
                let p = table.modulus;
                let a_s = table.negacyclic_mul(&a.rns[i], &s.rns[i]);
                let base_pow = powm(2, DECOMP_BASE_BITS as u64 * digit as u64, p);
                for j in 0..ctx.n {
                    let mut v = p - (a_s[j] + e.rns[i][j]) % p;
                    if v == p {
                        v = 0;
                    }
                    v = (v + mulmod(base_pow, target.rns[i][j], p)) % p;
                    b.rns[i][j] = v;
                }
            }

            // Stockage en domaine NTT
            let mut b_ntt = b;
            let mut a_ntt = a;
            for (i, table) in ctx.ntt_at(0).iter().enumerate() {
                table.forward(&mut b_ntt.rns[i]);
                table.forward(&mut a_ntt.rns[i]);
            }
            pairs.push((b_ntt, a_ntt));
        }
        KeySwitchKey { pairs }
    }

    /// Clés de relinéarisation : cible s²
    pub fn create_relin_keys(&self) -> RelinKeys {
        let ctx = self.ctx;
        let moduli = ctx.moduli_at(0);
        let s = self.sk.to_rns(moduli);
        let mut s_squared = RnsPoly::zero(moduli.len(), ctx.n);
        for (i, table) in ctx.ntt_at(0).iter().enumerate() {
            s_squared.rns[i] = table.negacyclic_mul(&s.rns[i], &s.rns[i]);
        }
        RelinKeys { key: self.create_switch_key(&s_squared) }
    }

    /// Clés de Galois : rotations de lignes par puissances de deux
    /// (éléments 3^(2^j) mod 2N) et échange de colonnes (élément 2N-1)
    pub fn create_galois_keys(&self) -> GaloisKeys {
        let ctx = self.ctx;
        let moduli = ctx.moduli_at(0);
        let s = self.sk.to_rns(moduli);
        let two_n = 2 * ctx.n as u64;

        let mut elts = Vec::new();
        let mut e = 3u64;
        let mut step = 1usize;
        while step < ctx.n / 2 {
            elts.push(e);
            e = mulmod(e, e, two_n);
            step <<= 1;
        }
        elts.push(two_n - 1);

        let mut keys = BTreeMap::new();
        for elt in elts {
            let target = s.automorphism(elt, moduli);
            keys.insert(elt, self.create_switch_key(&target));
        }
        GaloisKeys { keys }
    }
}

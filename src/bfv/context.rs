// ===========================================================================
// Contexte BFV — parent unique de toutes les précalculations
//
// Le contexte possède les modules, les tables NTT et les constantes
// dérivées ; encodeur, chiffreur, évaluateur et déchiffreur ne font que
// l'emprunter en lecture. Il est donc partageable entre threads sans
// synchronisation pendant toute la durée d'une exécution PSI.
//
// Chaîne de modulus à deux niveaux : q = q₁·q₂ (niveau 0) puis q₁ seul
// (niveau dernier, cible du switching). q₂ est cherché sous la double
// congruence q₂ ≡ 1 (mod 2N) et q₁·q₂ ≡ 1 (mod t) : Δ = (q-1)/t est
// alors entier et le terme croisé q mod t du bruit de multiplication
// disparaît. Trois premiers auxiliaires étendent la base CRT pour le
// produit tensoriel exact de la multiplication.
// ===========================================================================

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::bfv::ntt::NttTable;
use crate::crypto_error::CryptoError;
use crate::math::prime::{are_coprime, generate_ntt_prime, is_prime};

/// Largeur totale de q par défaut, en bits (à défaut de logqi explicites)
const DEFAULT_Q_BITS: u32 = 109;
/// Base de décomposition du key switching
pub const DECOMP_BASE_BITS: u32 = 16;

#[derive(Debug)]
pub struct BfvContext {
    /// Degré du polynôme de modulus (N, puissance de deux)
    pub n: usize,
    /// Facteurs premiers du module de plaintext (les tᵢ du CRT)
    pub plain_ti: Vec<u64>,
    /// t = Πtᵢ
    pub t: u64,
    /// Modules de chiffrés [q₁, q₂] — le niveau dernier ne garde que q₁
    pub q_moduli: Vec<u64>,
    /// Premiers auxiliaires de la base étendue de multiplication
    pub aux_moduli: Vec<u64>,

    /// Tables NTT par module de q
    pub ntt_q: Vec<NttTable>,
    /// Tables NTT de la base étendue (q ∪ aux)
    pub ntt_ext: Vec<NttTable>,

    /// q = q₁·q₂
    pub q_big: BigUint,
    pub q_half: BigUint,
    /// Δ = (q-1)/t, réduit modulo chaque qᵢ
    pub delta_mod_q: Vec<u64>,

    /// Nombre de digits du key switching (base 2^DECOMP_BASE_BITS)
    pub decomp_len: usize,

    // Lift de Garner (q₁,q₂) → entier, et reconstruction base étendue
    inv_q1_mod_q2: u64,
    ext_punctured: Vec<BigUint>,
    ext_inv: Vec<u64>,
    ext_big: BigUint,
}

impl BfvContext {
    /// Instancie le schéma pour le degré n, les largeurs logqᵢ (vide =
    /// défaut) et les facteurs tᵢ du module de plaintext.
    pub fn new(n: usize, logqi: &[u32], plain_ti: &[u64]) -> Result<BfvContext, CryptoError> {
        if !n.is_power_of_two() || n < 8 {
            return Err(CryptoError::Parameter(format!(
                "degré de polynôme {n} : puissance de deux >= 8 attendue"
            )));
        }
        if plain_ti.is_empty() {
            return Err(CryptoError::Parameter("aucun module de plaintext tᵢ".into()));
        }
        let two_n = 2 * n as u64;
        for &ti in plain_ti {
            if !is_prime(ti) || (ti - 1) % two_n != 0 {
                return Err(CryptoError::Parameter(format!(
                    "tᵢ = {ti} : premier ≡ 1 (mod {two_n}) attendu pour le batching"
                )));
            }
        }
        if !are_coprime(plain_ti) {
            return Err(CryptoError::Parameter("les tᵢ doivent être premiers entre eux".into()));
        }
        let mut t: u64 = 1;
        for &ti in plain_ti {
            t = t.checked_mul(ti).ok_or_else(|| {
                CryptoError::Parameter("module de plaintext t hors de u64".into())
            })?;
        }
        if t >= 1 << 62 {
            return Err(CryptoError::Parameter(format!("t = {t} trop grand (>= 2^62)")));
        }

        let total_bits: u32 = if logqi.is_empty() {
            DEFAULT_Q_BITS
        } else {
            logqi.iter().sum()
        };
        if !(60..=118).contains(&total_bits) {
            return Err(CryptoError::Parameter(format!(
                "largeur de q {total_bits} bits : plage [60, 118] attendue"
            )));
        }
        let bits1 = total_bits / 2;
        let bits2 = total_bits - bits1;

        // q₁ : premier NTT de bits1 bits. C'est aussi le module du dernier
        // niveau : il doit dominer t pour que le déchiffrement après
        // switching conserve une marge de bruit.
        let q1 = generate_ntt_prime(1u64 << (bits1 - 1), two_n);
        if q1 >> 8 < t {
            return Err(CryptoError::Parameter(format!(
                "dernier module {q1} trop proche du module de plaintext {t}"
            )));
        }

        // q₂ : premier ≡ 1 (mod 2N) avec q₁·q₂ ≡ 1 (mod t).
        // t ≡ 1 (mod 2N) (produit de tᵢ ≡ 1), donc la solution CRT est
        // x = r + t·((1 - r) mod 2N) modulo le pas 2N·t, où r = q₁⁻¹ mod t.
        let r = inv_mod_u64(q1 % t, t).ok_or(CryptoError::KeyInvalid)?;
        let step = two_n as u128 * t as u128;
        let x0 = r as u128 + t as u128 * ((1 + step - r as u128) % two_n as u128);
        let start = 1u128 << (bits2 - 1);
        let mut candidate = if start <= x0 {
            x0
        } else {
            x0 + (start - x0).div_ceil(step) * step
        };
        while candidate <= u64::MAX as u128
            && (!is_prime(candidate as u64) || candidate as u64 == q1)
        {
            candidate += step;
        }
        if candidate > u64::MAX as u128 {
            return Err(CryptoError::KeyInvalid);
        }
        let q2 = candidate as u64;
        let q_moduli = vec![q1, q2];

        // Base auxiliaire : trois premiers NTT au-delà de 2^55, distincts de q
        let mut aux_moduli = Vec::with_capacity(3);
        let mut min = 1u64 << 55;
        while aux_moduli.len() < 3 {
            let p = generate_ntt_prime(min, two_n);
            min = p + 1;
            if p != q1 && p != q2 {
                aux_moduli.push(p);
            }
        }

        let mut ntt_q = Vec::new();
        for &p in &q_moduli {
            ntt_q.push(NttTable::new(n, p)?);
        }
        let mut ntt_ext = Vec::new();
        for &p in q_moduli.iter().chain(aux_moduli.iter()) {
            ntt_ext.push(NttTable::new(n, p)?);
        }

        let q_big = BigUint::from(q1) * BigUint::from(q2);
        let q_half = &q_big >> 1;
        let delta = (&q_big - BigUint::one()) / BigUint::from(t);
        let delta_mod_q: Vec<u64> = q_moduli
            .iter()
            .map(|&p| (&delta % BigUint::from(p)).to_u64().unwrap_or(0))
            .collect();

        let decomp_len = (total_bits as usize).div_ceil(DECOMP_BASE_BITS as usize);

        let inv_q1_mod_q2 = inv_mod_u64(q1 % q2, q2).ok_or(CryptoError::KeyInvalid)?;

        // Reconstruction CRT de la base étendue : X = Σ Pᵢ·((rᵢ·Pᵢ⁻¹) mod pᵢ)
        let ext_primes: Vec<u64> = q_moduli.iter().chain(aux_moduli.iter()).copied().collect();
        let mut ext_big = BigUint::one();
        for &p in &ext_primes {
            ext_big *= BigUint::from(p);
        }
        let mut ext_punctured = Vec::new();
        let mut ext_inv = Vec::new();
        for &p in &ext_primes {
            let punct = &ext_big / BigUint::from(p);
            let punct_mod = (&punct % BigUint::from(p)).to_u64().unwrap_or(0);
            let inv = inv_mod_u64(punct_mod, p).ok_or(CryptoError::KeyInvalid)?;
            ext_punctured.push(punct);
            ext_inv.push(inv);
        }

        Ok(BfvContext {
            n,
            plain_ti: plain_ti.to_vec(),
            t,
            q_moduli,
            aux_moduli,
            ntt_q,
            ntt_ext,
            q_big,
            q_half,
            delta_mod_q,
            decomp_len,
            inv_q1_mod_q2,
            ext_punctured,
            ext_inv,
            ext_big,
        })
    }

    /// Indice du dernier niveau de la chaîne de modulus
    pub fn last_level(&self) -> usize {
        self.q_moduli.len() - 1
    }

    /// Modules actifs au niveau donné
    pub fn moduli_at(&self, level: usize) -> &[u64] {
        &self.q_moduli[..self.q_moduli.len() - level]
    }

    pub fn ntt_at(&self, level: usize) -> &[NttTable] {
        &self.ntt_q[..self.q_moduli.len() - level]
    }

    /// Produit des modules actifs au niveau donné
    pub fn q_at(&self, level: usize) -> u128 {
        self.moduli_at(level)
            .iter()
            .fold(1u128, |acc, &p| acc * p as u128)
    }

    /// Relève un coefficient RNS du niveau donné vers [0, q) (Garner)
    pub fn lift(&self, residues: &[u64]) -> u128 {
        match residues.len() {
            1 => residues[0] as u128,
            2 => {
                let (q1, q2) = (self.q_moduli[0], self.q_moduli[1]);
                let r1 = residues[0];
                let diff = (residues[1] + q2 - r1 % q2) % q2;
                let k = (diff as u128 * self.inv_q1_mod_q2 as u128) % q2 as u128;
                r1 as u128 + q1 as u128 * k
            }
            _ => unreachable!("chaîne de modulus à deux niveaux"),
        }
    }

    /// Reconstruit l'entier exact < Πpᵢ depuis ses résidus en base étendue
    pub fn ext_reconstruct(&self, residues: &[u64]) -> BigUint {
        let mut acc = BigUint::zero();
        for (i, &r) in residues.iter().enumerate() {
            let scaled = (r as u128 * self.ext_inv[i] as u128)
                % (self.ext_primes_at(i) as u128);
            acc += &self.ext_punctured[i] * BigUint::from(scaled as u64);
        }
        acc % &self.ext_big
    }

    fn ext_primes_at(&self, i: usize) -> u64 {
        if i < self.q_moduli.len() {
            self.q_moduli[i]
        } else {
            self.aux_moduli[i - self.q_moduli.len()]
        }
    }
}

/// Inverse modulaire par Euclide étendu (i128) — None si gcd(a, m) != 1.
/// À distinguer du modinv exhaustif de math/ : ici m peut approcher 2^63.
pub fn inv_mod_u64(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }
    if old_r != 1 {
        return None;
    }
    let mut x = old_s % m as i128;
    if x < 0 {
        x += m as i128;
    }
    Some(x as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_congruences() {
        let ctx = BfvContext::new(4096, &[], &[40961, 65537]).unwrap();
        let two_n = 8192u64;
        let t = 40961u64 * 65537;
        assert_eq!(ctx.t, t);
        for &q in &ctx.q_moduli {
            assert!(is_prime(q));
            assert_eq!((q - 1) % two_n, 0);
        }
        // q ≡ 1 (mod t) : Δ entier exact
        let q = ctx.q_at(0);
        assert_eq!(q % t as u128, 1);
        // base étendue assez large pour le produit tensoriel : P > 2N·q²
        let bound = BigUint::from(2u64 * 4096) * BigUint::from(q) * BigUint::from(q);
        assert!(ctx.ext_big > bound);
    }

    #[test]
    fn test_lift_garner() {
        let ctx = BfvContext::new(4096, &[], &[40961]).unwrap();
        let (q1, q2) = (ctx.q_moduli[0], ctx.q_moduli[1]);
        for x in [0u128, 1, 123_456_789, (q1 as u128) * (q2 as u128) - 1] {
            let residues = [(x % q1 as u128) as u64, (x % q2 as u128) as u64];
            assert_eq!(ctx.lift(&residues), x);
        }
    }

    #[test]
    fn test_ext_reconstruct_exact() {
        let ctx = BfvContext::new(4096, &[], &[40961]).unwrap();
        let primes: Vec<u64> = ctx
            .q_moduli
            .iter()
            .chain(ctx.aux_moduli.iter())
            .copied()
            .collect();
        let x = BigUint::from(3u64).pow(140); // ~222 bits, < P
        assert!(x < ctx.ext_big);
        let residues: Vec<u64> = primes
            .iter()
            .map(|&p| (&x % BigUint::from(p)).to_u64().unwrap())
            .collect();
        assert_eq!(ctx.ext_reconstruct(&residues), x);
    }

    #[test]
    fn test_rejects_bad_plain_modulus() {
        // 12289 ≡ 1 (mod 8192) ? 12288 = 3·2^12 → non divisible par 8192
        assert!(BfvContext::new(4096, &[], &[12289]).is_err());
        // non premier
        assert!(BfvContext::new(4096, &[], &[40962]).is_err());
        // degré non puissance de deux
        assert!(BfvContext::new(1000, &[], &[40961]).is_err());
    }
}

// ===========================================================================
// Famille de hash universelle à double réduction modulaire
//
// H(x)  = (((c₃·(x⊕s) + c₂) mod p)·c₁ + c₀) mod m   — version complète
// Hq(x) = ((x⊕s)·c₁ + c₀) mod m                      — version rapide
//
// La version complète est uniforme et décorrélée grâce au premier p > m² ;
// la version rapide reste uniforme mais corrélée, suffisante pour le
// sélecteur de table g. Construction : §recette ci-dessous, premiers p
// deux à deux distincts au sein d'une même famille.
// ===========================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::crypto_error::CryptoError;
use crate::math::prime::generate_prime;

#[derive(Debug, Clone, PartialEq)]
pub struct UniversalHash {
    /// Coefficients c₀, c₁, c₂, c₃
    pub coeffs: Vec<u64>,
    /// Module de sortie (taille de table, ou k pour le sélecteur)
    pub modulus: u64,
    /// Premier impair p > modulus² (vaut k, non premier, pour le sélecteur)
    pub prime: u64,
    /// Graine XORée à l'entrée
    pub seed: u64,
}

impl UniversalHash {
    pub fn new(coeffs: Vec<u64>, modulus: u64, prime: u64, seed: u64) -> Self {
        UniversalHash { coeffs, modulus, prime, seed }
    }

    /// Hash complet — suffisamment uniforme et décorrélé
    pub fn hash(&self, value: u64) -> u64 {
        let x = (value ^ self.seed) as u128;
        let p = self.prime as u128;
        let inner = ((self.coeffs[3] as u128) * x + self.coeffs[2] as u128) % p;
        ((inner * self.coeffs[1] as u128 + self.coeffs[0] as u128) % self.modulus as u128) as u64
    }

    /// Hash rapide — très uniforme, mais corrélé
    pub fn quick_hash(&self, value: u64) -> u64 {
        let x = (value ^ self.seed) as u128;
        ((x * self.coeffs[1] as u128 + self.coeffs[0] as u128) % self.modulus as u128) as u64
    }

    // -----------------------------------------------------------------------
    // Sérialisation texte : "count c₀ … c_{count-1} mod p seed"
    // -----------------------------------------------------------------------

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.coeffs.len().to_string());
        for c in &self.coeffs {
            out.push(' ');
            out.push_str(&c.to_string());
        }
        out.push_str(&format!(" {} {} {}", self.modulus, self.prime, self.seed));
        out
    }

    /// Lit un hash depuis un flux de tokens (blancs comme séparateurs)
    pub fn from_tokens<'a, I>(tokens: &mut I) -> Result<Self, CryptoError>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut next_u64 = |what: &str| -> Result<u64, CryptoError> {
            tokens
                .next()
                .ok_or_else(|| CryptoError::Parameter(format!("flux de hash tronqué ({what})")))?
                .parse::<u64>()
                .map_err(|_| CryptoError::Parameter(format!("champ de hash illisible ({what})")))
        };

        let count = next_u64("count")? as usize;
        let mut coeffs = Vec::with_capacity(count);
        for i in 0..count {
            coeffs.push(next_u64(&format!("c{i}"))?);
        }
        let modulus = next_u64("mod")?;
        let prime = next_u64("p")?;
        let seed = next_u64("seed")?;
        Ok(UniversalHash { coeffs, modulus, prime, seed })
    }
}

// ---------------------------------------------------------------------------
// Recette de construction d'une famille de longueur h sur le module m :
//   1. pᵢ = nextprime(m² + U[0,m)), rejeté s'il est déjà pris ;
//   2. sᵢ ~ U[0, max_data], c₀ ~ U[0,m), c₂ = nextprime(U[0,pᵢ)), c₃ ~ U[0,pᵢ) ;
//   3. c₁ premier dans [0,m) ne divisant pas m — retirage sinon.
// ---------------------------------------------------------------------------
pub fn generate_family(num_hashes: u64, modulus: u64, max_data: u64) -> Vec<UniversalHash> {
    let mut rng = StdRng::from_entropy();
    let min_value = modulus * modulus;

    let mut primes: Vec<u64> = Vec::new();
    let mut family = Vec::with_capacity(num_hashes as usize);
    for _ in 0..num_hashes {
        let mut prime;
        loop {
            prime = generate_prime(min_value + rng.gen_range(0..modulus));
            if !primes.contains(&prime) {
                break;
            }
        }
        primes.push(prime);

        let seed = rng.gen_range(0..=max_data);
        let c0 = rng.gen_range(0..modulus);
        let c2 = generate_prime(rng.gen_range(0..prime));
        let c3 = rng.gen_range(0..prime);

        let mut c1;
        loop {
            c1 = generate_prime(rng.gen_range(0..modulus));
            if modulus % c1 != 0 {
                break;
            }
        }

        family.push(UniversalHash::new(vec![c0, c1, c2, c3], modulus, prime, seed));
    }
    family
}

/// Sélecteur g : même gabarit avec m = k et p = k (pas premier —
/// acceptable, seul quick_hash est évalué sur g)
pub fn generate_selector(num_tables: u64, max_data: u64) -> UniversalHash {
    let mut rng = StdRng::from_entropy();

    let seed = rng.gen_range(0..=max_data);
    let c0 = rng.gen_range(0..num_tables);
    let mut c1 = generate_prime(rng.gen_range(0..num_tables));
    while num_tables % c1 == 0 {
        c1 = generate_prime(c1 + 1);
    }

    UniversalHash::new(vec![c0, c1, 0, 1], num_tables, num_tables, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::prime::is_prime;

    #[test]
    fn test_family_construction_invariants() {
        let n = 64u64;
        let family = generate_family(4, n, (1 << 16) - 1);
        assert_eq!(family.len(), 4);

        let mut primes = Vec::new();
        for h in &family {
            assert_eq!(h.modulus, n);
            // p premier et > m²
            assert!(is_prime(h.prime));
            assert!(h.prime >= n * n);
            primes.push(h.prime);
            // c₁ premier ne divisant pas m
            assert!(is_prime(h.coeffs[1]));
            assert_ne!(n % h.coeffs[1], 0);
        }
        // p deux à deux distincts
        primes.sort_unstable();
        primes.dedup();
        assert_eq!(primes.len(), 4);
    }

    #[test]
    fn test_hash_output_in_range() {
        let family = generate_family(3, 128, u32::MAX as u64);
        for h in &family {
            for x in [0u64, 1, 12345, u32::MAX as u64] {
                assert!(h.hash(x) < 128);
                assert!(h.quick_hash(x) < 128);
            }
        }
    }

    #[test]
    fn test_selector_range_and_degenerate_k1() {
        let g = generate_selector(2, 1000);
        for x in 0..100u64 {
            assert!(g.quick_hash(x) < 2);
        }
        // k = 1 : g dégénère en constante 0
        let g1 = generate_selector(1, 1000);
        for x in 0..100u64 {
            assert_eq!(g1.quick_hash(x), 0);
        }
    }

    #[test]
    fn test_text_roundtrip_byte_identical() {
        let h = UniversalHash::new(vec![17, 3, 4099, 1234], 64, 4211, 987654321);
        let text = h.to_text();
        assert_eq!(text, "4 17 3 4099 1234 64 4211 987654321");
        let parsed = UniversalHash::from_tokens(&mut text.split_whitespace()).unwrap();
        assert_eq!(parsed, h);
        // serialise → parse → serialise : flux identique octet pour octet
        assert_eq!(parsed.to_text(), text);
    }

    #[test]
    fn test_parse_rejects_truncated_stream() {
        let err = UniversalHash::from_tokens(&mut "4 1 2 3".split_whitespace());
        assert!(err.is_err());
    }
}

// ===========================================================================
// Empaquetage CRT — restes chinois sur modules u64 premiers entre eux
//
// Un vecteur de longueur k·N (bloc-major, blocs de k) devient un vecteur
// de longueur N dont chaque entrée est l'unique résidu mod M = Πmᵢ
// compatible avec les k composantes. Encode ∘ decode est l'identité sur
// les entrées de [0, mⱼ) ; pour des entrées plus larges, l'encodage les
// projette mod mⱼ, ce que le circuit PSI exploite (égalité mod M).
// ===========================================================================

use crate::crypto_error::CryptoError;
use crate::math::math::modinv;

#[derive(Debug, Clone, PartialEq)]
pub struct CrtParams {
    /// Modules mᵢ, premiers entre eux deux à deux
    pub mi: Vec<u64>,
    /// M = Πmᵢ
    pub m_big: u64,
    /// Mᵢ = M / mᵢ
    pub big_mi: Vec<u64>,
    /// Mᵢ⁻¹ mod mᵢ
    pub inv_big_mi: Vec<u64>,
}

/// Construit les paramètres CRT pour la liste de modules donnée
pub fn crt_params(vt: &[u64]) -> CrtParams {
    let mi = vt.to_vec();
    let mut m_big = 1u64;
    for &m in &mi {
        m_big *= m;
    }
    let big_mi: Vec<u64> = mi.iter().map(|&m| m_big / m).collect();
    let inv_big_mi: Vec<u64> = big_mi
        .iter()
        .zip(mi.iter())
        .map(|(&bm, &m)| modinv(bm % m, m))
        .collect();
    CrtParams { mi, m_big, big_mi, inv_big_mi }
}

/// vpack[i] = (Σⱼ v[i·k+j] · Mⱼ · Mⱼ⁻¹) mod M
pub fn crt_encode(vs: &[u64], crt: &CrtParams) -> Result<Vec<u64>, CryptoError> {
    let step = crt.mi.len();
    if vs.len() % step != 0 {
        return Err(CryptoError::CrtLength { len: vs.len(), step });
    }

    let size = vs.len() / step;
    let m_big = crt.m_big as u128;
    let mut vpack = vec![0u64; size];
    for (i, slot) in vpack.iter_mut().enumerate() {
        let mut acc: u128 = 0;
        for j in 0..step {
            let v = vs[i * step + j] as u128;
            let term = (v % m_big) * (crt.big_mi[j] as u128) % m_big;
            acc = (acc + term * (crt.inv_big_mi[j] as u128)) % m_big;
        }
        *slot = acc as u64;
    }
    Ok(vpack)
}

/// v[i·k+j] = vpack[i] mod mⱼ
pub fn crt_decode(vpack: &[u64], crt: &CrtParams) -> Vec<u64> {
    let step = crt.mi.len();
    let mut vs = vec![0u64; vpack.len() * step];
    for (i, &packed) in vpack.iter().enumerate() {
        for j in 0..step {
            vs[i * step + j] = packed % crt.mi[j];
        }
    }
    vs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_crt_roundtrip_in_range() {
        let crt = crt_params(&[40961, 65537]);
        assert_eq!(crt.m_big, 40961 * 65537);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let vs: Vec<u64> = (0..64)
            .map(|i| rng.gen_range(0..crt.mi[i % 2]))
            .collect();
        let packed = crt_encode(&vs, &crt).unwrap();
        assert_eq!(packed.len(), 32);
        assert_eq!(crt_decode(&packed, &crt), vs);
    }

    #[test]
    fn test_crt_single_modulus_is_identity() {
        // k = 1 : l'empaquetage dégénère en identité
        let crt = crt_params(&[40961]);
        let vs: Vec<u64> = vec![0, 1, 2, 40960];
        let packed = crt_encode(&vs, &crt).unwrap();
        assert_eq!(packed, vs);
        assert_eq!(crt_decode(&packed, &crt), vs);
    }

    #[test]
    fn test_crt_rejects_bad_length() {
        let crt = crt_params(&[40961, 65537]);
        let err = crt_encode(&[1, 2, 3], &crt).unwrap_err();
        assert_eq!(err, CryptoError::CrtLength { len: 3, step: 2 });
    }

    #[test]
    fn test_crt_projects_large_values() {
        // Une valeur >= mⱼ est projetée mod mⱼ dans chaque composante :
        // c'est l'identité mod M dont dépend le circuit d'intersection.
        let crt = crt_params(&[40961, 65537]);
        let v = 1u64 << 22;
        let packed = crt_encode(&[v, v], &crt).unwrap();
        assert_eq!(packed[0] % 40961, v % 40961);
        assert_eq!(packed[0] % 65537, v % 65537);
        assert_eq!(packed[0], v); // v < M : le résidu est la valeur elle-même
    }
}

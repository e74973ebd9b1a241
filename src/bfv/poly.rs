// ===========================================================================
// Polynômes en représentation RNS (un vecteur de coefficients par module)
//
// Les chiffrés vivent en domaine coefficient ; les passages en domaine
// NTT sont locaux aux produits. Toutes les opérations prennent la liste
// des modules actifs du niveau courant.
// ===========================================================================

use serde::{Deserialize, Serialize};

use crate::bfv::ntt::{add_mod, sub_mod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnsPoly {
    /// rns[i][j] = coefficient j modulo le i-ème module actif
    pub rns: Vec<Vec<u64>>,
}

impl RnsPoly {
    pub fn zero(num_moduli: usize, n: usize) -> RnsPoly {
        RnsPoly { rns: vec![vec![0u64; n]; num_moduli] }
    }

    /// Réduit une liste de petits entiers signés (bruit, clé ternaire)
    /// modulo chaque module — même représentant entier partout
    pub fn from_signed(values: &[i64], moduli: &[u64]) -> RnsPoly {
        let rns = moduli
            .iter()
            .map(|&p| {
                values
                    .iter()
                    .map(|&v| {
                        if v >= 0 {
                            v as u64 % p
                        } else {
                            p - ((-v) as u64 % p)
                        }
                    })
                    .collect()
            })
            .collect();
        RnsPoly { rns }
    }

    /// Réduit des coefficients u64 (ex. un plaintext mod t) module par module
    pub fn from_unsigned(values: &[u64], moduli: &[u64]) -> RnsPoly {
        let rns = moduli
            .iter()
            .map(|&p| values.iter().map(|&v| v % p).collect())
            .collect();
        RnsPoly { rns }
    }

    pub fn add_assign(&mut self, other: &RnsPoly, moduli: &[u64]) {
        for (i, &p) in moduli.iter().enumerate() {
            for (a, &b) in self.rns[i].iter_mut().zip(other.rns[i].iter()) {
                *a = add_mod(*a, b, p);
            }
        }
    }

    pub fn sub_assign(&mut self, other: &RnsPoly, moduli: &[u64]) {
        for (i, &p) in moduli.iter().enumerate() {
            for (a, &b) in self.rns[i].iter_mut().zip(other.rns[i].iter()) {
                *a = sub_mod(*a, b, p);
            }
        }
    }

    pub fn negate_assign(&mut self, moduli: &[u64]) {
        for (i, &p) in moduli.iter().enumerate() {
            for a in self.rns[i].iter_mut() {
                if *a != 0 {
                    *a = p - *a;
                }
            }
        }
    }

    /// Automorphisme de Galois x → x^g sur le quotient x^n + 1 :
    /// le coefficient i part en ±x^(i·g mod n), signe négatif si le
    /// représentant mod 2n retombe dans la moitié haute
    pub fn automorphism(&self, galois_elt: u64, moduli: &[u64]) -> RnsPoly {
        let n = self.rns[0].len();
        let two_n = 2 * n;
        let g = galois_elt as usize;
        let mut out = RnsPoly::zero(self.rns.len(), n);
        for (k, &p) in moduli.iter().enumerate() {
            for i in 0..n {
                let idx = (i * g) % two_n;
                let a = self.rns[k][i];
                if idx < n {
                    out.rns[k][idx] = a;
                } else {
                    out.rns[k][idx - n] = if a == 0 { 0 } else { p - a };
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_signed_consistent_residues() {
        let moduli = [97u64, 193];
        let poly = RnsPoly::from_signed(&[-1, 0, 5, -96], &moduli);
        assert_eq!(poly.rns[0], vec![96, 0, 5, 1]);
        assert_eq!(poly.rns[1], vec![192, 0, 5, 97]);
    }

    #[test]
    fn test_automorphism_identity_and_inverse() {
        let moduli = [97u64];
        let n = 8;
        let values: Vec<i64> = (0..n as i64).collect();
        let poly = RnsPoly::from_signed(&values, &moduli);

        // g = 1 : identité
        assert_eq!(poly.automorphism(1, &moduli), poly);

        // g = 2n - 1 est une involution (x → x⁻¹)
        let swapped = poly.automorphism(2 * n as u64 - 1, &moduli);
        assert_eq!(swapped.automorphism(2 * n as u64 - 1, &moduli), poly);
    }

    #[test]
    fn test_automorphism_signs() {
        // x → x³ : x³ part en x⁹ = x^(9-8)·(-1) pour n = 8
        let moduli = [97u64];
        let mut poly = RnsPoly::zero(1, 8);
        poly.rns[0][3] = 2;
        let out = poly.automorphism(3, &moduli);
        assert_eq!(out.rns[0][1], 95); // -2 mod 97
    }
}

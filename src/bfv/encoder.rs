// ===========================================================================
// Encodeur batch — bijection entre vecteurs de longueur N mod t et
// plaintexts (polynômes mod t)
//
// t = Πtᵢ est composite : l'encodage passe par une NTT négacyclique par
// facteur premier tᵢ puis recombine les coefficients par restes chinois.
// Disposition des slots en deux lignes : le slot i de la ligne 0 porte
// l'évaluation à l'exposant 3^i mod 2N, la ligne 1 les exposants opposés.
// L'automorphisme x → x³ décale ainsi chaque ligne d'un cran et
// x → x^(2N-1) échange les lignes.
// ===========================================================================

use serde::{Deserialize, Serialize};

use crate::bfv::context::BfvContext;
use crate::bfv::ntt::NttTable;
use crate::crypto_error::CryptoError;
use crate::math::crt::{crt_encode, crt_params, CrtParams};

/// Polynôme de plaintext, coefficients modulo t
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plaintext {
    pub coeffs: Vec<u64>,
}

pub struct BatchEncoder {
    n: usize,
    /// CRT sur les facteurs premiers de t
    factor_crt: CrtParams,
    /// Une table NTT par facteur tᵢ
    ntt: Vec<NttTable>,
    /// slot s → indice NTT naturel j (exposant 2j+1)
    slot_to_eval: Vec<usize>,
}

impl BatchEncoder {
    pub fn new(ctx: &BfvContext) -> Result<BatchEncoder, CryptoError> {
        let n = ctx.n;
        let mut ntt = Vec::new();
        for &ti in &ctx.plain_ti {
            ntt.push(NttTable::new(n, ti)?);
        }

        // Slot (ligne 0, col i) ↔ exposant 3^i mod 2N ; ligne 1 ↔ opposés.
        // L'indice NTT d'un exposant impair e est (e-1)/2.
        let two_n = 2 * n as u64;
        let mut slot_to_eval = vec![0usize; n];
        let mut e = 1u64;
        for i in 0..n / 2 {
            slot_to_eval[i] = ((e - 1) / 2) as usize;
            slot_to_eval[i + n / 2] = ((two_n - e - 1) / 2) as usize;
            e = e * 3 % two_n;
        }

        Ok(BatchEncoder {
            n,
            factor_crt: crt_params(&ctx.plain_ti),
            ntt,
            slot_to_eval,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.n
    }

    pub fn plain_modulus(&self) -> u64 {
        self.factor_crt.m_big
    }

    /// Vecteur de slots (longueur <= N, complété par des zéros) → plaintext
    pub fn encode(&self, values: &[u64]) -> Result<Plaintext, CryptoError> {
        if values.len() > self.n {
            return Err(CryptoError::Parameter(format!(
                "vecteur de {} slots pour un encodeur de {} slots",
                values.len(),
                self.n
            )));
        }

        let k = self.ntt.len();
        let mut per_factor = Vec::with_capacity(k);
        for table in &self.ntt {
            let ti = table.modulus;
            let mut evals = vec![0u64; self.n];
            for (s, &v) in values.iter().enumerate() {
                evals[self.slot_to_eval[s]] = v % ti;
            }
            table.inverse(&mut evals);
            per_factor.push(evals);
        }

        // Recombinaison CRT coefficient par coefficient (bloc-major)
        let mut interleaved = vec![0u64; self.n * k];
        for j in 0..self.n {
            for (i, coeffs) in per_factor.iter().enumerate() {
                interleaved[j * k + i] = coeffs[j];
            }
        }
        Ok(Plaintext { coeffs: crt_encode(&interleaved, &self.factor_crt)? })
    }

    /// Plaintext → vecteur de N slots mod t
    pub fn decode(&self, pt: &Plaintext) -> Result<Vec<u64>, CryptoError> {
        if pt.coeffs.len() != self.n {
            return Err(CryptoError::Parameter(format!(
                "plaintext de {} coefficients pour un encodeur de degré {}",
                pt.coeffs.len(),
                self.n
            )));
        }

        let k = self.ntt.len();
        let mut per_factor = Vec::with_capacity(k);
        for table in &self.ntt {
            let ti = table.modulus;
            let mut evals: Vec<u64> = pt.coeffs.iter().map(|&c| c % ti).collect();
            table.forward(&mut evals);
            per_factor.push(evals);
        }

        let mut interleaved = vec![0u64; self.n * k];
        for s in 0..self.n {
            let j = self.slot_to_eval[s];
            for (i, evals) in per_factor.iter().enumerate() {
                interleaved[s * k + i] = evals[j];
            }
        }
        crt_encode(&interleaved, &self.factor_crt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn encoder() -> BatchEncoder {
        let ctx = BfvContext::new(4096, &[], &[40961, 65537]).unwrap();
        BatchEncoder::new(&ctx).unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let enc = encoder();
        let t = enc.plain_modulus();
        let mut rng = StdRng::seed_from_u64(99);
        let values: Vec<u64> = (0..4096).map(|_| rng.gen_range(0..t)).collect();
        let pt = enc.encode(&values).unwrap();
        assert_eq!(enc.decode(&pt).unwrap(), values);
    }

    #[test]
    fn test_short_vector_pads_with_zeros() {
        let enc = encoder();
        let pt = enc.encode(&[7, 8, 9]).unwrap();
        let decoded = enc.decode(&pt).unwrap();
        assert_eq!(&decoded[..3], &[7, 8, 9]);
        assert!(decoded[3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_rejects_oversized_vector() {
        let enc = encoder();
        assert!(enc.encode(&vec![0u64; 4097]).is_err());
    }

    #[test]
    fn test_plain_multiplication_is_slotwise() {
        // Le produit polynomial mod (x^N + 1, t) doit agir slot par slot :
        // c'est l'hypothèse de tout le circuit d'intersection.
        let enc = encoder();
        let t = enc.factor_crt.m_big;
        let mut rng = StdRng::seed_from_u64(5);
        let a: Vec<u64> = (0..4096).map(|_| rng.gen_range(0..t)).collect();
        let b: Vec<u64> = (0..4096).map(|_| rng.gen_range(0..t)).collect();
        let pa = enc.encode(&a).unwrap();
        let pb = enc.encode(&b).unwrap();

        // produit négacyclique mod t via les facteurs premiers
        let k = enc.ntt.len();
        let mut interleaved = vec![0u64; 4096 * k];
        for (i, table) in enc.ntt.iter().enumerate() {
            let ti = table.modulus;
            let ca: Vec<u64> = pa.coeffs.iter().map(|&c| c % ti).collect();
            let cb: Vec<u64> = pb.coeffs.iter().map(|&c| c % ti).collect();
            let prod = table.negacyclic_mul(&ca, &cb);
            for j in 0..4096 {
                interleaved[j * k + i] = prod[j];
            }
        }
        let product = Plaintext {
            coeffs: crt_encode(&interleaved, &enc.factor_crt).unwrap(),
        };

        let decoded = enc.decode(&product).unwrap();
        for s in 0..4096 {
            let expected = (a[s] as u128 * b[s] as u128 % t as u128) as u64;
            assert_eq!(decoded[s], expected, "slot {s}");
        }
    }

    #[test]
    fn test_slot_layout_rotates_under_x_cubed() {
        // Substituer x → x³ dans le polynôme doit décaler la ligne 0
        // d'un cran vers la gauche (et de même la ligne 1).
        let enc = encoder();
        let values: Vec<u64> = (0..4096u64).collect();
        let pt = enc.encode(&values).unwrap();

        // automorphisme en domaine coefficient, par facteur premier
        let k = enc.ntt.len();
        let n = 4096usize;
        let mut interleaved = vec![0u64; n * k];
        for (i, table) in enc.ntt.iter().enumerate() {
            let ti = table.modulus;
            let mut out = vec![0u64; n];
            for idx in 0..n {
                let target = (idx * 3) % (2 * n);
                let c = pt.coeffs[idx] % ti;
                if target < n {
                    out[target] = c;
                } else {
                    out[target - n] = if c == 0 { 0 } else { ti - c };
                }
            }
            for j in 0..n {
                interleaved[j * k + i] = out[j];
            }
        }
        let rotated = Plaintext {
            coeffs: crt_encode(&interleaved, &enc.factor_crt).unwrap(),
        };
        let decoded = enc.decode(&rotated).unwrap();

        let half = n / 2;
        for s in 0..half {
            assert_eq!(decoded[s], values[(s + 1) % half]);
            assert_eq!(decoded[half + s], values[half + (s + 1) % half]);
        }
    }
}

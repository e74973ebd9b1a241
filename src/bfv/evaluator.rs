// ===========================================================================
// Évaluateur homomorphe
//
// Additions/soustractions élément par élément en RNS ; multiplication par
// produit tensoriel entier exact (base CRT étendue) suivi de l'échelle
// t/q arrondie puis d'une relinéarisation ; multiply_many en arbre
// équilibré ; switching vers le dernier niveau ; rotations par
// automorphismes de Galois avec key switching.
//
// L'évaluateur n'emprunte le contexte qu'en lecture : une même instance
// est partagée telle quelle par tous les workers d'une exécution.
// ===========================================================================

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::bfv::context::{BfvContext, DECOMP_BASE_BITS};
use crate::bfv::encoder::Plaintext;
use crate::bfv::encrypt::Ciphertext;
use crate::bfv::keys::{GaloisKeys, KeySwitchKey, RelinKeys};
use crate::bfv::ntt::{add_mod, sub_mod};
use crate::bfv::poly::RnsPoly;
use crate::crypto_error::CryptoError;
use crate::math::math::mulmod;

pub struct Evaluator<'a> {
    ctx: &'a BfvContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a BfvContext) -> Evaluator<'a> {
        Evaluator { ctx }
    }

    fn same_level(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(), CryptoError> {
        if a.level != b.level {
            return Err(CryptoError::LevelMismatch { expected: a.level, found: b.level });
        }
        Ok(())
    }

    fn full_level(&self, ct: &Ciphertext) -> Result<(), CryptoError> {
        if ct.level != 0 {
            return Err(CryptoError::LevelMismatch { expected: 0, found: ct.level });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Opérations linéaires
    // -----------------------------------------------------------------------

    pub fn negate(&self, a: &Ciphertext) -> Ciphertext {
        let moduli = self.ctx.moduli_at(a.level);
        let mut out = a.clone();
        for comp in out.c.iter_mut() {
            comp.negate_assign(moduli);
        }
        out
    }

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CryptoError> {
        self.same_level(a, b)?;
        let moduli = self.ctx.moduli_at(a.level);
        let mut out = a.clone();
        for (comp, other) in out.c.iter_mut().zip(b.c.iter()) {
            comp.add_assign(other, moduli);
        }
        Ok(out)
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext, CryptoError> {
        self.same_level(a, b)?;
        let moduli = self.ctx.moduli_at(a.level);
        let mut out = a.clone();
        for (comp, other) in out.c.iter_mut().zip(b.c.iter()) {
            comp.sub_assign(other, moduli);
        }
        Ok(out)
    }

    /// ct + Δ·m (niveau plein uniquement, Δ n'étant défini que pour q)
    pub fn add_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext, CryptoError> {
        self.plain_offset(ct, pt, false)
    }

    /// ct - Δ·m
    pub fn sub_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext, CryptoError> {
        self.plain_offset(ct, pt, true)
    }

    fn plain_offset(
        &self,
        ct: &Ciphertext,
        pt: &Plaintext,
        negate: bool,
    ) -> Result<Ciphertext, CryptoError> {
        self.full_level(ct)?;
        let ctx = self.ctx;
        let mut out = ct.clone();
        for (i, &p) in ctx.moduli_at(0).iter().enumerate() {
            let delta = ctx.delta_mod_q[i];
            for (j, v) in out.c[0].rns[i].iter_mut().enumerate() {
                let dm = mulmod(delta, pt.coeffs[j] % p, p);
                *v = if negate { sub_mod(*v, dm, p) } else { add_mod(*v, dm, p) };
            }
        }
        Ok(out)
    }

    /// Produit chiffré × plaintext (pas d'échelle : décrypte vers m·m')
    pub fn multiply_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext, CryptoError> {
        let ctx = self.ctx;
        let tables = ctx.ntt_at(ct.level);
        let mut out = ct.clone();
        for (i, table) in tables.iter().enumerate() {
            let p = table.modulus;
            let mut fm: Vec<u64> = pt.coeffs.iter().map(|&c| c % p).collect();
            table.forward(&mut fm);
            for comp in out.c.iter_mut() {
                let mut fc = comp.rns[i].clone();
                table.forward(&mut fc);
                for (v, &m) in fc.iter_mut().zip(fm.iter()) {
                    *v = mulmod(*v, m, p);
                }
                table.inverse(&mut fc);
                comp.rns[i] = fc;
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Multiplication chiffré × chiffré
    //
    // Produit tensoriel exact : les coefficients sont relevés en entiers,
    // transportés dans la base CRT étendue (dont le produit dépasse 2N·q²),
    // multipliés point à point en NTT, reconstruits exactement, puis
    // ramenés à l'échelle round(t·X/q) mod q. Relinéarisation immédiate :
    // aucun chiffré à trois composantes ne sort de cette fonction.
    // -----------------------------------------------------------------------

    pub fn multiply(
        &self,
        a: &Ciphertext,
        b: &Ciphertext,
        relin_keys: &RelinKeys,
    ) -> Result<Ciphertext, CryptoError> {
        self.full_level(a)?;
        self.full_level(b)?;
        let ctx = self.ctx;
        let n = ctx.n;

        // Relèvement entier des quatre polynômes d'entrée
        let lift_poly = |poly: &RnsPoly| -> Vec<u128> {
            (0..n).map(|j| ctx.lift(&[poly.rns[0][j], poly.rns[1][j]])).collect()
        };
        let a0 = lift_poly(&a.c[0]);
        let a1 = lift_poly(&a.c[1]);
        let b0 = lift_poly(&b.c[0]);
        let b1 = lift_poly(&b.c[1]);

        // Tensoriel dans chaque module de la base étendue
        let num_ext = ctx.ntt_ext.len();
        let mut d0_res = vec![Vec::new(); num_ext];
        let mut d1_res = vec![Vec::new(); num_ext];
        let mut d2_res = vec![Vec::new(); num_ext];
        for (i, table) in ctx.ntt_ext.iter().enumerate() {
            let p = table.modulus;
            let reduce = |poly: &[u128]| -> Vec<u64> {
                poly.iter().map(|&x| (x % p as u128) as u64).collect()
            };
            let mut fa0 = reduce(&a0);
            let mut fa1 = reduce(&a1);
            let mut fb0 = reduce(&b0);
            let mut fb1 = reduce(&b1);
            table.forward(&mut fa0);
            table.forward(&mut fa1);
            table.forward(&mut fb0);
            table.forward(&mut fb1);

            let mut d0 = vec![0u64; n];
            let mut d1 = vec![0u64; n];
            let mut d2 = vec![0u64; n];
            for j in 0..n {
                d0[j] = mulmod(fa0[j], fb0[j], p);
                d1[j] = add_mod(mulmod(fa0[j], fb1[j], p), mulmod(fa1[j], fb0[j], p), p);
                d2[j] = mulmod(fa1[j], fb1[j], p);
            }
            table.inverse(&mut d0);
            table.inverse(&mut d1);
            table.inverse(&mut d2);
            d0_res[i] = d0;
            d1_res[i] = d1;
            d2_res[i] = d2;
        }

        // Reconstruction exacte puis échelle round(t·X/q) mod q
        let t_big = BigUint::from(ctx.t);
        let moduli = ctx.moduli_at(0);
        let scale = |residues_per_prime: &[Vec<u64>]| -> RnsPoly {
            let mut out = RnsPoly::zero(moduli.len(), n);
            let mut residues = vec![0u64; num_ext];
            for j in 0..n {
                for i in 0..num_ext {
                    residues[i] = residues_per_prime[i][j];
                }
                let x = ctx.ext_reconstruct(&residues);
                let y = (&t_big * x + &ctx.q_half) / &ctx.q_big;
                for (i, &p) in moduli.iter().enumerate() {
                    out.rns[i][j] = (&y % BigUint::from(p)).to_u64().unwrap_or(0);
                }
            }
            out
        };
        let d0 = scale(&d0_res);
        let d1 = scale(&d1_res);
        let d2 = scale(&d2_res);

        // Relinéarisation : (d0, d1, d2) → (d0 + ks0, d1 + ks1)
        let (ks0, ks1) = self.key_switch(&d2, &relin_keys.key);
        let mut c0 = d0;
        let mut c1 = d1;
        c0.add_assign(&ks0, moduli);
        c1.add_assign(&ks1, moduli);

        Ok(Ciphertext { c: vec![c0, c1], level: 0 })
    }

    /// Produit en arbre équilibré : la profondeur vue par chaque chiffré
    /// est ⌈log₂(len)⌉ quelle que soit la taille du paquet
    pub fn multiply_many(
        &self,
        cts: &[Ciphertext],
        relin_keys: &RelinKeys,
    ) -> Result<Ciphertext, CryptoError> {
        if cts.is_empty() {
            return Err(CryptoError::Parameter("multiply_many sur un paquet vide".into()));
        }
        let mut layer = cts.to_vec();
        while layer.len() > 1 {
            let mut next = Vec::with_capacity(layer.len().div_ceil(2));
            for pair in layer.chunks(2) {
                if pair.len() == 2 {
                    next.push(self.multiply(&pair[0], &pair[1], relin_keys)?);
                } else {
                    next.push(pair[0].clone());
                }
            }
            layer = next;
        }
        Ok(layer.pop().expect("paquet non vide"))
    }

    // -----------------------------------------------------------------------
    // Switching vers le dernier jeu de paramètres : c' = round(c / q₂)
    // -----------------------------------------------------------------------

    pub fn mod_switch_to_last(&self, ct: &Ciphertext) -> Result<Ciphertext, CryptoError> {
        let ctx = self.ctx;
        if ct.level == ctx.last_level() {
            return Ok(ct.clone());
        }
        let q1 = ctx.q_moduli[0] as u128;
        let q2 = ctx.q_moduli[1] as u128;
        let half2 = q2 >> 1;

        let mut comps = Vec::with_capacity(ct.c.len());
        for comp in &ct.c {
            let mut out = RnsPoly::zero(1, ctx.n);
            for j in 0..ctx.n {
                let x = ctx.lift(&[comp.rns[0][j], comp.rns[1][j]]);
                let y = (x + half2) / q2;
                out.rns[0][j] = (y % q1) as u64;
            }
            comps.push(out);
        }
        Ok(Ciphertext { c: comps, level: ctx.last_level() })
    }

    // -----------------------------------------------------------------------
    // Automorphismes de Galois et rotations
    // -----------------------------------------------------------------------

    fn key_switch(&self, d: &RnsPoly, key: &KeySwitchKey) -> (RnsPoly, RnsPoly) {
        let ctx = self.ctx;
        let n = ctx.n;
        let moduli = ctx.moduli_at(0);
        let tables = ctx.ntt_at(0);
        let mask = (1u128 << DECOMP_BASE_BITS) - 1;

        let lifted: Vec<u128> = (0..n).map(|j| ctx.lift(&[d.rns[0][j], d.rns[1][j]])).collect();

        let mut acc0 = RnsPoly::zero(moduli.len(), n);
        let mut acc1 = RnsPoly::zero(moduli.len(), n);
        for (digit, (b, a)) in key.pairs.iter().enumerate() {
            let shift = DECOMP_BASE_BITS as usize * digit;
            let digit_coeffs: Vec<u64> =
                lifted.iter().map(|&x| ((x >> shift) & mask) as u64).collect();
            for (i, table) in tables.iter().enumerate() {
                let p = table.modulus;
                let mut dv = digit_coeffs.clone();
                table.forward(&mut dv);
                for j in 0..n {
                    acc0.rns[i][j] =
                        add_mod(acc0.rns[i][j], mulmod(dv[j], b.rns[i][j], p), p);
                    acc1.rns[i][j] =
                        add_mod(acc1.rns[i][j], mulmod(dv[j], a.rns[i][j], p), p);
                }
            }
        }
        for (i, table) in tables.iter().enumerate() {
            table.inverse(&mut acc0.rns[i]);
            table.inverse(&mut acc1.rns[i]);
        }
        (acc0, acc1)
    }

    pub fn apply_galois(
        &self,
        ct: &Ciphertext,
        galois_elt: u64,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext, CryptoError> {
        self.full_level(ct)?;
        let moduli = self.ctx.moduli_at(0);
        let c0 = ct.c[0].automorphism(galois_elt, moduli);
        let d = ct.c[1].automorphism(galois_elt, moduli);
        let (ks0, ks1) = self.key_switch(&d, galois_keys.key_for(galois_elt)?);
        let mut c0 = c0;
        c0.add_assign(&ks0, moduli);
        Ok(Ciphertext { c: vec![c0, ks1], level: 0 })
    }

    /// Rotation des lignes de `steps` crans (décomposition binaire sur les
    /// éléments 3^(2^j))
    pub fn rotate_rows(
        &self,
        ct: &Ciphertext,
        steps: u64,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext, CryptoError> {
        let half = self.ctx.n as u64 / 2;
        let mut steps = steps % half;
        let mut out = ct.clone();
        let two_n = 2 * self.ctx.n as u64;
        let mut elt = 3u64;
        while steps != 0 {
            if steps & 1 == 1 {
                out = self.apply_galois(&out, elt, galois_keys)?;
            }
            steps >>= 1;
            elt = mulmod(elt, elt, two_n);
        }
        Ok(out)
    }

    /// Échange des deux lignes (automorphisme x → x^(2N-1))
    pub fn rotate_columns(
        &self,
        ct: &Ciphertext,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext, CryptoError> {
        self.apply_galois(ct, 2 * self.ctx.n as u64 - 1, galois_keys)
    }
}

/// Rotation combinée du circuit : si steps dépasse N/2 on échange
/// d'abord les colonnes, puis on tourne les lignes du reste
pub fn rotate(
    ct: &Ciphertext,
    steps: u64,
    n: u64,
    evaluator: &Evaluator,
    galois_keys: &GaloisKeys,
) -> Result<Ciphertext, CryptoError> {
    let half = n >> 1;
    let mut out = ct.clone();
    if steps > half {
        out = evaluator.rotate_columns(&out, galois_keys)?;
    }
    let steps = steps % half;
    if steps != 0 {
        out = evaluator.rotate_rows(&out, steps, galois_keys)?;
    }
    Ok(out)
}

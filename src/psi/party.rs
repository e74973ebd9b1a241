// ===========================================================================
// Porteur d'ensemble (Sender ou Receiver)
//
// Un ensemble d'entiers distincts de largeur bitsize, chargé depuis un
// fichier texte (un décimal par ligne) ou généré aléatoirement, avec en
// option un recouvrement contrôlé avec un ensemble source — c'est ce qui
// permet de fabriquer des jeux d'essai dont l'intersection est non vide.
// ===========================================================================

use std::collections::HashSet;
use std::fs;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::crypto_error::CryptoError;
use crate::math::math::{clog2, shift_left};

#[derive(Debug, Clone, Default)]
pub struct Party {
    bitsize: u64,
    set: Vec<u64>,
}

impl Party {
    /// Charge un ensemble depuis un fichier (décimaux séparés par des
    /// blancs) ; bitsize = clog2 du plus grand élément
    pub fn from_file(filename: &str) -> Result<Party, CryptoError> {
        let raw = fs::read_to_string(filename)
            .map_err(|e| CryptoError::Io(format!("impossible d'ouvrir '{filename}' : {e}")))?;
        let mut set = Vec::new();
        for token in raw.split_whitespace() {
            let value = token.parse::<u64>().map_err(|_| {
                CryptoError::Parameter(format!("valeur illisible '{token}' dans '{filename}'"))
            })?;
            set.push(value);
        }
        let max = *set
            .iter()
            .max()
            .ok_or_else(|| CryptoError::Parameter(format!("ensemble vide dans '{filename}'")))?;
        Ok(Party { bitsize: clog2(max), set })
    }

    /// Ensemble uniforme de num_entries éléments distincts de bitsize bits
    pub fn random(num_entries: u64, bitsize: u64) -> Result<Party, CryptoError> {
        let max_value = shift_left(1, bitsize).wrapping_sub(1);
        Self::check_capacity(num_entries, max_value)?;
        let mut rng = StdRng::from_entropy();
        let mut unique = HashSet::new();
        while (unique.len() as u64) < num_entries {
            unique.insert(rng.gen_range(0..=max_value));
        }
        Ok(Party { bitsize, set: unique.into_iter().collect() })
    }

    /// Ensemble dont chaque élément est tiré de l'ensemble source avec la
    /// probabilité donnée, uniforme sinon
    pub fn random_with_source(
        num_entries: u64,
        bitsize: u64,
        source: &[u64],
        source_probability: f64,
    ) -> Result<Party, CryptoError> {
        if source.is_empty() {
            return Err(CryptoError::Parameter("ensemble source vide".into()));
        }
        let max_value = shift_left(1, bitsize).wrapping_sub(1);
        Self::check_capacity(num_entries, max_value)?;
        let mut rng = StdRng::from_entropy();
        let mut unique = HashSet::new();
        while (unique.len() as u64) < num_entries {
            if rng.gen::<f64>() <= source_probability {
                unique.insert(source[rng.gen_range(0..source.len())]);
            } else {
                unique.insert(rng.gen_range(0..=max_value));
            }
        }
        Ok(Party { bitsize, set: unique.into_iter().collect() })
    }

    pub fn from_set(set: Vec<u64>, bitsize: u64) -> Party {
        Party { bitsize, set }
    }

    fn check_capacity(num_entries: u64, max_value: u64) -> Result<(), CryptoError> {
        if max_value != u64::MAX && num_entries > max_value + 1 {
            return Err(CryptoError::Parameter(format!(
                "{num_entries} éléments distincts demandés dans un domaine de {} valeurs",
                max_value as u128 + 1
            )));
        }
        Ok(())
    }

    pub fn bitsize(&self) -> u64 {
        self.bitsize
    }

    pub fn set(&self) -> &[u64] {
        &self.set
    }

    /// Écrit l'ensemble, un décimal par ligne
    pub fn save(&self, filename: &str) -> Result<(), CryptoError> {
        let mut out = String::new();
        for value in &self.set {
            out.push_str(&value.to_string());
            out.push('\n');
        }
        fs::write(filename, out)
            .map_err(|e| CryptoError::Io(format!("impossible d'écrire '{filename}' : {e}")))
    }
}

// ===========================================================================
// Vecteurs aléatoires pour le masquage du circuit PSI
//
// Chaque appel instancie son propre RNG semé sur l'entropie système :
// ces fonctions sont appelées depuis des workers parallèles et ne doivent
// partager aucun état global.
// ===========================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Vecteur uniforme de num_entries valeurs dans [min_value, max_value)
pub fn random_vector(num_entries: usize, min_value: u64, max_value: u64) -> Vec<u64> {
    let mut rng = StdRng::from_entropy();
    (0..num_entries).map(|_| rng.gen_range(min_value..max_value)).collect()
}

/// Vecteur uniforme dans [min_value, max_value) dont chaque entrée est
/// première avec tous les modules donnés (échantillonnage par rejet).
/// Multiplier un indicateur de zéro par un tel vecteur détruit les valeurs
/// absolues sans jamais créer ni effacer de zéro mod mᵢ.
pub fn random_vector_coprime(
    num_entries: usize,
    min_value: u64,
    max_value: u64,
    moduli: &[u64],
) -> Vec<u64> {
    let mut rng = StdRng::from_entropy();
    let mut result = Vec::with_capacity(num_entries);
    while result.len() < num_entries {
        let v = rng.gen_range(min_value..max_value);
        if moduli.iter().all(|&m| v % m != 0) {
            result.push(v);
        }
    }
    result
}

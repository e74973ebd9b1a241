// ===========================================================================
// Gestion centralisée des erreurs du protocole PSI
//
// Tous les modules utilisent ce type au lieu de panic!/assert!/unwrap().
// Les couches internes propagent avec ? sans tentative de récupération
// locale ; seule la régénération de clés (kind KeyInvalid) est réessayée,
// au niveau des binaires.
// ===========================================================================

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CryptoError {
    // --- Erreurs de paramètres d'entrée ---
    /// Fichier de configuration ou argument CLI invalide
    Parameter(String),

    // --- Erreurs de la table Cuckoo ---
    /// L'insertion a dépassé le seuil d'évictions τ
    CuckooOverflow { threshold: u64 },

    // --- Erreurs du schéma homomorphe ---
    /// Les paramètres BFV ont produit un encodeur qui échoue son auto-test
    /// (round-trip encode/decode) — l'appelant doit régénérer contexte et clés
    KeyInvalid,
    /// Opération entre chiffrés à des niveaux de modulus différents
    LevelMismatch { expected: usize, found: usize },

    // --- Erreurs d'encodage CRT ---
    /// La longueur du vecteur n'est pas un multiple du nombre de modules
    CrtLength { len: usize, step: usize },

    // --- Erreurs d'entrées/sorties ---
    /// Fichier ou socket illisible/inécrivable
    Io(String),
    /// Trame réseau inattendue (taille hors borne, dimension incohérente)
    Protocol(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::Parameter(msg) =>
                write!(f, "Paramètre invalide : {msg}"),
            CryptoError::CuckooOverflow { threshold } =>
                write!(f, "Insertion Cuckoo échouée : seuil d'évictions atteint ({threshold})"),
            CryptoError::KeyInvalid =>
                write!(f, "Clés BFV invalides : l'encodeur échoue son auto-test, régénérer les paramètres"),
            CryptoError::LevelMismatch { expected, found } =>
                write!(f, "Niveaux de modulus incompatibles : attendu {expected}, reçu {found}"),
            CryptoError::CrtLength { len, step } =>
                write!(f, "Longueur de vecteur CRT invalide : {len} n'est pas un multiple de {step}"),
            CryptoError::Io(msg) =>
                write!(f, "Erreur I/O : {msg}"),
            CryptoError::Protocol(msg) =>
                write!(f, "Erreur de protocole : {msg}"),
        }
    }
}

impl std::error::Error for CryptoError {}

impl From<std::io::Error> for CryptoError {
    fn from(e: std::io::Error) -> Self {
        CryptoError::Io(e.to_string())
    }
}

impl From<bincode::Error> for CryptoError {
    fn from(e: bincode::Error) -> Self {
        CryptoError::Protocol(format!("(dé)sérialisation bincode : {e}"))
    }
}

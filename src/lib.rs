// Déclaration des modules
pub mod crypto_error;
pub mod math;
pub mod cuckoo;
pub mod bfv;
pub mod psi;
pub mod io;
pub mod network;

// Briques mathématiques principales
pub use crate::math::{crt_decode, crt_encode, crt_params, CrtParams};

// Table Cuckoo à k tables, hachage par permutation
pub use crate::cuckoo::{CuckooTable, UniversalHash};

// Schéma homomorphe et encodage batch
pub use crate::bfv::{
    instantiate_encryption_scheme, valid_keys, BatchEncoder, BfvContext, Ciphertext, Decryptor,
    Encryptor, Evaluator, GaloisKeys, KeyGenerator, RelinKeys, SecretKey,
};

// Protocole d'intersection
pub use crate::psi::{
    compute_intersection, compute_intersection_parallel, decrypt_intersection,
    decrypt_intersection_parallel, recrypt, recrypt_parallel, Party,
};

// Erreur centralisée
pub use crypto_error::CryptoError;

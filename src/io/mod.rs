pub mod config;
pub mod artifacts;

// Réexportations pratiques pour l'utilisateur du module

pub use config::{
    process_input, ComputeParameters, EncryptionParameters, SetParameters, TableParameters,
};
pub use artifacts::{
    load_galois_keys, load_relin_keys, load_secret_key, load_table, save_galois_keys,
    save_relin_keys, save_secret_key, save_set, save_table,
};

// ===========================================================================
// Artefacts disque : clés et table chiffrée
//
// Les clés sont des blobs bincode (.sk.key, .rk.key, .gk.key). La table
// chiffrée F se décompose en trois artefacts :
//   F.params — sérialisation texte des paramètres Cuckoo
//   F.size   — nombre décimal C de chiffrés
//   F_<i>.ct — chiffré i, binaire, pour i ∈ [0, C)
// ===========================================================================

use std::fs;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bfv::encrypt::Ciphertext;
use crate::bfv::keys::{GaloisKeys, RelinKeys, SecretKey};
use crate::crypto_error::CryptoError;
use crate::cuckoo::table::CuckooTable;

fn save_bin<T: Serialize>(filename: &str, value: &T) -> Result<(), CryptoError> {
    let bytes = bincode::serialize(value)?;
    fs::write(filename, bytes)
        .map_err(|e| CryptoError::Io(format!("impossible d'écrire '{filename}' : {e}")))
}

fn load_bin<T: DeserializeOwned>(filename: &str) -> Result<T, CryptoError> {
    let bytes = fs::read(filename)
        .map_err(|e| CryptoError::Io(format!("impossible d'ouvrir '{filename}' : {e}")))?;
    Ok(bincode::deserialize(&bytes)?)
}

// ---------------------------------------------------------------------------
// Clés
// ---------------------------------------------------------------------------

pub fn save_secret_key(filename: &str, sk: &SecretKey) -> Result<(), CryptoError> {
    save_bin(filename, sk)
}

pub fn load_secret_key(filename: &str) -> Result<SecretKey, CryptoError> {
    load_bin(filename)
}

pub fn save_relin_keys(filename: &str, rk: &RelinKeys) -> Result<(), CryptoError> {
    save_bin(filename, rk)
}

pub fn load_relin_keys(filename: &str) -> Result<RelinKeys, CryptoError> {
    load_bin(filename)
}

pub fn save_galois_keys(filename: &str, gk: &GaloisKeys) -> Result<(), CryptoError> {
    save_bin(filename, gk)
}

pub fn load_galois_keys(filename: &str) -> Result<GaloisKeys, CryptoError> {
    load_bin(filename)
}

// ---------------------------------------------------------------------------
// Table chiffrée
// ---------------------------------------------------------------------------

pub fn save_table(
    filename: &str,
    cuckoo: &CuckooTable,
    table: &[Ciphertext],
) -> Result<(), CryptoError> {
    let params_file = format!("{filename}.params");
    fs::write(&params_file, cuckoo.to_text())
        .map_err(|e| CryptoError::Io(format!("impossible d'écrire '{params_file}' : {e}")))?;

    let size_file = format!("{filename}.size");
    fs::write(&size_file, table.len().to_string())
        .map_err(|e| CryptoError::Io(format!("impossible d'écrire '{size_file}' : {e}")))?;

    for (i, ct) in table.iter().enumerate() {
        save_bin(&format!("{filename}_{i}.ct"), ct)?;
    }
    Ok(())
}

pub fn load_table(filename: &str) -> Result<(CuckooTable, Vec<Ciphertext>), CryptoError> {
    let params_file = format!("{filename}.params");
    let params_text = fs::read_to_string(&params_file)
        .map_err(|e| CryptoError::Io(format!("impossible d'ouvrir '{params_file}' : {e}")))?;
    let cuckoo = CuckooTable::from_text(&params_text)?;

    let size_file = format!("{filename}.size");
    let size_text = fs::read_to_string(&size_file)
        .map_err(|e| CryptoError::Io(format!("impossible d'ouvrir '{size_file}' : {e}")))?;
    let size: usize = size_text
        .trim()
        .parse()
        .map_err(|_| CryptoError::Parameter(format!("taille illisible dans '{size_file}'")))?;

    let mut table = Vec::with_capacity(size);
    for i in 0..size {
        table.push(load_bin(&format!("{filename}_{i}.ct"))?);
    }
    Ok((cuckoo, table))
}

/// Écrit un ensemble d'entiers, un décimal par ligne (sorties .intersect)
pub fn save_set(filename: &str, values: &[u64]) -> Result<(), CryptoError> {
    let mut out = String::new();
    for v in values {
        out.push_str(&v.to_string());
        out.push('\n');
    }
    fs::write(filename, out)
        .map_err(|e| CryptoError::Io(format!("impossible d'écrire '{filename}' : {e}")))
}

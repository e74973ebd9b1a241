// ===========================================================================
// Échanges cryptographiques sur le tunnel en trames
//
// Vol de setup : clés d'évaluation puis table chiffrée (paramètres texte,
// taille texte, C trames de chiffrés). Vol d'intersection : matrices de
// chiffrés précédées d'une trame de dimensions "lignes colonnes".
// ===========================================================================

use crate::bfv::encrypt::Ciphertext;
use crate::bfv::keys::{GaloisKeys, RelinKeys};
use crate::crypto_error::CryptoError;
use crate::cuckoo::table::CuckooTable;
use crate::network::socket::FramedSocket;

/// Bornes de sanité sur les dimensions annoncées par le pair
const MAX_ROWS: usize = 1 << 20;
const MAX_COLS: usize = 1 << 10;

pub fn send_relin_keys(socket: &mut FramedSocket, rk: &RelinKeys) -> Result<(), CryptoError> {
    socket.send_bin(rk)
}

pub fn receive_relin_keys(socket: &mut FramedSocket) -> Result<RelinKeys, CryptoError> {
    socket.receive_bin()
}

pub fn send_galois_keys(socket: &mut FramedSocket, gk: &GaloisKeys) -> Result<(), CryptoError> {
    socket.send_bin(gk)
}

pub fn receive_galois_keys(socket: &mut FramedSocket) -> Result<GaloisKeys, CryptoError> {
    socket.receive_bin()
}

/// Nombre d'ensembles du Receiver (trame décimale du vol d'intersection)
pub fn send_count(socket: &mut FramedSocket, count: u64) -> Result<(), CryptoError> {
    socket.send_text(&count.to_string())
}

pub fn receive_count(socket: &mut FramedSocket) -> Result<u64, CryptoError> {
    let text = socket.receive_text()?;
    text.trim()
        .parse()
        .map_err(|_| CryptoError::Protocol(format!("compte illisible : '{text}'")))
}

// ---------------------------------------------------------------------------
// Table chiffrée
// ---------------------------------------------------------------------------

pub fn send_table(
    socket: &mut FramedSocket,
    cuckoo: &CuckooTable,
    table: &[Ciphertext],
) -> Result<(), CryptoError> {
    socket.send_text(&cuckoo.to_text())?;
    socket.send_text(&table.len().to_string())?;
    for ct in table {
        socket.send_bin(ct)?;
    }
    Ok(())
}

pub fn receive_table(
    socket: &mut FramedSocket,
) -> Result<(CuckooTable, Vec<Ciphertext>), CryptoError> {
    let cuckoo = CuckooTable::from_text(&socket.receive_text()?)?;
    let size_text = socket.receive_text()?;
    let size: usize = size_text
        .trim()
        .parse()
        .map_err(|_| CryptoError::Protocol(format!("taille de table illisible : '{size_text}'")))?;
    if size > MAX_ROWS {
        return Err(CryptoError::Protocol(format!("taille de table aberrante : {size}")));
    }
    let mut table = Vec::with_capacity(size);
    for _ in 0..size {
        table.push(socket.receive_bin()?);
    }
    Ok((cuckoo, table))
}

// ---------------------------------------------------------------------------
// Matrices de chiffrés (results, randoms, finals)
// ---------------------------------------------------------------------------

pub fn send_ciphertexts(
    socket: &mut FramedSocket,
    cts: &[Vec<Ciphertext>],
) -> Result<(), CryptoError> {
    if cts.is_empty() {
        return Err(CryptoError::Protocol("matrice de chiffrés vide".into()));
    }
    socket.send_text(&format!("{} {}", cts.len(), cts[0].len()))?;
    for row in cts {
        for ct in row {
            socket.send_bin(ct)?;
        }
    }
    Ok(())
}

pub fn receive_ciphertexts(
    socket: &mut FramedSocket,
) -> Result<Vec<Vec<Ciphertext>>, CryptoError> {
    let dims = socket.receive_text()?;
    let mut tokens = dims.split_whitespace();
    let mut next_dim = |what: &str| -> Result<usize, CryptoError> {
        tokens
            .next()
            .ok_or_else(|| CryptoError::Protocol(format!("dimension absente ({what})")))?
            .parse::<usize>()
            .map_err(|_| CryptoError::Protocol(format!("dimension illisible ({what}) : '{dims}'")))
    };
    let rows = next_dim("lignes")?;
    let cols = next_dim("colonnes")?;
    if rows == 0 || cols == 0 || rows > MAX_ROWS || cols > MAX_COLS {
        return Err(CryptoError::Protocol(format!(
            "dimensions hors bornes : {rows} x {cols}"
        )));
    }

    let mut cts = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            row.push(socket.receive_bin()?);
        }
        cts.push(row);
    }
    Ok(cts)
}

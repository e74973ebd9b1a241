// ===========================================================================
// Fichier de paramètres clé=valeur des binaires réseau
//
// Lignes vides et commentaires (#) ignorés, espaces rognés de part et
// d'autre du '='. La clé `path` préfixe tous les chemins (un '/' final
// est ajouté au besoin). Les sections Sender/Receiver partagent le même
// gabarit, différencié par le préfixe de clé ("sender"/"receiver").
// ===========================================================================

use std::collections::HashMap;
use std::fmt;
use std::fs;

use crate::crypto_error::CryptoError;
use crate::math::math::shift_left;

#[derive(Debug)]
pub struct ComputeParameters {
    pub ip: String,
    pub port_setup: u16,
    pub port_intersect: u16,
    pub rcvbuf_size: usize,
    pub sndbuf_size: usize,
    pub num_threads: usize,
}

#[derive(Debug)]
pub struct EncryptionParameters {
    pub filename_gk: String,
    pub filename_rk: String,
    pub filename_sk: String,
    pub n: usize,
    pub logqi: Vec<u32>,
    pub ti: Vec<u64>,
    pub eta: u64,
}

#[derive(Debug)]
pub struct SetParameters {
    pub filenames: Vec<String>,
    pub bitsize: u64,
}

#[derive(Debug)]
pub struct TableParameters {
    pub filename: String,
    pub num_hashes: u64,
    pub table_size: u64,
    pub max_data: u64,
    pub max_depth: u64,
    pub num_tables: u64,
}

type RawParams = HashMap<String, String>;

fn require<'a>(params: &'a RawParams, key: &str) -> Result<&'a str, CryptoError> {
    params
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| CryptoError::Parameter(format!("clé '{key}' absente du fichier de paramètres")))
}

fn parse_field<T: std::str::FromStr>(params: &RawParams, key: &str) -> Result<T, CryptoError> {
    require(params, key)?
        .parse::<T>()
        .map_err(|_| CryptoError::Parameter(format!("clé '{key}' illisible")))
}

fn parse_list<T: std::str::FromStr>(raw: &str, key: &str) -> Result<Vec<T>, CryptoError> {
    raw.split(',')
        .map(|tok| {
            tok.trim()
                .parse::<T>()
                .map_err(|_| CryptoError::Parameter(format!("liste '{key}' illisible")))
        })
        .collect()
}

impl ComputeParameters {
    fn from_raw(params: &RawParams) -> Result<ComputeParameters, CryptoError> {
        Ok(ComputeParameters {
            ip: require(params, "ip")?.to_string(),
            port_setup: parse_field(params, "port_setup")?,
            port_intersect: parse_field(params, "port_intersect")?,
            rcvbuf_size: parse_field(params, "rcvbuf_size")?,
            sndbuf_size: parse_field(params, "sndbuf_size")?,
            num_threads: parse_field(params, "num_threads")?,
        })
    }
}

impl EncryptionParameters {
    // `key` vaut "sender" ou "receiver" et préfixe les clés de la section
    fn from_raw(params: &RawParams, key: &str) -> Result<EncryptionParameters, CryptoError> {
        let path = require(params, "path")?;
        let keys = require(params, &format!("{key}_keys"))?;
        let logn: u32 = parse_field(params, &format!("{key}_logn"))?;
        Ok(EncryptionParameters {
            filename_gk: format!("{path}{keys}.gk.key"),
            filename_rk: format!("{path}{keys}.rk.key"),
            filename_sk: format!("{path}{keys}.sk.key"),
            n: 1usize << logn,
            logqi: parse_list(require(params, &format!("{key}_logqi"))?, "logqi")?,
            ti: parse_list(require(params, "ti")?, "ti")?,
            eta: parse_field(params, &format!("{key}_eta"))?,
        })
    }
}

impl SetParameters {
    fn from_raw(params: &RawParams) -> Result<SetParameters, CryptoError> {
        let path = require(params, "path")?;
        let filenames = require(params, "set")?
            .split(',')
            .map(|f| format!("{path}{}", f.trim()))
            .collect();
        Ok(SetParameters { filenames, bitsize: parse_field(params, "bit_size")? })
    }
}

impl TableParameters {
    fn from_raw(params: &RawParams) -> Result<TableParameters, CryptoError> {
        let path = require(params, "path")?;
        let num_tables = require(params, "ti")?.split(',').count() as u64;
        let log_table_size: u64 = parse_field(params, "log_table_size")?;
        if log_table_size < num_tables - 1 {
            return Err(CryptoError::Parameter(format!(
                "log_table_size = {log_table_size} trop petit pour {num_tables} tables"
            )));
        }
        let bitsize: u64 = parse_field(params, "bit_size")?;
        Ok(TableParameters {
            filename: format!("{path}{}", require(params, "table")?),
            num_hashes: parse_field(params, "num_hashes")?,
            table_size: 1u64 << (log_table_size - (num_tables - 1)),
            max_data: shift_left(1, bitsize).wrapping_sub(1),
            max_depth: parse_field(params, "max_depth")?,
            num_tables,
        })
    }
}

/// Lit et découpe le fichier de paramètres, puis construit les cinq
/// sections (compute, sender, receiver, set, table)
pub fn process_input(
    filename: &str,
) -> Result<
    (
        ComputeParameters,
        EncryptionParameters,
        EncryptionParameters,
        SetParameters,
        TableParameters,
    ),
    CryptoError,
> {
    let raw = fs::read_to_string(filename)
        .map_err(|e| CryptoError::Io(format!("impossible d'ouvrir '{filename}' : {e}")))?;

    let mut params: RawParams = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| CryptoError::Parameter(format!("ligne invalide : {line}")))?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }

    // Normalise le chemin : '/' final obligatoire
    let path = require(&params, "path")?.to_string();
    if !path.ends_with('/') {
        params.insert("path".into(), format!("{path}/"));
    }

    let compute = ComputeParameters::from_raw(&params)?;
    let set = SetParameters::from_raw(&params)?;
    let sender = EncryptionParameters::from_raw(&params, "sender")?;
    let receiver = EncryptionParameters::from_raw(&params, "receiver")?;
    let table = TableParameters::from_raw(&params)?;

    Ok((compute, sender, receiver, set, table))
}

// ---------------------------------------------------------------------------
// Affichage des sections au lancement des binaires
// ---------------------------------------------------------------------------

impl fmt::Display for ComputeParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IP : {}", self.ip)?;
        writeln!(f, "Port (setup) : {}", self.port_setup)?;
        writeln!(f, "Port (intersect) : {}", self.port_intersect)?;
        writeln!(f, "Tampon de réception : {} octets", self.rcvbuf_size)?;
        writeln!(f, "Tampon d'émission : {} octets", self.sndbuf_size)?;
        writeln!(f, "Threads : {}", self.num_threads)
    }
}

impl fmt::Display for EncryptionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Clé secrète : {}", self.filename_sk)?;
        writeln!(f, "Clés de relinéarisation : {}", self.filename_rk)?;
        writeln!(f, "Clés de Galois : {}", self.filename_gk)?;
        writeln!(f, "n = {}", self.n)?;
        let q: u32 = self.logqi.iter().sum();
        writeln!(f, "|q| = {} bits {:?}", q, self.logqi)?;
        writeln!(f, "ti = {:?}", self.ti)?;
        writeln!(f, "η = {}", self.eta)
    }
}

impl fmt::Display for SetParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fichiers d'ensembles :")?;
        for name in &self.filenames {
            writeln!(f, "  {name}")?;
        }
        writeln!(f, "Largeur des éléments : {} bits", self.bitsize)
    }
}

impl fmt::Display for TableParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fichier de table : {}", self.filename)?;
        writeln!(f, "Nombre de hash : {}", self.num_hashes)?;
        writeln!(f, "Taille de table : {}", self.table_size)?;
        writeln!(f, "Valeur maximale : {}", self.max_data)?;
        writeln!(f, "Seuil d'évictions : {}", self.max_depth)?;
        writeln!(f, "Nombre de tables : {}", self.num_tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_config(dir: &std::path::Path) -> String {
        let path = dir.join("psi.conf");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "# paramètres d'essai").unwrap();
        writeln!(file, "ip = 127.0.0.1").unwrap();
        writeln!(file, "port_setup = 9100").unwrap();
        writeln!(file, "port_intersect = 9101").unwrap();
        writeln!(file, "rcvbuf_size = 65536").unwrap();
        writeln!(file, "sndbuf_size = 65536").unwrap();
        writeln!(file, "num_threads = 4").unwrap();
        writeln!(file, "path = {}", dir.display()).unwrap();
        writeln!(file, "set = x.txt, y.txt").unwrap();
        writeln!(file, "bit_size = 16").unwrap();
        writeln!(file, "ti = 40961, 65537").unwrap();
        writeln!(file, "table = cuckoo").unwrap();
        writeln!(file, "num_hashes = 4").unwrap();
        writeln!(file, "log_table_size = 11").unwrap();
        writeln!(file, "max_depth = 1024").unwrap();
        writeln!(file, "sender_keys = sender").unwrap();
        writeln!(file, "sender_logn = 12").unwrap();
        writeln!(file, "sender_logqi = 27,27,27,28").unwrap();
        writeln!(file, "sender_eta = 1").unwrap();
        writeln!(file, "receiver_keys = receiver").unwrap();
        writeln!(file, "receiver_logn = 12").unwrap();
        writeln!(file, "receiver_logqi = 27,27,27,28").unwrap();
        writeln!(file, "receiver_eta = 1").unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_process_input_full_file() {
        let dir = std::env::temp_dir().join("psi_config_test");
        fs::create_dir_all(&dir).unwrap();
        let file = sample_config(&dir);

        let (compute, sender, receiver, set, table) = process_input(&file).unwrap();
        assert_eq!(compute.ip, "127.0.0.1");
        assert_eq!(compute.num_threads, 4);
        assert_eq!(sender.n, 4096);
        assert_eq!(sender.logqi, vec![27, 27, 27, 28]);
        assert_eq!(sender.ti, vec![40961, 65537]);
        assert!(sender.filename_sk.ends_with("sender.sk.key"));
        assert_eq!(receiver.eta, 1);
        assert_eq!(set.filenames.len(), 2);
        assert!(set.filenames[0].ends_with("/x.txt"));
        // table_size = 2^(log_table_size - (k-1)) avec k = |ti| = 2
        assert_eq!(table.table_size, 1 << 10);
        assert_eq!(table.num_tables, 2);
        assert_eq!(table.max_data, (1 << 16) - 1);

        fs::remove_file(&file).ok();
    }

    #[test]
    fn test_missing_key_is_a_parameter_error() {
        let dir = std::env::temp_dir().join("psi_config_test_bad");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.conf");
        fs::write(&path, "ip = 1.2.3.4\npath = /tmp\n").unwrap();
        let err = process_input(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, CryptoError::Parameter(_)));
        fs::remove_file(&path).ok();
    }
}

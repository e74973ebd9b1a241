// =========================================================
// psi_protocol — benchmark mono-processus du protocole
//
// Les deux parties vivent dans le même processus : aucun
// réseau, uniquement les quatre étapes cryptographiques
// (table chiffrée, computeIntersection, recrypt,
// decryptIntersection). Deux jeux de paramètres :
//   mode 0 (Fast Setup)        : k = 2, t = 40961·65537, η = (1,1)
//   mode 1 (Fast Intersection) : k = 1, t = 40961, η = (0,0)
// Les temps par rôle sont écrits dans runtime.log.
// =========================================================

use std::env;
use std::fs;
use std::process;
use std::time::Instant;

use psi_crypto::bfv::{
    instantiate_encryption_scheme, pack_encrypt_table_parallel, BatchEncoder, Decryptor,
    Encryptor, Evaluator, KeyGenerator,
};
use psi_crypto::cuckoo::CuckooTable;
use psi_crypto::math::{crt_params, shift_left};
use psi_crypto::psi::{
    compute_intersection_parallel, decrypt_intersection_parallel, recrypt_parallel, Party,
};
use psi_crypto::CryptoError;

fn usage(program: &str) {
    eprintln!("Usage : {program} <mode> <log2|X|> <|Y|> <m> <threads>");
    eprintln!("  mode : 0 (Fast Setup), 1 (Fast Intersection)");
    eprintln!("  log2|X| : log2 de la taille de l'ensemble du Sender (défaut : 20)");
    eprintln!("  |Y| : taille de l'ensemble du Receiver (défaut : 4)");
    eprintln!("  m : nombre de répétitions (défaut : 1)");
    eprintln!("  threads : nombre de threads (défaut : 4)");
}

fn arg<T: std::str::FromStr>(args: &[String], i: usize, default: T) -> Result<T, CryptoError> {
    match args.get(i) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| CryptoError::Parameter(format!("argument {i} illisible : '{raw}'"))),
    }
}

fn run(args: &[String]) -> Result<(), CryptoError> {
    let mode: u32 = arg(args, 1, 0)?;
    let log2x: u64 = arg(args, 2, 20)?;
    let size_y: u64 = arg(args, 3, 4)?;
    let m: u64 = arg(args, 4, 1)?;
    let num_threads: usize = arg(args, 5, 4)?;

    /* Paramètres */

    // Chiffrement homomorphe : mêmes largeurs des deux côtés
    let n = 1usize << 12;
    let logqi = [27u32, 27, 27, 28];

    // Modules de plaintext partagés
    let ti: Vec<u64> = if mode != 0 { vec![40961] } else { vec![40961, 65537] };
    let crt = crt_params(&ti);
    let k = ti.len() as u64;

    // Cuckoo : h = 4, seuil 1024, une table par module CRT
    let num_hashes = 4u64;
    let table_size = 1u64 << (log2x - (k - 1));
    let max_depth = 1u64 << 10;
    let load_factor = if mode != 0 { 0.86 } else { 0.87 };

    // Partitionnement : profondeur contre nombre de chiffrés
    let sender_eta: u64 = if mode != 0 { 0 } else { 1 };
    let receiver_eta: u64 = if mode != 0 { 0 } else { 1 };

    let mut time_sender_pre = 0u128;
    let mut time_sender = 0u128;
    let mut time_receiver = 0u128;

    // Ensemble du Sender
    print!("Génération de l'ensemble du Sender...");
    let sender_set_size = (load_factor * table_size as f64) as u64;
    let bitsize = 32u64;
    let max_data = shift_left(1, bitsize) - 1;
    let sender = Party::random(sender_set_size, bitsize)?;
    println!("fait.");

    // Ensembles du Receiver, tirés de celui du Sender pour que
    // l'intersection soit non vide (aucun impact sur les performances)
    print!("Génération des ensembles du Receiver...");
    let mut receivers = Vec::with_capacity(m as usize);
    for _ in 0..m {
        receivers.push(Party::random_with_source(size_y, bitsize, sender.set(), 0.5)?);
    }
    println!("fait.");

    /* Setup */

    print!("Génération des clés et de l'évaluateur du Sender...");
    let sender_ctx = instantiate_encryption_scheme(n, &logqi, &ti)?;
    let sender_keygen = KeyGenerator::new(&sender_ctx);
    let sender_sk = sender_keygen.secret_key();
    let sender_relin = sender_keygen.create_relin_keys();
    let sender_encoder = BatchEncoder::new(&sender_ctx)?;
    let sender_evaluator = Evaluator::new(&sender_ctx);
    let sender_encryptor = Encryptor::new(&sender_ctx, &sender_sk);
    let sender_decryptor = Decryptor::new(&sender_ctx, &sender_sk);
    println!("fait.");

    print!("Génération des clés et de l'évaluateur du Receiver...");
    let receiver_ctx = instantiate_encryption_scheme(n, &logqi, &ti)?;
    let receiver_keygen = KeyGenerator::new(&receiver_ctx);
    let receiver_sk = receiver_keygen.secret_key();
    let receiver_relin = receiver_keygen.create_relin_keys();
    let receiver_galois = receiver_keygen.create_galois_keys();
    let receiver_encoder = BatchEncoder::new(&receiver_ctx)?;
    let receiver_evaluator = Evaluator::new(&receiver_ctx);
    let receiver_encryptor = Encryptor::new(&receiver_ctx, &receiver_sk);
    let receiver_decryptor = Decryptor::new(&receiver_ctx, &receiver_sk);
    println!("fait.");

    /* Table Cuckoo */

    print!("Construction de la table Cuckoo...");
    let start = Instant::now();
    let mut cuckoo = CuckooTable::new(num_hashes, table_size, max_data, max_depth, k);
    cuckoo.insert_set_parallel(sender.set())?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_sender_pre += span;

    // Ce que le Receiver a le droit de voir : les paramètres seuls
    let cuckoo_params = cuckoo.params_clone();
    let receiver_dummy = cuckoo.invalid_data() + 2;

    println!(
        "Dimensions de la table : {} x {}",
        cuckoo.table().len(),
        cuckoo.table()[0].len()
    );

    /* Chiffrement de la table */

    print!("Chiffrement de la table Cuckoo...");
    let start = Instant::now();
    let encrypted_table = pack_encrypt_table_parallel(
        cuckoo.table(),
        &crt,
        &sender_encoder,
        &sender_encryptor,
        num_threads,
    )?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_sender_pre += span;

    println!("Chiffrés de table : {}", encrypted_table.len());

    /* Intersections */

    for receiver in &receivers {
        print!("Calcul de l'intersection...");
        let start = Instant::now();
        let (results, randoms) = compute_intersection_parallel(
            receiver.set(),
            &cuckoo_params,
            &encrypted_table,
            &crt,
            sender_eta,
            &sender_encoder,
            &sender_evaluator,
            &sender_relin,
            &receiver_encoder,
            &receiver_encryptor,
            receiver_dummy,
            num_threads,
        )?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_receiver += span;

        print!("Recrypt des résultats...");
        let start = Instant::now();
        let finals = recrypt_parallel(
            &results,
            &randoms,
            &crt,
            receiver_eta,
            &sender_encoder,
            &sender_decryptor,
            &receiver_encoder,
            &receiver_evaluator,
            &receiver_relin,
            &receiver_galois,
            num_threads,
        )?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_sender += span;

        print!("Déchiffrement de l'intersection...");
        let start = Instant::now();
        let intersection = decrypt_intersection_parallel(
            &finals,
            receiver.set(),
            &crt,
            &receiver_encoder,
            &receiver_decryptor,
            num_threads,
        )?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_receiver += span;

        println!("Taille de l'intersection : {}", intersection.len());
    }

    // Journal des temps par rôle
    fs::write(
        "runtime.log",
        format!("{time_sender_pre}\n{time_sender}\n{time_receiver}\n"),
    )
    .map_err(|e| CryptoError::Io(format!("impossible d'écrire runtime.log : {e}")))?;

    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        process::exit(1);
    }
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        process::exit(1);
    }
}

// =========================================================
// sender_setup — phase de setup, côté Sender
//
// Hors ligne : clés BFV (avec boucle de régénération tant
// que l'auto-test de l'encodeur échoue), table Cuckoo de
// l'ensemble X, chiffrement de la table, persistance.
// En ligne : échange des clés d'évaluation avec le Receiver
// puis envoi de la table chiffrée.
// =========================================================

use std::env;
use std::process;
use std::time::Instant;

use psi_crypto::bfv::{
    instantiate_encryption_scheme, pack_encrypt_table_parallel, BatchEncoder, Encryptor,
    KeyGenerator,
};
use psi_crypto::cuckoo::CuckooTable;
use psi_crypto::io::{
    process_input, save_galois_keys, save_relin_keys, save_secret_key, save_table,
};
use psi_crypto::network::{
    receive_galois_keys, receive_relin_keys, send_relin_keys, send_table, FramedSocket,
};
use psi_crypto::psi::Party;
use psi_crypto::CryptoError;

fn run(config_file: &str) -> Result<(), CryptoError> {
    let (compute, sender, receiver, set, table) = process_input(config_file)?;

    println!("Setup du Sender\n");
    println!("Paramètres de calcul :\n{compute}");
    println!("Paramètres du Sender :\n{sender}");
    println!("Paramètres du Receiver :\n{receiver}");
    println!("Paramètres d'ensembles :\n{set}");
    println!("Paramètres de table :\n{table}");

    let mut time_compute = 0u128;
    let mut time_network = 0u128;
    let mut time_io = 0u128;

    println!("\nPhase hors ligne\n");

    // Ensemble du Sender
    print!("Chargement de l'ensemble du Sender...");
    let start = Instant::now();
    let party = Party::from_file(&set.filenames[0])?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    // Clés du Sender (contexte régénéré tant que l'auto-test échoue)
    print!("Génération des clés du Sender...");
    let start = Instant::now();
    let sender_ctx = instantiate_encryption_scheme(sender.n, &sender.logqi, &sender.ti)?;
    let sender_keygen = KeyGenerator::new(&sender_ctx);
    let sender_sk = sender_keygen.secret_key();
    let sender_rk = sender_keygen.create_relin_keys();
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    print!("Sauvegarde des clés du Sender...");
    let start = Instant::now();
    save_secret_key(&sender.filename_sk, &sender_sk)?;
    save_relin_keys(&sender.filename_rk, &sender_rk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    // Table Cuckoo à k tables
    print!("Construction de la table Cuckoo...");
    let start = Instant::now();
    let mut cuckoo = CuckooTable::new(
        table.num_hashes,
        table.table_size,
        table.max_data,
        table.max_depth,
        table.num_tables,
    );
    cuckoo.insert_set(party.set())?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    // Chiffrement de la table
    print!("Chiffrement de la table Cuckoo...");
    let start = Instant::now();
    let crt = psi_crypto::crt_params(&sender.ti);
    let sender_encoder = BatchEncoder::new(&sender_ctx)?;
    let sender_encryptor = Encryptor::new(&sender_ctx, &sender_sk);
    let encrypted_table = pack_encrypt_table_parallel(
        cuckoo.table(),
        &crt,
        &sender_encoder,
        &sender_encryptor,
        compute.num_threads,
    )?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    print!("Sauvegarde de la table Cuckoo...");
    let start = Instant::now();
    save_table(&table.filename, &cuckoo, &encrypted_table)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    println!("\nPhase en ligne\n");

    print!("Attente de la connexion du Receiver...");
    let mut socket = FramedSocket::listen(
        compute.port_setup,
        compute.rcvbuf_size,
        compute.sndbuf_size,
    )?;
    println!("fait.");

    // Clés d'évaluation du Receiver
    print!("Réception des clés d'évaluation du Receiver...");
    let start = Instant::now();
    let receiver_rk = receive_relin_keys(&mut socket)?;
    let receiver_gk = receive_galois_keys(&mut socket)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Envoi des clés d'évaluation du Sender...");
    let start = Instant::now();
    send_relin_keys(&mut socket, &sender_rk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Envoi de la table Cuckoo au Receiver...");
    let start = Instant::now();
    send_table(&mut socket, &cuckoo.params_clone(), &encrypted_table)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Sauvegarde des clés d'évaluation du Receiver...");
    let start = Instant::now();
    save_relin_keys(&receiver.filename_rk, &receiver_rk)?;
    save_galois_keys(&receiver.filename_gk, &receiver_gk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    println!("\nTemps total (calcul) : {time_compute} ms");
    println!("Temps total (réseau) : {time_network} ms");
    println!("Temps total (I/O) : {time_io} ms");
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage : {} <fichier_de_paramètres>", args[0]);
        process::exit(1);
    }
    if let Err(e) = run(&args[1]) {
        eprintln!("{e}");
        process::exit(1);
    }
}

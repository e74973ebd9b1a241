// =========================================================
// receiver_setup — phase de setup, côté Receiver
//
// Hors ligne : clés BFV complètes (secrète, relinéarisation,
// Galois) avec la boucle de régénération. En ligne : envoi
// des clés d'évaluation au Sender, réception des siennes et
// de la table Cuckoo chiffrée, persistance locale.
// =========================================================

use std::env;
use std::process;
use std::time::Instant;

use psi_crypto::bfv::{instantiate_encryption_scheme, KeyGenerator};
use psi_crypto::io::{
    process_input, save_galois_keys, save_relin_keys, save_secret_key, save_table,
};
use psi_crypto::network::{
    receive_relin_keys, receive_table, send_galois_keys, send_relin_keys, FramedSocket,
};
use psi_crypto::CryptoError;

fn run(config_file: &str) -> Result<(), CryptoError> {
    let (compute, sender, receiver, set, table) = process_input(config_file)?;

    println!("Setup du Receiver\n");
    println!("Paramètres de calcul :\n{compute}");
    println!("Paramètres du Sender :\n{sender}");
    println!("Paramètres du Receiver :\n{receiver}");
    println!("Paramètres d'ensembles :\n{set}");
    println!("Paramètres de table :\n{table}");

    let mut time_compute = 0u128;
    let mut time_network = 0u128;
    let mut time_io = 0u128;

    println!("\nPhase hors ligne\n");

    print!("Génération des clés du Receiver...");
    let start = Instant::now();
    let receiver_ctx = instantiate_encryption_scheme(receiver.n, &receiver.logqi, &receiver.ti)?;
    let receiver_keygen = KeyGenerator::new(&receiver_ctx);
    let receiver_sk = receiver_keygen.secret_key();
    let receiver_rk = receiver_keygen.create_relin_keys();
    let receiver_gk = receiver_keygen.create_galois_keys();
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    print!("Sauvegarde des clés du Receiver...");
    let start = Instant::now();
    save_secret_key(&receiver.filename_sk, &receiver_sk)?;
    save_relin_keys(&receiver.filename_rk, &receiver_rk)?;
    save_galois_keys(&receiver.filename_gk, &receiver_gk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    println!("\nPhase en ligne\n");

    print!("Connexion au Sender...");
    let start = Instant::now();
    let mut socket = FramedSocket::connect(
        &compute.ip,
        compute.port_setup,
        compute.rcvbuf_size,
        compute.sndbuf_size,
    )?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Envoi des clés d'évaluation du Receiver...");
    let start = Instant::now();
    send_relin_keys(&mut socket, &receiver_rk)?;
    send_galois_keys(&mut socket, &receiver_gk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Réception des clés d'évaluation du Sender...");
    let start = Instant::now();
    let sender_rk = receive_relin_keys(&mut socket)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Sauvegarde des clés d'évaluation du Sender...");
    let start = Instant::now();
    save_relin_keys(&sender.filename_rk, &sender_rk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    print!("Réception de la table Cuckoo du Sender...");
    let start = Instant::now();
    let (cuckoo, encrypted_table) = receive_table(&mut socket)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    print!("Sauvegarde de la table Cuckoo...");
    let start = Instant::now();
    save_table(&table.filename, &cuckoo, &encrypted_table)?;
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

// =========================================================
// receiver_intersect — phase d'intersection, côté Receiver
//
// Charge ses clés, celles du Sender et la table chiffrée,
// annonce le nombre d'ensembles, puis pour chaque ensemble :
// computeIntersection, envoi de (results, randoms), réception
// de finals, déchiffrement et écriture de <set>.intersect.
// =========================================================

use std::env;
use std::process;
use std::time::Instant;

use psi_crypto::bfv::{
    instantiate_encryption_scheme, BatchEncoder, Decryptor, Encryptor, Evaluator,
};
use psi_crypto::io::{load_relin_keys, load_secret_key, load_table, process_input, save_set};
use psi_crypto::network::{receive_ciphertexts, send_ciphertexts, send_count, FramedSocket};
use psi_crypto::psi::Party;
use psi_crypto::CryptoError;

fn run(config_file: &str) -> Result<(), CryptoError> {
    let (compute, sender, receiver, set, table) = process_input(config_file)?;

    println!("Intersection — côté Receiver\n");
    println!("Paramètres de calcul :\n{compute}");
    println!("Paramètres du Sender :\n{sender}");
    println!("Paramètres du Receiver :\n{receiver}");
    println!("Paramètres d'ensembles :\n{set}");
    println!("Paramètres de table :\n{table}");

    let mut time_compute = 0u128;
    let mut time_network = 0u128;
    let mut time_io = 0u128;

    println!("\nCoûts fixes\n");

    // Paramètres CRT
    let crt = psi_crypto::crt_params(&sender.ti);

    // Clés du Receiver
    print!("Chargement des clés du Receiver...");
    let start = Instant::now();
    let receiver_ctx = instantiate_encryption_scheme(receiver.n, &receiver.logqi, &receiver.ti)?;
    let receiver_sk = load_secret_key(&receiver.filename_sk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    print!("Construction de l'encodeur, du chiffreur et du déchiffreur du Receiver...");
    let start = Instant::now();
    let receiver_encoder = BatchEncoder::new(&receiver_ctx)?;
    let receiver_encryptor = Encryptor::new(&receiver_ctx, &receiver_sk);
    let receiver_decryptor = Decryptor::new(&receiver_ctx, &receiver_sk);
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    // Clés d'évaluation du Sender
    print!("Chargement des clés d'évaluation du Sender...");
    let start = Instant::now();
    let sender_ctx = instantiate_encryption_scheme(sender.n, &sender.logqi, &sender.ti)?;
    let sender_rk = load_relin_keys(&sender.filename_rk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    print!("Construction de l'encodeur et de l'évaluateur du Sender...");
    let start = Instant::now();
    let sender_encoder = BatchEncoder::new(&sender_ctx)?;
    let sender_evaluator = Evaluator::new(&sender_ctx);
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    // Table Cuckoo chiffrée
    print!("Chargement de la table Cuckoo...");
    let start = Instant::now();
    let (cuckoo, encrypted_table) = load_table(&table.filename)?;
    let receiver_dummy = cuckoo.invalid_data() + 2;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    print!("Connexion au Sender...");
    let start = Instant::now();
    let mut socket = FramedSocket::connect(
        &compute.ip,
        compute.port_intersect,
        compute.rcvbuf_size,
        compute.sndbuf_size,
    )?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_network += span;

    println!("\nCoûts récurrents\n");

    // Annonce du nombre d'ensembles pour que le Sender puisse se terminer
    print!("Envoi du nombre d'ensembles au Sender...");
    send_count(&mut socket, set.filenames.len() as u64)?;
    println!("fait.");

    for set_filename in &set.filenames {
        println!();

        print!("Chargement de l'ensemble du Receiver...");
        let start = Instant::now();
        let party = Party::from_file(set_filename)?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_io += span;

        print!("Calcul de l'intersection...");
        let start = Instant::now();
        let (results, randoms) = psi_crypto::compute_intersection_parallel(
            party.set(),
            &cuckoo,
            &encrypted_table,
            &crt,
            sender.eta,
            &sender_encoder,
            &sender_evaluator,
            &sender_rk,
            &receiver_encoder,
            &receiver_encryptor,
            receiver_dummy,
            compute.num_threads,
        )?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_compute += span;

        print!("Envoi des résultats intermédiaires...");
        let start = Instant::now();
        send_ciphertexts(&mut socket, &results)?;
        send_ciphertexts(&mut socket, &randoms)?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_network += span;

        print!("Réception des résultats finals...");
        let start = Instant::now();
        let finals = receive_ciphertexts(&mut socket)?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_network += span;

        print!("Déchiffrement de l'intersection...");
        let start = Instant::now();
        let intersection = psi_crypto::decrypt_intersection_parallel(
            &finals,
            party.set(),
            &crt,
            &receiver_encoder,
            &receiver_decryptor,
            compute.num_threads,
        )?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_compute += span;

        print!("Sauvegarde de l'intersection ({} éléments)...", intersection.len());
        let start = Instant::now();
        save_set(&format!("{set_filename}.intersect"), &intersection)?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_io += span;
    }

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

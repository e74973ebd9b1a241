// =========================================================
// sender_intersect — phase d'intersection, côté Sender
//
// Charge ses clés et celles du Receiver, attend la connexion,
// reçoit le nombre d'ensembles puis, pour chacun : reçoit
// (results, randoms), exécute le recrypt et renvoie finals.
// Le Sender ne voit jamais y ni aucune valeur en clair.
// =========================================================

use std::env;
use std::process;
use std::time::Instant;

use psi_crypto::bfv::{
    instantiate_encryption_scheme, BatchEncoder, Decryptor, Evaluator,
};
use psi_crypto::io::{load_galois_keys, load_relin_keys, load_secret_key, process_input};
use psi_crypto::network::{receive_ciphertexts, receive_count, send_ciphertexts, FramedSocket};
use psi_crypto::CryptoError;

fn run(config_file: &str) -> Result<(), CryptoError> {
    let (compute, sender, receiver, set, table) = process_input(config_file)?;

    println!("Intersection — côté Sender\n");
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

    // Clés du Sender
    print!("Chargement des clés du Sender...");
    let start = Instant::now();
    let sender_ctx = instantiate_encryption_scheme(sender.n, &sender.logqi, &sender.ti)?;
    let sender_sk = load_secret_key(&sender.filename_sk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    print!("Construction de l'encodeur et du déchiffreur du Sender...");
    let start = Instant::now();
    let sender_encoder = BatchEncoder::new(&sender_ctx)?;
    let sender_decryptor = Decryptor::new(&sender_ctx, &sender_sk);
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    // Clés d'évaluation du Receiver
    print!("Chargement des clés d'évaluation du Receiver...");
    let start = Instant::now();
    let receiver_ctx = instantiate_encryption_scheme(receiver.n, &receiver.logqi, &receiver.ti)?;
    let receiver_rk = load_relin_keys(&receiver.filename_rk)?;
    let receiver_gk = load_galois_keys(&receiver.filename_gk)?;
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_io += span;

    print!("Construction de l'encodeur et de l'évaluateur du Receiver...");
    let start = Instant::now();
    let receiver_encoder = BatchEncoder::new(&receiver_ctx)?;
    let receiver_evaluator = Evaluator::new(&receiver_ctx);
    let span = start.elapsed().as_millis();
    println!("fait ({span} ms)");
    time_compute += span;

    print!("Attente de la connexion du Receiver...");
    let mut socket = FramedSocket::listen(
        compute.port_intersect,
        compute.rcvbuf_size,
        compute.sndbuf_size,
    )?;
    println!("fait.");

    println!("\nCoûts récurrents\n");

    // Nombre d'ensembles : permet au programme de se terminer
    print!("Réception du nombre d'ensembles du Receiver...");
    let num_sets = receive_count(&mut socket)?;
    println!("fait ({num_sets} ensembles).");

    for set_number in 1..=num_sets {
        println!();

        print!("Réception des résultats intermédiaires...");
        let start = Instant::now();
        let results = receive_ciphertexts(&mut socket)?;
        let randoms = receive_ciphertexts(&mut socket)?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_network += span;

        print!("Recrypt des résultats intermédiaires...");
        let start = Instant::now();
        let finals = psi_crypto::recrypt_parallel(
            &results,
            &randoms,
            &crt,
            receiver.eta,
            &sender_encoder,
            &sender_decryptor,
            &receiver_encoder,
            &receiver_evaluator,
            &receiver_rk,
            &receiver_gk,
            compute.num_threads,
        )?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_compute += span;

        print!("Envoi des résultats finals...");
        let start = Instant::now();
        send_ciphertexts(&mut socket, &finals)?;
        let span = start.elapsed().as_millis();
        println!("fait ({span} ms)");
        time_network += span;

        println!("Ensemble n°{set_number} traité.");
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

// =========================================================
// generate_set — fabrication d'ensembles d'essai
//
// Ensemble uniforme de `set_size` éléments de `bit_size` bits,
// avec recouvrement optionnel d'un ensemble source : chaque
// élément est tiré du source avec la probabilité donnée.
// =========================================================

use std::env;
use std::process;

use psi_crypto::psi::Party;
use psi_crypto::CryptoError;

fn usage(program: &str) {
    eprintln!("Usage : {program} <set_size> <bit_size> <target_file> [source_file] [source_probability]");
    eprintln!("  set_size : nombre d'éléments de l'ensemble");
    eprintln!("  bit_size : largeur des éléments en bits");
    eprintln!("  target_file : fichier de sortie");
    eprintln!("  source_file : ensemble à échantillonner");
    eprintln!("  source_probability : probabilité de tirer dans source_file");
}

fn run(args: &[String]) -> Result<(), CryptoError> {
    let set_size: u64 = args[1]
        .parse()
        .map_err(|_| CryptoError::Parameter(format!("set_size illisible : '{}'", args[1])))?;
    let mut bit_size: u64 = args[2]
        .parse()
        .map_err(|_| CryptoError::Parameter(format!("bit_size illisible : '{}'", args[2])))?;
    let target_file = &args[3];

    println!("Génération d'un ensemble de {set_size} éléments de {bit_size} bits");

    let party = if args.len() > 4 {
        let source_file = &args[4];
        let probability: f64 = if args.len() > 5 {
            args[5].parse().map_err(|_| {
                CryptoError::Parameter(format!("probabilité illisible : '{}'", args[5]))
            })?
        } else {
            1.0
        };
        let source = Party::from_file(source_file)?;
        // on ne peut pas tirer dans un source plus large que le domaine cible
        bit_size = bit_size.max(source.bitsize());
        println!(
            "Échantillonnage de {source_file} avec probabilité {probability} ({} éléments de {} bits)",
            source.set().len(),
            source.bitsize()
        );
        Party::random_with_source(set_size, bit_size, source.set(), probability)?
    } else {
        Party::random(set_size, bit_size)?
    };

    party.save(target_file)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 3 {
        usage(&args[0]);
        process::exit(1);
    }
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        process::exit(1);
    }
}

// ===========================================================================
// Évaluateur PSI — circuit d'indicateur de zéro masqué
//
// computeIntersection (Receiver) : pour chaque y, soustrait y_R du slot
// sondé dans la table chiffrée sous h hash, répartit les différences en
// return_width = η_s + 1 paquets round-robin, multiplie chaque paquet en
// arbre, masque additivement par ρ sous la clé du Sender et chiffre ρ
// sous la clé du Receiver.
//
// recrypt (Sender) : déchiffre r+ρ, le ré-encode côté Receiver et le
// soustrait de Enc_R(ρ) — obtenant Enc_R(-r) sans apprendre r —, refait
// un produit par paquets (final_width = η_r + 1), multiplie par un
// vecteur aléatoire premier avec chaque mᵢ (la nullité par composante
// CRT est préservée, les valeurs absolues sont détruites), tourne
// aléatoirement les slots et redescend au dernier niveau.
//
// decryptIntersection (Receiver) : une entrée décodée à zéro suffit à
// marquer y comme membre de l'intersection.
//
// Chaque variante parallèle suit le même gabarit fork-join à deux
// étages : un pool externe sur les requêtes (outer = min(T, |Y|)),
// des pools internes sur les hash ou les paquets (inner = ⌈T/outer⌉),
// join après chaque étage, échecs agrégés après le join.
// ===========================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bfv::encoder::BatchEncoder;
use crate::bfv::encrypt::{Ciphertext, Decryptor, Encryptor};
use crate::bfv::evaluator::{rotate, Evaluator};
use crate::bfv::keys::{GaloisKeys, RelinKeys};
use crate::bfv::packing::{pack_decrypt, pack_encode};
use crate::crypto_error::CryptoError;
use crate::cuckoo::table::CuckooTable;
use crate::math::crt::CrtParams;
use crate::math::random::{random_vector, random_vector_coprime};

// ---------------------------------------------------------------------------
// Remplissage parallèle d'un tableau indexé : chaque worker remplit une
// tranche contiguë, les erreurs sont collectées puis agrégées au join
// ---------------------------------------------------------------------------
fn parallel_fill<T, F>(slots: &mut [Option<T>], workers: usize, f: F) -> Result<(), CryptoError>
where
    T: Send,
    F: Fn(usize) -> Result<T, CryptoError> + Sync,
{
    if workers <= 1 || slots.len() <= 1 {
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = Some(f(i)?);
        }
        return Ok(());
    }
    let chunk = slots.len().div_ceil(workers.min(slots.len()));
    std::thread::scope(|s| {
        let handles: Vec<_> = slots
            .chunks_mut(chunk)
            .enumerate()
            .map(|(w, slice)| {
                let f = &f;
                s.spawn(move || -> Result<(), CryptoError> {
                    for (offset, slot) in slice.iter_mut().enumerate() {
                        *slot = Some(f(w * chunk + offset)?);
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle
                .join()
                .map_err(|_| CryptoError::Protocol("worker paniqué".into()))??;
        }
        Ok(())
    })
}

fn unwrap_filled<T>(slots: Vec<Option<T>>) -> Vec<T> {
    slots.into_iter().map(|s| s.expect("tranche remplie")).collect()
}

// Répartition round-robin en `width` paquets dont les tailles diffèrent
// d'au plus un : l'élément j va dans le paquet j mod width
fn split_round_robin<T>(items: Vec<T>, width: usize) -> Vec<Vec<T>> {
    let mut buckets: Vec<Vec<T>> = (0..width).map(|_| Vec::new()).collect();
    for (j, item) in items.into_iter().enumerate() {
        buckets[j % width].push(item);
    }
    buckets
}

// ---------------------------------------------------------------------------
// Étapes élémentaires du circuit, partagées entre les variantes
// séquentielles et parallèles
// ---------------------------------------------------------------------------

// Différence sous le hash j pour la requête (y_R, t, b_j) : plaintext
// rempli de la sentinelle receiver_dummy sauf au slot sondé, qui porte y_R
#[allow(clippy::too_many_arguments)]
fn hash_difference(
    y_r: u64,
    table_index: u64,
    bin: u64,
    encrypted_table: &[Ciphertext],
    crt: &CrtParams,
    sender_encoder: &BatchEncoder,
    sender_evaluator: &Evaluator,
    receiver_dummy: u64,
) -> Result<Ciphertext, CryptoError> {
    let k = crt.mi.len();
    let slots = sender_encoder.slot_count() as u64;
    let ct_index = (bin / slots) as usize;
    let ct_bslot = (bin % slots) as usize;
    if ct_index >= encrypted_table.len() {
        return Err(CryptoError::Protocol(format!(
            "case {bin} hors de la table chiffrée ({} chiffrés)",
            encrypted_table.len()
        )));
    }
    let slot = ct_bslot * k + table_index as usize;

    let mut v = vec![receiver_dummy; k * slots as usize];
    v[slot] = y_r;
    let pt = pack_encode(&v, crt, sender_encoder)?;
    sender_evaluator.sub_plain(&encrypted_table[ct_index], &pt)
}

// Produit d'un paquet, masquage additif par ρ, switching, et Enc_R(ρ)
#[allow(clippy::too_many_arguments)]
fn mask_bucket(
    bucket: &[Ciphertext],
    crt: &CrtParams,
    sender_encoder: &BatchEncoder,
    sender_evaluator: &Evaluator,
    sender_relin_keys: &RelinKeys,
    receiver_encoder: &BatchEncoder,
    receiver_encryptor: &Encryptor,
) -> Result<(Ciphertext, Ciphertext), CryptoError> {
    let product = sender_evaluator.multiply_many(bucket, sender_relin_keys)?;

    let receiver_slots = receiver_encoder.slot_count();
    let rho = random_vector(receiver_slots, 0, crt.m_big);

    let masked = sender_evaluator.add_plain(&product, &sender_encoder.encode(&rho)?)?;
    let masked = sender_evaluator.mod_switch_to_last(&masked)?;

    let random_ct = receiver_encryptor.encrypt_symmetric(&receiver_encoder.encode(&rho)?)?;
    Ok((masked, random_ct))
}

// Déchiffre r+ρ sous la clé Sender, le ré-encode côté Receiver et le
// soustrait de Enc_R(ρ) : le résultat chiffre -r sous la clé du Receiver
fn recrypt_difference(
    result_ct: &Ciphertext,
    random_ct: &Ciphertext,
    sender_encoder: &BatchEncoder,
    sender_decryptor: &Decryptor,
    receiver_encoder: &BatchEncoder,
    receiver_evaluator: &Evaluator,
) -> Result<Ciphertext, CryptoError> {
    let pt = sender_decryptor.decrypt(result_ct)?;
    let values = sender_encoder.decode(&pt)?;
    let re_encoded = receiver_encoder.encode(&values)?;
    receiver_evaluator.sub_plain(random_ct, &re_encoded)
}

// Produit final d'un paquet, masque multiplicatif premier avec chaque mᵢ,
// rotation aléatoire des slots, switching
#[allow(clippy::too_many_arguments)]
fn finalize_bucket(
    bucket: &[Ciphertext],
    crt: &CrtParams,
    receiver_encoder: &BatchEncoder,
    receiver_evaluator: &Evaluator,
    receiver_relin_keys: &RelinKeys,
    receiver_galois_keys: &GaloisKeys,
) -> Result<Ciphertext, CryptoError> {
    let product = receiver_evaluator.multiply_many(bucket, receiver_relin_keys)?;

    let receiver_slots = receiver_encoder.slot_count();
    let mask = random_vector_coprime(receiver_slots, 1, crt.m_big, &crt.mi);
    let masked = receiver_evaluator.multiply_plain(&product, &receiver_encoder.encode(&mask)?)?;

    let steps = StdRng::from_entropy().gen_range(0..receiver_slots as u64);
    let rotated = rotate(
        &masked,
        steps,
        receiver_slots as u64,
        receiver_evaluator,
        receiver_galois_keys,
    )?;
    receiver_evaluator.mod_switch_to_last(&rotated)
}

fn check_widths(num_hashes: u64, sender_eta: u64) -> Result<usize, CryptoError> {
    if sender_eta >= num_hashes {
        return Err(CryptoError::Parameter(format!(
            "η Sender = {sender_eta} hors de [0, {})",
            num_hashes
        )));
    }
    Ok(sender_eta as usize + 1)
}

// ===========================================================================
// computeIntersection — côté Receiver, sur la table chiffrée du Sender
// ===========================================================================

#[allow(clippy::too_many_arguments)]
pub fn compute_intersection(
    receiver_set: &[u64],
    cuckoo: &CuckooTable,
    encrypted_table: &[Ciphertext],
    crt: &CrtParams,
    sender_eta: u64,
    sender_encoder: &BatchEncoder,
    sender_evaluator: &Evaluator,
    sender_relin_keys: &RelinKeys,
    receiver_encoder: &BatchEncoder,
    receiver_encryptor: &Encryptor,
    receiver_dummy: u64,
) -> Result<(Vec<Vec<Ciphertext>>, Vec<Vec<Ciphertext>>), CryptoError> {
    let return_width = check_widths(cuckoo.num_hashes(), sender_eta)?;

    let mut results = Vec::with_capacity(receiver_set.len());
    let mut randoms = Vec::with_capacity(receiver_set.len());
    for &entry in receiver_set {
        let (y_r, table_index, indices) = cuckoo.get_indices(entry);

        let mut differences = Vec::with_capacity(indices.len());
        for &bin in &indices {
            differences.push(hash_difference(
                y_r,
                table_index,
                bin,
                encrypted_table,
                crt,
                sender_encoder,
                sender_evaluator,
                receiver_dummy,
            )?);
        }
        let buckets = split_round_robin(differences, return_width);

        let mut row_results = Vec::with_capacity(return_width);
        let mut row_randoms = Vec::with_capacity(return_width);
        for bucket in &buckets {
            let (masked, random_ct) = mask_bucket(
                bucket,
                crt,
                sender_encoder,
                sender_evaluator,
                sender_relin_keys,
                receiver_encoder,
                receiver_encryptor,
            )?;
            row_results.push(masked);
            row_randoms.push(random_ct);
        }
        results.push(row_results);
        randoms.push(row_randoms);
    }
    Ok((results, randoms))
}

#[allow(clippy::too_many_arguments)]
pub fn compute_intersection_parallel(
    receiver_set: &[u64],
    cuckoo: &CuckooTable,
    encrypted_table: &[Ciphertext],
    crt: &CrtParams,
    sender_eta: u64,
    sender_encoder: &BatchEncoder,
    sender_evaluator: &Evaluator,
    sender_relin_keys: &RelinKeys,
    receiver_encoder: &BatchEncoder,
    receiver_encryptor: &Encryptor,
    receiver_dummy: u64,
    num_threads: usize,
) -> Result<(Vec<Vec<Ciphertext>>, Vec<Vec<Ciphertext>>), CryptoError> {
    let return_width = check_widths(cuckoo.num_hashes(), sender_eta)?;
    if receiver_set.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let num_threads = num_threads.max(1);
    let outer = num_threads.min(receiver_set.len());
    let inner = num_threads / outer + usize::from(num_threads % outer != 0);

    let mut rows: Vec<Option<(Vec<Ciphertext>, Vec<Ciphertext>)>> =
        (0..receiver_set.len()).map(|_| None).collect();
    parallel_fill(&mut rows, outer, |i| {
        let (y_r, table_index, indices) = cuckoo.get_indices(receiver_set[i]);

        // Étage interne 1 : différences sous chaque hash
        let mut differences: Vec<Option<Ciphertext>> =
            (0..indices.len()).map(|_| None).collect();
        parallel_fill(&mut differences, inner.min(indices.len()), |j| {
            hash_difference(
                y_r,
                table_index,
                indices[j],
                encrypted_table,
                crt,
                sender_encoder,
                sender_evaluator,
                receiver_dummy,
            )
        })?;
        let buckets = split_round_robin(unwrap_filled(differences), return_width);

        // Étage interne 2 : produit et masquage de chaque paquet
        let mut pairs: Vec<Option<(Ciphertext, Ciphertext)>> =
            (0..return_width).map(|_| None).collect();
        parallel_fill(&mut pairs, inner.min(return_width), |j| {
            mask_bucket(
                &buckets[j],
                crt,
                sender_encoder,
                sender_evaluator,
                sender_relin_keys,
                receiver_encoder,
                receiver_encryptor,
            )
        })?;
        Ok(unwrap_filled(pairs).into_iter().unzip())
    })?;

    Ok(unwrap_filled(rows).into_iter().unzip())
}

// ===========================================================================
// recrypt — côté Sender, re-randomisation sous la clé du Receiver
// ===========================================================================

#[allow(clippy::too_many_arguments)]
pub fn recrypt(
    results: &[Vec<Ciphertext>],
    randoms: &[Vec<Ciphertext>],
    crt: &CrtParams,
    receiver_eta: u64,
    sender_encoder: &BatchEncoder,
    sender_decryptor: &Decryptor,
    receiver_encoder: &BatchEncoder,
    receiver_evaluator: &Evaluator,
    receiver_relin_keys: &RelinKeys,
    receiver_galois_keys: &GaloisKeys,
) -> Result<Vec<Vec<Ciphertext>>, CryptoError> {
    let final_width = receiver_eta as usize + 1;
    check_recrypt_dims(results, randoms, final_width)?;

    let mut finals = Vec::with_capacity(results.len());
    for (row_results, row_randoms) in results.iter().zip(randoms.iter()) {
        let mut differences = Vec::with_capacity(row_results.len());
        for (result_ct, random_ct) in row_results.iter().zip(row_randoms.iter()) {
            differences.push(recrypt_difference(
                result_ct,
                random_ct,
                sender_encoder,
                sender_decryptor,
                receiver_encoder,
                receiver_evaluator,
            )?);
        }
        let buckets = split_round_robin(differences, final_width);

        let mut row_finals = Vec::with_capacity(final_width);
        for bucket in &buckets {
            row_finals.push(finalize_bucket(
                bucket,
                crt,
                receiver_encoder,
                receiver_evaluator,
                receiver_relin_keys,
                receiver_galois_keys,
            )?);
        }
        finals.push(row_finals);
    }
    Ok(finals)
}

#[allow(clippy::too_many_arguments)]
pub fn recrypt_parallel(
    results: &[Vec<Ciphertext>],
    randoms: &[Vec<Ciphertext>],
    crt: &CrtParams,
    receiver_eta: u64,
    sender_encoder: &BatchEncoder,
    sender_decryptor: &Decryptor,
    receiver_encoder: &BatchEncoder,
    receiver_evaluator: &Evaluator,
    receiver_relin_keys: &RelinKeys,
    receiver_galois_keys: &GaloisKeys,
    num_threads: usize,
) -> Result<Vec<Vec<Ciphertext>>, CryptoError> {
    let final_width = receiver_eta as usize + 1;
    check_recrypt_dims(results, randoms, final_width)?;
    if results.is_empty() {
        return Ok(Vec::new());
    }
    let num_threads = num_threads.max(1);
    let outer = num_threads.min(results.len());
    let inner = num_threads / outer + usize::from(num_threads % outer != 0);

    let mut rows: Vec<Option<Vec<Ciphertext>>> = (0..results.len()).map(|_| None).collect();
    parallel_fill(&mut rows, outer, |i| {
        let return_width = results[i].len();

        // Étage interne 1 : déchiffrement et soustraction du masque
        let mut differences: Vec<Option<Ciphertext>> =
            (0..return_width).map(|_| None).collect();
        parallel_fill(&mut differences, inner.min(return_width), |j| {
            recrypt_difference(
                &results[i][j],
                &randoms[i][j],
                sender_encoder,
                sender_decryptor,
                receiver_encoder,
                receiver_evaluator,
            )
        })?;
        let buckets = split_round_robin(unwrap_filled(differences), final_width);

        // Étage interne 2 : produit final, masque multiplicatif, rotation
        let mut row_finals: Vec<Option<Ciphertext>> =
            (0..final_width).map(|_| None).collect();
        parallel_fill(&mut row_finals, inner.min(final_width), |j| {
            finalize_bucket(
                &buckets[j],
                crt,
                receiver_encoder,
                receiver_evaluator,
                receiver_relin_keys,
                receiver_galois_keys,
            )
        })?;
        Ok(unwrap_filled(row_finals))
    })?;

    Ok(unwrap_filled(rows))
}

fn check_recrypt_dims(
    results: &[Vec<Ciphertext>],
    randoms: &[Vec<Ciphertext>],
    final_width: usize,
) -> Result<(), CryptoError> {
    if results.len() != randoms.len() {
        return Err(CryptoError::Protocol(format!(
            "dimensions résultats/masques incohérentes : {} vs {}",
            results.len(),
            randoms.len()
        )));
    }
    for (row_results, row_randoms) in results.iter().zip(randoms.iter()) {
        if row_results.len() != row_randoms.len() {
            return Err(CryptoError::Protocol(
                "largeurs résultats/masques incohérentes".into(),
            ));
        }
        if row_results.is_empty() || final_width > row_results.len() {
            return Err(CryptoError::Parameter(format!(
                "η Receiver incompatible : {} paquets pour {} chiffrés",
                final_width,
                row_results.len()
            )));
        }
    }
    Ok(())
}

// ===========================================================================
// decryptIntersection — côté Receiver, lecture des indicateurs de zéro
// ===========================================================================

pub fn decrypt_intersection(
    finals: &[Vec<Ciphertext>],
    receiver_set: &[u64],
    crt: &CrtParams,
    receiver_encoder: &BatchEncoder,
    receiver_decryptor: &Decryptor,
) -> Result<Vec<u64>, CryptoError> {
    check_final_dims(finals, receiver_set)?;

    let mut flags = vec![false; receiver_set.len()];
    for (flag, row) in flags.iter_mut().zip(finals.iter()) {
        for ct in row {
            let values = pack_decrypt(ct, crt, receiver_encoder, receiver_decryptor)?;
            if values.iter().any(|&v| v == 0) {
                *flag = true;
                break;
            }
        }
    }
    Ok(collect_flagged(receiver_set, &flags))
}

pub fn decrypt_intersection_parallel(
    finals: &[Vec<Ciphertext>],
    receiver_set: &[u64],
    crt: &CrtParams,
    receiver_encoder: &BatchEncoder,
    receiver_decryptor: &Decryptor,
    num_threads: usize,
) -> Result<Vec<u64>, CryptoError> {
    check_final_dims(finals, receiver_set)?;
    if finals.is_empty() {
        return Ok(Vec::new());
    }
    let num_threads = num_threads.max(1);
    let outer = num_threads.min(finals.len());
    let inner = num_threads / outer + usize::from(num_threads % outer != 0);

    let mut flags: Vec<Option<bool>> = (0..finals.len()).map(|_| None).collect();
    parallel_fill(&mut flags, outer, |i| {
        let row = &finals[i];
        let mut zeros: Vec<Option<bool>> = (0..row.len()).map(|_| None).collect();
        parallel_fill(&mut zeros, inner.min(row.len()), |j| {
            let values = pack_decrypt(&row[j], crt, receiver_encoder, receiver_decryptor)?;
            Ok(values.iter().any(|&v| v == 0))
        })?;
        Ok(unwrap_filled(zeros).into_iter().any(|z| z))
    })?;

    let flags = unwrap_filled(flags);
    Ok(collect_flagged(receiver_set, &flags))
}

fn check_final_dims(finals: &[Vec<Ciphertext>], receiver_set: &[u64]) -> Result<(), CryptoError> {
    if finals.len() != receiver_set.len() {
        return Err(CryptoError::Protocol(format!(
            "{} lignes de résultats pour {} requêtes",
            finals.len(),
            receiver_set.len()
        )));
    }
    Ok(())
}

// L'intersection préserve l'ordre d'origine de Y
fn collect_flagged(receiver_set: &[u64], flags: &[bool]) -> Vec<u64> {
    receiver_set
        .iter()
        .zip(flags.iter())
        .filter(|(_, &flag)| flag)
        .map(|(&y, _)| y)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_robin_sizes_differ_by_at_most_one() {
        let buckets = split_round_robin((0..7).collect::<Vec<_>>(), 3);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0], vec![0, 3, 6]);
        assert_eq!(buckets[1], vec![1, 4]);
        assert_eq!(buckets[2], vec![2, 5]);
    }

    #[test]
    fn test_parallel_fill_covers_all_indices() {
        let mut slots: Vec<Option<usize>> = (0..17).map(|_| None).collect();
        parallel_fill(&mut slots, 4, |i| Ok(i * i)).unwrap();
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(*slot, Some(i * i));
        }
    }

    #[test]
    fn test_parallel_fill_propagates_errors() {
        let mut slots: Vec<Option<usize>> = (0..8).map(|_| None).collect();
        let result = parallel_fill(&mut slots, 3, |i| {
            if i == 5 {
                Err(CryptoError::Parameter("boom".into()))
            } else {
                Ok(i)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_flagged_preserves_order() {
        let set = [30u64, 10, 20];
        let flags = [true, false, true];
        assert_eq!(collect_flagged(&set, &flags), vec![30, 20]);
    }
}

pub mod socket;
pub mod channel;

// Réexportations pratiques pour l'utilisateur du module

pub use socket::FramedSocket;
pub use channel::{
    receive_ciphertexts, receive_count, receive_galois_keys, receive_relin_keys, receive_table,
    send_ciphertexts, send_count, send_galois_keys, send_relin_keys, send_table,
};

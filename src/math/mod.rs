pub mod math;
pub mod prime;
pub mod crt;
pub mod random;

// Réexportations pratiques pour l'utilisateur du module

pub use math::{clog2, flog2, modinv, mulmod, powm, shift_left, shift_right};
pub use prime::{are_coprime, gcd, generate_ntt_prime, generate_prime, is_prime};
pub use crt::{crt_decode, crt_encode, crt_params, CrtParams};
pub use random::{random_vector, random_vector_coprime};

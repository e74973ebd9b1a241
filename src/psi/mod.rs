pub mod party;
pub mod intersect;

// Réexportations pratiques pour l'utilisateur du module

pub use party::Party;
pub use intersect::{
    compute_intersection, compute_intersection_parallel, decrypt_intersection,
    decrypt_intersection_parallel, recrypt, recrypt_parallel,
};

//! Human-readable encoding of the pairing secret.
//!
//! The 14 bytes of entropy are read as a big-endian bit stream and cut into
//! ten 11-bit indices into the BIP-39 English word list. The two trailing bits
//! are not encoded.

use bip39::Language;

use crate::types::{PairingSecret, PAIRING_SECRET_SIZE};

/// Number of words in a pairing phrase.
pub const PAIRING_PHRASE_WORDS: usize = 10;

const BITS_PER_WORD: usize = 11;

/// Encode pairing secret entropy into its ten-word phrase.
pub fn pairing_secret_to_words(secret: &PairingSecret) -> [&'static str; PAIRING_PHRASE_WORDS] {
    let words = Language::English.word_list();
    let mut out = [""; PAIRING_PHRASE_WORDS];
    let mut bit = 0;

    for slot in out.iter_mut() {
        let mut idx = 0usize;
        for _ in 0..BITS_PER_WORD {
            idx <<= 1;
            if bit_at(secret, bit) {
                idx |= 1;
            }
            bit += 1;
        }
        *slot = words[idx];
    }

    out
}

/// Space-separated pairing phrase, as shown to users.
pub fn pairing_secret_to_mnemonic(secret: &PairingSecret) -> String {
    pairing_secret_to_words(secret).join(" ")
}

fn bit_at(data: &[u8; PAIRING_SECRET_SIZE], idx: usize) -> bool {
    let byte = data[idx / 8];
    (byte >> (7 - idx % 8)) & 1 == 1
}

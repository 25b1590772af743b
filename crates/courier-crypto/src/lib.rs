//! At-rest encryption for message text.
//!
//! Every message gets a fresh random nonce (the IV), and the stored payload
//! is `base64(iv) + ":" + base64(ciphertext)`. One server-wide AES-256-GCM key
//! is used for all rows. This protects database dumps, not traffic between
//! users; the server can always read the text.

pub mod encrypt;
pub mod keys;

pub use encrypt::MessageCipher;

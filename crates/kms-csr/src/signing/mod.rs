mod signer;
mod kms;

pub use signer::ContentSigner;
pub use kms::{KmsContentSigner, SignerState};

use std::io;

use spki::AlgorithmIdentifierOwned;

use crate::error::Result;

/// Signs a byte stream written into it.
///
/// Callers write the to-be-signed bytes through `io::Write`, then call
/// [`signature`](ContentSigner::signature) once. Implementations are sync;
/// remote backends block on the call.
pub trait ContentSigner: io::Write {
    /// Signature algorithm the produced signature will carry.
    fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned>;

    /// Signs everything written so far. Raw signature bytes (DER for ECDSA).
    fn signature(&mut self) -> Result<Vec<u8>>;
}

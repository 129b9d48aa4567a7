use crate::domain::payment::IncomingPayment;
use crate::error::{Result, SoakError};
use std::io::Read;

/// Reads recorded payment notifications, one JSON object after another.
///
/// Objects are usually one per line but any whitespace separation works.
pub struct PaymentReader<R: Read> {
    source: R,
}

impl<R: Read> PaymentReader<R> {
    /// Creates a new `PaymentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Returns an iterator that lazily decodes notifications.
    ///
    /// A malformed object yields an error; decoding cannot resume after it,
    /// so the iterator ends there.
    pub fn payments(self) -> impl Iterator<Item = Result<IncomingPayment>> {
        let mut failed = false;
        serde_json::Deserializer::from_reader(self.source)
            .into_iter::<IncomingPayment>()
            .map(|result| result.map_err(SoakError::from))
            .take_while(move |result| {
                let keep = !failed;
                failed |= result.is_err();
                keep
            })
    }
}

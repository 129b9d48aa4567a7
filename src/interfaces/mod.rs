//! Readers and writers for recorded payment data.

pub mod csv {
    pub mod transfer_writer;
}

pub mod jsonl {
    pub mod payment_reader;
}

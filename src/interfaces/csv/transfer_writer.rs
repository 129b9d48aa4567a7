use crate::domain::payment::OutgoingRequest;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct TransferRow<'a> {
    to: &'a str,
    amount: u64,
    metadata: &'a str,
}

/// Writes executed transfers as CSV with a `to,amount,metadata` header.
pub struct TransferWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TransferWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_transfers<'a>(
        &mut self,
        transfers: impl IntoIterator<Item = &'a OutgoingRequest>,
    ) -> Result<()> {
        let mut written = false;
        for transfer in transfers {
            self.writer.serialize(TransferRow {
                to: &transfer.to,
                amount: transfer.amount,
                metadata: transfer.meta.as_deref().unwrap_or_default(),
            })?;
            written = true;
        }
        if !written {
            self.writer.write_record(["to", "amount", "metadata"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_rows() {
        let transfers = vec![
            OutgoingRequest::new("alice@switchcraft.kst", 33, Some("message=hi; there".to_string()))
                .unwrap(),
            OutgoingRequest::new("kpayer0001", 1, None).unwrap(),
        ];

        let mut out = Vec::new();
        TransferWriter::new(&mut out).write_transfers(&transfers).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "to,amount,metadata\nalice@switchcraft.kst,33,message=hi; there\nkpayer0001,1,\n"
        );
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let mut out = Vec::new();
        TransferWriter::new(&mut out)
            .write_transfers(std::iter::empty())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "to,amount,metadata\n");
    }
}

//! CSV framing for `COPY FROM STDIN`.
//!
//! Each row is written as `<id><delimiter><quote><payload><quote>\n`, with
//! every quote character inside the payload doubled. JSON text always
//! contains quotes, so the payload field is quoted unconditionally.

use super::binder::RowBinder;
use crate::error::{ConfigError, EncodeError};
use crate::store::TargetTable;

/// Delimiter and quote character of the copy stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFormat {
    delimiter: char,
    quote: char,
}

impl Default for CopyFormat {
    fn default() -> Self {
        Self {
            delimiter: ';',
            quote: '"',
        }
    }
}

impl CopyFormat {
    /// PostgreSQL requires single-byte, distinct delimiter and quote
    /// characters that are not line terminators. Digits and `-` would
    /// collide with the unquoted id column.
    pub fn new(delimiter: char, quote: char) -> Result<Self, ConfigError> {
        for (key, ch) in [("delimiter", delimiter), ("quote", quote)] {
            if !ch.is_ascii() || matches!(ch, '\n' | '\r' | '-' | '0'..='9') {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: ch.escape_default().to_string(),
                });
            }
        }

        if delimiter == quote {
            return Err(ConfigError::InvalidValue {
                key: "quote",
                value: format!("{quote} (same as delimiter)"),
            });
        }

        Ok(Self { delimiter, quote })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn quote(&self) -> char {
        self.quote
    }

    pub fn statement(&self, table: &TargetTable) -> String {
        format!(
            "COPY {} (id, payload) FROM STDIN WITH (FORMAT csv, DELIMITER {}, QUOTE {})",
            table.qualified_name(),
            sql_char(self.delimiter),
            sql_char(self.quote)
        )
    }

    /// Append one row to `frame`.
    pub fn write_row(&self, frame: &mut String, id: i64, payload: &str) {
        frame.push_str(&id.to_string());
        frame.push(self.delimiter);
        frame.push(self.quote);
        for ch in payload.chars() {
            if ch == self.quote {
                frame.push(ch);
            }
            frame.push(ch);
        }
        frame.push(self.quote);
        frame.push('\n');
    }

    /// Frame a whole chunk. Fails before producing any output if a row does
    /// not encode.
    pub fn build_frame<B: RowBinder + ?Sized>(
        &self,
        binder: &B,
    ) -> Result<String, (usize, EncodeError)> {
        let mut frame = String::new();

        for index in 0..binder.len() {
            let row = binder.bind_row(index).map_err(|err| (index, err))?;
            self.write_row(&mut frame, row.id, &row.payload);
        }

        Ok(frame)
    }
}

fn sql_char(ch: char) -> String {
    if ch == '\'' {
        "''''".to_string()
    } else {
        format!("'{ch}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::SerdeJsonEncoder;
    use crate::load::binder::ChunkBinder;
    use crate::test_support::TestRecord;
    use serde_json::json;

    #[test]
    fn quotes_in_payload_are_doubled() {
        let mut frame = String::new();
        CopyFormat::default().write_row(&mut frame, 0, r#"{"name":"item-\"1\""}"#);

        assert_eq!(frame, "0;\"{\"\"name\"\":\"\"item-\\\"\"1\\\"\"\"\"}\"\n");
    }

    #[test]
    fn frame_uses_absolute_positions() {
        let records = vec![json!({"v": 1}), json!({"v": 2})];
        let binder = ChunkBinder::new(&records, 50_000, &SerdeJsonEncoder);

        let frame = CopyFormat::default().build_frame(&binder).unwrap();
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines, vec![r#"50000;"{""v"":1}""#, r#"50001;"{""v"":2}""#]);
    }

    #[test]
    fn encode_failure_produces_no_frame() {
        let records = vec![TestRecord::valid(json!({})), TestRecord::unencodable()];
        let binder = ChunkBinder::new(&records, 0, &SerdeJsonEncoder);

        let (index, _) = CopyFormat::default().build_frame(&binder).unwrap_err();
        assert_eq!(index, 1);
    }

    #[test]
    fn statement_declares_delimiter_and_quote() {
        let table = TargetTable::new("json_table").in_schema("run_1");
        let statement = CopyFormat::default().statement(&table);

        assert_eq!(
            statement,
            "COPY \"run_1\".\"json_table\" (id, payload) FROM STDIN WITH (FORMAT csv, DELIMITER ';', QUOTE '\"')"
        );
    }

    #[test]
    fn single_quote_is_escaped_in_statement() {
        let format = CopyFormat::new(',', '\'').unwrap();
        let statement = format.statement(&TargetTable::new("t"));
        assert!(statement.ends_with("DELIMITER ',', QUOTE '''')"));
    }

    #[test]
    fn rejects_invalid_formats() {
        assert!(CopyFormat::new(';', ';').is_err());
        assert!(CopyFormat::new('\n', '"').is_err());
        assert!(CopyFormat::new('§', '"').is_err());
    }

    #[test]
    fn rejects_characters_used_by_ids() {
        assert!(CopyFormat::new('1', '"').is_err());
        assert!(CopyFormat::new(';', '0').is_err());
        assert!(CopyFormat::new('-', '"').is_err());
        assert!(CopyFormat::new('|', '\'').is_ok());
    }
}
